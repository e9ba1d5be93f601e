use std::collections::BTreeSet;

use tracing::{debug, info};

use super::costs::{band_costs, summarize_years};
use super::error::{PayModelError, Result};
use super::fpr::{erosion_for_target, real_terms_change, targets_for_bands};
use super::history::HistoricalIndexTable;
use super::reducer::flat_as_percentage;
use super::types::{
    Band, BandProjection, CostRecord, ErosionCompounding, FormulaPolicy, SimulationConfig,
    SimulationResult, Year0Baseline, YearInput,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressionState {
    pub nominal_pay: f64,
    pub real_pay: f64,
    pub erosion: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YearStep {
    pub state: ProgressionState,
    pub total_pay_rise: f64,
    pub real_terms_change: f64,
    pub progress_percent: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Progression {
    pub band_id: String,
    pub fpr_target_percent: f64,
    pub initial: ProgressionState,
    pub initial_progress: f64,
    pub steps: Vec<YearStep>,
}

impl Progression {
    pub fn final_state(&self) -> ProgressionState {
        self.steps.last().map_or(self.initial, |step| step.state)
    }

    pub fn nominal_series(&self) -> Vec<f64> {
        self.series(|state| state.nominal_pay)
    }

    pub fn real_series(&self) -> Vec<f64> {
        self.series(|state| state.real_pay)
    }

    pub fn erosion_series(&self) -> Vec<f64> {
        self.series(|state| state.erosion)
    }

    pub fn progress_series(&self) -> Vec<f64> {
        std::iter::once(self.initial_progress)
            .chain(self.steps.iter().map(|step| step.progress_percent))
            .collect()
    }

    /// Year-on-year change in nominal pay, starting from base pay.
    pub fn nominal_deltas(&self) -> Vec<f64> {
        self.nominal_series()
            .windows(2)
            .map(|pair| pair[1] - pair[0])
            .collect()
    }

    fn series(&self, field: impl Fn(&ProgressionState) -> f64) -> Vec<f64> {
        std::iter::once(&self.initial)
            .chain(self.steps.iter().map(|step| &step.state))
            .map(field)
            .collect()
    }
}

/// Year-by-year state machine for a single band.
#[derive(Debug, Clone)]
pub struct ProgressionEngine<'a> {
    band: &'a Band,
    fpr_target_percent: f64,
    initial_erosion: f64,
    policy: FormulaPolicy,
}

impl<'a> ProgressionEngine<'a> {
    pub fn new(band: &'a Band, fpr_target_percent: f64, policy: FormulaPolicy) -> Self {
        Self {
            band,
            fpr_target_percent,
            initial_erosion: erosion_for_target(fpr_target_percent, policy.fpr_formula),
            policy,
        }
    }

    pub fn initial_state(&self) -> ProgressionState {
        ProgressionState {
            nominal_pay: self.band.base_pay,
            real_pay: self.band.base_pay,
            erosion: self.initial_erosion,
        }
    }

    /// Share of the starting erosion that has been won back, in percent.
    /// Not clamped: overshooting restoration reads above 100.
    pub fn progress(&self, erosion: f64) -> Result<f64> {
        if self.initial_erosion == 0.0 {
            if erosion >= 0.0 {
                return Ok(100.0);
            }
            return Err(PayModelError::DegenerateTarget {
                band_id: self.band.id.clone(),
            });
        }
        Ok((erosion - self.initial_erosion) / -self.initial_erosion * 100.0)
    }

    pub fn step(
        &self,
        year_index: usize,
        previous: ProgressionState,
        input: &YearInput,
    ) -> Result<YearStep> {
        let band = self.band;
        let (total_pay_rise, nominal_pay) = if year_index == 0 {
            let total = band.existing_award()
                + input.percentage_increase
                + flat_as_percentage(input.flat_increase, band.base_pay);
            let nominal = match self.policy.year0_baseline {
                Year0Baseline::BasePay => band.base_pay * (1.0 + total),
                Year0Baseline::OfferedPay => {
                    band.offered_pay * (1.0 + input.percentage_increase) + input.flat_increase
                }
            };
            (total, nominal)
        } else {
            let percentage = input.percentage_increase + input.inflation_rate;
            let total =
                percentage + flat_as_percentage(input.flat_increase, previous.nominal_pay);
            let nominal = previous.nominal_pay * (1.0 + percentage) + input.flat_increase;
            (total, nominal)
        };

        let real_change = real_terms_change(total_pay_rise, input.inflation_rate);
        let erosion = match self.policy.erosion_compounding {
            ErosionCompounding::Multiplicative => {
                (1.0 + previous.erosion) * (1.0 + real_change) - 1.0
            }
            ErosionCompounding::Additive => previous.erosion + real_change,
        };

        Ok(YearStep {
            state: ProgressionState {
                nominal_pay,
                real_pay: nominal_pay / (1.0 + input.inflation_rate),
                erosion,
            },
            total_pay_rise,
            real_terms_change: real_change,
            progress_percent: self.progress(erosion)?,
        })
    }

    pub fn run(&self, inputs: &[YearInput]) -> Result<Progression> {
        let initial = self.initial_state();
        let mut state = initial;
        let mut steps = Vec::with_capacity(inputs.len());
        for (year_index, input) in inputs.iter().enumerate() {
            let step = self.step(year_index, state, input)?;
            state = step.state;
            steps.push(step);
        }

        Ok(Progression {
            band_id: self.band.id.clone(),
            fpr_target_percent: self.fpr_target_percent,
            initial,
            initial_progress: self.progress(initial.erosion)?,
            steps,
        })
    }
}

pub fn project_band(
    band: &Band,
    fpr_target_percent: f64,
    inputs: &[YearInput],
    policy: FormulaPolicy,
) -> Result<Progression> {
    ProgressionEngine::new(band, fpr_target_percent, policy).run(inputs)
}

/// Runs every band through the progression engine and prices the deal.
pub fn run_simulation(
    config: &SimulationConfig,
    table: &HistoricalIndexTable,
) -> Result<SimulationResult> {
    validate_config(config)?;

    let targets = targets_for_bands(
        table,
        &config.bands,
        &config.fpr_window,
        config.inflation_measure,
        config.projected_inflation,
        config.policy.fpr_formula,
    )?;

    let mut bands = Vec::with_capacity(config.bands.len());
    let mut band_cost_rows = Vec::with_capacity(config.bands.len());
    for (idx, (band, target)) in config.bands.iter().zip(targets).enumerate() {
        let inputs = config.band_inputs(idx);
        let progression = project_band(band, target, &inputs, config.policy)?;
        let costs = band_costs(band, &progression, &config.hours, config.policy)?;
        let final_inflation = inputs.last().map_or(0.0, |input| input.inflation_rate);
        debug!(
            target: "pay_restoration::engine",
            band = band.id.as_str(),
            fpr_target = target,
            final_pay = progression.final_state().nominal_pay,
            final_erosion = progression.final_state().erosion,
            "band projected"
        );
        bands.push(build_projection(band, &progression, &costs, final_inflation));
        band_cost_rows.push(costs);
    }

    let years = summarize_years(&band_cost_rows, config.year_inputs.len());
    let total_nominal_cost = bands.iter().map(|b| b.total_nominal_cost).sum();
    let total_real_cost = bands.iter().map(|b| b.total_real_cost).sum();
    let total_tax_recouped = years.iter().map(|y| y.tax_recouped).sum();
    let total_net_cost = years.iter().map(|y| y.net_cost).sum();
    let average_fpr_progress = bands
        .iter()
        .map(|b| b.fpr_progress.last().copied().unwrap_or(0.0))
        .sum::<f64>()
        / bands.len() as f64;

    info!(
        target: "pay_restoration::engine",
        bands = bands.len(),
        years = years.len(),
        measure = config.inflation_measure.label(),
        total_nominal_cost,
        total_net_cost,
        average_fpr_progress,
        "simulation complete"
    );

    Ok(SimulationResult {
        inflation_measure: config.inflation_measure,
        fpr_window: config.fpr_window.clone(),
        bands,
        years,
        total_nominal_cost,
        total_real_cost,
        total_tax_recouped,
        total_net_cost,
        average_fpr_progress,
    })
}

fn build_projection(
    band: &Band,
    progression: &Progression,
    costs: &[CostRecord],
    final_inflation: f64,
) -> BandProjection {
    let final_state = progression.final_state();
    let total_nominal_increase = final_state.nominal_pay - band.base_pay;
    let total_real_increase = final_state.real_pay - band.base_pay;
    let total_nominal_cost: f64 = costs.iter().map(|c| c.total_cost).sum();

    BandProjection {
        band_id: band.id.clone(),
        base_pay: band.base_pay,
        offered_pay: band.offered_pay,
        headcount: band.headcount,
        fpr_target_percent: progression.fpr_target_percent,
        fpr_target_pay: band.base_pay * (1.0 + progression.fpr_target_percent / 100.0),
        nominal_pay: progression.nominal_series(),
        real_pay: progression.real_series(),
        erosion: progression.erosion_series(),
        fpr_progress: progression.progress_series(),
        total_pay_rise: progression.steps.iter().map(|s| s.total_pay_rise).collect(),
        real_terms_change: progression
            .steps
            .iter()
            .map(|s| s.real_terms_change)
            .collect(),
        nominal_deltas: progression.nominal_deltas(),
        final_pay: final_state.nominal_pay,
        total_nominal_increase,
        total_real_increase,
        nominal_percent_increase: total_nominal_increase / band.base_pay * 100.0,
        real_percent_increase: total_real_increase / band.base_pay * 100.0,
        costs: costs.to_vec(),
        total_nominal_cost,
        total_real_cost: total_nominal_cost / (1.0 + final_inflation),
    }
}

/// Rejects configs the engine cannot price. Run before any result is reused.
pub fn validate_config(config: &SimulationConfig) -> Result<()> {
    let invalid = |msg: String| Err(PayModelError::InvalidConfig(msg));

    if config.bands.is_empty() {
        return invalid("at least one band is required".to_string());
    }

    let mut seen = BTreeSet::new();
    for band in &config.bands {
        if !seen.insert(band.id.as_str()) {
            return invalid(format!("duplicate band id {}", band.id));
        }
        if !band.base_pay.is_finite() || band.base_pay <= 0.0 {
            return invalid(format!("base pay for {} must be > 0", band.id));
        }
        if !band.offered_pay.is_finite() || band.offered_pay <= 0.0 {
            return invalid(format!("offered pay for {} must be > 0", band.id));
        }
    }

    for (year_index, year) in config.year_inputs.iter().enumerate() {
        if year.len() != config.bands.len() {
            return invalid(format!(
                "year {year_index} has {} band inputs, expected {}",
                year.len(),
                config.bands.len()
            ));
        }
        for input in year {
            if !input.inflation_rate.is_finite() || input.inflation_rate <= -1.0 {
                return invalid(format!("inflation in year {year_index} must be above -100%"));
            }
            if !input.percentage_increase.is_finite() || !input.flat_increase.is_finite() {
                return invalid(format!("pay rise in year {year_index} must be finite"));
            }
        }
    }

    if let Some(projected) = config.projected_inflation {
        if !projected.is_finite() || projected <= -1.0 {
            return invalid("projected inflation must be above -100%".to_string());
        }
    }

    let hours = &config.hours;
    if !hours.standard_weekly_hours.is_finite() || hours.standard_weekly_hours <= 0.0 {
        return invalid("standard weekly hours must be > 0".to_string());
    }
    for (label, value) in [
        ("additional hours", hours.additional_hours),
        ("out-of-hours", hours.out_of_hours),
        ("OOH multiplier", hours.ooh_multiplier),
    ] {
        if !value.is_finite() || value < 0.0 {
            return invalid(format!("{label} must be >= 0"));
        }
    }

    Ok(())
}
