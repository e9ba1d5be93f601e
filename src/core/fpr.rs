use serde::Serialize;
use tracing::debug;

use super::error::{PayModelError, Result};
use super::history::HistoricalIndexTable;
use super::types::{Band, FprFormula, FprWindow, InflationMeasure};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FprStep {
    pub year_label: String,
    pub pay_award: f64,
    pub inflation: Option<f64>,
    pub real_change: Option<f64>,
    pub cumulative_effect: f64,
    pub projected: bool,
}

impl FprStep {
    pub fn skipped(&self) -> bool {
        self.real_change.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FprBreakdown {
    pub band_id: Option<String>,
    pub measure: InflationMeasure,
    pub window: FprWindow,
    pub steps: Vec<FprStep>,
    pub cumulative_effect: f64,
    pub fpr_percent: f64,
    pub erosion_percent: f64,
}

impl FprBreakdown {
    pub fn purchasing_power_percent(&self) -> f64 {
        self.cumulative_effect * 100.0
    }

    /// Pay a band would need today to restore its purchasing power.
    pub fn restored_pay(&self, current_pay: f64) -> f64 {
        current_pay * (1.0 + self.fpr_percent / 100.0)
    }
}

pub fn real_terms_change(pay_rise: f64, inflation: f64) -> f64 {
    (1.0 + pay_rise) / (1.0 + inflation) - 1.0
}

pub fn fpr_percent(cumulative_effect: f64, formula: FprFormula) -> f64 {
    match formula {
        FprFormula::Restoration => (1.0 / cumulative_effect - 1.0) * 100.0,
        FprFormula::ErosionComplement => (1.0 - cumulative_effect) * 100.0,
    }
}

/// Inverse of [`fpr_percent`]: the erosion (cumulative effect minus one) a
/// band starts from when its target is `target_percent`.
///
/// The default `Restoration` formula starts from `1/(1+T) - 1`, not `-T`, so
/// a single real rise equal to the target brings erosion back to exactly zero
/// and progress to 100. `ErosionComplement` starts from `-T`.
pub fn erosion_for_target(target_percent: f64, formula: FprFormula) -> f64 {
    let target = target_percent / 100.0;
    match formula {
        FprFormula::Restoration => 1.0 / (1.0 + target) - 1.0,
        FprFormula::ErosionComplement => -target,
    }
}

/// Walks the years after the baseline `window.start_year` up to and including
/// `window.end_year`, compounding each year's real-terms change.
pub fn breakdown(
    table: &HistoricalIndexTable,
    band_id: Option<&str>,
    window: &FprWindow,
    measure: InflationMeasure,
    projected_inflation: Option<f64>,
    formula: FprFormula,
) -> Result<FprBreakdown> {
    let (start_idx, end_idx) = table.ordered_positions(&window.start_year, &window.end_year)?;
    let records = &table.records()[start_idx + 1..=end_idx];

    let mut cumulative_effect = 1.0;
    let mut steps = Vec::with_capacity(records.len());
    for record in records {
        let pay_award = table.resolve_award(record, band_id)?;
        let is_terminal = record.year_label == window.end_year;

        let (inflation, projected) = match record.inflation(measure) {
            Some(value) => (Some(value), false),
            None if is_terminal => (projected_inflation, projected_inflation.is_some()),
            None => (None, false),
        };

        let real_change = match inflation {
            Some(inflation) if inflation > -1.0 => {
                let change = real_terms_change(pay_award, inflation);
                cumulative_effect *= 1.0 + change;
                Some(change)
            }
            Some(inflation) => {
                return Err(PayModelError::InvalidConfig(format!(
                    "inflation for {} must be above -100%, got {inflation}",
                    record.year_label
                )));
            }
            None => {
                debug!(
                    target: "pay_restoration::fpr",
                    year = record.year_label.as_str(),
                    measure = measure.label(),
                    "no inflation data, year skipped"
                );
                None
            }
        };

        steps.push(FprStep {
            year_label: record.year_label.clone(),
            pay_award,
            inflation,
            real_change,
            cumulative_effect,
            projected,
        });
    }

    Ok(FprBreakdown {
        band_id: band_id.map(str::to_string),
        measure,
        window: window.clone(),
        steps,
        cumulative_effect,
        fpr_percent: fpr_percent(cumulative_effect, formula),
        erosion_percent: (1.0 - cumulative_effect) * 100.0,
    })
}

pub fn compute_target(
    table: &HistoricalIndexTable,
    band_id: Option<&str>,
    window: &FprWindow,
    measure: InflationMeasure,
    projected_inflation: Option<f64>,
    formula: FprFormula,
) -> Result<f64> {
    breakdown(table, band_id, window, measure, projected_inflation, formula)
        .map(|b| b.fpr_percent)
}

pub fn targets_for_bands(
    table: &HistoricalIndexTable,
    bands: &[Band],
    window: &FprWindow,
    measure: InflationMeasure,
    projected_inflation: Option<f64>,
    formula: FprFormula,
) -> Result<Vec<f64>> {
    bands
        .iter()
        .map(|band| {
            compute_target(
                table,
                Some(&band.id),
                window,
                measure,
                projected_inflation,
                formula,
            )
        })
        .collect()
}
