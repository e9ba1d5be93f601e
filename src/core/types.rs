use serde::Serialize;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InflationMeasure {
    Rpi,
    Cpi,
    Cpih,
}

impl InflationMeasure {
    pub const ALL: [InflationMeasure; 3] = [Self::Rpi, Self::Cpi, Self::Cpih];

    pub fn label(self) -> &'static str {
        match self {
            Self::Rpi => "RPI",
            Self::Cpi => "CPI",
            Self::Cpih => "CPIH",
        }
    }
}

/// How the cumulative real-terms effect is turned into an FPR percentage.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FprFormula {
    /// `(1 / c - 1) * 100`: the nominal rise that restores purchasing power.
    Restoration,
    /// `(1 - c) * 100`: the share of purchasing power lost.
    ErosionComplement,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErosionCompounding {
    Multiplicative,
    Additive,
}

/// Pay level the first simulated year is measured from.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Year0Baseline {
    BasePay,
    OfferedPay,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PensionCostPolicy {
    DifferenceOfEvaluations,
    FlatRateOfDelta,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormulaPolicy {
    pub fpr_formula: FprFormula,
    pub erosion_compounding: ErosionCompounding,
    pub year0_baseline: Year0Baseline,
    pub pension_cost: PensionCostPolicy,
}

impl Default for FormulaPolicy {
    fn default() -> Self {
        Self {
            fpr_formula: FprFormula::Restoration,
            erosion_compounding: ErosionCompounding::Multiplicative,
            year0_baseline: Year0Baseline::BasePay,
            pension_cost: PensionCostPolicy::DifferenceOfEvaluations,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Band {
    pub id: String,
    pub base_pay: f64,
    pub offered_pay: f64,
    pub headcount: u32,
}

impl Band {
    pub fn new(id: impl Into<String>, base_pay: f64, offered_pay: f64, headcount: u32) -> Self {
        Self {
            id: id.into(),
            base_pay,
            offered_pay,
            headcount,
        }
    }

    /// Rise already baked into the offered pay, as a fraction of base pay.
    pub fn existing_award(&self) -> f64 {
        self.offered_pay / self.base_pay - 1.0
    }
}

/// One simulated year for one band. All rates are fractions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearInput {
    pub percentage_increase: f64,
    pub flat_increase: f64,
    pub inflation_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkingHours {
    pub standard_weekly_hours: f64,
    pub additional_hours: f64,
    pub out_of_hours: f64,
    pub ooh_multiplier: f64,
}

impl WorkingHours {
    pub fn none() -> Self {
        Self {
            standard_weekly_hours: 40.0,
            additional_hours: 0.0,
            out_of_hours: 0.0,
            ooh_multiplier: 0.0,
        }
    }

    pub fn additional_pay(&self, basic_pay: f64) -> f64 {
        basic_pay / self.standard_weekly_hours * self.additional_hours
    }

    pub fn ooh_pay(&self, basic_pay: f64) -> f64 {
        basic_pay / self.standard_weekly_hours * self.out_of_hours * self.ooh_multiplier
    }

    pub fn total_pay(&self, basic_pay: f64) -> f64 {
        basic_pay + self.additional_pay(basic_pay) + self.ooh_pay(basic_pay)
    }
}

impl Default for WorkingHours {
    fn default() -> Self {
        Self {
            standard_weekly_hours: 40.0,
            additional_hours: 8.0,
            out_of_hours: 8.0,
            ooh_multiplier: 0.37,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FprWindow {
    pub start_year: String,
    pub end_year: String,
}

impl FprWindow {
    pub fn new(start_year: impl Into<String>, end_year: impl Into<String>) -> Self {
        Self {
            start_year: start_year.into(),
            end_year: end_year.into(),
        }
    }
}

/// Everything a run depends on besides the historical table. `year_inputs` is
/// year-major; each inner vector is aligned with `bands`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationConfig {
    pub bands: Vec<Band>,
    pub year_inputs: Vec<Vec<YearInput>>,
    pub inflation_measure: InflationMeasure,
    pub fpr_window: FprWindow,
    pub projected_inflation: Option<f64>,
    pub hours: WorkingHours,
    pub policy: FormulaPolicy,
}

impl SimulationConfig {
    pub fn band_inputs(&self, band_index: usize) -> Vec<YearInput> {
        self.year_inputs
            .iter()
            .map(|year| year[band_index])
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostRecord {
    pub year_index: usize,
    pub basic_pay_cost: f64,
    pub additional_pay_cost: f64,
    pub ooh_cost: f64,
    pub pension_cost: f64,
    pub employer_ni_cost: f64,
    pub total_cost: f64,
    pub tax_recouped: f64,
    pub net_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BandProjection {
    pub band_id: String,
    pub base_pay: f64,
    pub offered_pay: f64,
    pub headcount: u32,
    pub fpr_target_percent: f64,
    pub fpr_target_pay: f64,
    pub nominal_pay: Vec<f64>,
    pub real_pay: Vec<f64>,
    pub erosion: Vec<f64>,
    pub fpr_progress: Vec<f64>,
    pub total_pay_rise: Vec<f64>,
    pub real_terms_change: Vec<f64>,
    pub nominal_deltas: Vec<f64>,
    pub final_pay: f64,
    pub total_nominal_increase: f64,
    pub total_real_increase: f64,
    pub nominal_percent_increase: f64,
    pub real_percent_increase: f64,
    pub costs: Vec<CostRecord>,
    pub total_nominal_cost: f64,
    pub total_real_cost: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearCostSummary {
    pub year_index: usize,
    pub basic_pay_cost: f64,
    pub additional_pay_cost: f64,
    pub ooh_cost: f64,
    pub pension_cost: f64,
    pub employer_ni_cost: f64,
    pub total_cost: f64,
    pub tax_recouped: f64,
    pub net_cost: f64,
    pub cumulative_total_cost: f64,
    pub cumulative_net_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    pub inflation_measure: InflationMeasure,
    pub fpr_window: FprWindow,
    pub bands: Vec<BandProjection>,
    pub years: Vec<YearCostSummary>,
    pub total_nominal_cost: f64,
    pub total_real_cost: f64,
    pub total_tax_recouped: f64,
    pub total_net_cost: f64,
    pub average_fpr_progress: f64,
}
