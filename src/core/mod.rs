mod costs;
mod engine;
mod error;
mod fpr;
mod history;
mod reducer;
mod report;
mod tax;
mod types;

pub use costs::{band_costs, cost_of_change, summarize_years};
pub use engine::{
    Progression, ProgressionEngine, ProgressionState, YearStep, project_band, run_simulation,
    validate_config,
};
pub use error::{PayModelError, Result};
pub use fpr::{
    FprBreakdown, FprStep, breakdown, compute_target, erosion_for_target, fpr_percent,
    real_terms_change, targets_for_bands,
};
pub use history::{HistoricalIndexTable, HistoricalRecord};
pub use reducer::{broadcast_headline, flat_as_percentage, weighted_average_increase};
pub use report::{render_measure_report, report_file_name};
pub use tax::{
    EMPLOYER_PENSION_RATE, employee_ni, employer_ni, income_deductions, income_tax, pension,
};
pub use types::{
    Band, BandProjection, CostRecord, ErosionCompounding, FormulaPolicy, FprFormula, FprWindow,
    InflationMeasure, PensionCostPolicy, SimulationConfig, SimulationResult, WorkingHours,
    Year0Baseline, YearCostSummary, YearInput,
};
