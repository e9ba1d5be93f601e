use axum::{
    Router,
    extract::{Json, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::core::{
    Band, ErosionCompounding, FormulaPolicy, FprBreakdown, FprFormula, FprWindow,
    HistoricalIndexTable, HistoricalRecord, InflationMeasure, PayModelError, PensionCostPolicy,
    SimulationConfig, SimulationResult, WorkingHours, Year0Baseline, YearInput, breakdown,
    broadcast_headline, render_measure_report, report_file_name, run_simulation,
    validate_config, weighted_average_increase,
};

const DEFAULT_NODAL_POINTS: [(&str, f64, f64); 5] = [
    ("Nodal 1", 36_616.0, 38_831.0),
    ("Nodal 2", 42_008.0, 44_439.0),
    ("Nodal 3", 49_909.0, 52_656.0),
    ("Nodal 4", 61_825.0, 65_048.0),
    ("Nodal 5", 70_425.0, 73_992.0),
];

const CACHE_CAPACITY: usize = 64;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliInflationMeasure {
    Rpi,
    Cpi,
    Cpih,
}

impl From<CliInflationMeasure> for InflationMeasure {
    fn from(value: CliInflationMeasure) -> Self {
        match value {
            CliInflationMeasure::Rpi => InflationMeasure::Rpi,
            CliInflationMeasure::Cpi => InflationMeasure::Cpi,
            CliInflationMeasure::Cpih => InflationMeasure::Cpih,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliFprFormula {
    Restoration,
    ErosionComplement,
}

impl From<CliFprFormula> for FprFormula {
    fn from(value: CliFprFormula) -> Self {
        match value {
            CliFprFormula::Restoration => FprFormula::Restoration,
            CliFprFormula::ErosionComplement => FprFormula::ErosionComplement,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliErosionCompounding {
    Multiplicative,
    Additive,
}

impl From<CliErosionCompounding> for ErosionCompounding {
    fn from(value: CliErosionCompounding) -> Self {
        match value {
            CliErosionCompounding::Multiplicative => ErosionCompounding::Multiplicative,
            CliErosionCompounding::Additive => ErosionCompounding::Additive,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliYear0Baseline {
    BasePay,
    OfferedPay,
}

impl From<CliYear0Baseline> for Year0Baseline {
    fn from(value: CliYear0Baseline) -> Self {
        match value {
            CliYear0Baseline::BasePay => Year0Baseline::BasePay,
            CliYear0Baseline::OfferedPay => Year0Baseline::OfferedPay,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliPensionCostPolicy {
    DifferenceOfEvaluations,
    FlatRateOfDelta,
}

impl From<CliPensionCostPolicy> for PensionCostPolicy {
    fn from(value: CliPensionCostPolicy) -> Self {
        match value {
            CliPensionCostPolicy::DifferenceOfEvaluations => {
                PensionCostPolicy::DifferenceOfEvaluations
            }
            CliPensionCostPolicy::FlatRateOfDelta => PensionCostPolicy::FlatRateOfDelta,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiInflationMeasure {
    #[serde(alias = "RPI")]
    Rpi,
    #[serde(alias = "CPI")]
    Cpi,
    #[serde(alias = "CPIH")]
    Cpih,
}

impl From<ApiInflationMeasure> for CliInflationMeasure {
    fn from(value: ApiInflationMeasure) -> Self {
        match value {
            ApiInflationMeasure::Rpi => CliInflationMeasure::Rpi,
            ApiInflationMeasure::Cpi => CliInflationMeasure::Cpi,
            ApiInflationMeasure::Cpih => CliInflationMeasure::Cpih,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiFprFormula {
    Restoration,
    #[serde(alias = "erosionComplement", alias = "erosion_complement")]
    ErosionComplement,
}

impl From<ApiFprFormula> for CliFprFormula {
    fn from(value: ApiFprFormula) -> Self {
        match value {
            ApiFprFormula::Restoration => CliFprFormula::Restoration,
            ApiFprFormula::ErosionComplement => CliFprFormula::ErosionComplement,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiErosionCompounding {
    Multiplicative,
    Additive,
}

impl From<ApiErosionCompounding> for CliErosionCompounding {
    fn from(value: ApiErosionCompounding) -> Self {
        match value {
            ApiErosionCompounding::Multiplicative => CliErosionCompounding::Multiplicative,
            ApiErosionCompounding::Additive => CliErosionCompounding::Additive,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiYear0Baseline {
    #[serde(alias = "basePay", alias = "base_pay", alias = "base")]
    BasePay,
    #[serde(alias = "offeredPay", alias = "offered_pay", alias = "offered")]
    OfferedPay,
}

impl From<ApiYear0Baseline> for CliYear0Baseline {
    fn from(value: ApiYear0Baseline) -> Self {
        match value {
            ApiYear0Baseline::BasePay => CliYear0Baseline::BasePay,
            ApiYear0Baseline::OfferedPay => CliYear0Baseline::OfferedPay,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiPensionCostPolicy {
    #[serde(alias = "differenceOfEvaluations", alias = "difference")]
    DifferenceOfEvaluations,
    #[serde(alias = "flatRateOfDelta", alias = "flat")]
    FlatRateOfDelta,
}

impl From<ApiPensionCostPolicy> for CliPensionCostPolicy {
    fn from(value: ApiPensionCostPolicy) -> Self {
        match value {
            ApiPensionCostPolicy::DifferenceOfEvaluations => {
                CliPensionCostPolicy::DifferenceOfEvaluations
            }
            ApiPensionCostPolicy::FlatRateOfDelta => CliPensionCostPolicy::FlatRateOfDelta,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "pay_restoration",
    about = "Multi-year pay deal model: FPR targets, pay erosion and deal cost per nodal point"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the JSON API.
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// Run one deal scenario and print the result as JSON.
    Simulate(ScenarioArgs),
    /// Print the FPR target workings per nodal point as JSON.
    Fpr(ScenarioArgs),
    /// Write <MEASURE>_Calculations.txt for RPI, CPI and CPIH.
    Report {
        #[command(flatten)]
        scenario: ScenarioArgs,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ScenarioArgs {
    #[arg(long, value_enum, default_value_t = CliInflationMeasure::Rpi)]
    measure: CliInflationMeasure,
    #[arg(long, default_value = "2008/2009", help = "Baseline year of the FPR window")]
    fpr_start_year: String,
    #[arg(long, default_value = "2024/2025", help = "Last year counted in the FPR window")]
    fpr_end_year: String,
    #[arg(
        long,
        help = "Inflation in percent used when the FPR end year has no published figure"
    )]
    projected_inflation: Option<f64>,
    #[arg(long, default_value = "2024/2025", help = "Year label of the initial deal year")]
    deal_start_year: String,
    #[arg(long, default_value_t = 5, help = "Deal years after the initial year")]
    deal_years: u32,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "Additional percent on top of the agreed award in the initial year"
    )]
    year0_percentage: f64,
    #[arg(long, default_value_t = 0.0, help = "Consolidated £ rise in the initial year")]
    year0_flat: f64,
    #[arg(
        long,
        help = "Initial-year inflation in percent; defaults to the published figure"
    )]
    year0_inflation: Option<f64>,
    #[arg(
        long,
        default_value_t = 7.0,
        help = "Percent above inflation in each later year"
    )]
    percentage_increase: f64,
    #[arg(long, default_value_t = 0.0, help = "Consolidated £ rise in each later year")]
    flat_increase: f64,
    #[arg(long, default_value_t = 2.0, help = "Projected inflation in percent for later years")]
    inflation: f64,
    #[arg(long, value_delimiter = ',', default_value = "8000,6000,20000,25000,6000")]
    headcounts: Vec<u32>,
    #[arg(long, default_value_t = 40.0)]
    standard_weekly_hours: f64,
    #[arg(long, default_value_t = 8.0)]
    additional_hours: f64,
    #[arg(long, default_value_t = 8.0)]
    out_of_hours: f64,
    #[arg(long, default_value_t = 37.0, help = "Out-of-hours uplift in percent")]
    ooh_multiplier: f64,
    #[arg(long, value_enum, default_value_t = CliFprFormula::Restoration)]
    fpr_formula: CliFprFormula,
    #[arg(long, value_enum, default_value_t = CliErosionCompounding::Multiplicative)]
    erosion_compounding: CliErosionCompounding,
    #[arg(long, value_enum, default_value_t = CliYear0Baseline::BasePay)]
    year0_baseline: CliYear0Baseline,
    #[arg(long, value_enum, default_value_t = CliPensionCostPolicy::DifferenceOfEvaluations)]
    pension_cost_policy: CliPensionCostPolicy,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct BandPayload {
    id: String,
    base_pay: f64,
    offered_pay: Option<f64>,
    headcount: u32,
}

/// Per-year adjustments, in percent and pounds, applied over the uniform schedule.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct YearPayload {
    year: usize,
    inflation: Option<f64>,
    percentage_increase: Option<f64>,
    band_percentages: Option<Vec<f64>>,
    flat_increase: Option<f64>,
    band_flat_increases: Option<Vec<f64>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulatePayload {
    measure: Option<ApiInflationMeasure>,
    fpr_start_year: Option<String>,
    fpr_end_year: Option<String>,
    projected_inflation: Option<f64>,
    deal_start_year: Option<String>,
    deal_years: Option<u32>,
    year0_percentage: Option<f64>,
    year0_flat: Option<f64>,
    year0_inflation: Option<f64>,
    percentage_increase: Option<f64>,
    flat_increase: Option<f64>,
    inflation: Option<f64>,
    headcounts: Option<Vec<u32>>,
    standard_weekly_hours: Option<f64>,
    additional_hours: Option<f64>,
    out_of_hours: Option<f64>,
    ooh_multiplier: Option<f64>,
    fpr_formula: Option<ApiFprFormula>,
    erosion_compounding: Option<ApiErosionCompounding>,
    year0_baseline: Option<ApiYear0Baseline>,
    pension_cost_policy: Option<ApiPensionCostPolicy>,
    bands: Option<Vec<BandPayload>>,
    year_overrides: Option<Vec<YearPayload>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct FprQuery {
    measure: Option<ApiInflationMeasure>,
    start_year: Option<String>,
    end_year: Option<String>,
    projected_inflation: Option<f64>,
    fpr_formula: Option<ApiFprFormula>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulateResponse<'a> {
    #[serde(flatten)]
    result: &'a SimulationResult,
    headline_increases: Vec<f64>,
    cached: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FprResponse {
    breakdowns: Vec<FprBreakdown>,
    average_fpr_percent: f64,
    average_erosion_percent: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoryResponse<'a> {
    records: &'a [HistoricalRecord],
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// Results keyed by the serialized config. Configs are validated before the
/// lookup, so every key describes a finite, runnable config.
#[derive(Debug, Default)]
pub struct SimulationCache {
    entries: Mutex<HashMap<String, Arc<SimulationResult>>>,
}

impl SimulationCache {
    pub fn fingerprint(config: &SimulationConfig) -> Result<String, PayModelError> {
        serde_json::to_string(config).map_err(|e| PayModelError::InvalidConfig(e.to_string()))
    }

    pub fn get_or_run(
        &self,
        config: &SimulationConfig,
        table: &HistoricalIndexTable,
    ) -> Result<(Arc<SimulationResult>, bool), PayModelError> {
        validate_config(config)?;
        let key = Self::fingerprint(config)?;
        if let Some(hit) = self.lock().get(&key) {
            debug!(
                target: "pay_restoration::api",
                bands = config.bands.len(),
                "simulation cache hit"
            );
            return Ok((Arc::clone(hit), true));
        }

        let result = Arc::new(run_simulation(config, table)?);
        let mut entries = self.lock();
        if entries.len() >= CACHE_CAPACITY {
            entries.clear();
        }
        entries.insert(key, Arc::clone(&result));
        Ok((result, false))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<SimulationResult>>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Clone)]
struct AppState {
    table: Arc<HistoricalIndexTable>,
    cache: Arc<SimulationCache>,
}

fn default_bands(headcounts: &[u32]) -> Result<Vec<Band>, String> {
    if headcounts.len() != DEFAULT_NODAL_POINTS.len() {
        return Err(format!(
            "--headcounts must list {} values, one per nodal point",
            DEFAULT_NODAL_POINTS.len()
        ));
    }
    Ok(DEFAULT_NODAL_POINTS
        .iter()
        .zip(headcounts)
        .map(|(&(id, base, offered), &headcount)| Band::new(id, base, offered, headcount))
        .collect())
}

fn build_config(args: ScenarioArgs, table: &HistoricalIndexTable) -> Result<SimulationConfig, String> {
    build_config_for_bands(args, None, table)
}

fn build_config_for_bands(
    args: ScenarioArgs,
    bands: Option<Vec<Band>>,
    table: &HistoricalIndexTable,
) -> Result<SimulationConfig, String> {
    let start = table
        .position(&args.fpr_start_year)
        .map_err(|_| format!("--fpr-start-year {} is not in the table", args.fpr_start_year))?;
    let end = table
        .position(&args.fpr_end_year)
        .map_err(|_| format!("--fpr-end-year {} is not in the table", args.fpr_end_year))?;
    if end <= start {
        return Err("--fpr-end-year must be after --fpr-start-year".to_string());
    }

    if args.deal_years > 10 {
        return Err("--deal-years must be between 0 and 10".to_string());
    }

    for (flag, value) in [
        ("--projected-inflation", args.projected_inflation),
        ("--year0-percentage", Some(args.year0_percentage)),
        ("--year0-flat", Some(args.year0_flat)),
        ("--year0-inflation", args.year0_inflation),
        ("--percentage-increase", Some(args.percentage_increase)),
        ("--flat-increase", Some(args.flat_increase)),
        ("--inflation", Some(args.inflation)),
        ("--standard-weekly-hours", Some(args.standard_weekly_hours)),
        ("--additional-hours", Some(args.additional_hours)),
        ("--out-of-hours", Some(args.out_of_hours)),
        ("--ooh-multiplier", Some(args.ooh_multiplier)),
    ] {
        if value.is_some_and(|v| !v.is_finite()) {
            return Err(format!("{flag} must be a finite number"));
        }
    }

    if let Some(projected) = args.projected_inflation {
        if projected <= -100.0 {
            return Err("--projected-inflation must be > -100".to_string());
        }
    }

    if args.inflation <= -100.0 {
        return Err("--inflation must be > -100".to_string());
    }

    if args.year0_flat < 0.0 || args.flat_increase < 0.0 {
        return Err("--year0-flat and --flat-increase must be >= 0".to_string());
    }

    if args.standard_weekly_hours <= 0.0 {
        return Err("--standard-weekly-hours must be > 0".to_string());
    }

    if args.additional_hours < 0.0 || args.out_of_hours < 0.0 || args.ooh_multiplier < 0.0 {
        return Err(
            "--additional-hours, --out-of-hours and --ooh-multiplier must be >= 0".to_string(),
        );
    }

    let measure: InflationMeasure = args.measure.into();
    let year0_inflation = match args.year0_inflation {
        Some(v) if v <= -100.0 => return Err("--year0-inflation must be > -100".to_string()),
        Some(v) => v / 100.0,
        None => table
            .lookup(&args.deal_start_year)
            .ok()
            .and_then(|record| record.inflation(measure))
            .ok_or_else(|| {
                format!(
                    "--year0-inflation is required: no published {} for {}",
                    measure.label(),
                    args.deal_start_year
                )
            })?,
    };

    let bands = match bands {
        Some(bands) => bands,
        None => default_bands(&args.headcounts)?,
    };
    if bands.is_empty() {
        return Err("at least one band is required".to_string());
    }

    let uniform = |input: YearInput| vec![input; bands.len()];
    let mut year_inputs = Vec::with_capacity(args.deal_years as usize + 1);
    year_inputs.push(uniform(YearInput {
        percentage_increase: args.year0_percentage / 100.0,
        flat_increase: args.year0_flat,
        inflation_rate: year0_inflation,
    }));
    for _ in 0..args.deal_years {
        year_inputs.push(uniform(YearInput {
            percentage_increase: args.percentage_increase / 100.0,
            flat_increase: args.flat_increase,
            inflation_rate: args.inflation / 100.0,
        }));
    }

    Ok(SimulationConfig {
        bands,
        year_inputs,
        inflation_measure: measure,
        fpr_window: FprWindow::new(args.fpr_start_year, args.fpr_end_year),
        projected_inflation: args.projected_inflation.map(|v| v / 100.0),
        hours: WorkingHours {
            standard_weekly_hours: args.standard_weekly_hours,
            additional_hours: args.additional_hours,
            out_of_hours: args.out_of_hours,
            ooh_multiplier: args.ooh_multiplier / 100.0,
        },
        policy: FormulaPolicy {
            fpr_formula: args.fpr_formula.into(),
            erosion_compounding: args.erosion_compounding.into(),
            year0_baseline: args.year0_baseline.into(),
            pension_cost: args.pension_cost_policy.into(),
        },
    })
}

fn apply_year_overrides(
    config: &mut SimulationConfig,
    overrides: Vec<YearPayload>,
) -> Result<(), String> {
    let band_count = config.bands.len();
    for year in overrides {
        let idx = year.year;
        let Some(inputs) = config.year_inputs.get_mut(idx) else {
            return Err(format!("yearOverrides: year {idx} is outside the deal"));
        };

        if let Some(inflation) = year.inflation {
            if !inflation.is_finite() || inflation <= -100.0 {
                return Err(format!("yearOverrides[{idx}].inflation must be > -100"));
            }
            for input in inputs.iter_mut() {
                input.inflation_rate = inflation / 100.0;
            }
        }

        let percentages = match (year.band_percentages, year.percentage_increase) {
            (Some(values), _) => Some(values),
            (None, Some(headline)) => Some(broadcast_headline(headline, band_count)),
            (None, None) => None,
        };
        if let Some(values) = percentages {
            if values.len() != band_count {
                return Err(format!(
                    "yearOverrides[{idx}].bandPercentages must list {band_count} values"
                ));
            }
            if values.iter().any(|v| !v.is_finite()) {
                return Err(format!("yearOverrides[{idx}] percentages must be finite"));
            }
            for (input, value) in inputs.iter_mut().zip(values) {
                input.percentage_increase = value / 100.0;
            }
        }

        let flats = match (year.band_flat_increases, year.flat_increase) {
            (Some(values), _) => Some(values),
            (None, Some(flat)) => Some(vec![flat; band_count]),
            (None, None) => None,
        };
        if let Some(values) = flats {
            if values.len() != band_count {
                return Err(format!(
                    "yearOverrides[{idx}].bandFlatIncreases must list {band_count} values"
                ));
            }
            if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
                return Err(format!(
                    "yearOverrides[{idx}] flat increases must be finite and >= 0"
                ));
            }
            for (input, value) in inputs.iter_mut().zip(values) {
                input.flat_increase = value;
            }
        }
    }
    Ok(())
}

/// Headcount-weighted headline rise per deal year.
fn headline_increases(config: &SimulationConfig) -> Vec<f64> {
    let headcounts: Vec<u32> = config.bands.iter().map(|b| b.headcount).collect();
    config
        .year_inputs
        .iter()
        .map(|year| {
            let percentages: Vec<f64> = year.iter().map(|i| i.percentage_increase).collect();
            weighted_average_increase(&percentages, &headcounts)
        })
        .collect()
}

pub fn default_scenario_args() -> ScenarioArgs {
    ScenarioArgs {
        measure: CliInflationMeasure::Rpi,
        fpr_start_year: "2008/2009".to_string(),
        fpr_end_year: "2024/2025".to_string(),
        projected_inflation: None,
        deal_start_year: "2024/2025".to_string(),
        deal_years: 5,
        year0_percentage: 0.0,
        year0_flat: 0.0,
        year0_inflation: None,
        percentage_increase: 7.0,
        flat_increase: 0.0,
        inflation: 2.0,
        headcounts: vec![8_000, 6_000, 20_000, 25_000, 6_000],
        standard_weekly_hours: 40.0,
        additional_hours: 8.0,
        out_of_hours: 8.0,
        ooh_multiplier: 37.0,
        fpr_formula: CliFprFormula::Restoration,
        erosion_compounding: CliErosionCompounding::Multiplicative,
        year0_baseline: CliYear0Baseline::BasePay,
        pension_cost_policy: CliPensionCostPolicy::DifferenceOfEvaluations,
    }
}

#[cfg(test)]
fn api_request_from_json(
    json: &str,
    table: &HistoricalIndexTable,
) -> Result<SimulationConfig, String> {
    let payload = serde_json::from_str::<SimulatePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    api_request_from_payload(payload, table)
}

fn api_request_from_payload(
    payload: SimulatePayload,
    table: &HistoricalIndexTable,
) -> Result<SimulationConfig, String> {
    let mut args = default_scenario_args();

    if let Some(v) = payload.measure {
        args.measure = v.into();
    }
    if let Some(v) = payload.fpr_start_year {
        args.fpr_start_year = v;
    }
    if let Some(v) = payload.fpr_end_year {
        args.fpr_end_year = v;
    }
    if let Some(v) = payload.projected_inflation {
        args.projected_inflation = Some(v);
    }
    if let Some(v) = payload.deal_start_year {
        args.deal_start_year = v;
    }
    if let Some(v) = payload.deal_years {
        args.deal_years = v;
    }
    if let Some(v) = payload.year0_percentage {
        args.year0_percentage = v;
    }
    if let Some(v) = payload.year0_flat {
        args.year0_flat = v;
    }
    if let Some(v) = payload.year0_inflation {
        args.year0_inflation = Some(v);
    }
    if let Some(v) = payload.percentage_increase {
        args.percentage_increase = v;
    }
    if let Some(v) = payload.flat_increase {
        args.flat_increase = v;
    }
    if let Some(v) = payload.inflation {
        args.inflation = v;
    }
    if let Some(v) = payload.headcounts {
        args.headcounts = v;
    }
    if let Some(v) = payload.standard_weekly_hours {
        args.standard_weekly_hours = v;
    }
    if let Some(v) = payload.additional_hours {
        args.additional_hours = v;
    }
    if let Some(v) = payload.out_of_hours {
        args.out_of_hours = v;
    }
    if let Some(v) = payload.ooh_multiplier {
        args.ooh_multiplier = v;
    }
    if let Some(v) = payload.fpr_formula {
        args.fpr_formula = v.into();
    }
    if let Some(v) = payload.erosion_compounding {
        args.erosion_compounding = v.into();
    }
    if let Some(v) = payload.year0_baseline {
        args.year0_baseline = v.into();
    }
    if let Some(v) = payload.pension_cost_policy {
        args.pension_cost_policy = v.into();
    }

    let bands = payload.bands.map(|bands| {
        bands
            .into_iter()
            .map(|b| Band::new(b.id, b.base_pay, b.offered_pay.unwrap_or(b.base_pay), b.headcount))
            .collect::<Vec<_>>()
    });

    let mut config = build_config_for_bands(args, bands, table)?;
    if let Some(overrides) = payload.year_overrides {
        apply_year_overrides(&mut config, overrides)?;
    }
    Ok(config)
}

fn fpr_breakdowns(
    config: &SimulationConfig,
    table: &HistoricalIndexTable,
) -> Result<FprResponse, PayModelError> {
    let breakdowns = config
        .bands
        .iter()
        .map(|band| {
            breakdown(
                table,
                Some(&band.id),
                &config.fpr_window,
                config.inflation_measure,
                config.projected_inflation,
                config.policy.fpr_formula,
            )
        })
        .collect::<Result<Vec<_>, _>>()?;

    let count = breakdowns.len().max(1) as f64;
    Ok(FprResponse {
        average_fpr_percent: breakdowns.iter().map(|b| b.fpr_percent).sum::<f64>() / count,
        average_erosion_percent: breakdowns.iter().map(|b| b.erosion_percent).sum::<f64>()
            / count,
        breakdowns,
    })
}

/// Entry point shared by the binary: runs one subcommand to completion.
pub async fn run_cli(cli: Cli) -> Result<(), String> {
    let table = HistoricalIndexTable::standard();
    match cli.command {
        Command::Serve { port } => run_http_server(port)
            .await
            .map_err(|e| format!("Server error: {e}")),
        Command::Simulate(args) => {
            let config = build_config(args, &table)?;
            let result = run_simulation(&config, &table).map_err(|e| e.to_string())?;
            let response = SimulateResponse {
                result: &result,
                headline_increases: headline_increases(&config),
                cached: false,
            };
            print_json(&response)
        }
        Command::Fpr(args) => {
            let config = build_config(args, &table)?;
            let response = fpr_breakdowns(&config, &table).map_err(|e| e.to_string())?;
            print_json(&response)
        }
        Command::Report { scenario, out_dir } => write_reports(scenario, &out_dir, &table),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let json = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{json}");
    Ok(())
}

fn write_reports(
    args: ScenarioArgs,
    out_dir: &std::path::Path,
    table: &HistoricalIndexTable,
) -> Result<(), String> {
    let config = build_config(args, table)?;
    std::fs::create_dir_all(out_dir)
        .map_err(|e| format!("cannot create {}: {e}", out_dir.display()))?;
    for measure in InflationMeasure::ALL {
        let report = render_measure_report(
            table,
            &config.bands,
            &config.fpr_window,
            measure,
            config.projected_inflation,
            config.policy.fpr_formula,
        )
        .map_err(|e| e.to_string())?;
        let path = out_dir.join(report_file_name(measure));
        std::fs::write(&path, report).map_err(|e| format!("cannot write {}: {e}", path.display()))?;
        info!(target: "pay_restoration::api", path = %path.display(), "report written");
    }
    Ok(())
}

fn router(table: HistoricalIndexTable) -> Router {
    let state = AppState {
        table: Arc::new(table),
        cache: Arc::new(SimulationCache::default()),
    };
    Router::new()
        .route(
            "/api/simulate",
            get(simulate_get_handler).post(simulate_post_handler),
        )
        .route("/api/fpr", get(fpr_handler))
        .route("/api/history", get(history_handler))
        .route("/api/report", get(report_handler))
        .fallback(not_found_handler)
        .with_state(state)
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = router(HistoricalIndexTable::standard());

    let listener = TcpListener::bind(addr).await?;
    info!(target: "pay_restoration::api", %addr, "pay model API listening");

    axum::serve(listener, app).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn simulate_get_handler(
    State(state): State<AppState>,
    Query(payload): Query<SimulatePayload>,
) -> Response {
    simulate_handler_impl(&state, payload)
}

async fn simulate_post_handler(
    State(state): State<AppState>,
    Json(payload): Json<SimulatePayload>,
) -> Response {
    simulate_handler_impl(&state, payload)
}

fn simulate_handler_impl(state: &AppState, payload: SimulatePayload) -> Response {
    let config = match api_request_from_payload(payload, &state.table) {
        Ok(config) => config,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    match state.cache.get_or_run(&config, &state.table) {
        Ok((result, cached)) => json_response(
            StatusCode::OK,
            SimulateResponse {
                result: &result,
                headline_increases: headline_increases(&config),
                cached,
            },
        ),
        Err(err) => error_response(StatusCode::UNPROCESSABLE_ENTITY, &err.to_string()),
    }
}

async fn fpr_handler(State(state): State<AppState>, Query(query): Query<FprQuery>) -> Response {
    let payload = SimulatePayload {
        measure: query.measure,
        fpr_start_year: query.start_year,
        fpr_end_year: query.end_year,
        projected_inflation: query.projected_inflation,
        fpr_formula: query.fpr_formula,
        ..SimulatePayload::default()
    };
    let config = match api_request_from_payload(payload, &state.table) {
        Ok(config) => config,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };
    match fpr_breakdowns(&config, &state.table) {
        Ok(response) => json_response(StatusCode::OK, response),
        Err(err) => error_response(StatusCode::UNPROCESSABLE_ENTITY, &err.to_string()),
    }
}

async fn history_handler(State(state): State<AppState>) -> Response {
    json_response(
        StatusCode::OK,
        HistoryResponse {
            records: state.table.records(),
        },
    )
}

async fn report_handler(State(state): State<AppState>, Query(query): Query<FprQuery>) -> Response {
    let payload = SimulatePayload {
        measure: query.measure,
        fpr_start_year: query.start_year,
        fpr_end_year: query.end_year,
        projected_inflation: query.projected_inflation,
        fpr_formula: query.fpr_formula,
        ..SimulatePayload::default()
    };
    let config = match api_request_from_payload(payload, &state.table) {
        Ok(config) => config,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };
    match render_measure_report(
        &state.table,
        &config.bands,
        &config.fpr_window,
        config.inflation_measure,
        config.projected_inflation,
        config.policy.fpr_formula,
    ) {
        Ok(text) => with_cache_control((
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            text,
        )),
        Err(err) => error_response(StatusCode::UNPROCESSABLE_ENTITY, &err.to_string()),
    }
}

fn with_cache_control<R: IntoResponse>(response: R) -> Response {
    let mut response = response.into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    with_cache_control((status, Json(body)))
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn sample_args() -> ScenarioArgs {
        default_scenario_args()
    }

    fn test_state() -> AppState {
        AppState {
            table: Arc::new(HistoricalIndexTable::standard()),
            cache: Arc::new(SimulationCache::default()),
        }
    }

    #[test]
    fn cli_defaults_match_api_defaults() {
        let cli = Cli::try_parse_from(["pay_restoration", "simulate"]).expect("defaults parse");
        let Command::Simulate(args) = cli.command else {
            panic!("expected simulate subcommand");
        };
        let table = HistoricalIndexTable::standard();
        let from_cli = build_config(args, &table).expect("valid cli defaults");
        let from_api = build_config(default_scenario_args(), &table).expect("valid api defaults");
        assert_eq!(from_cli, from_api);
    }

    #[test]
    fn cli_parses_policies_and_headcounts() {
        let cli = Cli::try_parse_from([
            "pay_restoration",
            "simulate",
            "--measure",
            "cpih",
            "--headcounts",
            "1,2,3,4,5",
            "--fpr-formula",
            "erosion-complement",
            "--year0-baseline",
            "offered-pay",
        ])
        .expect("valid flags");
        let Command::Simulate(args) = cli.command else {
            panic!("expected simulate subcommand");
        };
        let config = build_config(args, &HistoricalIndexTable::standard()).expect("valid");
        assert_eq!(config.inflation_measure, InflationMeasure::Cpih);
        assert_eq!(config.policy.fpr_formula, FprFormula::ErosionComplement);
        assert_eq!(config.policy.year0_baseline, Year0Baseline::OfferedPay);
        let heads: Vec<u32> = config.bands.iter().map(|b| b.headcount).collect();
        assert_eq!(heads, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn build_config_converts_percent_units() {
        let config = build_config(sample_args(), &HistoricalIndexTable::standard()).expect("valid");
        assert_eq!(config.bands.len(), 5);
        assert_eq!(config.year_inputs.len(), 6);
        let year0 = config.year_inputs[0][0];
        assert_approx(year0.percentage_increase, 0.0);
        assert_approx(year0.inflation_rate, 0.045);
        let year1 = config.year_inputs[1][4];
        assert_approx(year1.percentage_increase, 0.07);
        assert_approx(year1.inflation_rate, 0.02);
        assert_approx(config.hours.ooh_multiplier, 0.37);
    }

    #[test]
    fn build_config_rejects_reversed_window() {
        let mut args = sample_args();
        args.fpr_start_year = "2020/2021".to_string();
        args.fpr_end_year = "2010/2011".to_string();
        let err = build_config(args, &HistoricalIndexTable::standard()).expect_err("reversed");
        assert!(err.contains("--fpr-end-year"));
    }

    #[test]
    fn build_config_rejects_unknown_years() {
        let mut args = sample_args();
        args.fpr_start_year = "1990/1991".to_string();
        let err = build_config(args, &HistoricalIndexTable::standard()).expect_err("unknown");
        assert!(err.contains("--fpr-start-year"));
    }

    #[test]
    fn build_config_requires_year0_inflation_without_history() {
        let mut args = sample_args();
        args.deal_start_year = "2025/2026".to_string();
        let err = build_config(args.clone(), &HistoricalIndexTable::standard())
            .expect_err("no published inflation");
        assert!(err.contains("--year0-inflation"));

        args.year0_inflation = Some(3.0);
        let config = build_config(args, &HistoricalIndexTable::standard()).expect("explicit");
        assert_approx(config.year_inputs[0][0].inflation_rate, 0.03);
    }

    #[test]
    fn build_config_rejects_wrong_headcount_count() {
        let mut args = sample_args();
        args.headcounts = vec![1, 2];
        let err = build_config(args, &HistoricalIndexTable::standard()).expect_err("short list");
        assert!(err.contains("--headcounts"));
    }

    #[test]
    fn api_request_from_json_parses_web_keys() {
        let json = r#"{
          "measure": "CPI",
          "fprStartYear": "2010/2011",
          "fprEndYear": "2023/2024",
          "dealYears": 2,
          "year0Percentage": 1.5,
          "year0Flat": 500,
          "year0Inflation": 3.5,
          "percentageIncrease": 4,
          "inflation": 2.5,
          "additionalHours": 0,
          "outOfHours": 0,
          "fprFormula": "erosion-complement",
          "erosionCompounding": "additive",
          "year0Baseline": "offered",
          "pensionCostPolicy": "flat"
        }"#;
        let config =
            api_request_from_json(json, &HistoricalIndexTable::standard()).expect("json parses");

        assert_eq!(config.inflation_measure, InflationMeasure::Cpi);
        assert_eq!(config.fpr_window, FprWindow::new("2010/2011", "2023/2024"));
        assert_eq!(config.year_inputs.len(), 3);
        assert_approx(config.year_inputs[0][2].percentage_increase, 0.015);
        assert_approx(config.year_inputs[0][2].flat_increase, 500.0);
        assert_approx(config.year_inputs[0][2].inflation_rate, 0.035);
        assert_approx(config.year_inputs[2][0].percentage_increase, 0.04);
        assert_approx(config.year_inputs[2][0].inflation_rate, 0.025);
        assert_approx(config.hours.additional_hours, 0.0);
        assert_eq!(config.policy.fpr_formula, FprFormula::ErosionComplement);
        assert_eq!(
            config.policy.erosion_compounding,
            ErosionCompounding::Additive
        );
        assert_eq!(config.policy.year0_baseline, Year0Baseline::OfferedPay);
        assert_eq!(config.policy.pension_cost, PensionCostPolicy::FlatRateOfDelta);
    }

    #[test]
    fn api_request_accepts_custom_bands_and_year_overrides() {
        let json = r#"{
          "bands": [
            { "id": "Foundation", "basePay": 32000, "offeredPay": 33500, "headcount": 100 },
            { "id": "Registrar", "basePay": 45000, "headcount": 300 }
          ],
          "dealYears": 2,
          "yearOverrides": [
            { "year": 1, "bandPercentages": [10, 2], "inflation": 4 },
            { "year": 2, "percentageIncrease": 3, "bandFlatIncreases": [1000, 0] }
          ]
        }"#;
        let config =
            api_request_from_json(json, &HistoricalIndexTable::standard()).expect("json parses");

        assert_eq!(config.bands.len(), 2);
        assert_approx(config.bands[1].offered_pay, 45_000.0);
        assert_approx(config.year_inputs[1][0].percentage_increase, 0.10);
        assert_approx(config.year_inputs[1][1].percentage_increase, 0.02);
        assert_approx(config.year_inputs[1][1].inflation_rate, 0.04);
        assert_approx(config.year_inputs[2][1].percentage_increase, 0.03);
        assert_approx(config.year_inputs[2][0].flat_increase, 1_000.0);

        let headlines = headline_increases(&config);
        assert_approx(headlines[1], (0.10 * 100.0 + 0.02 * 300.0) / 400.0);
        assert_approx(headlines[2], 0.03);

        let result = run_simulation(&config, &HistoricalIndexTable::standard())
            .expect("custom bands fall back to published averages");
        assert_eq!(result.bands[0].band_id, "Foundation");
    }

    #[test]
    fn year_overrides_outside_deal_are_rejected() {
        let json = r#"{ "dealYears": 1, "yearOverrides": [{ "year": 4, "inflation": 2 }] }"#;
        let err = api_request_from_json(json, &HistoricalIndexTable::standard())
            .expect_err("year 4 is outside a one-year deal");
        assert!(err.contains("yearOverrides"));

        let json = r#"{ "yearOverrides": [{ "year": 0, "bandPercentages": [1, 2] }] }"#;
        let err = api_request_from_json(json, &HistoricalIndexTable::standard())
            .expect_err("band count mismatch");
        assert!(err.contains("bandPercentages"));
    }

    #[test]
    fn simulate_response_serialization_contains_expected_fields() {
        let table = HistoricalIndexTable::standard();
        let config = build_config(sample_args(), &table).expect("valid");
        let result = run_simulation(&config, &table).expect("valid run");
        let response = SimulateResponse {
            result: &result,
            headline_increases: headline_increases(&config),
            cached: false,
        };
        let json = serde_json::to_string(&response).expect("response should serialize");
        assert!(json.contains("\"bands\""));
        assert!(json.contains("\"years\""));
        assert!(json.contains("\"inflationMeasure\":\"RPI\""));
        assert!(json.contains("\"fprProgress\""));
        assert!(json.contains("\"taxRecouped\""));
        assert!(json.contains("\"cumulativeTotalCost\""));
        assert!(json.contains("\"headlineIncreases\""));
        assert!(json.contains("\"totalNetCost\""));
    }

    #[test]
    fn cache_returns_identical_result_for_identical_config() {
        let table = HistoricalIndexTable::standard();
        let cache = SimulationCache::default();
        let config = build_config(sample_args(), &table).expect("valid");

        let (first, first_cached) = cache.get_or_run(&config, &table).expect("valid run");
        let (second, second_cached) = cache.get_or_run(&config, &table).expect("valid run");
        assert!(!first_cached);
        assert!(second_cached);
        assert!(Arc::ptr_eq(&first, &second));

        let mut changed = config.clone();
        changed.year_inputs[1][0].percentage_increase += 0.01;
        assert_ne!(
            SimulationCache::fingerprint(&config).expect("serializes"),
            SimulationCache::fingerprint(&changed).expect("serializes")
        );
    }

    #[test]
    fn cache_never_serves_a_non_finite_config() {
        let table = HistoricalIndexTable::standard();
        let cache = SimulationCache::default();
        let config = build_config(sample_args(), &table).expect("valid");
        cache.get_or_run(&config, &table).expect("warm the cache");

        let mut poisoned = config.clone();
        poisoned.projected_inflation = Some(f64::NAN);
        let err = cache
            .get_or_run(&poisoned, &table)
            .expect_err("NaN projected inflation is rejected before lookup");
        assert!(matches!(err, PayModelError::InvalidConfig(_)));
    }

    #[test]
    fn non_finite_query_values_are_bad_requests() {
        let uri: axum::http::Uri = "/api/simulate?projectedInflation=NaN"
            .parse()
            .expect("valid uri");
        let Query(payload) = Query::<SimulatePayload>::try_from_uri(&uri).expect("query parses");
        assert!(payload.projected_inflation.is_some_and(f64::is_nan));
        let err = api_request_from_payload(payload, &HistoricalIndexTable::standard())
            .expect_err("NaN is not a number of percent");
        assert!(err.contains("--projected-inflation"));

        let json = r#"{ "yearOverrides": [{ "year": 0, "inflation": 1e999 }] }"#;
        assert!(api_request_from_json(json, &HistoricalIndexTable::standard()).is_err());
    }

    #[test]
    fn fpr_breakdowns_average_over_bands() {
        let table = HistoricalIndexTable::standard();
        let config = build_config(sample_args(), &table).expect("valid");
        let response = fpr_breakdowns(&config, &table).expect("valid window");
        assert_eq!(response.breakdowns.len(), 5);
        let mean = response
            .breakdowns
            .iter()
            .map(|b| b.fpr_percent)
            .sum::<f64>()
            / 5.0;
        assert_approx(response.average_fpr_percent, mean);
    }

    #[tokio::test]
    async fn simulate_handler_maps_errors_to_status_codes() {
        let state = test_state();

        let ok = simulate_handler_impl(&state, SimulatePayload::default());
        assert_eq!(ok.status(), StatusCode::OK);
        assert_eq!(
            ok.headers().get(header::CACHE_CONTROL).map(|v| v.as_bytes()),
            Some(&b"no-store"[..])
        );

        let bad_request = simulate_handler_impl(
            &state,
            SimulatePayload {
                fpr_start_year: Some("1900/1901".to_string()),
                ..SimulatePayload::default()
            },
        );
        assert_eq!(bad_request.status(), StatusCode::BAD_REQUEST);

        let empty_window = simulate_handler_impl(
            &state,
            SimulatePayload {
                fpr_start_year: Some("2024/2025".to_string()),
                fpr_end_year: Some("2024/2025".to_string()),
                ..SimulatePayload::default()
            },
        );
        assert_eq!(empty_window.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn zero_target_with_erosion_is_unprocessable() {
        let table = HistoricalIndexTable::new(vec![
            HistoricalRecord::new("A", Some(0.0), None, None, None),
            HistoricalRecord::new("B", Some(0.02), Some(0.02), Some(0.02), Some(0.02)),
        ]);
        let state = AppState {
            table: Arc::new(table),
            cache: Arc::new(SimulationCache::default()),
        };
        let payload = SimulatePayload {
            fpr_start_year: Some("A".to_string()),
            fpr_end_year: Some("B".to_string()),
            deal_start_year: Some("B".to_string()),
            year0_inflation: Some(50.0),
            ..SimulatePayload::default()
        };
        let response = simulate_handler_impl(&state, payload);
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn report_handler_returns_plain_text() {
        let response = report_handler(
            State(test_state()),
            Query(FprQuery {
                measure: Some(ApiInflationMeasure::Cpi),
                ..FprQuery::default()
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(header::CONTENT_TYPE)
                .map(|v| v.as_bytes()),
            Some(&b"text/plain; charset=utf-8"[..])
        );
    }
}
