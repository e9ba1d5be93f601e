use std::fmt::Write;

use super::error::Result;
use super::fpr::{FprBreakdown, breakdown};
use super::history::HistoricalIndexTable;
use super::types::{Band, FprFormula, FprWindow, InflationMeasure};

const TABLE_RULE: usize = 84;
const SUMMARY_RULE: usize = 80;

pub fn report_file_name(measure: InflationMeasure) -> String {
    format!("{}_Calculations.txt", measure.label())
}

/// Fixed-column FPR workings for every band under one inflation measure,
/// followed by the averages across bands.
pub fn render_measure_report(
    table: &HistoricalIndexTable,
    bands: &[Band],
    window: &FprWindow,
    measure: InflationMeasure,
    projected_inflation: Option<f64>,
    formula: FprFormula,
) -> Result<String> {
    let baseline = table.lookup(&window.start_year)?;

    let mut out = String::new();
    let rule = "=".repeat(50);
    let _ = writeln!(out, "{rule} {} CALCULATIONS {rule}\n", measure.label());

    let mut results = Vec::with_capacity(bands.len());
    for band in bands {
        let result = breakdown(
            table,
            Some(&band.id),
            window,
            measure,
            projected_inflation,
            formula,
        )?;
        let baseline_award = table.resolve_award(baseline, Some(&band.id))?;
        write_band_section(&mut out, band, &result, baseline_award, baseline.inflation(measure));
        results.push(result);
    }

    if !results.is_empty() {
        let count = results.len() as f64;
        let avg_erosion = results.iter().map(|r| r.erosion_percent).sum::<f64>() / count;
        let avg_fpr = results.iter().map(|r| r.fpr_percent).sum::<f64>() / count;
        let rule = "=".repeat(SUMMARY_RULE);
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "AVERAGE ACROSS ALL NODAL POINTS");
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "Average Pay Erosion: {avg_erosion:.2}%");
        let _ = writeln!(out, "Average FPR Required: {avg_fpr:.2}%");
        let _ = writeln!(out);
    }

    Ok(out)
}

fn write_band_section(
    out: &mut String,
    band: &Band,
    result: &FprBreakdown,
    baseline_award: f64,
    baseline_inflation: Option<f64>,
) {
    let label = result.measure.label();
    let rule = "=".repeat(TABLE_RULE);
    let _ = writeln!(
        out,
        "-------------------- {} (Current Pay: £{}) --------------------",
        band.id,
        format_pounds(band.base_pay)
    );
    let _ = writeln!(out, "\nCalculating FPR for {} using {label}", band.id);
    let _ = writeln!(
        out,
        "Period: {} to {}",
        result.window.start_year, result.window.end_year
    );
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(
        out,
        "{:<13} {:<12} {:<12} {:<13} {:<12}",
        "Year", "Pay Award", label, "Real Change", "Cumulative"
    );
    let _ = writeln!(out, "{rule}");

    let _ = writeln!(
        out,
        "{:<13} {:>8.1}% {:>9}      BASELINE     {:>10.6}",
        result.window.start_year,
        baseline_award * 100.0,
        format_rate(baseline_inflation),
        1.0
    );
    for step in &result.steps {
        let change = match step.real_change {
            Some(change) => format!("{:>11.2}%", change * 100.0),
            None => format!("{:>12}", "NO DATA"),
        };
        let marker = if step.projected { " (projected)" } else { "" };
        let _ = writeln!(
            out,
            "{:<13} {:>8.1}% {:>9} {change} {:>10.6}{marker}",
            step.year_label,
            step.pay_award * 100.0,
            format_rate(step.inflation),
            step.cumulative_effect
        );
    }

    let _ = writeln!(out, "\nRESULTS:");
    let _ = writeln!(out, "FPR Required: {:.2}%", result.fpr_percent);
    let _ = writeln!(out, "Pay Erosion: {:.2}%", result.erosion_percent);
    let _ = writeln!(out);
}

fn format_rate(rate: Option<f64>) -> String {
    rate.map_or_else(|| "n/a".to_string(), |r| format!("{:.1}%", r * 100.0))
}

/// Whole pounds with thousands separators.
fn format_pounds(amount: f64) -> String {
    let whole = amount.round() as i64;
    let digits = whole.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if whole < 0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}
