use super::engine::Progression;
use super::error::Result;
use super::tax::{EMPLOYER_PENSION_RATE, employer_ni, income_deductions, pension};
use super::types::{Band, CostRecord, FormulaPolicy, PensionCostPolicy, WorkingHours, YearCostSummary};

/// Cost of moving one band from `reference` basic pay to `current` basic pay.
pub fn cost_of_change(
    year_index: usize,
    reference: f64,
    current: f64,
    headcount: u32,
    hours: &WorkingHours,
    pension_policy: PensionCostPolicy,
) -> Result<CostRecord> {
    let heads = f64::from(headcount);
    let basic_pay_cost = (current - reference) * heads;
    let additional_pay_cost =
        (hours.additional_pay(current) - hours.additional_pay(reference)) * heads;
    let ooh_cost = (hours.ooh_pay(current) - hours.ooh_pay(reference)) * heads;

    let pension_cost = match pension_policy {
        PensionCostPolicy::DifferenceOfEvaluations => {
            (pension(current)? - pension(reference)?) * heads
        }
        PensionCostPolicy::FlatRateOfDelta => basic_pay_cost * EMPLOYER_PENSION_RATE,
    };

    let current_total = hours.total_pay(current);
    let reference_total = hours.total_pay(reference);
    let employer_ni_cost = (employer_ni(current_total)? - employer_ni(reference_total)?) * heads;
    let tax_recouped =
        (income_deductions(current_total)? - income_deductions(reference_total)?) * heads;

    let total_cost =
        basic_pay_cost + additional_pay_cost + ooh_cost + pension_cost + employer_ni_cost;

    Ok(CostRecord {
        year_index,
        basic_pay_cost,
        additional_pay_cost,
        ooh_cost,
        pension_cost,
        employer_ni_cost,
        total_cost,
        tax_recouped,
        net_cost: total_cost - tax_recouped,
    })
}

/// Prices each simulated year of a band against the pay it replaced. Year 0
/// is priced against the post-award pay, so the agreed award is not a cost of
/// the deal.
pub fn band_costs(
    band: &Band,
    progression: &Progression,
    hours: &WorkingHours,
    policy: FormulaPolicy,
) -> Result<Vec<CostRecord>> {
    let mut reference = band.offered_pay;

    let mut records = Vec::with_capacity(progression.steps.len());
    for (year_index, step) in progression.steps.iter().enumerate() {
        let current = step.state.nominal_pay;
        records.push(cost_of_change(
            year_index,
            reference,
            current,
            band.headcount,
            hours,
            policy.pension_cost,
        )?);
        reference = current;
    }
    Ok(records)
}

/// Sums per-band cost rows into per-year totals with running cumulative cost.
pub fn summarize_years(per_band: &[Vec<CostRecord>], year_count: usize) -> Vec<YearCostSummary> {
    let mut summaries = Vec::with_capacity(year_count);
    let mut cumulative_total_cost = 0.0;
    let mut cumulative_net_cost = 0.0;

    for year_index in 0..year_count {
        let mut summary = YearCostSummary {
            year_index,
            basic_pay_cost: 0.0,
            additional_pay_cost: 0.0,
            ooh_cost: 0.0,
            pension_cost: 0.0,
            employer_ni_cost: 0.0,
            total_cost: 0.0,
            tax_recouped: 0.0,
            net_cost: 0.0,
            cumulative_total_cost: 0.0,
            cumulative_net_cost: 0.0,
        };
        for record in per_band.iter().filter_map(|rows| rows.get(year_index)) {
            summary.basic_pay_cost += record.basic_pay_cost;
            summary.additional_pay_cost += record.additional_pay_cost;
            summary.ooh_cost += record.ooh_cost;
            summary.pension_cost += record.pension_cost;
            summary.employer_ni_cost += record.employer_ni_cost;
            summary.total_cost += record.total_cost;
            summary.tax_recouped += record.tax_recouped;
            summary.net_cost += record.net_cost;
        }
        cumulative_total_cost += summary.total_cost;
        cumulative_net_cost += summary.net_cost;
        summary.cumulative_total_cost = cumulative_total_cost;
        summary.cumulative_net_cost = cumulative_net_cost;
        summaries.push(summary);
    }
    summaries
}
