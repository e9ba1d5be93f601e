use super::error::{PayModelError, Result};

pub const EMPLOYER_PENSION_RATE: f64 = 0.237;

const WEEKS_PER_YEAR: f64 = 52.0;

/// Lower threshold and marginal rate of one band; each band ends where the
/// next one starts and the last one is open-ended.
type RateBand = (f64, f64);

const INCOME_TAX_BANDS: [RateBand; 4] = [
    (0.0, 0.0),
    (12_570.0, 0.20),
    (50_270.0, 0.40),
    (125_140.0, 0.45),
];

const EMPLOYEE_NI_WEEKLY_BANDS: [RateBand; 3] = [(0.0, 0.0), (242.0, 0.08), (967.0, 0.02)];

const EMPLOYER_NI_WEEKLY_BANDS: [RateBand; 4] = [
    (0.0, 0.0),
    (175.0, 0.138),
    (481.0, 0.138),
    (967.0, 0.138),
];

fn checked_income(income: f64) -> Result<f64> {
    if !income.is_finite() || income < 0.0 {
        return Err(PayModelError::InvalidIncome(income));
    }
    Ok(income)
}

fn progressive(amount: f64, bands: &[RateBand]) -> f64 {
    let mut due = 0.0;
    for (idx, &(lower, rate)) in bands.iter().enumerate() {
        if amount <= lower {
            break;
        }
        let upper = bands.get(idx + 1).map_or(f64::INFINITY, |&(next, _)| next);
        due += (amount.min(upper) - lower) * rate;
    }
    due
}

fn weekly_progressive(annual: f64, bands: &[RateBand]) -> f64 {
    progressive(annual / WEEKS_PER_YEAR, bands) * WEEKS_PER_YEAR
}

/// Employer pension contribution on basic pay.
pub fn pension(basic_pay: f64) -> Result<f64> {
    Ok(checked_income(basic_pay)? * EMPLOYER_PENSION_RATE)
}

pub fn income_tax(income: f64) -> Result<f64> {
    Ok(progressive(checked_income(income)?, &INCOME_TAX_BANDS))
}

pub fn employee_ni(income: f64) -> Result<f64> {
    Ok(weekly_progressive(
        checked_income(income)?,
        &EMPLOYEE_NI_WEEKLY_BANDS,
    ))
}

pub fn employer_ni(income: f64) -> Result<f64> {
    Ok(weekly_progressive(
        checked_income(income)?,
        &EMPLOYER_NI_WEEKLY_BANDS,
    ))
}

/// Income tax plus employee NI: what the Exchequer takes back from a salary.
pub fn income_deductions(income: f64) -> Result<f64> {
    Ok(income_tax(income)? + employee_ni(income)?)
}
