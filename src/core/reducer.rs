//! Pure helpers for front ends that keep a headline rise and per-band rises in
//! sync. None of these touch engine state.

/// Headcount-weighted mean of per-band rises. Zero when nobody is counted.
pub fn weighted_average_increase(percentages: &[f64], headcounts: &[u32]) -> f64 {
    let total: f64 = headcounts.iter().map(|&h| f64::from(h)).sum();
    if total == 0.0 {
        return 0.0;
    }
    percentages
        .iter()
        .zip(headcounts)
        .map(|(p, &h)| p * f64::from(h))
        .sum::<f64>()
        / total
}

/// Applies one headline rise to every band.
pub fn broadcast_headline(headline: f64, band_count: usize) -> Vec<f64> {
    vec![headline; band_count]
}

/// A consolidated cash rise expressed as a fraction of base pay.
pub fn flat_as_percentage(flat_increase: f64, base_pay: f64) -> f64 {
    if base_pay == 0.0 {
        return 0.0;
    }
    flat_increase / base_pay
}
