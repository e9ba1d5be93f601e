use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PayModelError {
    #[error("unknown year {0}")]
    UnknownYear(String),
    #[error("invalid range: {start} must come before {end}")]
    InvalidRange { start: String, end: String },
    #[error("FPR target is zero for {band_id} and pay is still eroding; progress is undefined")]
    DegenerateTarget { band_id: String },
    #[error("income must be a finite, non-negative amount, got {0}")]
    InvalidIncome(f64),
    #[error("no pay award for {band_id} in {year} and no published average to fall back to")]
    MissingOverride { year: String, band_id: String },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, PayModelError>;
