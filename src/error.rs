//! # Errors
//!
//! $$
//! \text{engine}:(\text{panel},\text{config})\to\text{CorrelationList}\;\cup\;\text{CorrelationError}
//! $$
//!
use chrono::NaiveDateTime;
use thiserror::Error;

/// Conditions surfaced by the correlation engine.
///
/// Missing data and short histories are not errors; only configuration
/// problems and ad-hoc out-of-range lookups are.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CorrelationError {
  #[error("unknown date_method={0:?}; expected one of in_sample, rolling, expanding")]
  InvalidMethod(String),
  #[error("unsupported frequency {0:?}")]
  InvalidFrequency(String),
  #[error("date {date} is before first fitting date {first}")]
  OutOfRangeDate {
    date: NaiveDateTime,
    first: NaiveDateTime,
  },
  #[error("panel has no observations")]
  EmptyPanel,
  #[error("unknown output form {0:?}; expected one of original, jsonable, long")]
  UnknownOutputForm(String),
  #[error("length mismatch: {left} schedule entries vs {right} matrices")]
  LengthMismatch { left: usize, right: usize },
}

pub type Result<T> = std::result::Result<T, CorrelationError>;
