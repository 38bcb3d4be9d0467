//! # corr-over-time
//!
//! $$
//! \{R_t\}_{t}\;=\;\Big\{\operatorname{corr}\big(r_{\,\text{fit}(t)}\big)\Big\}_{t\in\text{schedule}}
//! $$
//!
//! Estimates how a set of instruments' returns co-move over time: a fitting
//! schedule partitions the panel's date range, an estimator produces one
//! correlation matrix per entry, and a post-processor floors, clips and
//! shrinks each matrix.

pub mod assemble;
pub mod engine;
pub mod error;
pub mod extract;
pub mod frequency;
pub mod matrix;
pub mod normalize;
pub mod panel;
pub mod postprocess;
pub mod schedule;

pub use assemble::CorrelationList;
pub use assemble::LongRow;
pub use assemble::OutputForm;
pub use assemble::SerializedCorrelationList;
pub use engine::compute_correlation_over_time;
pub use engine::CorrelationConfig;
pub use engine::CorrelationEngine;
pub use error::CorrelationError;
pub use extract::extract_correlations;
pub use extract::CorrelationStrategy;
pub use extract::EwmaParams;
pub use matrix::CorrelationMatrix;
pub use normalize::normalize_returns;
pub use normalize::NormalizeConfig;
pub use panel::Panel;
pub use postprocess::PostProcessOptions;
pub use schedule::generate_fitting_dates;
pub use schedule::DateMethod;
pub use schedule::FitPeriod;
pub use schedule::FitSchedule;
pub use schedule::FitWindow;
