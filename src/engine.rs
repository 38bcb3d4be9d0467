//! # Correlation Engine
//!
//! $$
//! \mathcal L=\operatorname{Assemble}\Big(S,\;\big\{\operatorname{Post}(\operatorname{Extract}(X,S_i))\big\}_i\Big),\qquad
//! S=\operatorname{Schedule}(X)
//! $$
//!
//! High-level entry point chaining schedule generation, extraction,
//! post-processing and assembly.

use rayon::prelude::*;
use serde::Deserialize;
use tracing::info;

use crate::assemble::CorrelationList;
use crate::error::Result;
use crate::extract::extract_correlations;
use crate::extract::CorrelationStrategy;
use crate::extract::EwmaParams;
use crate::normalize::normalize_returns;
use crate::normalize::NormalizeConfig;
use crate::panel::Panel;
use crate::postprocess;
use crate::postprocess::PostProcessOptions;
use crate::schedule::DateMethod;
use crate::schedule::FitSchedule;

/// Runtime configuration for [`compute_correlation_over_time`].
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct CorrelationConfig {
  /// Shape of the fitting schedule.
  pub date_method: DateMethod,
  /// Boundary-index lookback for [`DateMethod::Rolling`].
  pub rollyears: usize,
  /// Spacing between schedule boundaries.
  pub interval_frequency: String,
  /// EWMA extraction when true, windowed sample otherwise.
  pub using_exponent: bool,
  /// EWMA span.
  pub ew_lookback: usize,
  /// Minimum pairwise observations before an EWMA correlation appears.
  pub min_periods: usize,
  /// Off-diagonal value of the no-data matrix.
  pub no_data_offdiag: f64,
  pub floor_at_zero: bool,
  pub clip: Option<f64>,
  pub shrinkage: f64,
}

impl Default for CorrelationConfig {
  fn default() -> Self {
    Self {
      date_method: DateMethod::InSample,
      rollyears: 20,
      interval_frequency: "12M".to_string(),
      using_exponent: true,
      ew_lookback: 250,
      min_periods: 20,
      no_data_offdiag: 0.99,
      floor_at_zero: true,
      clip: None,
      shrinkage: 0.0,
    }
  }
}

impl CorrelationConfig {
  pub fn strategy(&self) -> CorrelationStrategy {
    if self.using_exponent {
      CorrelationStrategy::Ewma(EwmaParams {
        span: self.ew_lookback,
        min_periods: self.min_periods,
      })
    } else {
      CorrelationStrategy::WindowedSample
    }
  }

  pub fn post_process(&self) -> PostProcessOptions {
    PostProcessOptions {
      floor_at_zero: self.floor_at_zero,
      clip: self.clip,
      shrinkage: self.shrinkage,
    }
  }
}

/// Correlation matrices over time for an already-normalized returns panel.
///
/// Every matrix, including the no-data fallback, passes through the
/// post-processor.
pub fn compute_correlation_over_time(
  panel: &Panel,
  config: &CorrelationConfig,
) -> Result<CorrelationList> {
  let schedule = FitSchedule::generate(
    panel,
    config.date_method,
    config.rollyears,
    &config.interval_frequency,
  )?;
  let strategy = config.strategy();
  info!(
    method = %config.date_method,
    ?strategy,
    periods = schedule.len(),
    instruments = panel.ncols(),
    "computing correlation over time"
  );

  let raw = extract_correlations(panel, &schedule, strategy, config.no_data_offdiag);
  let options = config.post_process();
  let matrices = raw
    .par_iter()
    .map(|m| postprocess::apply(m, &options))
    .collect();

  CorrelationList::assemble(panel.columns().to_vec(), schedule, matrices)
}

/// Single entry-point engine: normalize, then compute.
#[derive(Clone, Debug, Default)]
pub struct CorrelationEngine {
  config: CorrelationConfig,
  normalize: NormalizeConfig,
}

impl CorrelationEngine {
  pub fn new(config: CorrelationConfig, normalize: NormalizeConfig) -> Self {
    Self { config, normalize }
  }

  pub fn config(&self) -> &CorrelationConfig {
    &self.config
  }

  pub fn normalize_config(&self) -> &NormalizeConfig {
    &self.normalize
  }

  /// Normalize a price or returns panel to bucketed returns.
  pub fn normalize(&self, panel: &Panel) -> Result<Panel> {
    normalize_returns(panel, &self.normalize)
  }

  /// Compute on a panel that is already per-period returns.
  pub fn compute(&self, returns: &Panel) -> Result<CorrelationList> {
    compute_correlation_over_time(returns, &self.config)
  }

  /// Normalize `panel` and compute.
  pub fn run(&self, panel: &Panel) -> Result<CorrelationList> {
    let returns = self.normalize(panel)?;
    self.compute(&returns)
  }
}
