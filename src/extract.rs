//! # Extract
//!
//! $$
//! \{(\text{fit}_i,\text{period}_i)\}_{i}\;\mapsto\;\{R_i\}_{i}
//! $$
//!
//! One correlation matrix per schedule entry, from either windowed sample
//! estimates or a global EWMA structure.

pub mod ewma;
pub mod sample;

use rayon::prelude::*;
use tracing::warn;

use crate::matrix::CorrelationMatrix;
use crate::panel::Panel;
use crate::schedule::FitPeriod;
use crate::schedule::FitSchedule;
use crate::schedule::FitWindow;

pub use ewma::EwmaCorrelations;
pub use ewma::EwmaParams;
pub use sample::SampleCorrelation;

/// Produces a raw estimate for one fit window.
pub trait CorrelationEstimator: Sync {
  fn estimate(&self, panel: &Panel, window: &FitWindow) -> CorrelationMatrix;
}

/// Which estimator feeds the schedule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CorrelationStrategy {
  WindowedSample,
  Ewma(EwmaParams),
}

fn estimate_period<E: CorrelationEstimator + ?Sized>(
  estimator: &E,
  panel: &Panel,
  period: &FitPeriod,
  no_data_offdiag: f64,
) -> CorrelationMatrix {
  match period {
    FitPeriod::NoData(_) => CorrelationMatrix::no_data(panel.columns(), no_data_offdiag),
    FitPeriod::Real(window) => {
      let estimate = estimator.estimate(panel, window);
      if estimate.size() > 1 && estimate.is_all_missing() {
        warn!(
          fit_start = %window.fit_start,
          fit_end = %window.fit_end,
          "no viable estimate; using no-data matrix"
        );
        CorrelationMatrix::no_data(panel.columns(), no_data_offdiag)
      } else {
        estimate
      }
    }
  }
}

/// Run `estimator` over every schedule entry in parallel, preserving order.
pub fn extract_with<E: CorrelationEstimator + ?Sized>(
  estimator: &E,
  panel: &Panel,
  schedule: &FitSchedule,
  no_data_offdiag: f64,
) -> Vec<CorrelationMatrix> {
  schedule
    .periods()
    .par_iter()
    .map(|period| estimate_period(estimator, panel, period, no_data_offdiag))
    .collect()
}

/// One matrix per schedule entry using `strategy`.
///
/// For [`CorrelationStrategy::Ewma`] the whole-panel structure is built once
/// before any period is looked up. Short histories degrade to the no-data
/// matrix rather than failing.
pub fn extract_correlations(
  panel: &Panel,
  schedule: &FitSchedule,
  strategy: CorrelationStrategy,
  no_data_offdiag: f64,
) -> Vec<CorrelationMatrix> {
  match strategy {
    CorrelationStrategy::WindowedSample => {
      extract_with(&SampleCorrelation, panel, schedule, no_data_offdiag)
    }
    CorrelationStrategy::Ewma(params) => {
      let structure = EwmaCorrelations::build(panel, params);
      extract_with(&structure, panel, schedule, no_data_offdiag)
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::Duration;
  use chrono::NaiveDate;

  use super::*;
  use crate::schedule::DateMethod;

  fn panel(n: usize) -> Panel {
    let start = NaiveDate::from_ymd_opt(2020, 1, 1)
      .unwrap()
      .and_hms_opt(0, 0, 0)
      .unwrap();
    let index = (0..n).map(|i| start + Duration::days(i as i64)).collect();
    let a: Vec<f64> = (0..n).map(|i| ((i * 7) % 11) as f64).collect();
    let b: Vec<f64> = (0..n).map(|i| ((i * 5) % 13) as f64 + 0.5 * a[i]).collect();
    Panel::from_columns(index, vec![("A".into(), a), ("B".into(), b)]).unwrap()
  }

  #[test]
  fn one_matrix_per_period_in_order() {
    let p = panel(60);
    let schedule = FitSchedule::generate(&p, DateMethod::Expanding, 1, "7D").unwrap();
    for strategy in [
      CorrelationStrategy::WindowedSample,
      CorrelationStrategy::Ewma(EwmaParams { span: 10, min_periods: 3 }),
    ] {
      let out = extract_correlations(&p, &schedule, strategy, 0.99);
      assert_eq!(out.len(), schedule.len());
      assert_eq!(out[0], CorrelationMatrix::no_data(p.columns(), 0.99));
      assert!(out[1..].iter().all(|m| m.get(0, 1) != Some(0.99)));
    }
  }

  #[test]
  fn windowed_matches_direct_pearson_on_fit_window() {
    let p = panel(60);
    let schedule = FitSchedule::generate(&p, DateMethod::Rolling, 2, "7D").unwrap();
    let out = extract_correlations(&p, &schedule, CorrelationStrategy::WindowedSample, 0.99);

    let last = schedule.periods().last().unwrap().window();
    let direct = sample::pearson_matrix(&p, p.rows_between(last.fit_start, last.fit_end));
    assert_eq!(out.last().unwrap(), &direct);
  }

  #[test]
  fn ewma_without_enough_history_falls_back() {
    let p = panel(20);
    let schedule = FitSchedule::generate(&p, DateMethod::Expanding, 1, "7D").unwrap();
    let strategy = CorrelationStrategy::Ewma(EwmaParams { span: 10, min_periods: 500 });
    let out = extract_correlations(&p, &schedule, strategy, 0.5);

    assert!(out
      .iter()
      .all(|m| m == &CorrelationMatrix::no_data(p.columns(), 0.5)));
  }
}
