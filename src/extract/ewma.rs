//! # EWMA Correlation
//!
//! $$
//! \alpha=\frac{2}{\text{span}+1},\qquad
//! \rho^{(t)}_{ij}=\frac{\operatorname{cov}^{(t)}_{ij}}{\sqrt{\operatorname{var}^{(t)}_i\operatorname{var}^{(t)}_j}}
//! $$
//!
//! One pass over the whole panel builds the exponentially weighted
//! correlation of every instrument pair at every timestamp. Weights are the
//! adjusted form, missing observations are skipped without decaying the
//! weights, and covariances are biased. Covariance and both variances of a
//! pair use only the rows where both sides are present.

use chrono::NaiveDateTime;
use ndarray::Array2;
use serde::Deserialize;
use tracing::debug;

use super::CorrelationEstimator;
use crate::matrix::CorrelationMatrix;
use crate::panel::Panel;
use crate::schedule::FitWindow;

/// EWMA span and minimum pairwise observation count.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct EwmaParams {
  pub span: usize,
  pub min_periods: usize,
}

impl Default for EwmaParams {
  fn default() -> Self {
    Self {
      span: 250,
      min_periods: 20,
    }
  }
}

impl EwmaParams {
  fn decay(&self) -> f64 {
    let span = self.span.max(1) as f64;
    1.0 - 2.0 / (span + 1.0)
  }
}

#[derive(Clone, Copy, Debug, Default)]
struct PairState {
  mean_x: f64,
  mean_y: f64,
  cov: f64,
  var_x: f64,
  var_y: f64,
  old_wt: f64,
  nobs: usize,
  started: bool,
}

impl PairState {
  fn update(&mut self, x: f64, y: f64, decay: f64) {
    if x.is_nan() || y.is_nan() {
      return;
    }
    self.nobs += 1;
    if !self.started {
      self.mean_x = x;
      self.mean_y = y;
      self.old_wt = 1.0;
      self.started = true;
      return;
    }

    self.old_wt *= decay;
    let (old_mx, old_my) = (self.mean_x, self.mean_y);
    let w = self.old_wt;
    // Constant series keep their mean exactly.
    if self.mean_x != x {
      self.mean_x = (w * old_mx + x) / (w + 1.0);
    }
    if self.mean_y != y {
      self.mean_y = (w * old_my + y) / (w + 1.0);
    }
    let (shift_x, shift_y) = (old_mx - self.mean_x, old_my - self.mean_y);
    let (dx, dy) = (x - self.mean_x, y - self.mean_y);
    self.cov = (w * (self.cov + shift_x * shift_y) + dx * dy) / (w + 1.0);
    self.var_x = (w * (self.var_x + shift_x * shift_x) + dx * dx) / (w + 1.0);
    self.var_y = (w * (self.var_y + shift_y * shift_y) + dy * dy) / (w + 1.0);
    self.old_wt += 1.0;
  }

  fn ready(&self, min_periods: usize) -> bool {
    self.nobs >= min_periods
  }

  fn correlation(&self, min_periods: usize) -> Option<f64> {
    if !self.ready(min_periods) {
      return None;
    }
    let r = self.cov / (self.var_x * self.var_y).max(0.0).sqrt();
    r.is_finite().then_some(r)
  }
}

/// Pairwise EWMA correlation matrices for every timestamp of a panel.
#[derive(Clone, Debug)]
pub struct EwmaCorrelations {
  index: Vec<NaiveDateTime>,
  columns: Vec<String>,
  matrices: Vec<Array2<Option<f64>>>,
}

impl EwmaCorrelations {
  pub fn build(panel: &Panel, params: EwmaParams) -> Self {
    let k = panel.ncols();
    let decay = params.decay();
    let min_periods = params.min_periods.max(1);
    let values = panel.values();

    // Upper triangle; (i, i) only gates the diagonal on observation count.
    let mut states = Array2::<PairState>::default((k, k));
    let mut matrices = Vec::with_capacity(panel.nrows());

    for row in values.rows() {
      for i in 0..k {
        for j in i..k {
          states[[i, j]].update(row[i], row[j], decay);
        }
      }

      let mut m = Array2::<Option<f64>>::from_elem((k, k), None);
      for i in 0..k {
        m[[i, i]] = states[[i, i]].ready(min_periods).then_some(1.0);
        for j in (i + 1)..k {
          let rho = states[[i, j]].correlation(min_periods);
          m[[i, j]] = rho;
          m[[j, i]] = rho;
        }
      }
      matrices.push(m);
    }

    debug!(
      timestamps = matrices.len(),
      instruments = k,
      span = params.span,
      min_periods,
      "built EWMA correlation structure"
    );
    Self {
      index: panel.index().to_vec(),
      columns: panel.columns().to_vec(),
      matrices,
    }
  }

  pub fn len(&self) -> usize {
    self.matrices.len()
  }

  pub fn is_empty(&self) -> bool {
    self.matrices.is_empty()
  }

  pub fn index(&self) -> &[NaiveDateTime] {
    &self.index
  }

  /// Raw cells at row `t`; the diagonal is missing until the column has
  /// `min_periods` observations.
  pub fn raw_at(&self, t: usize) -> Option<&Array2<Option<f64>>> {
    self.matrices.get(t)
  }

  /// Matrix at the latest timestamp strictly before `date`, or an
  /// all-missing matrix if no timestamp precedes it.
  pub fn last_valid_before(&self, date: NaiveDateTime) -> CorrelationMatrix {
    // Each timestamp contributes one K-row block, so one preceding timestamp
    // is the K-observation minimum.
    let before = self.index.partition_point(|t| *t < date);
    if before == 0 {
      return CorrelationMatrix::missing(&self.columns);
    }
    CorrelationMatrix::from_values(self.columns.clone(), self.matrices[before - 1].clone())
  }
}

impl CorrelationEstimator for EwmaCorrelations {
  fn estimate(&self, _panel: &Panel, window: &FitWindow) -> CorrelationMatrix {
    self.last_valid_before(window.fit_end)
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use chrono::Duration;
  use chrono::NaiveDate;
  use rand::rngs::StdRng;
  use rand::SeedableRng;
  use rand_distr::Distribution;
  use rand_distr::StandardNormal;

  use super::*;

  fn day(i: i64) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2023, 1, 1)
      .unwrap()
      .and_hms_opt(0, 0, 0)
      .unwrap()
      + Duration::days(i)
  }

  fn random_panel(n: usize, k: usize, seed: u64) -> Panel {
    let mut rng = StdRng::seed_from_u64(seed);
    let series: Vec<(String, Vec<f64>)> = (0..k)
      .map(|j| {
        let v: Vec<f64> = (0..n).map(|_| StandardNormal.sample(&mut rng)).collect();
        (format!("c{j}"), v)
      })
      .collect();
    Panel::from_columns((0..n as i64).map(day).collect(), series).unwrap()
  }

  /// Reference: direct weighted sums with weights `(1-alpha)^(t-s)`.
  fn brute_force_corr(x: &[f64], y: &[f64], span: usize) -> f64 {
    let decay = 1.0 - 2.0 / (span as f64 + 1.0);
    let n = x.len();
    let w: Vec<f64> = (0..n).map(|s| decay.powi((n - 1 - s) as i32)).collect();
    let sw: f64 = w.iter().sum();
    let mx = x.iter().zip(&w).map(|(a, b)| a * b).sum::<f64>() / sw;
    let my = y.iter().zip(&w).map(|(a, b)| a * b).sum::<f64>() / sw;
    let cov = (0..n).map(|s| w[s] * (x[s] - mx) * (y[s] - my)).sum::<f64>() / sw;
    let vx = (0..n).map(|s| w[s] * (x[s] - mx).powi(2)).sum::<f64>() / sw;
    let vy = (0..n).map(|s| w[s] * (y[s] - my).powi(2)).sum::<f64>() / sw;
    cov / (vx * vy).sqrt()
  }

  #[test]
  fn matches_direct_weighted_estimate() {
    let p = random_panel(40, 2, 7);
    let ewm = EwmaCorrelations::build(&p, EwmaParams { span: 10, min_periods: 2 });
    let x = p.column(0).to_vec();
    let y = p.column(1).to_vec();

    let got = ewm.raw_at(39).unwrap()[[0, 1]].unwrap();
    assert_abs_diff_eq!(got, brute_force_corr(&x, &y, 10), epsilon = 1e-10);
  }

  #[test]
  fn min_periods_gates_early_rows() {
    let p = random_panel(5, 3, 11);
    let ewm = EwmaCorrelations::build(&p, EwmaParams { span: 5, min_periods: 2 });

    assert!(ewm.raw_at(0).unwrap().iter().all(|v| v.is_none()));
    let third = ewm.raw_at(2).unwrap();
    assert!(third.iter().all(|v| v.is_some()));
    assert_eq!(third[[0, 0]], Some(1.0));
    assert_eq!(ewm.len(), 5);
  }

  #[test]
  fn lookup_uses_strictly_earlier_timestamp() {
    let p = random_panel(10, 2, 3);
    let ewm = EwmaCorrelations::build(&p, EwmaParams { span: 5, min_periods: 2 });

    let m = ewm.last_valid_before(day(4));
    assert_eq!(m.get(0, 1), ewm.raw_at(3).unwrap()[[0, 1]]);
    assert_eq!(m.columns(), &["c0".to_string(), "c1".to_string()]);
  }

  #[test]
  fn lookup_before_any_data_is_all_missing() {
    let p = random_panel(5, 2, 5);
    let ewm = EwmaCorrelations::build(&p, EwmaParams::default());
    let m = ewm.last_valid_before(day(-9));
    assert!(m.is_all_missing());
  }

  #[test]
  fn missing_rows_do_not_decay_weights() {
    let base = random_panel(30, 2, 21);
    let a_col = base.column(0).to_vec();
    let b_col = base.column(1).to_vec();

    let extend = |tail: &[(f64, f64)]| {
      let mut xs = a_col.clone();
      let mut ys = b_col.clone();
      for (x, y) in tail {
        xs.push(*x);
        ys.push(*y);
      }
      let n = xs.len() as i64;
      Panel::from_columns(
        (0..n).map(day).collect(),
        vec![("c0".into(), xs), ("c1".into(), ys)],
      )
      .unwrap()
    };
    let clean = extend(&[(0.5, -0.2)]);
    let gapped = extend(&[(f64::NAN, f64::NAN), (0.5, -0.2)]);

    let params = EwmaParams { span: 8, min_periods: 3 };
    let a = EwmaCorrelations::build(&clean, params);
    let b = EwmaCorrelations::build(&gapped, params);
    assert_abs_diff_eq!(
      a.raw_at(30).unwrap()[[0, 1]].unwrap(),
      b.raw_at(31).unwrap()[[0, 1]].unwrap(),
      epsilon = 1e-12
    );
  }

  #[test]
  fn variances_use_only_rows_shared_by_the_pair() {
    let base = random_panel(40, 2, 13);
    let mut x = base.column(0).to_vec();
    let mut y = base.column(1).to_vec();
    x[3] = f64::NAN;
    x[17] = f64::NAN;
    y[9] = f64::NAN;
    y[25] = f64::NAN;
    y[31] = f64::NAN;
    let gapped = Panel::from_columns(
      (0..40).map(day).collect(),
      vec![("c0".into(), x.clone()), ("c1".into(), y.clone())],
    )
    .unwrap();

    let (xs, ys): (Vec<f64>, Vec<f64>) = x
      .iter()
      .zip(&y)
      .filter(|(a, b)| a.is_finite() && b.is_finite())
      .map(|(a, b)| (*a, *b))
      .unzip();

    let ewm = EwmaCorrelations::build(&gapped, EwmaParams { span: 10, min_periods: 2 });
    let got = ewm.raw_at(39).unwrap()[[0, 1]].unwrap();
    assert_abs_diff_eq!(got, brute_force_corr(&xs, &ys, 10), epsilon = 1e-10);
  }

  #[test]
  fn series_equal_on_shared_rows_are_perfectly_correlated() {
    let base = random_panel(20, 1, 17);
    let a = base.column(0).to_vec();
    let mut b = a.clone();
    // Drop the other side on the days with the largest moves.
    let mut by_size: Vec<usize> = (0..a.len()).collect();
    by_size.sort_by(|&i, &j| a[j].abs().total_cmp(&a[i].abs()));
    for &t in &by_size[..3] {
      b[t] = f64::NAN;
    }
    let p = Panel::from_columns(
      (0..20).map(day).collect(),
      vec![("a".into(), a), ("b".into(), b)],
    )
    .unwrap();

    let ewm = EwmaCorrelations::build(&p, EwmaParams { span: 5, min_periods: 2 });
    for t in 5..20 {
      let rho = ewm.raw_at(t).unwrap()[[0, 1]].unwrap();
      assert_abs_diff_eq!(rho, 1.0, epsilon = 1e-9);
    }
  }
}
