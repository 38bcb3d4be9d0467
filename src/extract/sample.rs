//! # Windowed Sample Correlation
//!
//! $$
//! \hat\rho_{ij}=\frac{\sum_t (x_{ti}-\bar x_i)(x_{tj}-\bar x_j)}
//! {\sqrt{\sum_t (x_{ti}-\bar x_i)^2\sum_t (x_{tj}-\bar x_j)^2}}
//! $$
//!
//! Pearson correlation over pairwise-complete observations of a fit window.

use std::ops::Range;

use ndarray::Array2;

use super::CorrelationEstimator;
use crate::matrix::CorrelationMatrix;
use crate::panel::Panel;
use crate::schedule::FitWindow;

fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
  let n = x.len().min(y.len());
  if n < 2 {
    return None;
  }

  let mx = x.iter().sum::<f64>() / n as f64;
  let my = y.iter().sum::<f64>() / n as f64;

  let mut cov = 0.0;
  let mut sx = 0.0;
  let mut sy = 0.0;
  let mut qx = 0.0;
  let mut qy = 0.0;

  for i in 0..n {
    let dx = x[i] - mx;
    let dy = y[i] - my;
    cov += dx * dy;
    sx += dx * dx;
    sy += dy * dy;
    qx += x[i] * x[i];
    qy += y[i] * y[i];
  }

  // Variance at round-off level relative to the data's magnitude is zero.
  let roundoff = (f64::EPSILON * n as f64).powi(2);
  if sx <= qx * roundoff || sy <= qy * roundoff {
    return None;
  }
  Some((cov / (sx * sy).sqrt()).clamp(-1.0, 1.0))
}

/// Pearson matrix of `panel` over `rows`, skipping rows where either side of
/// a pair is missing.
pub fn pearson_matrix(panel: &Panel, rows: Range<usize>) -> CorrelationMatrix {
  let k = panel.ncols();
  let mut values = Array2::<Option<f64>>::from_elem((k, k), None);
  let mut xs = Vec::with_capacity(rows.len());
  let mut ys = Vec::with_capacity(rows.len());

  for i in 0..k {
    let col_i = panel.column(i);
    for j in (i + 1)..k {
      let col_j = panel.column(j);
      xs.clear();
      ys.clear();
      for t in rows.clone() {
        let (a, b) = (col_i[t], col_j[t]);
        if a.is_finite() && b.is_finite() {
          xs.push(a);
          ys.push(b);
        }
      }
      let r = pearson(&xs, &ys);
      values[[i, j]] = r;
      values[[j, i]] = r;
    }
  }

  CorrelationMatrix::from_values(panel.columns().to_vec(), values)
}

/// Estimator computing an independent Pearson matrix per fit window.
#[derive(Clone, Copy, Debug, Default)]
pub struct SampleCorrelation;

impl CorrelationEstimator for SampleCorrelation {
  fn estimate(&self, panel: &Panel, window: &FitWindow) -> CorrelationMatrix {
    pearson_matrix(panel, panel.rows_between(window.fit_start, window.fit_end))
  }
}
