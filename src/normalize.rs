//! # Normalize
//!
//! $$
//! P_t=\begin{cases}\ln X_t & \text{prices}\\ \sum_{s\le t} r_s & \text{returns}\end{cases},\qquad
//! r^{(f)}_b = P_{\ell_b}-P_{\ell_{b-1}}
//! $$
//!
//! Turns a price or returns panel into per-bucket log-returns at a requested
//! frequency.

use ndarray::Array2;
use serde::Deserialize;
use tracing::debug;

use crate::error::Result;
use crate::frequency::ResampleFrequency;
use crate::panel::Panel;

/// Options for [`normalize_returns`].
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
  /// Input holds prices rather than log-returns.
  pub is_price_series: bool,
  /// Forward-fill the synthetic price index before resampling.
  pub forward_fill: bool,
  /// Resampling frequency (`D`, `B`, `W`, `M`, `Y`, `H`, `<n>D`, ...).
  pub frequency: String,
}

impl Default for NormalizeConfig {
  fn default() -> Self {
    Self {
      is_price_series: false,
      forward_fill: true,
      frequency: "D".to_string(),
    }
  }
}

/// Build the log-price index: `ln` of prices, or the running sum of returns
/// with missing values skipped.
fn price_index(panel: &Panel, is_price_series: bool) -> Array2<f64> {
  let mut index = panel.values().to_owned();
  if is_price_series {
    index.mapv_inplace(|v| {
      let l = v.ln();
      if l.is_finite() {
        l
      } else {
        f64::NAN
      }
    });
  } else {
    for mut col in index.columns_mut() {
      let mut acc = 0.0;
      for v in col.iter_mut() {
        if v.is_nan() {
          continue;
        }
        acc += *v;
        *v = acc;
      }
    }
  }
  index
}

fn forward_fill(values: &mut Array2<f64>) {
  for mut col in values.columns_mut() {
    let mut last = f64::NAN;
    for v in col.iter_mut() {
      if v.is_nan() {
        *v = last;
      } else {
        last = *v;
      }
    }
  }
}

/// Resample to `frequency` keeping the last non-missing value per bucket and
/// first-difference the result.
///
/// The input is not modified. Every bucket between the first and last
/// timestamp is emitted; the first row is always missing.
pub fn normalize_returns(panel: &Panel, config: &NormalizeConfig) -> Result<Panel> {
  let frequency: ResampleFrequency = config.frequency.parse()?;
  let (Some(first), Some(last)) = (panel.first_timestamp(), panel.last_timestamp()) else {
    return Ok(panel.clone());
  };

  let mut prices = price_index(panel, config.is_price_series);
  if config.forward_fill {
    forward_fill(&mut prices);
  }

  let labels = frequency.labels_between(first, last);
  let k = panel.ncols();
  let mut buckets = Array2::<f64>::from_elem((labels.len(), k), f64::NAN);
  for (row, ts) in panel.index().iter().enumerate() {
    let label = frequency.bucket_label(*ts, first);
    let Ok(b) = labels.binary_search(&label) else {
      continue;
    };
    for j in 0..k {
      let v = prices[[row, j]];
      if !v.is_nan() {
        buckets[[b, j]] = v;
      }
    }
  }

  let mut returns = Array2::<f64>::from_elem((labels.len(), k), f64::NAN);
  for b in 1..labels.len() {
    for j in 0..k {
      returns[[b, j]] = buckets[[b, j]] - buckets[[b - 1, j]];
    }
  }

  debug!(
    rows_in = panel.nrows(),
    rows_out = labels.len(),
    frequency = %config.frequency,
    "normalized panel to returns"
  );
  Ok(Panel::from_parts_unchecked(
    labels,
    panel.columns().to_vec(),
    returns,
  ))
}
