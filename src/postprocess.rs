//! # Post-Processing
//!
//! $$
//! R' = s\,\bar R + (1-s)\,\operatorname{clip}_{c}\big(\max(R,0)\big),\qquad
//! \bar R_{ij}=\bar\rho\;(i\ne j),\;\bar R_{ii}=1
//! $$
//!
//! Floor, clip and shrink-to-average transforms. Each stage returns a new
//! matrix and restores the unit diagonal; missing cells stay missing.

use serde::Deserialize;

use crate::matrix::CorrelationMatrix;

/// Post-processing toggles applied to every estimate.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct PostProcessOptions {
  /// Set negative correlations to zero.
  pub floor_at_zero: bool,
  /// Clamp correlations to `[-|c|, |c|]`; non-finite values disable it.
  pub clip: Option<f64>,
  /// Blend weight towards the average-correlation prior, clamped to `[0, 1]`.
  pub shrinkage: f64,
}

impl Default for PostProcessOptions {
  fn default() -> Self {
    Self {
      floor_at_zero: true,
      clip: None,
      shrinkage: 0.0,
    }
  }
}

pub fn floor_at_zero(matrix: &CorrelationMatrix) -> CorrelationMatrix {
  matrix.map_off_diagonal(|v| v.max(0.0))
}

/// Clamp into `[-|clip_value|, |clip_value|]`; with `None` or a non-finite
/// bound only the diagonal is re-normalised.
pub fn clip(matrix: &CorrelationMatrix, clip_value: Option<f64>) -> CorrelationMatrix {
  match clip_value.filter(|c| c.is_finite()) {
    Some(c) => {
      let c = c.abs();
      matrix.map_off_diagonal(|v| v.clamp(-c, c))
    }
    None => matrix.map_off_diagonal(|v| v),
  }
}

/// Blend towards a prior whose off-diagonal cells all equal the current
/// off-diagonal mean.
///
/// Returns the input unchanged when `shrinkage <= 0` or when every
/// off-diagonal cell is missing.
pub fn shrink_to_average(matrix: &CorrelationMatrix, shrinkage: f64) -> CorrelationMatrix {
  if !(shrinkage > 0.0) {
    return matrix.clone();
  }
  let Some(avg) = matrix.off_diagonal_mean() else {
    return matrix.clone();
  };
  let s = shrinkage.min(1.0);
  matrix.map_off_diagonal(|v| s * avg + (1.0 - s) * v)
}

/// Run floor, clip and shrink in that fixed order.
pub fn apply(matrix: &CorrelationMatrix, options: &PostProcessOptions) -> CorrelationMatrix {
  let floored = if options.floor_at_zero {
    floor_at_zero(matrix)
  } else {
    matrix.clone()
  };
  let clipped = clip(&floored, options.clip);
  shrink_to_average(&clipped, options.shrinkage)
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::array;

  use super::*;

  fn cols() -> Vec<String> {
    vec!["A".into(), "B".into(), "C".into()]
  }

  fn sample() -> CorrelationMatrix {
    CorrelationMatrix::from_f64(
      cols(),
      &array![[0.9, -0.5, 0.95], [-0.5, 1.2, 0.1], [0.95, 0.1, 1.0]],
    )
    .unwrap()
  }

  fn off(m: &CorrelationMatrix) -> Vec<f64> {
    m.off_diagonal().flatten().collect()
  }

  #[test]
  fn floor_removes_negatives() {
    let m = floor_at_zero(&sample());
    assert!(off(&m).iter().all(|v| *v >= 0.0));
    assert_eq!(m.get(0, 1), Some(0.0));
    assert_eq!(m.get(0, 2), Some(0.95));
  }

  #[test]
  fn clip_bounds_magnitude_with_negative_clip_value() {
    let m = clip(&sample(), Some(-0.8));
    assert!(off(&m).iter().all(|v| v.abs() <= 0.8));
    assert_eq!(m.get(0, 2), Some(0.8));
    assert_eq!(m.get(1, 0), Some(-0.5));
  }

  #[test]
  fn full_shrinkage_collapses_to_mean() {
    let before = sample();
    let mean = before.off_diagonal_mean().unwrap();
    let m = shrink_to_average(&before, 3.0);
    for v in off(&m) {
      assert_abs_diff_eq!(v, mean, epsilon = 1e-12);
    }
  }

  #[test]
  fn partial_shrinkage_blends() {
    let before = sample();
    let mean = before.off_diagonal_mean().unwrap();
    let m = shrink_to_average(&before, 0.25);
    assert_abs_diff_eq!(m.get(0, 2).unwrap(), 0.25 * mean + 0.75 * 0.95, epsilon = 1e-12);
  }

  #[test]
  fn shrinkage_with_all_missing_is_identity() {
    let missing = CorrelationMatrix::missing(&cols());
    assert_eq!(shrink_to_average(&missing, 0.5), missing);
  }

  #[test]
  fn apply_always_restores_diagonal() {
    let options = PostProcessOptions {
      floor_at_zero: false,
      clip: None,
      shrinkage: 0.0,
    };
    let m = apply(&sample(), &options);
    for i in 0..3 {
      assert_eq!(m.get(i, i), Some(1.0));
    }
    assert_eq!(m.get(0, 1), Some(-0.5));
  }

  #[test]
  fn stages_run_in_fixed_order() {
    let options = PostProcessOptions {
      floor_at_zero: true,
      clip: Some(0.5),
      shrinkage: 1.0,
    };
    let m = apply(&sample(), &options);
    // floor -> [0, 0.95, 0.1], clip -> [0, 0.5, 0.1], mean 0.2
    for v in off(&m) {
      assert_abs_diff_eq!(v, 0.2, epsilon = 1e-12);
    }
  }

  #[test]
  fn non_finite_clip_is_ignored() {
    let m = CorrelationMatrix::from_f64(
      vec!["a".into(), "b".into()],
      &array![[1.0, 0.7], [0.7, 1.0]],
    )
    .unwrap();
    for bound in [f64::NAN, f64::INFINITY] {
      assert_eq!(clip(&m, Some(bound)), m);
    }
    let options: PostProcessOptions = serde_json::from_str(r#"{"clip": null}"#).unwrap();
    assert_eq!(apply(&m, &PostProcessOptions { clip: Some(f64::NAN), ..options }), m);
  }
}
