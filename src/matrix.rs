//! # Correlation Matrix
//!
//! $$
//! R=R^\top,\qquad R_{ii}=1,\qquad R_{ij}\in\mathbb R\cup\{\varnothing\}
//! $$
//!
//! Square correlation matrix with explicit missing cells (`None`).

use anyhow::bail;
use anyhow::Result;
use ndarray::Array2;
use ndarray::ArrayView2;

/// Symmetric `K x K` matrix labelled by its `K` columns.
///
/// The diagonal is always exactly `1.0`; every constructor and transform
/// restores it.
#[derive(Clone, Debug, PartialEq)]
pub struct CorrelationMatrix {
  columns: Vec<String>,
  values: Array2<Option<f64>>,
}

impl CorrelationMatrix {
  /// Validate shape and build the matrix. Non-finite cells become missing.
  pub fn new(columns: Vec<String>, values: Array2<Option<f64>>) -> Result<Self> {
    let (rows, cols) = values.dim();
    if rows != cols {
      bail!("correlation matrix must be square, got {rows}x{cols}");
    }
    if rows != columns.len() {
      bail!(
        "correlation matrix is {rows}x{rows} but {} columns were given",
        columns.len()
      );
    }
    Ok(Self::from_values(columns, values))
  }

  /// Build from raw `f64` cells where `NaN` marks missing.
  pub fn from_f64(columns: Vec<String>, values: &Array2<f64>) -> Result<Self> {
    Self::new(columns, values.mapv(Some))
  }

  pub(crate) fn from_values(columns: Vec<String>, mut values: Array2<Option<f64>>) -> Self {
    values.mapv_inplace(|v| v.filter(|x| x.is_finite()));
    values.diag_mut().fill(Some(1.0));
    Self { columns, values }
  }

  /// Constant fallback used when no estimate is viable.
  pub fn no_data(columns: &[String], offdiag: f64) -> Self {
    let k = columns.len();
    Self::from_values(
      columns.to_vec(),
      Array2::from_elem((k, k), Some(offdiag)),
    )
  }

  /// Matrix with every off-diagonal cell missing.
  pub fn missing(columns: &[String]) -> Self {
    let k = columns.len();
    Self::from_values(columns.to_vec(), Array2::from_elem((k, k), None))
  }

  pub fn columns(&self) -> &[String] {
    &self.columns
  }

  pub fn values(&self) -> ArrayView2<'_, Option<f64>> {
    self.values.view()
  }

  pub fn size(&self) -> usize {
    self.columns.len()
  }

  pub fn get(&self, i: usize, j: usize) -> Option<f64> {
    self.values.get((i, j)).copied().flatten()
  }

  /// Row-major rows, `None` for missing cells.
  pub fn rows(&self) -> Vec<Vec<Option<f64>>> {
    self.values.rows().into_iter().map(|r| r.to_vec()).collect()
  }

  /// Dense copy with `NaN` for missing cells.
  pub fn to_f64(&self) -> Array2<f64> {
    self.values.mapv(|v| v.unwrap_or(f64::NAN))
  }

  pub fn off_diagonal(&self) -> impl Iterator<Item = Option<f64>> + '_ {
    self
      .values
      .indexed_iter()
      .filter(|((i, j), _)| i != j)
      .map(|(_, v)| *v)
  }

  /// Every off-diagonal cell is missing.
  pub fn is_all_missing(&self) -> bool {
    self.off_diagonal().all(|v| v.is_none())
  }

  /// Mean of the present off-diagonal cells, `None` if there are none.
  pub fn off_diagonal_mean(&self) -> Option<f64> {
    let (sum, n) = self
      .off_diagonal()
      .flatten()
      .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
  }

  /// Apply `f` to each present off-diagonal cell, returning a new matrix.
  pub fn map_off_diagonal<F>(&self, f: F) -> Self
  where
    F: Fn(f64) -> f64,
  {
    let values = self.values.mapv(|v| v.map(&f));
    Self::from_values(self.columns.clone(), values)
  }

  /// Largest `|R_ij - R_ji|` over cells present on both sides.
  pub fn asymmetry(&self) -> f64 {
    let k = self.size();
    let mut worst: f64 = 0.0;
    for i in 0..k {
      for j in (i + 1)..k {
        if let (Some(a), Some(b)) = (self.get(i, j), self.get(j, i)) {
          worst = worst.max((a - b).abs());
        }
      }
    }
    worst
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::array;

  use super::*;

  fn cols(n: usize) -> Vec<String> {
    ["A", "B", "C", "D"][..n].iter().map(|s| s.to_string()).collect()
  }

  #[test]
  fn constructor_forces_unit_diagonal_and_drops_non_finite() {
    let m = CorrelationMatrix::from_f64(
      cols(2),
      &array![[f64::NAN, 0.3], [f64::INFINITY, 0.7]],
    )
    .unwrap();

    assert_eq!(m.get(0, 0), Some(1.0));
    assert_eq!(m.get(1, 1), Some(1.0));
    assert_eq!(m.get(0, 1), Some(0.3));
    assert_eq!(m.get(1, 0), None);
  }

  #[test]
  fn rejects_non_square_input() {
    let err = CorrelationMatrix::new(cols(2), Array2::from_elem((2, 3), Some(0.0))).unwrap_err();
    assert!(err.to_string().contains("square"));
    assert!(CorrelationMatrix::new(cols(3), Array2::from_elem((2, 2), None)).is_err());
  }

  #[test]
  fn no_data_matrix_is_constant_off_diagonal() {
    let m = CorrelationMatrix::no_data(&cols(3), 0.99);
    assert!(m.off_diagonal().all(|v| v == Some(0.99)));
    assert_eq!(m.get(2, 2), Some(1.0));
  }

  #[test]
  fn mean_skips_missing_cells() {
    let m = CorrelationMatrix::new(
      cols(3),
      array![
        [Some(1.0), Some(0.2), None],
        [Some(0.2), Some(1.0), Some(0.6)],
        [None, Some(0.6), Some(1.0)],
      ],
    )
    .unwrap();

    assert_abs_diff_eq!(m.off_diagonal_mean().unwrap(), 0.4, epsilon = 1e-12);
    assert!(!m.is_all_missing());
    assert_eq!(CorrelationMatrix::missing(&cols(3)).off_diagonal_mean(), None);
    assert!(CorrelationMatrix::missing(&cols(3)).is_all_missing());
  }
}
