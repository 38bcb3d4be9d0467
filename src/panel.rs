//! # Panel
//!
//! $$
//! X\in\mathbb R^{T\times K},\quad t_1<t_2<\dots<t_T
//! $$
//!
//! Time-indexed table of observations, one column per instrument. Missing
//! observations are stored as `f64::NAN`.

use std::collections::HashSet;
use std::ops::Range;

use anyhow::bail;
use anyhow::Result;
use chrono::NaiveDateTime;
use ndarray::Array2;
use ndarray::ArrayView1;
use ndarray::ArrayView2;
use ndarray::Axis;

/// Observations indexed by strictly increasing timestamps.
#[derive(Clone, Debug, PartialEq)]
pub struct Panel {
  index: Vec<NaiveDateTime>,
  columns: Vec<String>,
  values: Array2<f64>,
}

impl Panel {
  /// Build a panel, rejecting unordered timestamps, duplicate columns and
  /// shape mismatches. `values` is `T x K` with `NaN` for missing cells.
  pub fn new(
    index: Vec<NaiveDateTime>,
    columns: Vec<String>,
    values: Array2<f64>,
  ) -> Result<Self> {
    if values.nrows() != index.len() {
      bail!(
        "values has {} rows but the index has {} timestamps",
        values.nrows(),
        index.len()
      );
    }
    if values.ncols() != columns.len() {
      bail!(
        "values has {} columns but {} column names were given",
        values.ncols(),
        columns.len()
      );
    }
    if let Some(w) = index.windows(2).find(|w| w[1] <= w[0]) {
      bail!("index must be strictly increasing ({} is followed by {})", w[0], w[1]);
    }
    let mut seen = HashSet::with_capacity(columns.len());
    for c in &columns {
      if !seen.insert(c.as_str()) {
        bail!("duplicate column name {c:?}");
      }
    }

    Ok(Self {
      index,
      columns,
      values,
    })
  }

  /// Build a panel from per-instrument series sharing one index.
  pub fn from_columns(index: Vec<NaiveDateTime>, series: Vec<(String, Vec<f64>)>) -> Result<Self> {
    let t = index.len();
    let k = series.len();
    let mut values = Array2::<f64>::from_elem((t, k), f64::NAN);
    let mut columns = Vec::with_capacity(k);
    for (j, (name, data)) in series.into_iter().enumerate() {
      if data.len() != t {
        bail!("series {name:?} has {} values, expected {t}", data.len());
      }
      for (i, v) in data.into_iter().enumerate() {
        values[[i, j]] = v;
      }
      columns.push(name);
    }
    Self::new(index, columns, values)
  }

  pub(crate) fn from_parts_unchecked(
    index: Vec<NaiveDateTime>,
    columns: Vec<String>,
    values: Array2<f64>,
  ) -> Self {
    Self {
      index,
      columns,
      values,
    }
  }

  pub fn index(&self) -> &[NaiveDateTime] {
    &self.index
  }

  pub fn columns(&self) -> &[String] {
    &self.columns
  }

  pub fn values(&self) -> ArrayView2<'_, f64> {
    self.values.view()
  }

  pub fn column(&self, j: usize) -> ArrayView1<'_, f64> {
    self.values.column(j)
  }

  pub fn nrows(&self) -> usize {
    self.index.len()
  }

  pub fn ncols(&self) -> usize {
    self.columns.len()
  }

  pub fn is_empty(&self) -> bool {
    self.index.is_empty()
  }

  pub fn first_timestamp(&self) -> Option<NaiveDateTime> {
    self.index.first().copied()
  }

  pub fn last_timestamp(&self) -> Option<NaiveDateTime> {
    self.index.last().copied()
  }

  /// Row range covering `start..=end`.
  pub fn rows_between(&self, start: NaiveDateTime, end: NaiveDateTime) -> Range<usize> {
    let lo = self.index.partition_point(|t| *t < start);
    let hi = self.index.partition_point(|t| *t <= end);
    lo..hi.max(lo)
  }

  /// Number of rows strictly before `date`.
  pub fn rows_before(&self, date: NaiveDateTime) -> usize {
    self.index.partition_point(|t| *t < date)
  }

  /// Sub-panel restricted to `start..=end`.
  pub fn slice(&self, start: NaiveDateTime, end: NaiveDateTime) -> Panel {
    let rows = self.rows_between(start, end);
    let values = self
      .values
      .slice_axis(Axis(0), ndarray::Slice::from(rows.clone()))
      .to_owned();
    Panel::from_parts_unchecked(self.index[rows].to_vec(), self.columns.clone(), values)
  }
}
