//! # Assemble
//!
//! $$
//! \mathcal L=\big(\text{columns},\;[(p_1,R_1),\dots,(p_n,R_n)]\big)
//! $$
//!
//! Pairs schedule entries with their matrices and renders the dict and long
//! views of the result.

use std::str::FromStr;

use anyhow::Context;
use chrono::DateTime;
use chrono::NaiveDateTime;
use chrono::SecondsFormat;
use ndarray::Array2;
use serde::Deserialize;
use serde::Serialize;

use crate::error::CorrelationError;
use crate::error::Result;
use crate::matrix::CorrelationMatrix;
use crate::schedule::FitPeriod;
use crate::schedule::FitSchedule;
use crate::schedule::FitWindow;

/// Format a naive timestamp as ISO-8601, treating it as UTC.
pub fn to_iso(ts: NaiveDateTime) -> String {
  ts.and_utc().to_rfc3339_opts(SecondsFormat::AutoSi, false)
}

fn from_iso(s: &str) -> anyhow::Result<NaiveDateTime> {
  let parsed = DateTime::parse_from_rfc3339(s).with_context(|| format!("invalid timestamp {s:?}"))?;
  Ok(parsed.naive_utc())
}

/// Correlation matrices over time, one per schedule entry.
#[derive(Clone, Debug, PartialEq)]
pub struct CorrelationList {
  column_names: Vec<String>,
  schedule: FitSchedule,
  matrices: Vec<CorrelationMatrix>,
}

impl CorrelationList {
  /// Zip `schedule` with `matrices`; both must have the same length.
  pub fn assemble(
    column_names: Vec<String>,
    schedule: FitSchedule,
    matrices: Vec<CorrelationMatrix>,
  ) -> Result<Self> {
    if schedule.len() != matrices.len() {
      return Err(CorrelationError::LengthMismatch {
        left: schedule.len(),
        right: matrices.len(),
      });
    }
    Ok(Self {
      column_names,
      schedule,
      matrices,
    })
  }

  pub fn column_names(&self) -> &[String] {
    &self.column_names
  }

  pub fn schedule(&self) -> &FitSchedule {
    &self.schedule
  }

  pub fn matrices(&self) -> &[CorrelationMatrix] {
    &self.matrices
  }

  pub fn len(&self) -> usize {
    self.matrices.len()
  }

  pub fn is_empty(&self) -> bool {
    self.matrices.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&FitPeriod, &CorrelationMatrix)> {
    self.schedule.iter().zip(self.matrices.iter())
  }

  /// Matrix in force at `date`.
  pub fn matrix_at(&self, date: NaiveDateTime) -> Result<&CorrelationMatrix> {
    let idx = self.schedule.index_before(date)?;
    Ok(&self.matrices[idx])
  }

  pub fn to_jsonable(&self) -> SerializedCorrelationList {
    let periods = self
      .iter()
      .map(|(period, corr)| SerializedPeriod {
        fit_start: to_iso(period.fit_start()),
        fit_end: to_iso(period.fit_end()),
        period_start: to_iso(period.period_start()),
        period_end: to_iso(period.period_end()),
        no_data: period.is_no_data(),
        correlation: SerializedMatrix {
          columns: corr.columns().to_vec(),
          values: corr.rows(),
        },
      })
      .collect();

    SerializedCorrelationList {
      columns: self.column_names.clone(),
      periods,
    }
  }

  pub fn to_long(&self) -> Vec<LongRow> {
    self.to_jsonable().to_long()
  }

  pub fn view(&self, form: OutputForm) -> CorrelationView<'_> {
    match form {
      OutputForm::Original => CorrelationView::Original(self),
      OutputForm::Jsonable => CorrelationView::Jsonable(self.to_jsonable()),
      OutputForm::Long => CorrelationView::Long(self.to_long()),
    }
  }

  /// [`CorrelationList::view`] keyed by name.
  pub fn as_form(&self, form: &str) -> Result<CorrelationView<'_>> {
    Ok(self.view(form.parse()?))
  }
}

/// Names of the available output views.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputForm {
  Original,
  Jsonable,
  Long,
}

impl FromStr for OutputForm {
  type Err = CorrelationError;

  fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
    match s {
      "original" => Ok(Self::Original),
      "jsonable" | "dict" => Ok(Self::Jsonable),
      "long" => Ok(Self::Long),
      other => Err(CorrelationError::UnknownOutputForm(other.to_string())),
    }
  }
}

#[derive(Clone, Debug, PartialEq)]
pub enum CorrelationView<'a> {
  Original(&'a CorrelationList),
  Jsonable(SerializedCorrelationList),
  Long(Vec<LongRow>),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SerializedMatrix {
  pub columns: Vec<String>,
  /// Row-major, `null` for missing cells.
  pub values: Vec<Vec<Option<f64>>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SerializedPeriod {
  pub fit_start: String,
  pub fit_end: String,
  pub period_start: String,
  pub period_end: String,
  pub no_data: bool,
  pub correlation: SerializedMatrix,
}

/// External boundary format of a [`CorrelationList`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SerializedCorrelationList {
  pub columns: Vec<String>,
  pub periods: Vec<SerializedPeriod>,
}

/// One instrument pair in one period.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LongRow {
  /// The period's `fit_end`.
  pub date: String,
  /// `"A__B"` with `A` before `B` in column order.
  pub pair: String,
  pub value: Option<f64>,
  pub fit_start: String,
  pub fit_end: String,
  pub period_start: String,
  pub period_end: String,
  pub no_data: bool,
}

impl SerializedCorrelationList {
  /// Tidy rows, each unordered pair once per period, diagonal excluded.
  pub fn to_long(&self) -> Vec<LongRow> {
    let mut rows = Vec::new();
    for period in &self.periods {
      let columns = &period.correlation.columns;
      let values = &period.correlation.values;
      for i in 0..columns.len() {
        for j in (i + 1)..columns.len() {
          let value = values.get(i).and_then(|r| r.get(j)).copied().flatten();
          rows.push(LongRow {
            date: period.fit_end.clone(),
            pair: format!("{}__{}", columns[i], columns[j]),
            value,
            fit_start: period.fit_start.clone(),
            fit_end: period.fit_end.clone(),
            period_start: period.period_start.clone(),
            period_end: period.period_end.clone(),
            no_data: period.no_data,
          });
        }
      }
    }
    rows
  }

  pub fn to_json(&self) -> serde_json::Result<String> {
    serde_json::to_string(self)
  }

  pub fn from_json(s: &str) -> serde_json::Result<Self> {
    serde_json::from_str(s)
  }

  /// Parse back into a typed [`CorrelationList`].
  pub fn to_list(&self) -> anyhow::Result<CorrelationList> {
    let mut periods = Vec::with_capacity(self.periods.len());
    let mut matrices = Vec::with_capacity(self.periods.len());
    for p in &self.periods {
      let window = FitWindow {
        fit_start: from_iso(&p.fit_start)?,
        fit_end: from_iso(&p.fit_end)?,
        period_start: from_iso(&p.period_start)?,
        period_end: from_iso(&p.period_end)?,
      };
      periods.push(if p.no_data {
        FitPeriod::NoData(window)
      } else {
        FitPeriod::Real(window)
      });

      let k = p.correlation.columns.len();
      if p.correlation.values.len() != k || p.correlation.values.iter().any(|r| r.len() != k) {
        anyhow::bail!("correlation values for period {} are not {k}x{k}", p.period_start);
      }
      let flat: Vec<Option<f64>> = p.correlation.values.iter().flatten().copied().collect();
      let values = Array2::from_shape_vec((k, k), flat)?;
      matrices.push(CorrelationMatrix::new(p.correlation.columns.clone(), values)?);
    }

    let schedule = FitSchedule::from_periods(periods)?;
    Ok(CorrelationList::assemble(
      self.columns.clone(),
      schedule,
      matrices,
    )?)
  }
}
