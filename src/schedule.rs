//! # Fitting Schedule
//!
//! $$
//! b_0<b_1<\dots<b_{n-1},\qquad
//! [\text{fit}_i,\text{period}_i]=\big([b_{\max(0,i-r)}\text{ or }t_0,\;b_i],\;[b_i,b_{i+1}]\big)
//! $$
//!
//! Partitions a panel's date range into fit/period windows.

use std::fmt::Display;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::Deserialize;
use tracing::debug;
use tracing::warn;

use crate::error::CorrelationError;
use crate::error::Result;
use crate::frequency::IntervalFrequency;
use crate::panel::Panel;

/// How fit windows move through time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum DateMethod {
  /// One window covering the whole panel.
  #[default]
  InSample,
  /// Fit windows trail the period start by a fixed number of boundaries.
  Rolling,
  /// Fit windows always start at the first timestamp.
  Expanding,
}

impl FromStr for DateMethod {
  type Err = CorrelationError;

  fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
    match s {
      "in_sample" => Ok(Self::InSample),
      "rolling" => Ok(Self::Rolling),
      "expanding" => Ok(Self::Expanding),
      other => Err(CorrelationError::InvalidMethod(other.to_string())),
    }
  }
}

impl TryFrom<String> for DateMethod {
  type Error = CorrelationError;

  fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
    s.parse()
  }
}

impl Display for DateMethod {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      DateMethod::InSample => write!(f, "in_sample"),
      DateMethod::Rolling => write!(f, "rolling"),
      DateMethod::Expanding => write!(f, "expanding"),
    }
  }
}

/// Bounds of one scheduled estimation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FitWindow {
  pub fit_start: NaiveDateTime,
  pub fit_end: NaiveDateTime,
  pub period_start: NaiveDateTime,
  pub period_end: NaiveDateTime,
}

/// One schedule entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FitPeriod {
  /// A window with history to estimate from.
  Real(FitWindow),
  /// Leading entry of rolling/expanding schedules, before any viable history.
  NoData(FitWindow),
}

impl FitPeriod {
  pub fn window(&self) -> &FitWindow {
    match self {
      FitPeriod::Real(w) | FitPeriod::NoData(w) => w,
    }
  }

  pub fn is_no_data(&self) -> bool {
    matches!(self, FitPeriod::NoData(_))
  }

  pub fn fit_start(&self) -> NaiveDateTime {
    self.window().fit_start
  }

  pub fn fit_end(&self) -> NaiveDateTime {
    self.window().fit_end
  }

  pub fn period_start(&self) -> NaiveDateTime {
    self.window().period_start
  }

  pub fn period_end(&self) -> NaiveDateTime {
    self.window().period_end
  }
}

/// Ordered, immutable sequence of [`FitPeriod`]s.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FitSchedule {
  periods: Vec<FitPeriod>,
}

impl FitSchedule {
  fn in_sample(start: NaiveDateTime, end: NaiveDateTime) -> Self {
    Self {
      periods: vec![FitPeriod::Real(FitWindow {
        fit_start: start,
        fit_end: end,
        period_start: start,
        period_end: end,
      })],
    }
  }

  /// Build the schedule for `panel`'s date range.
  ///
  /// `rollyears` is a boundary-index lookback and only matters for
  /// [`DateMethod::Rolling`]. `interval_frequency` is ignored for
  /// [`DateMethod::InSample`].
  pub fn generate(
    panel: &Panel,
    method: DateMethod,
    rollyears: usize,
    interval_frequency: &str,
  ) -> Result<Self> {
    let (Some(start), Some(end)) = (panel.first_timestamp(), panel.last_timestamp()) else {
      return Err(CorrelationError::EmptyPanel);
    };

    if method == DateMethod::InSample {
      return Ok(Self::in_sample(start, end));
    }

    let interval: IntervalFrequency = interval_frequency.parse()?;
    let boundaries = boundaries(start, end, interval);

    if boundaries.len() < 2 {
      warn!(
        %method,
        interval_frequency,
        "history too short to subdivide; falling back to a single in-sample period"
      );
      return Ok(Self::in_sample(start, end));
    }

    let mut periods = Vec::with_capacity(boundaries.len() - 1);
    periods.push(FitPeriod::NoData(FitWindow {
      fit_start: start,
      fit_end: start,
      period_start: start,
      period_end: boundaries[1],
    }));

    for i in 1..boundaries.len() - 1 {
      let period_start = boundaries[i];
      let fit_start = match method {
        DateMethod::Rolling => boundaries[i.saturating_sub(rollyears)],
        DateMethod::Expanding | DateMethod::InSample => start,
      };
      periods.push(FitPeriod::Real(FitWindow {
        fit_start,
        fit_end: period_start,
        period_start,
        period_end: boundaries[i + 1],
      }));
    }

    debug!(%method, periods = periods.len(), "generated fitting schedule");
    Ok(Self { periods })
  }

  /// Rebuild a schedule from explicit entries, e.g. after deserialization.
  pub fn from_periods(periods: Vec<FitPeriod>) -> anyhow::Result<Self> {
    if let Some(w) = periods
      .windows(2)
      .find(|w| w[1].period_start() <= w[0].period_start())
    {
      anyhow::bail!(
        "period starts must be strictly increasing ({} is followed by {})",
        w[0].period_start(),
        w[1].period_start()
      );
    }
    if let Some(p) = periods
      .iter()
      .find(|p| p.fit_start() > p.fit_end() || p.period_start() > p.period_end())
    {
      anyhow::bail!("period {:?} has a start after its end", p.window());
    }
    Ok(Self { periods })
  }

  pub fn periods(&self) -> &[FitPeriod] {
    &self.periods
  }

  pub fn iter(&self) -> std::slice::Iter<'_, FitPeriod> {
    self.periods.iter()
  }

  pub fn len(&self) -> usize {
    self.periods.len()
  }

  pub fn is_empty(&self) -> bool {
    self.periods.is_empty()
  }

  pub fn period_starts(&self) -> Vec<NaiveDateTime> {
    self.periods.iter().map(FitPeriod::period_start).collect()
  }

  /// Index of the most recent period starting at or before `date`.
  pub fn index_before(&self, date: NaiveDateTime) -> Result<usize> {
    let first = match self.periods.first() {
      Some(p) => p.period_start(),
      None => return Err(CorrelationError::EmptyPanel),
    };
    if date < first {
      return Err(CorrelationError::OutOfRangeDate { date, first });
    }
    Ok(self.periods.partition_point(|p| p.period_start() <= date) - 1)
  }
}

impl<'a> IntoIterator for &'a FitSchedule {
  type Item = &'a FitPeriod;
  type IntoIter = std::slice::Iter<'a, FitPeriod>;

  fn into_iter(self) -> Self::IntoIter {
    self.periods.iter()
  }
}

/// Boundaries stepped backwards from the interval's anchor at or before `end`
/// while still `>= start`, ascending.
fn boundaries(
  start: NaiveDateTime,
  end: NaiveDateTime,
  interval: IntervalFrequency,
) -> Vec<NaiveDateTime> {
  let mut out = Vec::new();
  let mut next = interval.anchor(end);
  while let Some(b) = next.filter(|b| *b >= start) {
    out.push(b);
    next = interval.step_back(b).filter(|prev| *prev < b);
  }
  out.reverse();
  out
}

/// Parse `date_method` and build the schedule in one step.
pub fn generate_fitting_dates(
  panel: &Panel,
  date_method: &str,
  rollyears: usize,
  interval_frequency: &str,
) -> Result<FitSchedule> {
  let method: DateMethod = date_method.parse()?;
  FitSchedule::generate(panel, method, rollyears, interval_frequency)
}
