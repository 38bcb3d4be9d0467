//! # Frequency
//!
//! $$
//! \ell(t)=o+\Delta\left\lfloor\frac{t-o}{\Delta}\right\rfloor
//! $$
//!
//! Parsing of resampling frequencies and schedule spacing intervals.

use std::str::FromStr;

use chrono::Datelike;
use chrono::Duration;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use chrono::Weekday;

use crate::error::CorrelationError;

/// Split `"12M"` into `(12, "M")`; a missing count is 1 and must be positive.
fn split_count(s: &str) -> Option<(i64, &str)> {
  let s = s.trim();
  let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
  let (count, unit) = s.split_at(split);
  let n: i64 = if count.is_empty() {
    1
  } else {
    count.parse().ok()?
  };
  (n > 0).then_some((n, unit))
}

/// Parse a literal span such as `7D`, `36H`, `15min`, `2W` or `D`.
pub(crate) fn parse_fixed_span(s: &str) -> Option<Duration> {
  let (n, unit) = split_count(s)?;
  let span = match unit {
    "D" | "d" => Duration::days(n),
    "W" | "w" => Duration::days(7 * n),
    "H" | "h" => Duration::hours(n),
    "T" | "min" => Duration::minutes(n),
    "S" | "s" => Duration::seconds(n),
    _ => return None,
  };
  Some(span)
}

/// Spacing between consecutive fitting-schedule boundaries.
///
/// Symbolic names resolve to calendar-day spans: `W` is 7 days, `M` is 30
/// days, `12M` and `Y` are 365 days. Other strings are literal spacings,
/// either a fixed span (`7D`, `36H`) or a calendar offset landing on period
/// ends (`6M`, `ME`, `Q`, `2Y`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntervalFrequency {
  Span(Duration),
  /// Every `n` month ends.
  MonthEnd(u32),
  /// Every `n` quarter ends (March, June, September, December).
  QuarterEnd(u32),
  /// Every `n` December 31sts.
  YearEnd(u32),
}

fn month_index(date: NaiveDate) -> i64 {
  date.year() as i64 * 12 + date.month0() as i64
}

fn month_end_at(index: i64) -> Option<NaiveDate> {
  let year = i32::try_from(index.div_euclid(12)).ok()?;
  let month = index.rem_euclid(12) as u32 + 1;
  let (ny, nm) = if month == 12 {
    (year.checked_add(1)?, 1)
  } else {
    (year, month + 1)
  };
  NaiveDate::from_ymd_opt(ny, nm, 1)?.pred_opt()
}

impl IntervalFrequency {
  /// `(stride, alignment)` in months for calendar offsets.
  fn calendar(&self) -> Option<(i64, i64)> {
    match *self {
      Self::Span(_) => None,
      Self::MonthEnd(n) => Some((n as i64, 1)),
      Self::QuarterEnd(n) => Some((3 * n as i64, 3)),
      Self::YearEnd(n) => Some((12 * n as i64, 12)),
    }
  }

  /// Latest boundary at or before `end`: `end` itself for fixed spans,
  /// otherwise the last aligned period end, at `end`'s time of day.
  pub fn anchor(&self, end: NaiveDateTime) -> Option<NaiveDateTime> {
    let Some((_, align)) = self.calendar() else {
      return Some(end);
    };
    let date = end.date();
    let mut index = month_index(date);
    if month_end_at(index)? > date {
      index -= 1;
    }
    index -= (index.rem_euclid(12) + 1) % align;
    Some(month_end_at(index)?.and_time(end.time()))
  }

  /// Boundary one step before `boundary`, or `None` past the calendar range.
  pub fn step_back(&self, boundary: NaiveDateTime) -> Option<NaiveDateTime> {
    if let Self::Span(span) = *self {
      return boundary.checked_sub_signed(span);
    }
    let (stride, _) = self.calendar()?;
    let index = month_index(boundary.date()) - stride;
    Some(month_end_at(index)?.and_time(boundary.time()))
  }
}

fn parse_calendar_offset(s: &str) -> Option<IntervalFrequency> {
  let (n, unit) = split_count(s)?;
  let n = u32::try_from(n).ok()?;
  match unit {
    "M" | "ME" => Some(IntervalFrequency::MonthEnd(n)),
    "Q" | "QE" => Some(IntervalFrequency::QuarterEnd(n)),
    "Y" | "YE" | "A" => Some(IntervalFrequency::YearEnd(n)),
    _ => None,
  }
}

impl FromStr for IntervalFrequency {
  type Err = CorrelationError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let parsed = match s.trim() {
      "W" => Some(Self::Span(Duration::days(7))),
      "M" => Some(Self::Span(Duration::days(30))),
      "12M" | "Y" => Some(Self::Span(Duration::days(365))),
      other => parse_calendar_offset(other).or_else(|| parse_fixed_span(other).map(Self::Span)),
    };
    parsed.ok_or_else(|| CorrelationError::InvalidFrequency(s.to_string()))
  }
}

/// Bucketing rule used when resampling a panel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResampleFrequency {
  /// Fixed-width buckets anchored at midnight of the first observation.
  Fixed(Duration),
  /// Business days; weekend observations fall into the preceding Friday.
  BusinessDay,
  /// Weeks ending on Sunday, labelled by that Sunday.
  WeekEnd,
  /// Calendar months, labelled by their last day.
  MonthEnd,
  /// Calendar years, labelled by December 31.
  YearEnd,
}

impl Default for ResampleFrequency {
  fn default() -> Self {
    Self::Fixed(Duration::days(1))
  }
}

impl FromStr for ResampleFrequency {
  type Err = CorrelationError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim() {
      "B" => Ok(Self::BusinessDay),
      "W" | "W-SUN" => Ok(Self::WeekEnd),
      "M" | "ME" => Ok(Self::MonthEnd),
      "Y" | "YE" | "A" => Ok(Self::YearEnd),
      other => parse_fixed_span(other)
        .map(Self::Fixed)
        .ok_or_else(|| CorrelationError::InvalidFrequency(s.to_string())),
    }
  }
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
  date.and_time(chrono::NaiveTime::MIN)
}

fn month_end(year: i32, month: u32) -> NaiveDate {
  let (ny, nm) = if month == 12 {
    (year + 1, 1)
  } else {
    (year, month + 1)
  };
  NaiveDate::from_ymd_opt(ny, nm, 1)
    .and_then(|d| d.pred_opt())
    .unwrap_or(NaiveDate::MAX)
}

fn year_end(year: i32) -> NaiveDate {
  NaiveDate::from_ymd_opt(year, 12, 31).unwrap_or(NaiveDate::MAX)
}

impl ResampleFrequency {
  /// Label of the bucket containing `ts`; `origin` anchors fixed-width buckets.
  pub fn bucket_label(&self, ts: NaiveDateTime, origin: NaiveDateTime) -> NaiveDateTime {
    match *self {
      Self::Fixed(step) => {
        let anchor = midnight(origin.date());
        let step_ms = step.num_milliseconds().max(1);
        let elapsed = (ts - anchor).num_milliseconds();
        anchor + Duration::milliseconds(elapsed.div_euclid(step_ms) * step_ms)
      }
      Self::BusinessDay => {
        let date = ts.date();
        let back = match date.weekday() {
          Weekday::Sat => 1,
          Weekday::Sun => 2,
          _ => 0,
        };
        midnight(date - Duration::days(back))
      }
      Self::WeekEnd => {
        let date = ts.date();
        let ahead = (7 - date.weekday().num_days_from_sunday()) % 7;
        midnight(date + Duration::days(ahead as i64))
      }
      Self::MonthEnd => midnight(month_end(ts.year(), ts.month())),
      Self::YearEnd => midnight(year_end(ts.year())),
    }
  }

  /// Label of the bucket following `label`.
  pub fn next_label(&self, label: NaiveDateTime) -> NaiveDateTime {
    match *self {
      Self::Fixed(step) => label + step,
      Self::BusinessDay => {
        let skip = match label.date().weekday() {
          Weekday::Fri => 3,
          Weekday::Sat => 2,
          _ => 1,
        };
        label + Duration::days(skip)
      }
      Self::WeekEnd => label + Duration::days(7),
      Self::MonthEnd => {
        let next = label.date() + Duration::days(1);
        midnight(month_end(next.year(), next.month()))
      }
      Self::YearEnd => midnight(year_end(label.year() + 1)),
    }
  }

  /// Every bucket label from the bucket of `first` to the bucket of `last`.
  pub fn labels_between(&self, first: NaiveDateTime, last: NaiveDateTime) -> Vec<NaiveDateTime> {
    let end = self.bucket_label(last, first);
    let mut label = self.bucket_label(first, first);
    let mut out = Vec::new();
    while label <= end {
      out.push(label);
      label = self.next_label(label);
    }
    out
  }
}
