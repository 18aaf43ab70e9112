//! Absolute start/end derivation for report time ranges.

use chrono::{
    DateTime, Duration, FixedOffset, Months, NaiveDate, NaiveTime, SecondsFormat, TimeZone, Utc,
};
use shared::report::TimeRange;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DateRangeError {
    #[error("custom range starts on {start}, after its end {end}")]
    InvertedCustomRange { start: NaiveDate, end: NaiveDate },
    #[error("a custom range needs both a start and an end date")]
    MissingCustomStart,
    #[error("date arithmetic overflowed")]
    OutOfRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RangeBound {
    /// A computed instant, sent as RFC 3339 UTC with milliseconds.
    Instant(DateTime<FixedOffset>),
    /// A user-entered day, sent verbatim.
    Day(NaiveDate),
}

impl RangeBound {
    pub fn query_value(&self) -> String {
        match self {
            RangeBound::Instant(at) => at
                .with_timezone(&Utc)
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            RangeBound::Day(day) => day.format("%Y-%m-%d").to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    /// `None` only for an incomplete custom range.
    pub start: Option<RangeBound>,
    pub end: RangeBound,
}

/// Derives the absolute range for `range` as seen at `now`.
///
/// Relative ranges end at `now`. Month-based ranges use calendar months, so
/// 31 March minus one month is the last day of February. A custom range is
/// used as entered when both days are present; otherwise the range ends at
/// `now` and has no start. An inverted custom range is rejected, never
/// swapped.
///
/// Every relative start is strictly before `now` except `Today` evaluated at
/// exactly local midnight, where start and end are the same instant.
pub fn derive_date_range<Tz: TimeZone>(
    now: &DateTime<Tz>,
    range: &TimeRange,
) -> Result<DateRange, DateRangeError> {
    let end = RangeBound::Instant(now.fixed_offset());
    let months_back = |months: u32| {
        now.clone()
            .checked_sub_months(Months::new(months))
            .ok_or(DateRangeError::OutOfRange)
    };

    let start = match range {
        TimeRange::Today => start_of_day(now),
        TimeRange::Week => now
            .clone()
            .checked_sub_signed(Duration::days(7))
            .ok_or(DateRangeError::OutOfRange)?,
        TimeRange::Month => months_back(1)?,
        TimeRange::ThreeMonths => months_back(3)?,
        TimeRange::SixMonths => months_back(6)?,
        TimeRange::Year => months_back(12)?,
        TimeRange::Custom {
            start: Some(start),
            end: Some(custom_end),
        } => {
            if start > custom_end {
                return Err(DateRangeError::InvertedCustomRange {
                    start: *start,
                    end: *custom_end,
                });
            }
            return Ok(DateRange {
                start: Some(RangeBound::Day(*start)),
                end: RangeBound::Day(*custom_end),
            });
        }
        TimeRange::Custom { .. } => return Ok(DateRange { start: None, end }),
    };

    Ok(DateRange {
        start: Some(RangeBound::Instant(start.fixed_offset())),
        end,
    })
}

fn start_of_day<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Tz> {
    let midnight = now.date_naive().and_time(NaiveTime::MIN);
    now.timezone()
        .from_local_datetime(&midnight)
        .earliest()
        // Midnight skipped by a DST jump; step back by the local wall-clock time instead.
        .unwrap_or_else(|| now.clone() - (now.time() - NaiveTime::MIN))
}
