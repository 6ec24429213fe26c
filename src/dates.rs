//! Date normalization: integer-encoded review dates to calendar dates.

use chrono::{DateTime, Datelike, NaiveDate, TimeDelta};
use tracing::debug;

use crate::config::DateEncoding;
use crate::constants::dates::MAX_YYYYMMDD;
use crate::data::{RawReviewBatch, ReviewBatch, ReviewDate};
use crate::errors::CleanError;
use crate::metrics::RunTally;

/// Map an integer `value` under `encoding` to a calendar date.
///
/// Fails with `InvalidDateEncoding` when the value names no calendar date
/// (month 13, day 32, negative `YYYYMMDD`, or a magnitude chrono cannot hold).
pub fn normalize_date(value: i64, encoding: DateEncoding) -> Result<NaiveDate, CleanError> {
    let date = match encoding {
        DateEncoding::DaysSinceEpoch => {
            let epoch = NaiveDate::from_ymd_opt(1970, 1, 1);
            TimeDelta::try_days(value)
                .and_then(|delta| epoch.and_then(|epoch| epoch.checked_add_signed(delta)))
        }
        DateEncoding::YyyyMmDd => parse_yyyymmdd(value),
        DateEncoding::UnixSeconds => {
            DateTime::from_timestamp(value, 0).map(|timestamp| timestamp.date_naive())
        }
    };
    date.ok_or(CleanError::InvalidDateEncoding { value, encoding })
}

/// Split a calendar date into `(year, month)`.
pub fn decompose(date: NaiveDate) -> (i32, u32) {
    (date.year(), date.month())
}

/// Parse decimal `YYYYMMDD` with bounds checks on each part.
fn parse_yyyymmdd(value: i64) -> Option<NaiveDate> {
    if !(0..=MAX_YYYYMMDD).contains(&value) {
        return None;
    }
    let year = i32::try_from(value / 10_000).ok()?;
    let month = u32::try_from((value / 100) % 100).ok()?;
    let day = u32::try_from(value % 100).ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Replace integer dates with calendar dates, excluding rows that fail.
///
/// Null and undecodable dates are excluded and counted in
/// `tally.excluded_invalid_date`; no row is kept with a default date.
pub fn normalize_dates(
    raw: RawReviewBatch,
    encoding: DateEncoding,
    tally: &mut RunTally,
) -> ReviewBatch {
    let encoding = raw.date_encoding.unwrap_or(encoding);
    let mut keep = Vec::with_capacity(raw.len());
    let mut dates = Vec::with_capacity(raw.len());
    for value in &raw.review_date {
        let Some(value) = value else {
            keep.push(false);
            continue;
        };
        match normalize_date(*value, encoding) {
            Ok(date) => {
                keep.push(true);
                dates.push(ReviewDate::new(date));
            }
            Err(err) => {
                debug!(source = %raw.source, "excluding record: {err}");
                keep.push(false);
            }
        }
    }

    let excluded = keep.iter().filter(|kept| !**kept).count() as u64;
    tally.excluded_invalid_date += excluded;

    let mut columns = raw.columns;
    columns.retain_rows(&keep);
    ReviewBatch {
        source: raw.source,
        review_date: dates,
        columns,
    }
}
