//! Calendar helpers. Everything is generic over `TimeZone` so callers pick
//! `chrono::Local` in production and a fixed offset in tests.

use crate::models::ValidationError;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};

const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn add_days(date: NaiveDate, days: i64) -> NaiveDate {
    date + Duration::days(days)
}

/// The first instant of `date` in `tz`. A midnight swallowed by a DST jump
/// resolves to the first valid local time after it.
pub fn local_midnight<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> DateTime<Tz> {
    let naive = date.and_time(NaiveTime::MIN);
    if let Some(at) = tz.from_local_datetime(&naive).earliest() {
        return at;
    }

    let mut candidate = naive;
    for _ in 0..96 {
        candidate += Duration::minutes(15);
        if let Some(at) = tz.from_local_datetime(&candidate).earliest() {
            return at;
        }
    }
    tz.from_utc_datetime(&naive)
}

pub fn start_of_day<Tz: TimeZone>(instant: &DateTime<Tz>) -> DateTime<Tz> {
    local_midnight(instant.date_naive(), &instant.timezone())
}

/// Most recent Sunday on or before `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    add_days(date, -i64::from(date.weekday().num_days_from_sunday()))
}

pub fn start_of_week<Tz: TimeZone>(instant: &DateTime<Tz>) -> DateTime<Tz> {
    local_midnight(week_start(instant.date_naive()), &instant.timezone())
}

/// UTC instants `[local midnight of date, local midnight of the next day)`.
pub fn local_day_bounds_utc<Tz: TimeZone>(
    date: NaiveDate,
    tz: &Tz,
) -> (DateTime<Utc>, DateTime<Utc>) {
    local_range_bounds_utc(date, date, tz)
}

/// UTC instants covering the local days `first..=last`.
pub fn local_range_bounds_utc<Tz: TimeZone>(
    first: NaiveDate,
    last: NaiveDate,
    tz: &Tz,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = local_midnight(first, tz).with_timezone(&Utc);
    let end = local_midnight(add_days(last, 1), tz).with_timezone(&Utc);
    (start, end)
}

pub fn local_date_of<Tz: TimeZone>(instant: &DateTime<Utc>, tz: &Tz) -> NaiveDate {
    instant.with_timezone(tz).date_naive()
}

pub fn today_in<Tz: TimeZone>(tz: &Tz) -> NaiveDate {
    local_date_of(&Utc::now(), tz)
}

pub fn parse_date(value: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|_| ValidationError::InvalidDate(value.to_string()))
}
