use crate::dates::{add_days, local_date_of};
use crate::models::{Activity, DailyStat, Period, RangeStat, WeeklyReport};
use chrono::{NaiveDate, TimeZone};
use std::collections::BTreeMap;

/// Totals for the records whose local start date equals `date`.
pub fn aggregate_day<Tz: TimeZone>(records: &[Activity], date: NaiveDate, tz: &Tz) -> DailyStat {
    let mut stat = DailyStat::empty(date);
    for record in records {
        if local_date_of(&record.started_at, tz) == date {
            stat.add(record.kind, record.amount);
        }
    }
    stat
}

pub fn partition_by_day<'a, Tz: TimeZone>(
    records: &'a [Activity],
    tz: &Tz,
) -> BTreeMap<NaiveDate, Vec<&'a Activity>> {
    let mut days: BTreeMap<NaiveDate, Vec<&'a Activity>> = BTreeMap::new();
    for record in records {
        days.entry(local_date_of(&record.started_at, tz))
            .or_default()
            .push(record);
    }
    days
}

fn reduce_day(date: NaiveDate, records: Option<&Vec<&Activity>>) -> DailyStat {
    let mut stat = DailyStat::empty(date);
    for record in records.into_iter().flatten() {
        stat.add(record.kind, record.amount);
    }
    stat
}

/// First and last day (both inclusive) of the window ending on `today`.
pub fn window(period: Period, today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let span = i64::from(period.days());
    (add_days(today, -(span - 1)), today)
}

/// Zero-filled consecutive days from `first` to `last`, oldest first.
pub fn daily_series<Tz: TimeZone>(
    records: &[Activity],
    first: NaiveDate,
    last: NaiveDate,
    tz: &Tz,
) -> Vec<DailyStat> {
    let partitions = partition_by_day(records, tz);
    first
        .iter_days()
        .take_while(|day| *day <= last)
        .map(|day| reduce_day(day, partitions.get(&day)))
        .collect()
}

pub fn build_range_at<Tz: TimeZone>(
    today: NaiveDate,
    tz: &Tz,
    period: Period,
    pet_id: Option<i64>,
    records: &[Activity],
) -> RangeStat {
    let (start, end) = window(period, today);
    RangeStat {
        period,
        pet_id,
        start,
        end,
        days: daily_series(records, start, end, tz),
        streak_days: streak_days(records, today, tz),
    }
}

/// Consecutive days ending at `today` that have any activity at all.
pub fn streak_days<Tz: TimeZone>(records: &[Activity], today: NaiveDate, tz: &Tz) -> u32 {
    let active = partition_by_day(records, tz);
    let mut streak = 0;
    let mut day = today;
    while active.contains_key(&day) {
        streak += 1;
        day = add_days(day, -1);
    }
    streak
}

/// Seven days from `start`, compared against the seven days before it.
pub fn weekly_report<Tz: TimeZone>(records: &[Activity], start: NaiveDate, tz: &Tz) -> WeeklyReport {
    let end = add_days(start, 6);
    let days = daily_series(records, start, end, tz);
    let previous = daily_series(records, add_days(start, -7), add_days(start, -1), tz);

    let current_total: f64 = days.iter().map(DailyStat::active_minutes).sum();
    let previous_total: f64 = previous.iter().map(DailyStat::active_minutes).sum();
    let change_vs_last_week = if previous_total > 0.0 {
        Some((current_total - previous_total) / previous_total)
    } else {
        None
    };

    WeeklyReport {
        start,
        end,
        days,
        change_vs_last_week,
    }
}
