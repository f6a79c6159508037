use super::session_token;
use crate::backend::{ActivityQuery, Backend, BackendResult, Order};
use crate::dates::{add_days, local_day_bounds_utc, local_range_bounds_utc, today_in};
use crate::models::{DailyStat, Period, RangeStat, TodayResponse, WeeklyReport};
use crate::state::{AppState, RANGE_KEY, WEEKLY_KEY, daily_key};
use crate::stats::{aggregate_day, build_range_at, streak_days, weekly_report, window};
use chrono::{Local, NaiveDate};
use tracing::{debug, error};

/// Recomputes one day's totals. On failure the cached value (or an empty
/// day) is returned and nothing is overwritten.
pub async fn load_daily<B: Backend>(state: &AppState<B>, date: NaiveDate) -> DailyStat {
    let ticket = state.client.lock().await.sequencer.issue(daily_key(date));
    let (start, end) = local_day_bounds_utc(date, &Local);
    let query = ActivityQuery::new().gte(start).lt(end).order(Order::Ascending);

    let fetched = match session_token(state).await {
        Ok(token) => state.backend.select_activities(&token, &query).await,
        Err(err) => Err(err),
    };

    let mut client = state.client.lock().await;
    match fetched {
        Ok(records) => {
            let stat = aggregate_day(&records, date, &Local);
            if !client.apply_daily(&ticket, stat) {
                debug!(%date, "discarding superseded daily result");
            }
        }
        Err(err) => error!(%date, "failed to load daily stats: {err}"),
    }
    client
        .daily
        .get(&date)
        .cloned()
        .unwrap_or_else(|| DailyStat::empty(date))
}

/// Fetches the whole window once and partitions it by local day. When the
/// fetch fails the previous range is kept and returned as is.
pub async fn load_range<B: Backend>(
    state: &AppState<B>,
    period: Period,
    pet_id: Option<i64>,
) -> Option<RangeStat> {
    let ticket = {
        let mut client = state.client.lock().await;
        client.last_period = period;
        client.last_range_pet = pet_id;
        client.sequencer.issue(RANGE_KEY)
    };

    let fetched = match session_token(state).await {
        Ok(token) => fetch_range(state, &token, period, pet_id).await,
        Err(err) => Err(err),
    };

    let mut client = state.client.lock().await;
    match fetched {
        Ok(range) => {
            if !client.apply_range(&ticket, range) {
                debug!(?period, "discarding superseded range result");
            }
        }
        Err(err) => error!(?period, "failed to load range stats: {err}"),
    }
    client.range.clone()
}

async fn fetch_range<B: Backend>(
    state: &AppState<B>,
    token: &str,
    period: Period,
    pet_id: Option<i64>,
) -> BackendResult<RangeStat> {
    let today = today_in(&Local);
    let (first, last) = window(period, today);
    let (start, end) = local_range_bounds_utc(first, last, &Local);
    let query = ActivityQuery::new()
        .eq_pet(pet_id)
        .gte(start)
        .lt(end)
        .order(Order::Ascending);
    let records = state.backend.select_activities(token, &query).await?;
    let mut range = build_range_at(today, &Local, period, pet_id, &records);

    // A streak that fills the whole window may reach further back.
    if range.streak_days == period.days() {
        let earlier = ActivityQuery::new()
            .eq_pet(pet_id)
            .lt(start)
            .order(Order::Ascending);
        let older = state.backend.select_activities(token, &earlier).await?;
        range.streak_days += streak_days(&older, add_days(first, -1), &Local);
    }
    Ok(range)
}

/// Seven days from `start` compared with the week before.
pub async fn load_weekly<B: Backend>(
    state: &AppState<B>,
    start: NaiveDate,
) -> Option<WeeklyReport> {
    let ticket = state.client.lock().await.sequencer.issue(WEEKLY_KEY);
    let (from, to) = local_range_bounds_utc(add_days(start, -7), add_days(start, 6), &Local);
    let query = ActivityQuery::new().gte(from).lt(to).order(Order::Ascending);

    let fetched = match session_token(state).await {
        Ok(token) => state.backend.select_activities(&token, &query).await,
        Err(err) => Err(err),
    };

    let mut client = state.client.lock().await;
    match fetched {
        Ok(records) => {
            client.apply_weekly(&ticket, weekly_report(&records, start, &Local));
        }
        Err(err) => error!(%start, "failed to load weekly report: {err}"),
    }
    client.weekly.clone()
}

pub async fn today<B: Backend>(state: &AppState<B>) -> TodayResponse {
    let date = today_in(&Local);
    let stat = load_daily(state, date).await;
    let running_timers = state.client.lock().await.timers.running();
    TodayResponse {
        date,
        stat,
        running_timers,
    }
}
