use super::stats::{load_daily, load_range};
use super::{current_user, session_token};
use crate::backend::{ActivityQuery, Backend};
use crate::dates::{local_date_of, today_in};
use crate::errors::AppError;
use crate::extract::extract_activities;
use crate::models::{
    Activity, ActivityChanges, ActivityInput, ActivitySource, ActivityType, NewActivity,
    NoteResponse, QuickResponse, RunningTimer, ValidationError,
};
use crate::state::{ACTIVITIES_KEY, AppState, TimerToggle};
use chrono::{DateTime, Duration, Local, NaiveDate, Utc};
use std::collections::BTreeSet;
use tracing::{debug, error, info, warn};

const FUTURE_SKEW_SECS: i64 = 60;

fn check_amount(amount: f64) -> Result<(), ValidationError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(ValidationError::InvalidAmount(amount));
    }
    Ok(())
}

/// Pulls a timestamp more than a minute ahead of `now` back to `now`.
pub fn clamp_future(at: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    if at > now + Duration::seconds(FUTURE_SKEW_SECS) {
        now
    } else {
        at
    }
}

/// Validates and normalises a logging request into an insertable row.
///
/// A unit that does not fit the activity type is replaced by the expected
/// one. Times in the future (beyond a minute of skew) are clamped to `now`
/// and the end is never before the start.
pub fn prepare_activity(
    input: ActivityInput,
    user_id: i64,
    now: DateTime<Utc>,
) -> Result<NewActivity, ValidationError> {
    check_amount(input.amount)?;

    let expected = input.kind.expected_unit();
    let unit = match input.unit {
        Some(unit) if unit != expected => {
            warn!(
                kind = input.kind.as_str(),
                given = ?unit,
                "unit does not match activity type, using {expected:?}"
            );
            expected
        }
        _ => expected,
    };

    let started_at = clamp_future(input.started_at.unwrap_or(now), now);
    let ended_at = clamp_future(input.ended_at.unwrap_or(started_at), now).max(started_at);

    Ok(NewActivity {
        user_id,
        pet_id: input.pet_id,
        kind: input.kind,
        amount: input.amount,
        unit,
        started_at,
        ended_at: Some(ended_at),
        note: input.note.filter(|note| !note.trim().is_empty()),
        source: input.source,
    })
}

pub async fn load_activities<B: Backend>(state: &AppState<B>) -> Vec<Activity> {
    let ticket = state.client.lock().await.sequencer.issue(ACTIVITIES_KEY);
    let fetched = match session_token(state).await {
        Ok(token) => {
            state
                .backend
                .select_activities(&token, &ActivityQuery::new())
                .await
        }
        Err(err) => Err(err),
    };

    let mut client = state.client.lock().await;
    match fetched {
        Ok(activities) => {
            client.apply_activities(&ticket, activities);
        }
        Err(err) => error!("failed to load activities: {err}"),
    }
    client.activities.clone()
}

pub async fn log_activity<B: Backend>(
    state: &AppState<B>,
    input: ActivityInput,
) -> Result<Activity, AppError> {
    check_amount(input.amount).inspect_err(|err| debug!("rejected activity: {err}"))?;
    let (token, user) = current_user(state).await?;
    let row = prepare_activity(input, user.id, Utc::now())
        .inspect_err(|err| debug!("rejected activity: {err}"))?;

    let activity = state
        .backend
        .insert_activity(&token, row)
        .await
        .inspect_err(|err| error!("failed to log activity: {err}"))?;

    info!(
        activity_id = activity.id,
        kind = activity.kind.as_str(),
        amount = activity.amount,
        "activity logged"
    );
    state.client.lock().await.prepend_activity(activity.clone());
    refresh_after_write(state, [local_date_of(&activity.started_at, &Local)]).await;
    Ok(activity)
}

pub async fn update_activity<B: Backend>(
    state: &AppState<B>,
    id: i64,
    mut changes: ActivityChanges,
) -> Result<Activity, AppError> {
    if let Some(amount) = changes.amount {
        check_amount(amount)?;
    }
    let now = Utc::now();
    changes.started_at = changes.started_at.map(|at| clamp_future(at, now));
    changes.ended_at = changes.ended_at.map(|at| clamp_future(at, now));
    if let (Some(started_at), Some(ended_at)) = (changes.started_at, changes.ended_at) {
        changes.ended_at = Some(ended_at.max(started_at));
    }

    let token = session_token(state).await?;
    let updated = state
        .backend
        .update_activity(&token, id, changes)
        .await
        .inspect_err(|err| error!(activity_id = id, "failed to update activity: {err}"))?;

    let previous = state.client.lock().await.replace_activity(updated.clone());
    let mut dates = vec![local_date_of(&updated.started_at, &Local)];
    if let Some(previous) = previous {
        dates.push(local_date_of(&previous.started_at, &Local));
    }
    refresh_after_write(state, dates).await;
    Ok(updated)
}

pub async fn remove_activity<B: Backend>(state: &AppState<B>, id: i64) -> Result<(), AppError> {
    let token = session_token(state).await?;
    state
        .backend
        .delete_activity(&token, id)
        .await
        .inspect_err(|err| error!(activity_id = id, "failed to remove activity: {err}"))?;

    let previous = state.client.lock().await.remove_activity(id);
    let dates = previous.map(|activity| local_date_of(&activity.started_at, &Local));
    refresh_after_write(state, dates).await;
    Ok(())
}

/// One tap on a quick-action button. Timed types toggle their timer; counted
/// types log a single occurrence right away.
pub async fn quick_action<B: Backend>(
    state: &AppState<B>,
    kind: ActivityType,
    pet_id: Option<i64>,
) -> Result<QuickResponse, AppError> {
    let now = Utc::now();
    let pet_id = match pet_id {
        Some(id) => Some(id),
        None => state.client.lock().await.session.selected_pet_id,
    };

    if !kind.is_timed() {
        let activity = log_activity(state, quick_input(kind, 1.0, pet_id, now, now)).await?;
        return Ok(QuickResponse::Logged { activity });
    }

    let toggle = state.client.lock().await.timers.toggle(kind, now);
    match toggle {
        TimerToggle::Started(started_at) => {
            debug!(kind = kind.as_str(), "timer started");
            Ok(QuickResponse::TimerStarted(RunningTimer { kind, started_at }))
        }
        TimerToggle::Stopped {
            started_at,
            ended_at,
            minutes,
        } => {
            let input = quick_input(kind, minutes, pet_id, started_at, ended_at);
            match log_activity(state, input).await {
                Ok(activity) => Ok(QuickResponse::Logged { activity }),
                Err(err) => {
                    state.client.lock().await.timers.restore(kind, started_at);
                    Err(err)
                }
            }
        }
    }
}

fn quick_input(
    kind: ActivityType,
    amount: f64,
    pet_id: Option<i64>,
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
) -> ActivityInput {
    ActivityInput {
        pet_id,
        kind,
        amount,
        unit: Some(kind.expected_unit()),
        started_at: Some(started_at),
        ended_at: Some(ended_at),
        note: None,
        source: ActivitySource::Quick,
    }
}

/// Extracts activities from a free-text note and logs each of them. A
/// failure after the first insert returns what was stored so far.
pub async fn log_note<B: Backend>(
    state: &AppState<B>,
    text: &str,
    pet_id: Option<i64>,
) -> Result<NoteResponse, AppError> {
    let extracted = extract_activities(text);
    if extracted.is_empty() {
        return Ok(NoteResponse {
            extracted,
            logged: Vec::new(),
            error: None,
        });
    }

    let pet_id = match pet_id {
        Some(id) => Some(id),
        None => state.client.lock().await.session.selected_pet_id,
    };
    let now = Utc::now();

    let mut logged = Vec::with_capacity(extracted.len());
    for candidate in extracted.clone() {
        let input = candidate.into_input(pet_id, now, text);
        match log_activity(state, input).await {
            Ok(activity) => logged.push(activity),
            Err(err) if logged.is_empty() => return Err(err),
            Err(err) => {
                warn!(
                    logged = logged.len(),
                    total = extracted.len(),
                    "note only partly logged: {err}"
                );
                return Ok(NoteResponse {
                    extracted,
                    logged,
                    error: Some(err.message),
                });
            }
        }
    }
    Ok(NoteResponse {
        extracted,
        logged,
        error: None,
    })
}

/// Re-fetches today, the touched days and the last range shown.
async fn refresh_after_write<B: Backend>(
    state: &AppState<B>,
    touched: impl IntoIterator<Item = NaiveDate>,
) {
    let mut dates: BTreeSet<NaiveDate> = touched.into_iter().collect();
    dates.insert(today_in(&Local));
    for date in dates {
        load_daily(state, date).await;
    }

    let (period, pet_id) = {
        let client = state.client.lock().await;
        (client.last_period, client.last_range_pet)
    };
    load_range(state, period, pet_id).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::pets::add_pet;
    use crate::actions::test_support::signed_in_state;
    use crate::backend::{BackendError, BackendResult, LocalBackend};
    use crate::models::{ActivityUnit, AuthSession, Pet, PetChanges, PetInput, User};
    use crate::session::PersistedSession;
    use crate::storage::unique_temp_path;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Local backend that refuses activity inserts once `inserts_left` runs out.
    struct LimitedInserts {
        inner: LocalBackend,
        inserts_left: AtomicUsize,
    }

    impl Backend for LimitedInserts {
        async fn sign_up(&self, email: &str, password: &str) -> BackendResult<AuthSession> {
            self.inner.sign_up(email, password).await
        }

        async fn sign_in_with_password(
            &self,
            email: &str,
            password: &str,
        ) -> BackendResult<AuthSession> {
            self.inner.sign_in_with_password(email, password).await
        }

        async fn get_session(&self, token: &str) -> BackendResult<Option<AuthSession>> {
            self.inner.get_session(token).await
        }

        async fn sign_out(&self, token: &str) -> BackendResult<()> {
            self.inner.sign_out(token).await
        }

        async fn get_user(&self, token: &str) -> BackendResult<User> {
            self.inner.get_user(token).await
        }

        async fn list_pets(&self, token: &str) -> BackendResult<Vec<Pet>> {
            self.inner.list_pets(token).await
        }

        async fn insert_pet(&self, token: &str, user_id: i64, pet: PetInput) -> BackendResult<Pet> {
            self.inner.insert_pet(token, user_id, pet).await
        }

        async fn update_pet(&self, token: &str, id: i64, changes: PetChanges) -> BackendResult<Pet> {
            self.inner.update_pet(token, id, changes).await
        }

        async fn delete_pet(&self, token: &str, id: i64) -> BackendResult<()> {
            self.inner.delete_pet(token, id).await
        }

        async fn select_activities(
            &self,
            token: &str,
            query: &ActivityQuery,
        ) -> BackendResult<Vec<Activity>> {
            self.inner.select_activities(token, query).await
        }

        async fn insert_activity(
            &self,
            token: &str,
            activity: NewActivity,
        ) -> BackendResult<Activity> {
            let allowed = self
                .inserts_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok();
            if !allowed {
                return Err(BackendError::Internal("insert refused".to_string()));
            }
            self.inner.insert_activity(token, activity).await
        }

        async fn update_activity(
            &self,
            token: &str,
            id: i64,
            changes: ActivityChanges,
        ) -> BackendResult<Activity> {
            self.inner.update_activity(token, id, changes).await
        }

        async fn delete_activity(&self, token: &str, id: i64) -> BackendResult<()> {
            self.inner.delete_activity(token, id).await
        }

        async fn upload(&self, token: &str, key: &str, bytes: Vec<u8>) -> BackendResult<()> {
            self.inner.upload(token, key, bytes).await
        }

        async fn download(&self, key: &str) -> BackendResult<Vec<u8>> {
            self.inner.download(key).await
        }

        fn public_url(&self, key: &str) -> String {
            self.inner.public_url(key)
        }
    }

    async fn limited_state(label: &str, inserts: usize) -> AppState<LimitedInserts> {
        let root = unique_temp_path(label);
        let inner =
            LocalBackend::open(root.join("backend.json"), root.join("objects"), "http://pets.test")
                .await;
        let backend = LimitedInserts {
            inner,
            inserts_left: AtomicUsize::new(inserts),
        };
        let state = AppState::new(backend, PersistedSession::default(), root.join("session.json"));
        crate::actions::auth::sign_up(&state, &format!("{label}@example.com"), "secret-pw")
            .await
            .unwrap();
        state
    }

    fn input(kind: ActivityType, amount: f64) -> ActivityInput {
        ActivityInput {
            pet_id: None,
            kind,
            amount,
            unit: None,
            started_at: None,
            ended_at: None,
            note: None,
            source: ActivitySource::Manual,
        }
    }

    #[test]
    fn mismatched_unit_is_substituted() {
        let now = Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap();
        let mut walk = input(ActivityType::Walk, 20.0);
        walk.unit = Some(ActivityUnit::Count);
        let row = prepare_activity(walk, 1, now).unwrap();
        assert_eq!(row.unit, ActivityUnit::Min);

        let treat = prepare_activity(input(ActivityType::Treat, 2.0), 1, now).unwrap();
        assert_eq!(treat.unit, ActivityUnit::Count);
    }

    #[test]
    fn invalid_amounts_are_rejected() {
        let now = Utc::now();
        for amount in [0.0, -3.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                prepare_activity(input(ActivityType::Meal, amount), 1, now),
                Err(ValidationError::InvalidAmount(_))
            ));
        }
    }

    #[test]
    fn times_are_defaulted_and_clamped() {
        let now = Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap();
        let row = prepare_activity(input(ActivityType::Care, 1.0), 1, now).unwrap();
        assert_eq!(row.started_at, now);
        assert_eq!(row.ended_at, Some(now));

        let mut future = input(ActivityType::Walk, 10.0);
        future.started_at = Some(now + Duration::hours(2));
        future.ended_at = Some(now - Duration::hours(1));
        let row = prepare_activity(future, 1, now).unwrap();
        assert_eq!(row.started_at, now);
        assert_eq!(row.ended_at, Some(now));
    }

    #[tokio::test]
    async fn rejected_amount_creates_no_record() {
        let state = signed_in_state("act_reject").await;
        let result = log_activity(&state, input(ActivityType::Treat, 0.0)).await;
        assert_eq!(result.unwrap_err().status, axum::http::StatusCode::BAD_REQUEST);
        let result = log_activity(&state, input(ActivityType::Treat, -1.0)).await;
        assert!(result.is_err());
        assert!(load_activities(&state).await.is_empty());
    }

    #[tokio::test]
    async fn logging_refreshes_today() {
        let state = signed_in_state("act_today").await;
        log_activity(&state, input(ActivityType::Walk, 15.0)).await.unwrap();
        log_activity(&state, input(ActivityType::Treat, 2.0)).await.unwrap();

        let today = today_in(&Local);
        let client = state.client.lock().await;
        let stat = client.daily.get(&today).expect("today refreshed");
        assert_eq!(stat.walk_min, 15.0);
        assert_eq!(stat.treat_count, 2.0);
        assert_eq!(client.activities.len(), 2);
        assert_eq!(client.range.as_ref().map(|range| range.days.len()), Some(7));
    }

    #[tokio::test]
    async fn update_and_remove_recompute_totals() {
        let state = signed_in_state("act_edit").await;
        let walk = log_activity(&state, input(ActivityType::Walk, 15.0)).await.unwrap();

        let updated = update_activity(
            &state,
            walk.id,
            ActivityChanges {
                amount: Some(40.0),
                ..ActivityChanges::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.amount, 40.0);
        let today = today_in(&Local);
        assert_eq!(state.client.lock().await.daily[&today].walk_min, 40.0);

        remove_activity(&state, walk.id).await.unwrap();
        let client = state.client.lock().await;
        assert_eq!(client.daily[&today].walk_min, 0.0);
        assert!(client.activities.is_empty());
    }

    #[tokio::test]
    async fn edited_times_keep_their_order_and_stay_out_of_the_future() {
        let state = signed_in_state("act_edit_times").await;
        let now = Utc::now();
        let mut walk = input(ActivityType::Walk, 5.0);
        walk.started_at = Some(now - Duration::hours(5));
        walk.ended_at = Some(now - Duration::hours(5) + Duration::minutes(5));
        let walk = log_activity(&state, walk).await.unwrap();

        let moved = update_activity(
            &state,
            walk.id,
            ActivityChanges {
                started_at: Some(now - Duration::hours(3)),
                ..ActivityChanges::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(moved.started_at, now - Duration::hours(3));
        assert!(moved.ended_at.is_some_and(|ended_at| ended_at >= moved.started_at));

        let future = update_activity(
            &state,
            walk.id,
            ActivityChanges {
                started_at: Some(now + Duration::days(3)),
                ..ActivityChanges::default()
            },
        )
        .await
        .unwrap();
        assert!(future.started_at <= Utc::now());
        assert!(future.ended_at.is_some_and(|ended_at| ended_at >= future.started_at));
    }

    #[test]
    fn clamp_allows_a_minute_of_skew() {
        let now = Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap();
        let close = now + Duration::seconds(30);
        assert_eq!(clamp_future(close, now), close);
        assert_eq!(clamp_future(now + Duration::minutes(5), now), now);
        assert_eq!(clamp_future(now - Duration::days(1), now), now - Duration::days(1));
    }

    #[tokio::test]
    async fn quick_timer_starts_then_logs() {
        let state = signed_in_state("act_timer").await;
        let started = quick_action(&state, ActivityType::Play, None).await.unwrap();
        assert!(matches!(started, QuickResponse::TimerStarted(_)));
        assert!(load_activities(&state).await.is_empty());

        let stopped = quick_action(&state, ActivityType::Play, None).await.unwrap();
        let QuickResponse::Logged { activity } = stopped else {
            panic!("expected a logged activity");
        };
        assert_eq!(activity.kind, ActivityType::Play);
        assert_eq!(activity.amount, 1.0);
        assert_eq!(activity.unit, ActivityUnit::Min);
        assert_eq!(activity.source, ActivitySource::Quick);
        assert!(state.client.lock().await.timers.running().is_empty());
    }

    #[tokio::test]
    async fn quick_tap_uses_selected_pet() {
        let state = signed_in_state("act_tap").await;
        let pet = add_pet(
            &state,
            PetInput {
                name: "Pochi".to_string(),
                species: None,
                birthdate: None,
                weight: None,
            },
        )
        .await
        .unwrap();

        let QuickResponse::Logged { activity } =
            quick_action(&state, ActivityType::Poop, None).await.unwrap()
        else {
            panic!("expected a logged activity");
        };
        assert_eq!(activity.pet_id, Some(pet.id));
        assert_eq!(activity.amount, 1.0);
        assert_eq!(activity.unit, ActivityUnit::Count);
    }

    #[tokio::test]
    async fn note_reports_partial_progress() {
        let state = limited_state("act_note_partial", 1).await;
        let response = log_note(&state, "散歩15分とおやつ2回", None).await.unwrap();
        assert_eq!(response.extracted.len(), 2);
        assert_eq!(response.logged.len(), 1);
        assert_eq!(response.logged[0].kind, ActivityType::Walk);
        assert!(response.error.is_some());
        assert_eq!(load_activities(&state).await.len(), 1);

        let refused = log_note(&state, "おやつ", None).await;
        assert!(refused.is_err());
    }

    #[tokio::test]
    async fn note_logs_every_extracted_activity() {
        let state = signed_in_state("act_note").await;
        let response = log_note(&state, "朝は散歩15分とおやつ2回、夜に遊び20分", None)
            .await
            .unwrap();
        assert_eq!(response.extracted.len(), 3);
        assert_eq!(response.logged.len(), 3);
        assert!(response
            .logged
            .iter()
            .all(|activity| activity.source == ActivitySource::Manual));

        assert!(response.error.is_none());

        let empty = log_note(&state, "雨", None).await.unwrap();
        assert!(empty.logged.is_empty());
    }
}
