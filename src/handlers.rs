use crate::actions::{activities, auth, pets, stats};
use crate::backend::Backend;
use crate::dates::{parse_date, today_in, week_start};
use crate::errors::AppError;
use crate::extract::extract_activities;
use crate::models::{
    Activity, ActivityChanges, ActivityInput, ActivityType, CredentialsRequest, DailyStat,
    DateQuery, ExtractedActivity, NoteResponse, Pet, PetChanges, PetInput, PetQuery, PhotoQuery,
    QuickResponse, RangeStat, SessionResponse, StatsQuery, TextRequest, TodayResponse,
    WeeklyReport,
};
use crate::state::AppState;
use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Local;

pub async fn get_today<B: Backend>(State(state): State<AppState<B>>) -> Json<TodayResponse> {
    Json(stats::today(&state).await)
}

pub async fn get_stats<B: Backend>(
    State(state): State<AppState<B>>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<RangeStat>, AppError> {
    let (period, pet_id) = {
        let client = state.client.lock().await;
        (
            query.period.unwrap_or(client.last_period),
            query.pet_id.or(client.session.selected_pet_id),
        )
    };
    stats::load_range(&state, period, pet_id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::unavailable("statistics are not available yet"))
}

pub async fn get_daily<B: Backend>(
    State(state): State<AppState<B>>,
    Query(query): Query<DateQuery>,
) -> Result<Json<DailyStat>, AppError> {
    let date = match query.date.as_deref() {
        Some(value) => parse_date(value)?,
        None => today_in(&Local),
    };
    Ok(Json(stats::load_daily(&state, date).await))
}

pub async fn get_weekly<B: Backend>(
    State(state): State<AppState<B>>,
    Query(query): Query<DateQuery>,
) -> Result<Json<WeeklyReport>, AppError> {
    let start = match query.start.as_deref() {
        Some(value) => parse_date(value)?,
        None => week_start(today_in(&Local)),
    };
    stats::load_weekly(&state, start)
        .await
        .map(Json)
        .ok_or_else(|| AppError::unavailable("weekly report is not available yet"))
}

pub async fn sign_up<B: Backend>(
    State(state): State<AppState<B>>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    Ok(Json(
        auth::sign_up(&state, &payload.email, &payload.password).await?,
    ))
}

pub async fn sign_in<B: Backend>(
    State(state): State<AppState<B>>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    Ok(Json(
        auth::sign_in(&state, &payload.email, &payload.password).await?,
    ))
}

pub async fn sign_out<B: Backend>(State(state): State<AppState<B>>) -> Json<SessionResponse> {
    Json(auth::sign_out(&state).await)
}

pub async fn get_session<B: Backend>(State(state): State<AppState<B>>) -> Json<SessionResponse> {
    Json(auth::session_status(&state).await)
}

pub async fn list_pets<B: Backend>(State(state): State<AppState<B>>) -> Json<Vec<Pet>> {
    Json(pets::load_pets(&state).await)
}

pub async fn create_pet<B: Backend>(
    State(state): State<AppState<B>>,
    Json(payload): Json<PetInput>,
) -> Result<Json<Pet>, AppError> {
    Ok(Json(pets::add_pet(&state, payload).await?))
}

pub async fn update_pet<B: Backend>(
    State(state): State<AppState<B>>,
    Path(id): Path<i64>,
    Json(payload): Json<PetChanges>,
) -> Result<Json<Pet>, AppError> {
    Ok(Json(pets::update_pet(&state, id, payload).await?))
}

pub async fn delete_pet<B: Backend>(
    State(state): State<AppState<B>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    pets::remove_pet(&state, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn select_pet<B: Backend>(
    State(state): State<AppState<B>>,
    Path(id): Path<i64>,
) -> Result<Json<SessionResponse>, AppError> {
    pets::select_pet(&state, Some(id)).await?;
    Ok(Json(auth::session_status(&state).await))
}

pub async fn upload_photo<B: Backend>(
    State(state): State<AppState<B>>,
    Path(id): Path<i64>,
    Query(query): Query<PhotoQuery>,
    body: Bytes,
) -> Result<Json<Pet>, AppError> {
    if body.is_empty() {
        return Err(AppError::bad_request("photo body is empty"));
    }
    Ok(Json(
        pets::upload_pet_photo(&state, id, &query.filename, body.to_vec()).await?,
    ))
}

pub async fn list_activities<B: Backend>(State(state): State<AppState<B>>) -> Json<Vec<Activity>> {
    Json(activities::load_activities(&state).await)
}

pub async fn create_activity<B: Backend>(
    State(state): State<AppState<B>>,
    Json(payload): Json<ActivityInput>,
) -> Result<Json<Activity>, AppError> {
    Ok(Json(activities::log_activity(&state, payload).await?))
}

pub async fn update_activity<B: Backend>(
    State(state): State<AppState<B>>,
    Path(id): Path<i64>,
    Json(payload): Json<ActivityChanges>,
) -> Result<Json<Activity>, AppError> {
    Ok(Json(activities::update_activity(&state, id, payload).await?))
}

pub async fn delete_activity<B: Backend>(
    State(state): State<AppState<B>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    activities::remove_activity(&state, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn quick<B: Backend>(
    State(state): State<AppState<B>>,
    Path(kind): Path<ActivityType>,
    Query(query): Query<PetQuery>,
) -> Result<Json<QuickResponse>, AppError> {
    Ok(Json(
        activities::quick_action(&state, kind, query.pet_id).await?,
    ))
}

pub async fn extract(Json(payload): Json<TextRequest>) -> Json<Vec<ExtractedActivity>> {
    Json(extract_activities(&payload.text))
}

pub async fn log_note<B: Backend>(
    State(state): State<AppState<B>>,
    Json(payload): Json<TextRequest>,
) -> Result<Json<NoteResponse>, AppError> {
    Ok(Json(
        activities::log_note(&state, &payload.text, payload.pet_id).await?,
    ))
}

pub async fn get_object<B: Backend>(
    State(state): State<AppState<B>>,
    Path(key): Path<String>,
) -> Result<Vec<u8>, AppError> {
    Ok(state.backend.download(&key).await?)
}
