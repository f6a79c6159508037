use crate::backend::Backend;
use crate::handlers;
use crate::state::AppState;
use axum::{
    Router,
    routing::{get, patch, post},
};

pub fn router<B: Backend>(state: AppState<B>) -> Router {
    Router::new()
        .route("/api/today", get(handlers::get_today::<B>))
        .route("/api/stats", get(handlers::get_stats::<B>))
        .route("/api/stats/daily", get(handlers::get_daily::<B>))
        .route("/api/stats/weekly", get(handlers::get_weekly::<B>))
        .route("/api/auth/signup", post(handlers::sign_up::<B>))
        .route("/api/auth/login", post(handlers::sign_in::<B>))
        .route("/api/auth/logout", post(handlers::sign_out::<B>))
        .route("/api/auth/session", get(handlers::get_session::<B>))
        .route(
            "/api/pets",
            get(handlers::list_pets::<B>).post(handlers::create_pet::<B>),
        )
        .route(
            "/api/pets/:id",
            patch(handlers::update_pet::<B>).delete(handlers::delete_pet::<B>),
        )
        .route("/api/pets/:id/select", post(handlers::select_pet::<B>))
        .route("/api/pets/:id/photo", post(handlers::upload_photo::<B>))
        .route(
            "/api/activities",
            get(handlers::list_activities::<B>).post(handlers::create_activity::<B>),
        )
        .route(
            "/api/activities/:id",
            patch(handlers::update_activity::<B>).delete(handlers::delete_activity::<B>),
        )
        .route("/api/quick/:kind", post(handlers::quick::<B>))
        .route("/api/extract", post(handlers::extract))
        .route("/api/notes", post(handlers::log_note::<B>))
        .route("/objects/*key", get(handlers::get_object::<B>))
        .with_state(state)
}
