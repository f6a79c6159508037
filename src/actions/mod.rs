//! Update actions over [`AppState`]. Each one talks to the backend outside
//! the state lock and applies the result afterwards; store failures are
//! logged and leave the previous state untouched.

pub mod activities;
pub mod auth;
pub mod pets;
pub mod stats;

use crate::backend::{Backend, BackendError};
use crate::models::User;
use crate::state::AppState;
use tracing::error;

pub(crate) async fn session_token<B: Backend>(state: &AppState<B>) -> Result<String, BackendError> {
    match state.access_token().await {
        Some(token) => Ok(token),
        None => {
            error!("no active session");
            Err(BackendError::Unauthorized)
        }
    }
}

/// Resolves the signed-in user for scoping a write.
pub(crate) async fn current_user<B: Backend>(
    state: &AppState<B>,
) -> Result<(String, User), BackendError> {
    let token = session_token(state).await?;
    match state.backend.get_user(&token).await {
        Ok(user) => {
            state.client.lock().await.user_id = Some(user.id);
            Ok((token, user))
        }
        Err(err) => {
            error!("failed to resolve current user: {err}");
            Err(err)
        }
    }
}
