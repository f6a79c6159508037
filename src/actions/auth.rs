use super::pets::load_pets;
use crate::backend::Backend;
use crate::errors::AppError;
use crate::models::{AuthSession, SessionResponse};
use crate::state::AppState;
use tracing::{error, info, warn};

pub async fn sign_up<B: Backend>(
    state: &AppState<B>,
    email: &str,
    password: &str,
) -> Result<SessionResponse, AppError> {
    let session = state.backend.sign_up(email, password).await?;
    adopt_session(state, session).await;
    Ok(session_status(state).await)
}

pub async fn sign_in<B: Backend>(
    state: &AppState<B>,
    email: &str,
    password: &str,
) -> Result<SessionResponse, AppError> {
    let session = state.backend.sign_in_with_password(email, password).await?;
    adopt_session(state, session).await;
    Ok(session_status(state).await)
}

async fn adopt_session<B: Backend>(state: &AppState<B>, session: AuthSession) {
    info!(user_id = session.user.id, "signed in");
    {
        let mut client = state.client.lock().await;
        if client.user_id.is_some_and(|id| id != session.user.id) {
            client.sign_out();
        }
        client.sign_in(session.access_token, session.user.id, session.user.email);
    }
    state.save_session().await;
    load_pets(state).await;
}

/// Revoking the token remotely is best effort; the local session is cleared
/// either way.
pub async fn sign_out<B: Backend>(state: &AppState<B>) -> SessionResponse {
    if let Some(token) = state.access_token().await {
        if let Err(err) = state.backend.sign_out(&token).await {
            error!("failed to revoke session: {err}");
        }
    }
    state.client.lock().await.sign_out();
    state.save_session().await;
    session_status(state).await
}

/// Re-validates a persisted token at startup.
pub async fn restore_session<B: Backend>(state: &AppState<B>) -> SessionResponse {
    let Some(token) = state.access_token().await else {
        return session_status(state).await;
    };

    match state.backend.get_session(&token).await {
        Ok(Some(session)) => {
            {
                let mut client = state.client.lock().await;
                client.sign_in(session.access_token, session.user.id, session.user.email);
            }
            state.save_session().await;
            load_pets(state).await;
        }
        Ok(None) => {
            warn!("persisted session is no longer valid");
            state.client.lock().await.sign_out();
            state.save_session().await;
        }
        Err(err) => {
            error!("failed to restore session: {err}");
            let mut client = state.client.lock().await;
            client.session.clear_auth();
            client.user_id = None;
        }
    }
    session_status(state).await
}

pub async fn session_status<B: Backend>(state: &AppState<B>) -> SessionResponse {
    let client = state.client.lock().await;
    SessionResponse {
        signed_in: client.session.is_signed_in(),
        user_email: client.session.user_email.clone(),
        selected_pet_id: client.session.selected_pet_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::test_support::{fresh_state, signed_in_state};
    use crate::session::load_session;

    #[tokio::test]
    async fn sign_up_persists_the_session() {
        let state = signed_in_state("auth_persist").await;
        let status = session_status(&state).await;
        assert!(status.signed_in);
        assert_eq!(status.user_email.as_deref(), Some("auth_persist@example.com"));

        let on_disk = load_session(&state.session_path).await;
        assert!(on_disk.access_token.is_some());
    }

    #[tokio::test]
    async fn failed_sign_in_leaves_state_alone() {
        let state = fresh_state("auth_fail").await;
        let result = sign_in(&state, "nobody@example.com", "secret-pw").await;
        assert_eq!(result.unwrap_err().status, axum::http::StatusCode::UNAUTHORIZED);
        assert!(!session_status(&state).await.signed_in);
    }

    #[tokio::test]
    async fn restore_drops_revoked_token() {
        let state = signed_in_state("auth_restore").await;
        let token = state.access_token().await.unwrap();
        assert!(restore_session(&state).await.signed_in);

        state.backend.sign_out(&token).await.unwrap();
        let status = restore_session(&state).await;
        assert!(!status.signed_in);
        assert!(load_session(&state.session_path).await.access_token.is_none());
    }

    #[tokio::test]
    async fn sign_out_clears_local_state() {
        let state = signed_in_state("auth_out").await;
        let status = sign_out(&state).await;
        assert!(!status.signed_in);
        assert!(state.client.lock().await.pets.is_empty());
    }
}
