use super::{current_user, session_token};
use crate::backend::Backend;
use crate::errors::AppError;
use crate::models::{Pet, PetChanges, PetInput, ValidationError};
use crate::state::{AppState, PETS_KEY};
use chrono::Utc;
use tracing::{error, info};

/// Fetches the user's pets and reconciles the selection. Returns whatever
/// the state holds afterwards, stale or not.
pub async fn load_pets<B: Backend>(state: &AppState<B>) -> Vec<Pet> {
    let ticket = state.client.lock().await.sequencer.issue(PETS_KEY);
    let fetched = match session_token(state).await {
        Ok(token) => state.backend.list_pets(&token).await,
        Err(err) => Err(err),
    };

    match fetched {
        Ok(pets) => {
            let applied = state.client.lock().await.apply_pets(&ticket, pets);
            if applied {
                state.save_session().await;
            }
        }
        Err(err) => error!("failed to load pets: {err}"),
    }
    state.client.lock().await.pets.clone()
}

pub async fn add_pet<B: Backend>(state: &AppState<B>, input: PetInput) -> Result<Pet, AppError> {
    if input.name.trim().is_empty() {
        return Err(ValidationError::EmptyName.into());
    }
    let (token, user) = current_user(state).await?;
    let pet = state
        .backend
        .insert_pet(&token, user.id, input)
        .await
        .inspect_err(|err| error!("failed to add pet: {err}"))?;

    info!(pet_id = pet.id, "pet added");
    state.client.lock().await.add_pet(pet.clone());
    state.save_session().await;
    Ok(pet)
}

pub async fn update_pet<B: Backend>(
    state: &AppState<B>,
    id: i64,
    changes: PetChanges,
) -> Result<Pet, AppError> {
    if changes.name.as_deref().is_some_and(|name| name.trim().is_empty()) {
        return Err(ValidationError::EmptyName.into());
    }
    let token = session_token(state).await?;
    let pet = state
        .backend
        .update_pet(&token, id, changes)
        .await
        .inspect_err(|err| error!(pet_id = id, "failed to update pet: {err}"))?;
    state.client.lock().await.replace_pet(pet.clone());
    Ok(pet)
}

pub async fn remove_pet<B: Backend>(state: &AppState<B>, id: i64) -> Result<(), AppError> {
    let token = session_token(state).await?;
    state
        .backend
        .delete_pet(&token, id)
        .await
        .inspect_err(|err| error!(pet_id = id, "failed to remove pet: {err}"))?;
    state.client.lock().await.remove_pet(id);
    state.save_session().await;
    Ok(())
}

pub async fn select_pet<B: Backend>(state: &AppState<B>, id: Option<i64>) -> Result<(), AppError> {
    let selected = state.client.lock().await.select_pet(id);
    if !selected {
        return Err(AppError::not_found(format!("pet {} is not loaded", id.unwrap_or_default())));
    }
    state.save_session().await;
    Ok(())
}

/// Keeps the characters that are safe in an object key.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    base.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect::<String>()
        .trim_start_matches('.')
        .to_string()
}

/// Stores the photo under `{user_id}/{timestamp}-{filename}` and points the
/// pet at its public URL.
pub async fn upload_pet_photo<B: Backend>(
    state: &AppState<B>,
    id: i64,
    filename: &str,
    bytes: Vec<u8>,
) -> Result<Pet, AppError> {
    let filename = sanitize_filename(filename);
    if filename.is_empty() {
        return Err(ValidationError::EmptyFilename.into());
    }
    let (token, user) = current_user(state).await?;
    let key = format!("{}/{}-{filename}", user.id, Utc::now().timestamp_millis());

    state
        .backend
        .upload(&token, &key, bytes)
        .await
        .inspect_err(|err| error!(key = %key, "failed to upload photo: {err}"))?;

    let changes = PetChanges {
        photo_url: Some(state.backend.public_url(&key)),
        ..PetChanges::default()
    };
    update_pet(state, id, changes).await
}
