//! A single-file stand-in for the hosted backend. The whole dataset lives in
//! one JSON document that is rewritten after every mutation; photos are plain
//! files under `objects_dir`.

use super::{ActivityQuery, Backend, BackendError, BackendResult, Order};
use crate::models::{
    Activity, ActivityChanges, AuthSession, NewActivity, Pet, PetChanges, PetInput, User,
};
use crate::storage::{load_json, persist_json};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use tokio::{fs, sync::Mutex};
use tracing::{debug, info};

const BCRYPT_COST: u32 = 10;
const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserRow {
    id: i64,
    email: String,
    password_hash: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LocalData {
    next_id: i64,
    users: Vec<UserRow>,
    /// access token -> user id
    sessions: BTreeMap<String, i64>,
    pets: Vec<Pet>,
    activities: Vec<Activity>,
}

impl LocalData {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn user_for(&self, token: &str) -> BackendResult<&UserRow> {
        let user_id = self.sessions.get(token).ok_or(BackendError::Unauthorized)?;
        self.users
            .iter()
            .find(|user| user.id == *user_id)
            .ok_or(BackendError::Unauthorized)
    }

    fn owns_pet(&self, user_id: i64, pet_id: i64) -> bool {
        self.pets
            .iter()
            .any(|pet| pet.id == pet_id && pet.user_id == user_id)
    }
}

pub struct LocalBackend {
    data_path: PathBuf,
    objects_dir: PathBuf,
    public_url: String,
    data: Mutex<LocalData>,
}

impl LocalBackend {
    pub async fn open(
        data_path: impl Into<PathBuf>,
        objects_dir: impl Into<PathBuf>,
        public_url: impl Into<String>,
    ) -> Self {
        let data_path = data_path.into();
        let data: LocalData = load_json(&data_path).await;
        info!(
            path = %data_path.display(),
            users = data.users.len(),
            activities = data.activities.len(),
            "local backend opened"
        );
        Self {
            data_path,
            objects_dir: objects_dir.into(),
            public_url: public_url.into(),
            data: Mutex::new(data),
        }
    }

    /// Writes `next` to disk and only then makes it the live dataset, so a
    /// failed write leaves memory exactly as it was.
    async fn commit(&self, live: &mut LocalData, next: LocalData) -> BackendResult<()> {
        persist_json(&self.data_path, &next).await?;
        *live = next;
        Ok(())
    }

    fn object_path(&self, key: &str) -> BackendResult<PathBuf> {
        let relative = Path::new(key);
        let safe = !key.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !safe {
            return Err(BackendError::InvalidInput(format!("bad object key '{key}'")));
        }
        Ok(self.objects_dir.join(relative))
    }
}

fn normalize_email(email: &str) -> BackendResult<String> {
    let email = email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(BackendError::InvalidInput("email is not valid".to_string()));
    }
    Ok(email)
}

fn new_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

async fn hash_password(password: String) -> BackendResult<String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, BCRYPT_COST))
        .await
        .map_err(|err| BackendError::Internal(err.to_string()))?
        .map_err(|err| BackendError::Internal(err.to_string()))
}

async fn verify_password(password: String, hash: String) -> bool {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash).unwrap_or(false))
        .await
        .unwrap_or(false)
}

fn non_empty_name(name: &str) -> BackendResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(BackendError::InvalidInput("name must not be empty".to_string()));
    }
    Ok(name.to_string())
}

fn check_amount(amount: f64) -> BackendResult<()> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(BackendError::InvalidInput(format!(
            "amount must be positive, got {amount}"
        )));
    }
    Ok(())
}

impl Backend for LocalBackend {
    async fn sign_up(&self, email: &str, password: &str) -> BackendResult<AuthSession> {
        let email = normalize_email(email)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(BackendError::InvalidInput(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        let password_hash = hash_password(password.to_string()).await?;

        let mut data = self.data.lock().await;
        if data.users.iter().any(|user| user.email == email) {
            return Err(BackendError::Conflict(format!("{email} is already registered")));
        }
        let mut next = data.clone();
        let id = next.allocate_id();
        next.users.push(UserRow {
            id,
            email: email.clone(),
            password_hash,
        });
        let access_token = new_token();
        next.sessions.insert(access_token.clone(), id);
        self.commit(&mut data, next).await?;

        info!(user_id = id, "user signed up");
        Ok(AuthSession {
            access_token,
            user: User { id, email },
        })
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> BackendResult<AuthSession> {
        let email = normalize_email(email)?;
        let row = {
            let data = self.data.lock().await;
            data.users.iter().find(|user| user.email == email).cloned()
        };
        let Some(row) = row else {
            return Err(BackendError::InvalidCredentials);
        };
        if !verify_password(password.to_string(), row.password_hash.clone()).await {
            return Err(BackendError::InvalidCredentials);
        }

        let mut data = self.data.lock().await;
        let mut next = data.clone();
        let access_token = new_token();
        next.sessions.insert(access_token.clone(), row.id);
        self.commit(&mut data, next).await?;

        debug!(user_id = row.id, "user signed in");
        Ok(AuthSession {
            access_token,
            user: User {
                id: row.id,
                email: row.email,
            },
        })
    }

    async fn get_session(&self, token: &str) -> BackendResult<Option<AuthSession>> {
        let data = self.data.lock().await;
        Ok(data.user_for(token).ok().map(|row| AuthSession {
            access_token: token.to_string(),
            user: User {
                id: row.id,
                email: row.email.clone(),
            },
        }))
    }

    async fn sign_out(&self, token: &str) -> BackendResult<()> {
        let mut data = self.data.lock().await;
        if !data.sessions.contains_key(token) {
            return Ok(());
        }
        let mut next = data.clone();
        next.sessions.remove(token);
        self.commit(&mut data, next).await
    }

    async fn get_user(&self, token: &str) -> BackendResult<User> {
        let data = self.data.lock().await;
        let row = data.user_for(token)?;
        Ok(User {
            id: row.id,
            email: row.email.clone(),
        })
    }

    async fn list_pets(&self, token: &str) -> BackendResult<Vec<Pet>> {
        let data = self.data.lock().await;
        let user_id = data.user_for(token)?.id;
        let mut pets: Vec<Pet> = data
            .pets
            .iter()
            .filter(|pet| pet.user_id == user_id)
            .cloned()
            .collect();
        pets.sort_by_key(|pet| (pet.created_at, pet.id));
        Ok(pets)
    }

    async fn insert_pet(&self, token: &str, user_id: i64, pet: PetInput) -> BackendResult<Pet> {
        let mut data = self.data.lock().await;
        if data.user_for(token)?.id != user_id {
            return Err(BackendError::Unauthorized);
        }
        let name = non_empty_name(&pet.name)?;
        let mut next = data.clone();
        let row = Pet {
            id: next.allocate_id(),
            user_id,
            name,
            species: pet.species,
            birthdate: pet.birthdate,
            weight: pet.weight,
            photo_url: None,
            created_at: Utc::now(),
        };
        next.pets.push(row.clone());
        self.commit(&mut data, next).await?;
        Ok(row)
    }

    async fn update_pet(&self, token: &str, id: i64, changes: PetChanges) -> BackendResult<Pet> {
        let mut data = self.data.lock().await;
        let user_id = data.user_for(token)?.id;
        let name = changes.name.as_deref().map(non_empty_name).transpose()?;

        let mut next = data.clone();
        let pet = next
            .pets
            .iter_mut()
            .find(|pet| pet.id == id && pet.user_id == user_id)
            .ok_or_else(|| BackendError::NotFound(format!("pet {id}")))?;
        if let Some(name) = name {
            pet.name = name;
        }
        if changes.species.is_some() {
            pet.species = changes.species;
        }
        if changes.birthdate.is_some() {
            pet.birthdate = changes.birthdate;
        }
        if changes.weight.is_some() {
            pet.weight = changes.weight;
        }
        if changes.photo_url.is_some() {
            pet.photo_url = changes.photo_url;
        }
        let updated = pet.clone();
        self.commit(&mut data, next).await?;
        Ok(updated)
    }

    async fn delete_pet(&self, token: &str, id: i64) -> BackendResult<()> {
        let mut data = self.data.lock().await;
        let user_id = data.user_for(token)?.id;
        if !data.owns_pet(user_id, id) {
            return Err(BackendError::NotFound(format!("pet {id}")));
        }
        let mut next = data.clone();
        next.pets.retain(|pet| pet.id != id);
        for activity in next
            .activities
            .iter_mut()
            .filter(|activity| activity.pet_id == Some(id))
        {
            activity.pet_id = None;
        }
        self.commit(&mut data, next).await
    }

    async fn select_activities(
        &self,
        token: &str,
        query: &ActivityQuery,
    ) -> BackendResult<Vec<Activity>> {
        let data = self.data.lock().await;
        let user_id = data.user_for(token)?.id;
        let mut rows: Vec<Activity> = data
            .activities
            .iter()
            .filter(|activity| activity.user_id == user_id && query.matches(activity))
            .cloned()
            .collect();
        rows.sort_by_key(|activity| (activity.started_at, activity.id));
        if query.order == Order::Descending {
            rows.reverse();
        }
        Ok(rows)
    }

    async fn insert_activity(&self, token: &str, activity: NewActivity) -> BackendResult<Activity> {
        let mut data = self.data.lock().await;
        if data.user_for(token)?.id != activity.user_id {
            return Err(BackendError::Unauthorized);
        }
        check_amount(activity.amount)?;
        if let Some(pet_id) = activity.pet_id {
            if !data.owns_pet(activity.user_id, pet_id) {
                return Err(BackendError::NotFound(format!("pet {pet_id}")));
            }
        }

        let mut next = data.clone();
        let row = Activity {
            id: next.allocate_id(),
            user_id: activity.user_id,
            pet_id: activity.pet_id,
            kind: activity.kind,
            amount: activity.amount,
            unit: activity.unit,
            started_at: activity.started_at,
            ended_at: activity.ended_at,
            note: activity.note,
            source: activity.source,
            created_at: Utc::now(),
        };
        next.activities.push(row.clone());
        self.commit(&mut data, next).await?;
        Ok(row)
    }

    async fn update_activity(
        &self,
        token: &str,
        id: i64,
        changes: ActivityChanges,
    ) -> BackendResult<Activity> {
        let mut data = self.data.lock().await;
        let user_id = data.user_for(token)?.id;
        if let Some(amount) = changes.amount {
            check_amount(amount)?;
        }

        let mut next = data.clone();
        let row = next
            .activities
            .iter_mut()
            .find(|activity| activity.id == id && activity.user_id == user_id)
            .ok_or_else(|| BackendError::NotFound(format!("activity {id}")))?;
        if let Some(amount) = changes.amount {
            row.amount = amount;
        }
        if let Some(started_at) = changes.started_at {
            row.started_at = started_at;
        }
        if let Some(ended_at) = changes.ended_at {
            row.ended_at = Some(ended_at);
        }
        // Checked on the merged row: either side of the pair may be unchanged.
        row.ended_at = row.ended_at.map(|ended_at| ended_at.max(row.started_at));
        let updated = row.clone();
        self.commit(&mut data, next).await?;
        Ok(updated)
    }

    async fn delete_activity(&self, token: &str, id: i64) -> BackendResult<()> {
        let mut data = self.data.lock().await;
        let user_id = data.user_for(token)?.id;
        let mut next = data.clone();
        next.activities
            .retain(|activity| !(activity.id == id && activity.user_id == user_id));
        if next.activities.len() == data.activities.len() {
            return Err(BackendError::NotFound(format!("activity {id}")));
        }
        self.commit(&mut data, next).await
    }

    async fn upload(&self, token: &str, key: &str, bytes: Vec<u8>) -> BackendResult<()> {
        let user_id = {
            let data = self.data.lock().await;
            data.user_for(token)?.id
        };
        if !key.starts_with(&format!("{user_id}/")) {
            return Err(BackendError::Unauthorized);
        }
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, bytes).await?;
        debug!(key, "object stored");
        Ok(())
    }

    async fn download(&self, key: &str) -> BackendResult<Vec<u8>> {
        let path = self.object_path(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(BackendError::NotFound(format!("object {key}")))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/objects/{key}", self.public_url)
    }
}
