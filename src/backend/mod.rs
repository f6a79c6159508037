//! The hosted backend the app talks to: auth, the `pets` and `activities`
//! tables, and object storage for pet photos. Every data call carries the
//! caller's access token and only ever sees that user's rows.

pub mod local;

use crate::models::{
    Activity, ActivityChanges, AuthSession, NewActivity, Pet, PetChanges, PetInput, User,
};
use chrono::{DateTime, Utc};
use std::future::Future;

pub use local::LocalBackend;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("not signed in")]
    Unauthorized,

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("backend error: {0}")]
    Internal(String),
}

pub type BackendResult<T> = Result<T, BackendError>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Order {
    Ascending,
    #[default]
    Descending,
}

/// Filter over the activities table: equality on id and pet, a half-open
/// range on `started_at`, and an ordering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivityQuery {
    pub id: Option<i64>,
    pub pet_id: Option<i64>,
    pub started_gte: Option<DateTime<Utc>>,
    pub started_lt: Option<DateTime<Utc>>,
    pub order: Order,
}

impl ActivityQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn eq_pet(mut self, pet_id: Option<i64>) -> Self {
        self.pet_id = pet_id;
        self
    }

    pub fn gte(mut self, at: DateTime<Utc>) -> Self {
        self.started_gte = Some(at);
        self
    }

    pub fn lt(mut self, at: DateTime<Utc>) -> Self {
        self.started_lt = Some(at);
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    pub fn matches(&self, activity: &Activity) -> bool {
        self.id.is_none_or(|id| activity.id == id)
            && self.pet_id.is_none_or(|pet| activity.pet_id == Some(pet))
            && self.started_gte.is_none_or(|at| activity.started_at >= at)
            && self.started_lt.is_none_or(|at| activity.started_at < at)
    }
}

pub trait Backend: Send + Sync + 'static {
    fn sign_up(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = BackendResult<AuthSession>> + Send;

    fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = BackendResult<AuthSession>> + Send;

    /// `None` when the token is unknown or revoked.
    fn get_session(
        &self,
        token: &str,
    ) -> impl Future<Output = BackendResult<Option<AuthSession>>> + Send;

    fn sign_out(&self, token: &str) -> impl Future<Output = BackendResult<()>> + Send;

    fn get_user(&self, token: &str) -> impl Future<Output = BackendResult<User>> + Send;

    /// Oldest first.
    fn list_pets(&self, token: &str) -> impl Future<Output = BackendResult<Vec<Pet>>> + Send;

    fn insert_pet(
        &self,
        token: &str,
        user_id: i64,
        pet: PetInput,
    ) -> impl Future<Output = BackendResult<Pet>> + Send;

    fn update_pet(
        &self,
        token: &str,
        id: i64,
        changes: PetChanges,
    ) -> impl Future<Output = BackendResult<Pet>> + Send;

    fn delete_pet(&self, token: &str, id: i64) -> impl Future<Output = BackendResult<()>> + Send;

    fn select_activities(
        &self,
        token: &str,
        query: &ActivityQuery,
    ) -> impl Future<Output = BackendResult<Vec<Activity>>> + Send;

    fn insert_activity(
        &self,
        token: &str,
        activity: NewActivity,
    ) -> impl Future<Output = BackendResult<Activity>> + Send;

    fn update_activity(
        &self,
        token: &str,
        id: i64,
        changes: ActivityChanges,
    ) -> impl Future<Output = BackendResult<Activity>> + Send;

    fn delete_activity(
        &self,
        token: &str,
        id: i64,
    ) -> impl Future<Output = BackendResult<()>> + Send;

    /// Stores `bytes` under `key`; keys must live under the caller's user id.
    fn upload(
        &self,
        token: &str,
        key: &str,
        bytes: Vec<u8>,
    ) -> impl Future<Output = BackendResult<()>> + Send;

    fn download(&self, key: &str) -> impl Future<Output = BackendResult<Vec<u8>>> + Send;

    fn public_url(&self, key: &str) -> String;
}
