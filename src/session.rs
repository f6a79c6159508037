//! Device-local state that outlives a restart: the access token and the
//! selected pet. The file carries a schema version; anything else is
//! discarded rather than guessed at.

use crate::storage::{load_json, persist_json};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

pub const SESSION_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSession {
    pub version: u32,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub user_email: Option<String>,
    #[serde(default)]
    pub selected_pet_id: Option<i64>,
}

impl Default for PersistedSession {
    fn default() -> Self {
        Self {
            version: SESSION_SCHEMA_VERSION,
            access_token: None,
            user_email: None,
            selected_pet_id: None,
        }
    }
}

impl PersistedSession {
    pub fn is_signed_in(&self) -> bool {
        self.access_token.is_some()
    }

    pub fn clear_auth(&mut self) {
        self.access_token = None;
        self.user_email = None;
    }
}

pub async fn load_session(path: &Path) -> PersistedSession {
    let session: PersistedSession = load_json(path).await;
    if session.version != SESSION_SCHEMA_VERSION {
        warn!(
            found = session.version,
            expected = SESSION_SCHEMA_VERSION,
            "discarding session file with unknown schema version"
        );
        return PersistedSession::default();
    }
    session
}

pub async fn persist_session(path: &Path, session: &PersistedSession) -> std::io::Result<()> {
    persist_json(path, session).await
}
