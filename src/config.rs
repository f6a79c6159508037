use std::{env, path::PathBuf};

const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// JSON document backing the local backend (users, pets, activities).
    pub data_path: PathBuf,
    /// Device-local session file (access token, selected pet).
    pub session_path: PathBuf,
    pub objects_dir: PathBuf,
    pub public_url: String,
}

impl Config {
    pub fn from_env() -> Self {
        let port = env::var("PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);

        Self {
            port,
            data_path: path_var("APP_DATA_PATH", "data/backend.json"),
            session_path: path_var("APP_SESSION_PATH", "data/session.json"),
            objects_dir: path_var("APP_OBJECTS_DIR", "data/objects"),
            public_url: env::var("APP_PUBLIC_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| format!("http://127.0.0.1:{port}")),
        }
    }
}

fn path_var(name: &str, default: &str) -> PathBuf {
    env::var(name)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(default))
}
