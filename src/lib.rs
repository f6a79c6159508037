pub mod actions;
pub mod app;
pub mod backend;
pub mod config;
pub mod dates;
pub mod errors;
pub mod extract;
pub mod handlers;
pub mod models;
pub mod session;
pub mod state;
pub mod stats;
pub mod storage;

pub use app::router;
pub use backend::LocalBackend;
pub use config::Config;
pub use state::AppState;
