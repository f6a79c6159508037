use pet_time::actions::auth::restore_session;
use pet_time::session::load_session;
use pet_time::{AppState, Config, LocalBackend, router};
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let config = Config::from_env();
    let backend = LocalBackend::open(
        &config.data_path,
        &config.objects_dir,
        config.public_url.as_str(),
    )
    .await;
    let session = load_session(&config.session_path).await;
    let state = AppState::new(backend, session, config.session_path.clone());

    let restored = restore_session(&state).await;
    info!(
        signed_in = restored.signed_in,
        selected_pet = ?restored.selected_pet_id,
        "session restored"
    );

    let app = router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    info!("listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
