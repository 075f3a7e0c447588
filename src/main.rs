use anyhow::Result;
use axum::Router;
use std::{io::ErrorKind, net::SocketAddr, time::Duration};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;

const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(15 * 60);

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config ---
    let cfg = config::AppConfig::from_env_and_args()?;
    tracing::info!(
        host = %cfg.host,
        port = cfg.port,
        content_dir = %cfg.content_dir.display(),
        data_dir = %cfg.data_dir.display(),
        upload_folder = %cfg.upload_folder,
        max_recent_images = cfg.max_recent_images,
        "Starting photo-frame"
    );

    // --- Initialize services and on-disk layout ---
    let state = state::AppState::new(cfg);
    state.prepare_storage().await?;
    let indexed = state.index.get_all_images(true).await.len();
    tracing::info!("Indexed {} images under {}", indexed, state.config.content_dir.display());

    // --- Background session cleanup ---
    let sessions = state.sessions.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SESSION_PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            sessions.purge_expired();
        }
    });

    // --- Build router ---
    let app: Router = routes::routes::routes(state.config.max_upload_bytes).with_state(state.clone());

    // --- Start server ---
    let cfg = &state.config;
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
