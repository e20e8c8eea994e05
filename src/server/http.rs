use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    Router,
    body::Body,
    extract::Request,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::api::{self, AppState, SharedState};
use super::db::{DbHandle, FlameDb};
use crate::config::FlameConfig;
use crate::integrations::IntegrationSync;

/// Build the full application router: API routes plus the optional frontend.
pub fn build_router(state: SharedState, public_dir: Option<PathBuf>) -> Router {
    let router = api::api_router().with_state(state);
    let router = match public_dir {
        Some(dir) => router.fallback(move |req: Request<Body>| static_handler(req, dir.clone())),
        None => router,
    };
    router.layer(TraceLayer::new_for_http())
}

/// Serve files from the built frontend or fall back to index.html for SPA routing.
async fn static_handler(req: Request<Body>, dir: PathBuf) -> Response {
    let path = req.uri().path().trim_start_matches('/');

    if !path.is_empty() && !path.contains("..") {
        let candidate = dir.join(path);
        if candidate.is_file() {
            if let Ok(bytes) = tokio::fs::read(&candidate).await {
                let mime = mime_guess::from_path(&candidate).first_or_octet_stream();
                return ([(header::CONTENT_TYPE, mime.as_ref().to_string())], bytes)
                    .into_response();
            }
        }
    }

    match tokio::fs::read(dir.join("index.html")).await {
        Ok(bytes) => (
            [(header::CONTENT_TYPE, "text/html; charset=utf-8".to_string())],
            bytes,
        )
            .into_response(),
        Err(_) => (StatusCode::NOT_FOUND, "Frontend not found").into_response(),
    }
}

/// Open the database, seed default settings and wire the shared state.
pub fn build_state(config: &FlameConfig) -> Result<SharedState> {
    let data_dir = config.data_dir();
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;
    let uploads_dir = config.uploads_dir();
    std::fs::create_dir_all(&uploads_dir).context("Failed to create uploads directory")?;

    let db = FlameDb::new(&config.db_path()).context("Failed to initialize Flame database")?;
    let seeded = db.seed_default_settings()?;
    if seeded > 0 {
        tracing::info!(keys = seeded, "seeded default settings");
    }

    Ok(Arc::new(AppState {
        db: DbHandle::new(db),
        sync: Arc::new(IntegrationSync::new()),
        auth_token: config.toml.auth.token.clone(),
        uploads_dir,
    }))
}

/// Start the Flame server and block until Ctrl+C.
pub async fn start_server(config: FlameConfig) -> Result<()> {
    let state = build_state(&config)?;

    let refresh_secs = config.toml.integrations.refresh_interval_secs;
    if refresh_secs > 0 {
        tracing::info!(every_secs = refresh_secs, "background integration refresh enabled");
        state
            .sync
            .clone()
            .spawn_periodic(state.db.clone(), Duration::from_secs(refresh_secs));
    }

    let mut app = build_router(state, config.toml.server.public_dir.clone());
    if config.toml.server.dev_mode {
        app = app.layer(CorsLayer::permissive());
    }

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    tracing::info!(address = %local_addr, auth = config.toml.auth.token.is_some(), "Flame running");

    serve(listener, app).await
}

/// Serve `app` on an already bound listener until Ctrl+C.
pub async fn serve(listener: tokio::net::TcpListener, app: Router) -> Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;
    tracing::info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
