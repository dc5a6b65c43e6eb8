//! kdw-daemon entry point.
//!
//! Thin: tracing, config and secrets, Postgres, engine wiring, scheduler
//! start, then the HTTP server until ctrl-c. Handlers live in `routes.rs`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use kdw_daemon::{routes, state, wiring, ENV_DAEMON_ADDR};
use kdw_db::PgStore;
use kdw_reconcile::{SubjectAdmin, SubjectStore};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let (settings, config_hash) = kdw_daemon::settings_from_env()?;
    let mode = kdw_daemon::run_mode_from_env()?;
    let secrets = kdw_config::resolve_secrets_for_mode(&settings, mode)?;
    info!(mode = mode.as_str(), config_hash = ?config_hash, "configuration loaded");

    let pool = kdw_db::connect_from_env().await?;
    kdw_db::migrate(&pool).await?;
    let pg = Arc::new(PgStore::new(pool));
    let store: Arc<dyn SubjectStore> = pg.clone();
    let admin: Arc<dyn SubjectAdmin> = pg;

    let engine = Arc::new(wiring::build_engine(&settings, &secrets, Arc::clone(&store)));
    let shared = Arc::new(state::AppState::new(
        engine,
        store,
        admin,
        &settings.scheduler,
    ));

    state::spawn_heartbeat(shared.bus.clone(), Duration::from_secs(1));
    shared.scheduler.start()?;

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = match bind_addr_from_env() {
        Some(a) => a,
        None => settings.daemon.socket_addr()?,
    };
    info!("kdw-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    // Idle if an operator already stopped it over HTTP.
    let _ = shared.scheduler.stop().await;
    info!("kdw-daemon shut down");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var(ENV_DAEMON_ADDR).ok()?.parse().ok()
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
    }
    info!("shutdown requested");
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers(tower_http::cors::Any)
}
