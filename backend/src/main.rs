// Mumble ping monitor: polls a server over UDP and serves its status over HTTP.

use std::env;
use std::net::SocketAddr;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use anyhow::Context;
use tokio::time::Instant;
use tracing::info;

use mumble_ping_server::app::AppState;
use mumble_ping_server::constants::{DEFAULT_HTTP_BIND, DEFAULT_HTTP_PORT};
use mumble_ping_server::http;
use mumble_ping_server::logging;
use mumble_ping_server::monitor::Monitor;
use mumble_ping_server::settings::{Settings, SettingsStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env().context("invalid monitor settings")?;
    let log_control = logging::init(settings.debug);

    let bind = env::var("HTTP_BIND").unwrap_or_else(|_| DEFAULT_HTTP_BIND.to_string());
    let port = match env::var("HTTP_PORT") {
        Ok(value) => value
            .parse::<u16>()
            .with_context(|| format!("invalid HTTP_PORT {value:?}"))?,
        Err(_) => DEFAULT_HTTP_PORT,
    };
    let addr: SocketAddr = format!("{}:{}", bind, port)
        .parse()
        .with_context(|| format!("invalid HTTP_BIND {bind:?}"))?;

    info!(
        host = %settings.host,
        port = settings.port,
        interval_secs = settings.refresh_interval_secs,
        enabled = settings.enabled,
        "loaded monitor settings"
    );

    let monitor = Monitor::new(SettingsStore::new(settings), Some(log_control));
    monitor.start().await;

    let app_state = AppState {
        monitor: monitor.clone(),
        sequence: Arc::new(AtomicU64::new(0)),
        start_instant: Instant::now(),
    };
    let app = http::router(app_state);

    info!(%addr, "starting server");
    axum::Server::try_bind(&addr)
        .with_context(|| format!("failed to bind {addr}"))?
        .serve(app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("server failed")?;

    monitor.shutdown().await;
    Ok(())
}
