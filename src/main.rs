//! Process entry point: load configuration, build `AppState`, spawn the
//! background loops that run for the process lifetime, and serve the
//! HTTP/WebSocket API until told to shut down.

use tokio_util::sync::CancellationToken;

use meshctl::api;
use meshctl::app_state::AppState;
use meshctl::config::Settings;
use meshctl::eventbus;
use meshctl::presence::sweeper::{self, SweeperConfig};
use meshctl::telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing();

    let config_path = std::env::var("MESHCTL_CONFIG").ok();
    let settings = Settings::load(config_path.as_deref())?;
    let addr = format!("{}:{}", settings.server.host, settings.server.port);

    let shutdown = CancellationToken::new();
    let state = AppState::build(settings, shutdown.clone()).await?;

    tokio::spawn(state.bus.clone().run_fanout_loop(shutdown.clone()));
    tokio::spawn(eventbus::heartbeat::run(state.bus.clone(), shutdown.clone()));
    tokio::spawn(sweeper::run(
        state.store.clone(),
        state.topology.clone(),
        state.bus.clone(),
        SweeperConfig {
            offline_threshold: state.settings.alerts.device_offline_threshold,
            interval: state.settings.alerts.check_interval,
        },
        shutdown.clone(),
    ));
    tokio::spawn(
        state
            .alerts
            .rules()
            .run_hot_reload(state.settings.alerts.rules_reload_interval, shutdown.clone()),
    );

    let app = api::router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "meshctl control plane listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    Ok(())
}

async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
    token.cancel();
}
