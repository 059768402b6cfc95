use std::net::SocketAddr;
use std::sync::Arc;

use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use field_outbox::config::Config;
use field_outbox::db::{self, SqliteQueueStore};
use field_outbox::outbox::migration;
use field_outbox::{connectivity, worker};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    tracing::info!("Starting field outbox");

    let pool = db::connect(&config.database_url).await?;
    db::migrate(&pool).await?;
    tracing::info!("Migrations applied");

    let store = Arc::new(SqliteQueueStore::new(pool.clone()));
    let state = field_outbox::build_state(store.clone(), config.clone())?;

    // A bad legacy value must never keep the app from starting.
    match migration::migrate_legacy(&state.outbox, store.as_ref()).await {
        Ok(report) if report.found => tracing::info!("Legacy outbox migration: {report:?}"),
        Ok(_) => {}
        Err(e) => tracing::error!("Legacy outbox migration failed: {e}"),
    }
    state.outbox.refresh_status().await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = worker::spawn(state.clone(), shutdown_rx.clone());

    let probe = match &config.probe_url {
        Some(url) => {
            let client = reqwest::Client::builder()
                .timeout(config.request_timeout)
                .build()?;
            Some(connectivity::spawn_probe(
                state.connectivity.clone(),
                client,
                url.clone(),
                config.probe_interval,
                shutdown_rx.clone(),
            ))
        }
        None => None,
    };

    let addr = SocketAddr::new(config.host, config.port);
    let app = field_outbox::build_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    let _ = worker.await;
    if let Some(probe) = probe {
        let _ = probe.await;
    }
    pool.close().await;

    tracing::info!("Field outbox stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
