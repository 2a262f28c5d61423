use std::sync::Arc;

use anyhow::Result;
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sensor_dashboard::{
    api::{self, AppState},
    config::Config,
    session::{
        persist::{FileStore, KeyValueStore, MemoryStore},
        SessionStore,
    },
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env (ignore error if file absent, env vars may be set externally)
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;

    let persisted: Arc<dyn KeyValueStore> = match &config.session_store_dir {
        Some(dir) => {
            info!(dir = %dir.display(), "Persisting session to disk");
            Arc::new(FileStore::new(dir))
        }
        None => Arc::new(MemoryStore::new()),
    };

    // Pick up where the last run left off, if anything was persisted
    let sessions = SessionStore::new(persisted);
    if let Some(session) = sessions.restore().await {
        info!(
            user = %session.user.name,
            sensors = session.sensors.len(),
            "Restored persisted session"
        );
    }

    let addr = config.bind_address();
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "HTTP server listening");

    axum::serve(listener, api::router(AppState::new(sessions, config)))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
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

    info!("Shutdown signal received");
}
