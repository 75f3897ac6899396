use lectern_common::snowflake::{ProcessId, WorkerId};
use lectern_db::{
    DbError,
    client::DbClient,
    forum::{DEFAULT_STORAGE_TIMEOUT, ForumStore, StoreConfig},
};
use serde::Deserialize;
use server::ServerState;
use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::Duration,
};
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod server;

#[derive(Debug, Error)]
enum InitError {
    #[error("Error parsing .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error("Error parsing environment: {0}")]
    Envy(#[from] envy::Error),
    #[error("Worker id {0} is out of range")]
    WorkerId(u8),
    #[error("Process id {0} is out of range")]
    ProcessId(u8),
    #[error("Error setting up the database: {0}")]
    Database(#[from] DbError),
    #[error("Error binding tcp listener: {0}")]
    TcpBind(std::io::Error),
    #[error("Error serving server: {0}")]
    TcpServe(std::io::Error),
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
struct Env {
    server_address: IpAddr,
    server_port: u16,
    database_url: String,
    worker_id: u8,
    process_id: u8,
    #[serde(default = "default_storage_timeout_ms")]
    storage_timeout_ms: u64,
}

fn default_storage_timeout_ms() -> u64 {
    DEFAULT_STORAGE_TIMEOUT
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}

fn install_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "lectern_api=debug,\
                lectern_db=debug,\
                tower_http=debug,axum::rejection=trace,sqlx=warn"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn get_env() -> Result<Env, InitError> {
    if let Err(e) = dotenvy::dotenv() {
        if e.not_found() {
            debug!("No .env file found");
        } else {
            return Err(e.into());
        }
    }

    envy::from_env().map_err(InitError::from)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "Could not listen for ctrl-c, shutting down");
    }
    info!("Shutting down");
}

#[tokio::main]
async fn main() -> Result<(), InitError> {
    install_tracing();
    let env = get_env()?;

    let worker_id = WorkerId::new(env.worker_id).ok_or(InitError::WorkerId(env.worker_id))?;
    let process_id =
        ProcessId::new(env.process_id).ok_or(InitError::ProcessId(env.process_id))?;

    let db = Arc::new(DbClient::connect(&env.database_url, worker_id, process_id).await?);
    db.migrate().await?;

    let config = StoreConfig {
        timeout: Duration::from_millis(env.storage_timeout_ms),
    };
    let state = ServerState {
        forum: Arc::new(ForumStore::new(db.clone(), db.clone(), config)),
        sessions: db,
    };

    let app = server::routes()
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let server_address = SocketAddr::new(env.server_address, env.server_port);
    let listener = tokio::net::TcpListener::bind(server_address)
        .await
        .map_err(InitError::TcpBind)?;
    info!(%server_address, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(InitError::TcpServe)?;

    Ok(())
}
