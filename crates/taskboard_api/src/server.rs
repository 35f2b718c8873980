//! HTTP server lifecycle.

use crate::routes::create_router;
use crate::state::AppState;
use std::error::Error;
use std::fmt::{Display, Formatter};
use taskboard_core::{open_db_with_busy_timeout, AppConfig, ConfigError, DbError};
use tokio::net::TcpListener;

#[derive(Debug)]
pub enum ServeError {
    Config(ConfigError),
    Db(DbError),
    Io(std::io::Error),
}

impl Display for ServeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "database unavailable: {err}"),
            Self::Io(err) => write!(f, "server I/O failed: {err}"),
        }
    }
}

impl Error for ServeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Io(err) => Some(err),
        }
    }
}

impl From<ConfigError> for ServeError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<DbError> for ServeError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<std::io::Error> for ServeError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Migrates the database, binds `config.bind_addr` and serves until Ctrl+C.
pub async fn serve(config: &AppConfig) -> Result<(), ServeError> {
    let addr = config.socket_addr()?;
    // Fail before binding if the schema is unusable.
    drop(open_db_with_busy_timeout(
        &config.database_path,
        config.busy_timeout(),
    )?);

    let router = create_router(AppState::from_config(config), &config.allowed_origins);
    let listener = TcpListener::bind(addr).await?;
    log::info!(
        "event=server_start module=api status=ok addr={} database_path={} capacity_policy={:?}",
        addr,
        config.database_path.display(),
        config.capacity_policy
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log::info!("event=server_stop module=api status=ok");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        log::error!(
            "event=server_signal module=api status=error error={}",
            err
        );
        std::future::pending::<()>().await;
    }
}
