//! Shared request state.
//!
//! # Responsibility
//! - Carry the database location and runtime policies into handlers.
//! - Run each request's work on the blocking pool with its own connection.
//!
//! # Invariants
//! - No connection or rank state outlives a request.
//! - Authenticated work only runs after the bearer token resolved to a
//!   principal.

use crate::error::ApiError;
use crate::extract::Bearer;
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use taskboard_core::auth::DEFAULT_TOKEN_TTL;
use taskboard_core::{
    open_db_with_busy_timeout, AppConfig, AuthGate, CapacityPolicy, Principal, RepoError,
    ServiceError, SqliteTokenGate,
};

#[derive(Debug)]
struct StateInner {
    database_path: PathBuf,
    busy_timeout: Duration,
    capacity_policy: CapacityPolicy,
    token_ttl: Duration,
}

/// Cheaply cloneable handle passed to every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    inner: Arc<StateInner>,
}

impl AppState {
    /// State with the default one-week token lifetime.
    pub fn new(
        database_path: impl Into<PathBuf>,
        busy_timeout: Duration,
        capacity_policy: CapacityPolicy,
    ) -> Self {
        Self::with_token_ttl(database_path, busy_timeout, capacity_policy, DEFAULT_TOKEN_TTL)
    }

    pub fn with_token_ttl(
        database_path: impl Into<PathBuf>,
        busy_timeout: Duration,
        capacity_policy: CapacityPolicy,
        token_ttl: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(StateInner {
                database_path: database_path.into(),
                busy_timeout,
                capacity_policy,
                token_ttl,
            }),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::with_token_ttl(
            config.database_path.clone(),
            config.busy_timeout(),
            config.capacity_policy,
            config.token_ttl(),
        )
    }

    /// Lifetime of tokens minted by `/auth/refresh`.
    pub fn token_ttl(&self) -> Duration {
        self.inner.token_ttl
    }

    /// Runs `work` on the blocking pool with a fresh connection and no
    /// principal.
    pub async fn run_public<T, F>(&self, work: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, ServiceError> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let conn = inner.connect()?;
            work(&conn)
        })
        .await
        .map_err(ApiError::internal)?
        .map_err(ApiError::from)
    }

    /// Resolves `bearer` and runs `work` as that principal.
    pub async fn run_as<T, F>(&self, bearer: Bearer, work: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection, &Principal, CapacityPolicy) -> Result<T, ServiceError>
            + Send
            + 'static,
    {
        let policy = self.inner.capacity_policy;
        self.run_public(move |conn| {
            let principal = SqliteTokenGate::new(conn).resolve(bearer.as_str())?;
            work(conn, &principal, policy)
        })
        .await
    }
}

impl StateInner {
    fn connect(&self) -> Result<Connection, ServiceError> {
        open_db_with_busy_timeout(&self.database_path, self.busy_timeout)
            .map_err(|err| ServiceError::from(RepoError::from(err)))
    }
}
