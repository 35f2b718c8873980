//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository and engine calls into use-case level APIs.
//! - Own the unit of work: every mutating call is one IMMEDIATE transaction.
//! - Enforce ownership of the project behind every addressed resource.
//!
//! # Invariants
//! - A failed unit of work is rolled back and leaves no partial effect.
//! - Lock contention is retried once; a second failure surfaces `Conflict`.

use crate::auth::{AuthError, Principal};
use crate::engine::PositionError;
use crate::model::board::ColumnId;
use crate::repo::board_repo::BoardRepository;
use crate::repo::{EntityKind, RepoError};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;
use uuid::Uuid;

pub mod board_service;
pub mod task_service;

/// Number of attempts a unit of work gets before surfacing `Conflict`.
const UNIT_OF_WORK_ATTEMPTS: u32 = 2;

/// Error taxonomy shared by all services.
#[derive(Debug)]
pub enum ServiceError {
    NotFound { entity: EntityKind, id: Uuid },
    Unauthenticated,
    Forbidden,
    /// Write lock could not be acquired after one retry.
    Conflict(String),
    Validation(String),
    CapacityExceeded {
        column_id: ColumnId,
        wip_limit: i64,
        count: i64,
    },
    Repo(RepoError),
}

impl ServiceError {
    pub fn not_found(entity: EntityKind, id: Uuid) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn is_lock_contention(&self) -> bool {
        matches!(self, Self::Repo(err) if err.is_lock_contention())
    }
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::Unauthenticated => write!(f, "authentication required"),
            Self::Forbidden => write!(f, "not allowed to access this resource"),
            Self::Conflict(message) => write!(f, "conflict: {message}"),
            Self::Validation(message) => write!(f, "{message}"),
            Self::CapacityExceeded {
                column_id,
                wip_limit,
                count,
            } => write!(
                f,
                "column {column_id} is at capacity ({count} of {wip_limit} tasks)"
            ),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound { entity, id } => Self::NotFound { entity, id },
            RepoError::Duplicate(message) => Self::Validation(message),
            other => Self::Repo(other),
        }
    }
}

impl From<rusqlite::Error> for ServiceError {
    fn from(value: rusqlite::Error) -> Self {
        RepoError::from(value).into()
    }
}

impl From<PositionError> for ServiceError {
    fn from(value: PositionError) -> Self {
        match value {
            PositionError::TaskNotFound(id) => Self::not_found(EntityKind::Task, id),
            PositionError::ColumnNotFound(id) => Self::not_found(EntityKind::Column, id),
            PositionError::CapacityExceeded {
                column_id,
                wip_limit,
                count,
            } => Self::CapacityExceeded {
                column_id,
                wip_limit,
                count,
            },
            PositionError::Repo(err) => err.into(),
        }
    }
}

impl From<AuthError> for ServiceError {
    fn from(value: AuthError) -> Self {
        match value {
            AuthError::MissingToken | AuthError::InvalidToken => Self::Unauthenticated,
            AuthError::Forbidden => Self::Forbidden,
            AuthError::UnknownUser(id) => Self::not_found(EntityKind::User, id),
            AuthError::Repo(err) => err.into(),
        }
    }
}

/// Runs `work` inside one IMMEDIATE transaction, retrying once on lock
/// contention.
///
/// `work` may run twice, so it must derive everything from the transaction.
pub(crate) fn unit_of_work<T, F>(
    conn: &Connection,
    operation: &'static str,
    mut work: F,
) -> Result<T, ServiceError>
where
    F: FnMut(&Transaction<'_>) -> Result<T, ServiceError>,
{
    let started_at = Instant::now();
    let mut attempt = 1;
    loop {
        match run_once(conn, &mut work) {
            Ok(value) => {
                log::debug!(
                    "event=unit_of_work module=service op={} status=ok attempt={} duration_ms={}",
                    operation,
                    attempt,
                    started_at.elapsed().as_millis()
                );
                return Ok(value);
            }
            Err(err) if err.is_lock_contention() => {
                if attempt >= UNIT_OF_WORK_ATTEMPTS {
                    log::warn!(
                        "event=unit_of_work module=service op={} status=conflict attempt={} duration_ms={}",
                        operation,
                        attempt,
                        started_at.elapsed().as_millis()
                    );
                    return Err(ServiceError::Conflict(format!(
                        "{operation} could not acquire the write lock"
                    )));
                }
                log::info!(
                    "event=unit_of_work module=service op={} status=retry attempt={}",
                    operation,
                    attempt
                );
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

fn run_once<T, F>(conn: &Connection, work: &mut F) -> Result<T, ServiceError>
where
    F: FnMut(&Transaction<'_>) -> Result<T, ServiceError>,
{
    // Dropping `tx` on the error path rolls the whole attempt back.
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let value = work(&tx)?;
    tx.commit()?;
    Ok(value)
}

/// Fails unless `principal` owns the project behind `column_id`.
pub(crate) fn ensure_column_owner(
    boards: &impl BoardRepository,
    principal: &Principal,
    column_id: ColumnId,
) -> Result<(), ServiceError> {
    let owner = boards
        .column_owner(column_id)?
        .ok_or_else(|| ServiceError::not_found(EntityKind::Column, column_id))?;
    crate::auth::ensure_user(principal, owner)?;
    Ok(())
}
