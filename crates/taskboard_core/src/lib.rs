//! Core domain logic for the task board.
//! This crate is the single source of truth for rank and ownership invariants.

pub mod auth;
pub mod config;
pub mod db;
pub mod engine;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use auth::{AuthError, AuthGate, IssuedToken, Principal, SqliteTokenGate};
pub use config::{AppConfig, ConfigError};
pub use db::{open_db, open_db_in_memory, open_db_with_busy_timeout, DbError};
pub use engine::{CapacityPolicy, DensityViolation, PositionEngine, PositionError};
pub use logging::{default_log_level, init_logging, init_stderr_logging, logging_status};
pub use model::activity::{ActivityAction, ActivityEntry};
pub use model::board::{
    Board, BoardId, Column, ColumnId, NewBoard, NewColumn, NewProject, NewUser, Project,
    ProjectId, User, UserId,
};
pub use model::task::{
    NewTask, Task, TaskId, TaskListQuery, TaskMove, TaskPatch, TaskPriority,
};
pub use repo::{EntityKind, RepoError, RepoResult};
pub use service::board_service::BoardService;
pub use service::task_service::TaskService;
pub use service::ServiceError;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
