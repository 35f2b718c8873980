//! Domain model for users, projects, boards, columns and tasks.
//!
//! # Responsibility
//! - Define canonical data structures used by core business logic.
//! - Own field-level validation shared by services and repositories.
//!
//! # Invariants
//! - Every domain object is identified by a stable UUID.
//! - A task belongs to exactly one column at a time.

pub mod activity;
pub mod board;
pub mod task;

/// Default page size for list operations.
pub const PAGE_DEFAULT_LIMIT: u32 = 100;
/// Maximum page size for list operations.
pub const PAGE_LIMIT_MAX: u32 = 100;

/// Normalizes a requested page size. `None`/`0` fall back to the default.
pub fn normalize_page_limit(limit: Option<u32>) -> u32 {
    match limit {
        Some(0) => PAGE_DEFAULT_LIMIT,
        Some(value) if value > PAGE_LIMIT_MAX => PAGE_LIMIT_MAX,
        Some(value) => value,
        None => PAGE_DEFAULT_LIMIT,
    }
}
