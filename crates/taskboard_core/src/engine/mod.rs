//! Ordered-position maintenance.
//!
//! # Responsibility
//! - Keep every column's task ranks dense (`0..n-1`) across append, move and
//!   delete.
//! - Detect and repair columns whose ranks drifted.
//!
//! # Invariants
//! - The engine never opens a transaction. Callers run each operation inside
//!   one IMMEDIATE unit of work so the read-compute-write sequence is atomic.
//! - A cross-column move touches ranks in the source and destination columns
//!   only.

pub mod position;

pub use position::{
    clamp_rank, plan_delete, plan_move, CapacityPolicy, DensityViolation, MoveOutcome, MovePlan,
    PositionEngine, PositionError, RankShift,
};
