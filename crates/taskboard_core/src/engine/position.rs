//! Position engine over a `TaskStore`.
//!
//! Planning is pure: `plan_move`/`plan_delete` turn a request and the current
//! ranks into a list of `RankShift`s plus a final placement. `PositionEngine`
//! reads current state from the store, plans, and applies the plan.

use crate::model::board::{Column, ColumnId};
use crate::model::task::{Task, TaskId};
use crate::repo::task_repo::{RankRange, TaskStore};
use crate::repo::RepoError;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Whether column `wip_limit`s block new tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacityPolicy {
    /// Limits are informational only.
    #[default]
    Advisory,
    /// Append and cross-column move fail once a column is full.
    Enforce,
}

/// Errors raised by position engine operations.
#[derive(Debug)]
pub enum PositionError {
    TaskNotFound(TaskId),
    ColumnNotFound(ColumnId),
    /// Destination column is at or above its `wip_limit`.
    CapacityExceeded {
        column_id: ColumnId,
        wip_limit: i64,
        count: i64,
    },
    Repo(RepoError),
}

impl PositionError {
    pub fn is_lock_contention(&self) -> bool {
        matches!(self, Self::Repo(err) if err.is_lock_contention())
    }
}

impl Display for PositionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TaskNotFound(id) => write!(f, "task not found: {id}"),
            Self::ColumnNotFound(id) => write!(f, "column not found: {id}"),
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

impl Error for PositionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for PositionError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// One compensating shift: add `delta` to every rank in `range` of `column_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankShift {
    pub column_id: ColumnId,
    pub range: RankRange,
    pub delta: i64,
}

/// Shifts plus final placement for one move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovePlan {
    pub shifts: Vec<RankShift>,
    pub to_column: ColumnId,
    pub to_position: i64,
}

impl MovePlan {
    /// Returns whether applying the plan changes nothing.
    pub fn is_noop(&self, from_column: ColumnId, from_position: i64) -> bool {
        self.shifts.is_empty() && self.to_column == from_column && self.to_position == from_position
    }
}

/// Result of a committed move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOutcome {
    /// Task as stored after the move.
    pub task: Task,
    pub from_column: ColumnId,
    pub from_position: i64,
}

impl MoveOutcome {
    pub fn changed(&self) -> bool {
        self.task.column_id != self.from_column || self.task.position != self.from_position
    }
}

/// Column whose ranks are not exactly `0..expected_count`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DensityViolation {
    pub column_id: ColumnId,
    pub expected_count: usize,
    /// Observed ranks in ascending order.
    pub observed: Vec<i64>,
}

/// Clamps `requested` into `[0, max]`.
pub fn clamp_rank(requested: i64, max: i64) -> i64 {
    requested.clamp(0, max.max(0))
}

/// Plans a move of the task at `from_position` in `from_column` to
/// `requested` in `to_column`.
///
/// `to_count` is the number of tasks currently in `to_column`, including the
/// moving task when the move stays in one column.
pub fn plan_move(
    from_column: ColumnId,
    from_position: i64,
    to_column: ColumnId,
    requested: i64,
    to_count: i64,
) -> MovePlan {
    if from_column == to_column {
        let target = clamp_rank(requested, to_count - 1);
        let shifts = if from_position < target {
            vec![RankShift {
                column_id: from_column,
                range: RankRange::between(from_position + 1, target),
                delta: -1,
            }]
        } else if target < from_position {
            vec![RankShift {
                column_id: from_column,
                range: RankRange::between(target, from_position - 1),
                delta: 1,
            }]
        } else {
            Vec::new()
        };
        return MovePlan {
            shifts,
            to_column,
            to_position: target,
        };
    }

    let target = clamp_rank(requested, to_count);
    MovePlan {
        shifts: vec![
            RankShift {
                column_id: from_column,
                range: RankRange::from(from_position + 1),
                delta: -1,
            },
            RankShift {
                column_id: to_column,
                range: RankRange::from(target),
                delta: 1,
            },
        ],
        to_column,
        to_position: target,
    }
}

/// Plans the shift that closes the gap left by removing rank `position`.
pub fn plan_delete(column_id: ColumnId, position: i64) -> RankShift {
    RankShift {
        column_id,
        range: RankRange::from(position + 1),
        delta: -1,
    }
}

/// Applies dense-rank bookkeeping through a task store.
pub struct PositionEngine<S: TaskStore> {
    store: S,
    policy: CapacityPolicy,
}

impl<S: TaskStore> PositionEngine<S> {
    pub fn new(store: S, policy: CapacityPolicy) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Inserts `task` at the tail of its column. The incoming `position` is
    /// ignored.
    pub fn append(&self, mut task: Task) -> Result<Task, PositionError> {
        let column = self.require_column(task.column_id)?;
        self.check_capacity(&column)?;
        task.position = self.store.next_position(column.id)?;
        self.store.insert_task(&task)?;
        log::debug!(
            "event=rank_append module=engine column_id={} task_id={} position={}",
            column.id,
            task.id,
            task.position
        );
        Ok(task)
    }

    /// Moves a task to `requested` in `to_column`, clamping the rank.
    pub fn move_task(
        &self,
        task_id: TaskId,
        to_column: ColumnId,
        requested: i64,
    ) -> Result<MoveOutcome, PositionError> {
        let task = self
            .store
            .find_task(task_id)?
            .ok_or(PositionError::TaskNotFound(task_id))?;
        let destination = self.require_column(to_column)?;

        let cross_column = task.column_id != destination.id;
        if cross_column {
            self.check_capacity(&destination)?;
        }
        let to_count = self.store.count_in_column(destination.id)?;
        let plan = plan_move(
            task.column_id,
            task.position,
            destination.id,
            requested,
            to_count,
        );

        let from_column = task.column_id;
        let from_position = task.position;
        if plan.is_noop(from_column, from_position) {
            return Ok(MoveOutcome {
                task,
                from_column,
                from_position,
            });
        }

        for shift in &plan.shifts {
            self.store
                .shift_positions(shift.column_id, shift.range, shift.delta, Some(task_id))?;
        }
        self.store
            .place_task(task_id, plan.to_column, plan.to_position)?;
        log::debug!(
            "event=rank_move module=engine task_id={} from_column={} from_position={} to_column={} to_position={} requested={}",
            task_id,
            from_column,
            from_position,
            plan.to_column,
            plan.to_position,
            requested
        );

        let task = self
            .store
            .find_task(task_id)?
            .ok_or(PositionError::TaskNotFound(task_id))?;
        Ok(MoveOutcome {
            task,
            from_column,
            from_position,
        })
    }

    /// Deletes a task and closes the gap it leaves. Returns the removed task.
    pub fn delete(&self, task_id: TaskId) -> Result<Task, PositionError> {
        let task = self
            .store
            .find_task(task_id)?
            .ok_or(PositionError::TaskNotFound(task_id))?;
        self.store.delete_task(task_id)?;
        let shift = plan_delete(task.column_id, task.position);
        let shifted = self
            .store
            .shift_positions(shift.column_id, shift.range, shift.delta, None)?;
        log::debug!(
            "event=rank_delete module=engine task_id={} column_id={} position={} shifted={}",
            task_id,
            task.column_id,
            task.position,
            shifted
        );
        Ok(task)
    }

    /// Reports a violation when the column's ranks are not `0..n-1`.
    pub fn audit(&self, column_id: ColumnId) -> Result<Option<DensityViolation>, PositionError> {
        self.require_column(column_id)?;
        let observed: Vec<i64> = self
            .store
            .column_positions(column_id)?
            .into_iter()
            .map(|(_, position)| position)
            .collect();
        let dense = observed
            .iter()
            .enumerate()
            .all(|(index, position)| *position == index as i64);
        if dense {
            return Ok(None);
        }
        Ok(Some(DensityViolation {
            column_id,
            expected_count: observed.len(),
            observed,
        }))
    }

    /// Renumbers a column to `0..n-1` keeping current order, ties by id.
    /// Returns the number of rows rewritten.
    pub fn compact(&self, column_id: ColumnId) -> Result<usize, PositionError> {
        self.require_column(column_id)?;
        let mut rewritten = 0;
        for (index, (task_id, position)) in
            self.store.column_positions(column_id)?.into_iter().enumerate()
        {
            let dense = index as i64;
            if position != dense {
                self.store.place_task(task_id, column_id, dense)?;
                rewritten += 1;
            }
        }
        if rewritten > 0 {
            log::info!(
                "event=rank_compact module=engine column_id={} rewritten={}",
                column_id,
                rewritten
            );
        }
        Ok(rewritten)
    }

    fn require_column(&self, column_id: ColumnId) -> Result<Column, PositionError> {
        self.store
            .find_column(column_id)?
            .ok_or(PositionError::ColumnNotFound(column_id))
    }

    fn check_capacity(&self, column: &Column) -> Result<(), PositionError> {
        if self.policy != CapacityPolicy::Enforce {
            return Ok(());
        }
        let Some(wip_limit) = column.wip_limit else {
            return Ok(());
        };
        let count = self.store.count_in_column(column.id)?;
        if count >= wip_limit {
            return Err(PositionError::CapacityExceeded {
                column_id: column.id,
                wip_limit,
                count,
            });
        }
        Ok(())
    }
}
