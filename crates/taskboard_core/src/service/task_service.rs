//! Task lifecycle service.
//!
//! # Responsibility
//! - Provide create/get/list/update/move/delete for tasks.
//! - Delegate rank bookkeeping to the position engine.
//! - Record one activity entry per mutation inside the same transaction.
//!
//! # Invariants
//! - Every mutating call is one unit of work (see [`super::unit_of_work`]).
//! - `update_task` never touches rank or column.
//! - Callers only see tasks in projects they own.

use crate::auth::Principal;
use crate::db::now_epoch_ms;
use crate::engine::{CapacityPolicy, DensityViolation, PositionEngine};
use crate::model::activity::{ActivityAction, ActivityEntry};
use crate::model::board::{ColumnId, UserId};
use crate::model::task::{
    normalize_task_title, NewTask, Task, TaskId, TaskListQuery, TaskMove, TaskPatch,
};
use crate::repo::account_repo::{AccountRepository, SqliteAccountRepository};
use crate::repo::activity_repo::{ActivityRepository, SqliteActivityRepository};
use crate::repo::board_repo::SqliteBoardRepository;
use crate::repo::task_repo::{list_all_column_ids, SqliteTaskStore, TaskStore};
use crate::repo::EntityKind;
use crate::service::{ensure_column_owner, unit_of_work, ServiceError};
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

/// Task service bound to one connection.
pub struct TaskService<'conn> {
    conn: &'conn Connection,
    policy: CapacityPolicy,
}

impl<'conn> TaskService<'conn> {
    pub fn new(conn: &'conn Connection, policy: CapacityPolicy) -> Self {
        Self { conn, policy }
    }

    /// Creates a task at the tail of its column.
    pub fn create_task(
        &self,
        principal: &Principal,
        new_task: NewTask,
    ) -> Result<Task, ServiceError> {
        let title = normalize_task_title(&new_task.title)
            .map_err(|err| ServiceError::Validation(err.to_string()))?;

        let task = unit_of_work(self.conn, "task_create", |tx| {
            ensure_column_owner(
                &SqliteBoardRepository::new(tx),
                principal,
                new_task.column_id,
            )?;
            ensure_assignee_exists(&SqliteAccountRepository::new(tx), new_task.assignee_id)?;

            let now = now_epoch_ms();
            let draft = Task {
                id: Uuid::new_v4(),
                title: title.clone(),
                description: new_task.description.clone(),
                priority: new_task.priority,
                due_at: new_task.due_at,
                position: 0,
                column_id: new_task.column_id,
                assignee_id: new_task.assignee_id,
                created_by: principal.user_id,
                created_at: now,
                updated_at: now,
            };
            let task = PositionEngine::new(SqliteTaskStore::new(tx), self.policy).append(draft)?;
            record(
                tx,
                principal,
                ActivityAction::TaskCreated,
                task.id,
                format!("Task '{}' created", task.title),
                json!({ "column_id": task.column_id, "position": task.position }),
            )?;
            Ok(task)
        })?;

        log::info!(
            "event=task_create module=service status=ok task_id={} column_id={} position={}",
            task.id,
            task.column_id,
            task.position
        );
        Ok(task)
    }

    /// Loads one task the principal can see.
    pub fn get_task(&self, principal: &Principal, task_id: TaskId) -> Result<Task, ServiceError> {
        let task = SqliteTaskStore::try_new(self.conn)?
            .find_task(task_id)?
            .ok_or_else(|| ServiceError::not_found(EntityKind::Task, task_id))?;
        ensure_column_owner(
            &SqliteBoardRepository::try_new(self.conn)?,
            principal,
            task.column_id,
        )?;
        Ok(task)
    }

    /// Lists tasks ordered by rank, then column, then id.
    ///
    /// With a column filter the column must belong to the principal; without
    /// one, only tasks in the principal's projects are returned.
    pub fn list_tasks(
        &self,
        principal: &Principal,
        query: &TaskListQuery,
    ) -> Result<Vec<Task>, ServiceError> {
        let store = SqliteTaskStore::try_new(self.conn)?;
        match query.column_id {
            Some(column_id) => {
                ensure_column_owner(
                    &SqliteBoardRepository::try_new(self.conn)?,
                    principal,
                    column_id,
                )?;
                Ok(store.list_tasks(query, None)?)
            }
            None => Ok(store.list_tasks(query, Some(principal.user_id))?),
        }
    }

    /// Lists one column's tasks in rank order.
    pub fn list_column_tasks(
        &self,
        principal: &Principal,
        column_id: ColumnId,
        skip: u32,
        limit: Option<u32>,
    ) -> Result<Vec<Task>, ServiceError> {
        let query = TaskListQuery {
            column_id: Some(column_id),
            skip,
            limit,
            ..TaskListQuery::default()
        };
        self.list_tasks(principal, &query)
    }

    /// Merges `patch` into a task. An empty patch returns the task unchanged.
    pub fn update_task(
        &self,
        principal: &Principal,
        task_id: TaskId,
        patch: TaskPatch,
    ) -> Result<Task, ServiceError> {
        if patch.is_empty() {
            return self.get_task(principal, task_id);
        }

        let task = unit_of_work(self.conn, "task_update", |tx| {
            let store = SqliteTaskStore::new(tx);
            let mut task = store
                .find_task(task_id)?
                .ok_or_else(|| ServiceError::not_found(EntityKind::Task, task_id))?;
            ensure_column_owner(&SqliteBoardRepository::new(tx), principal, task.column_id)?;
            if let Some(assignee_id) = patch.assignee_id {
                ensure_assignee_exists(&SqliteAccountRepository::new(tx), assignee_id)?;
            }

            patch
                .apply_to(&mut task)
                .map_err(|err| ServiceError::Validation(err.to_string()))?;
            task.updated_at = now_epoch_ms();
            store.update_task_fields(&task)?;
            record(
                tx,
                principal,
                ActivityAction::TaskUpdated,
                task.id,
                format!("Task '{}' updated", task.title),
                json!({ "fields": patch.changed_fields() }),
            )?;
            Ok(task)
        })?;

        log::info!(
            "event=task_update module=service status=ok task_id={} fields={}",
            task.id,
            patch.changed_fields().join(",")
        );
        Ok(task)
    }

    /// Moves a task to a column and rank. Out-of-range ranks are clamped.
    pub fn move_task(
        &self,
        principal: &Principal,
        task_id: TaskId,
        request: TaskMove,
    ) -> Result<Task, ServiceError> {
        let outcome = unit_of_work(self.conn, "task_move", |tx| {
            let boards = SqliteBoardRepository::new(tx);
            let engine = PositionEngine::new(SqliteTaskStore::new(tx), self.policy);
            let current = engine
                .store()
                .find_task(task_id)?
                .ok_or_else(|| ServiceError::not_found(EntityKind::Task, task_id))?;
            ensure_column_owner(&boards, principal, current.column_id)?;
            if request.column_id != current.column_id {
                ensure_column_owner(&boards, principal, request.column_id)?;
            }

            let outcome =
                engine.move_task(task_id, request.column_id, i64::from(request.position))?;
            if outcome.changed() {
                record(
                    tx,
                    principal,
                    ActivityAction::TaskMoved,
                    task_id,
                    format!("Task '{}' moved", outcome.task.title),
                    json!({
                        "from_column": outcome.from_column,
                        "from_position": outcome.from_position,
                        "to_column": outcome.task.column_id,
                        "to_position": outcome.task.position,
                    }),
                )?;
            }
            Ok(outcome)
        })?;

        log::info!(
            "event=task_move module=service status=ok task_id={} from_column={} from_position={} to_column={} to_position={} requested={}",
            task_id,
            outcome.from_column,
            outcome.from_position,
            outcome.task.column_id,
            outcome.task.position,
            request.position
        );
        Ok(outcome.task)
    }

    /// Deletes a task and closes the gap it leaves.
    pub fn delete_task(&self, principal: &Principal, task_id: TaskId) -> Result<(), ServiceError> {
        let removed = unit_of_work(self.conn, "task_delete", |tx| {
            let engine = PositionEngine::new(SqliteTaskStore::new(tx), self.policy);
            let current = engine
                .store()
                .find_task(task_id)?
                .ok_or_else(|| ServiceError::not_found(EntityKind::Task, task_id))?;
            ensure_column_owner(&SqliteBoardRepository::new(tx), principal, current.column_id)?;

            let removed = engine.delete(task_id)?;
            record(
                tx,
                principal,
                ActivityAction::TaskDeleted,
                task_id,
                format!("Task '{}' deleted", removed.title),
                json!({ "column_id": removed.column_id, "position": removed.position }),
            )?;
            Ok(removed)
        })?;

        log::info!(
            "event=task_delete module=service status=ok task_id={} column_id={} position={}",
            task_id,
            removed.column_id,
            removed.position
        );
        Ok(())
    }

    /// Lists a task's activity, newest first.
    ///
    /// Once a task is deleted its history stays readable by the user who
    /// deleted it.
    pub fn list_activity(
        &self,
        principal: &Principal,
        task_id: TaskId,
    ) -> Result<Vec<ActivityEntry>, ServiceError> {
        let entries = SqliteActivityRepository::try_new(self.conn)?.list_for_task(task_id)?;
        match SqliteTaskStore::try_new(self.conn)?.find_task(task_id)? {
            Some(task) => {
                ensure_column_owner(
                    &SqliteBoardRepository::try_new(self.conn)?,
                    principal,
                    task.column_id,
                )?;
                Ok(entries)
            }
            None => {
                let deleted_by = entries
                    .iter()
                    .find(|entry| entry.action == ActivityAction::TaskDeleted)
                    .map(|entry| entry.user_id)
                    .ok_or_else(|| ServiceError::not_found(EntityKind::Task, task_id))?;
                crate::auth::ensure_user(principal, deleted_by)?;
                Ok(entries)
            }
        }
    }

    /// Renumbers a column the principal owns. Returns the rows rewritten.
    pub fn compact_column(
        &self,
        principal: &Principal,
        column_id: ColumnId,
    ) -> Result<usize, ServiceError> {
        unit_of_work(self.conn, "column_compact", |tx| {
            ensure_column_owner(&SqliteBoardRepository::new(tx), principal, column_id)?;
            Ok(PositionEngine::new(SqliteTaskStore::new(tx), self.policy).compact(column_id)?)
        })
    }

    /// Renumbers any column. Operator entry point without ownership checks.
    pub fn repair_column(&self, column_id: ColumnId) -> Result<usize, ServiceError> {
        unit_of_work(self.conn, "column_repair", |tx| {
            Ok(PositionEngine::new(SqliteTaskStore::new(tx), self.policy).compact(column_id)?)
        })
    }

    /// Audits every column and returns those whose ranks are not dense.
    pub fn audit_all(&self) -> Result<Vec<DensityViolation>, ServiceError> {
        let engine = PositionEngine::new(SqliteTaskStore::try_new(self.conn)?, self.policy);
        let mut violations = Vec::new();
        for column_id in list_all_column_ids(self.conn)? {
            if let Some(violation) = engine.audit(column_id)? {
                log::warn!(
                    "event=rank_audit module=service status=violation column_id={} count={}",
                    column_id,
                    violation.expected_count
                );
                violations.push(violation);
            }
        }
        Ok(violations)
    }
}

fn ensure_assignee_exists(
    accounts: &impl AccountRepository,
    assignee_id: Option<UserId>,
) -> Result<(), ServiceError> {
    match assignee_id {
        Some(id) if !accounts.user_exists(id)? => Err(ServiceError::Validation(format!(
            "assignee does not exist: {id}"
        ))),
        _ => Ok(()),
    }
}

fn record(
    conn: &Connection,
    principal: &Principal,
    action: ActivityAction,
    task_id: TaskId,
    description: String,
    meta_data: serde_json::Value,
) -> Result<(), ServiceError> {
    SqliteActivityRepository::new(conn).append(&ActivityEntry {
        id: Uuid::new_v4(),
        action,
        description: Some(description),
        meta_data: Some(meta_data),
        task_id: Some(task_id),
        user_id: principal.user_id,
        created_at: now_epoch_ms(),
    })?;
    Ok(())
}
