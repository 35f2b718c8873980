//! Task store contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide row lookup, filtered listing, range rank shifts and row writes
//!   over the `tasks` table, plus the column lookups the position engine needs.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - Listing is deterministic: `position ASC, column_id ASC, id ASC`.
//! - Store methods never open their own transaction; callers run them inside
//!   the unit of work that must be atomic.

use crate::model::board::{Column, ColumnId, UserId};
use crate::model::normalize_page_limit;
use crate::model::task::{Task, TaskId, TaskListQuery, TaskPriority};
use crate::repo::{
    ensure_schema_ready, parse_optional_uuid, parse_uuid, EntityKind, RepoError, RepoResult,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};

const TASK_SELECT_SQL: &str = "SELECT
    t.id AS id,
    t.title AS title,
    t.description AS description,
    t.position AS position,
    t.priority AS priority,
    t.due_at AS due_at,
    t.column_id AS column_id,
    t.assignee_id AS assignee_id,
    t.created_by AS created_by,
    t.created_at AS created_at,
    t.updated_at AS updated_at
FROM tasks t";

pub(crate) const COLUMN_SELECT_SQL: &str = "SELECT
    id,
    title,
    position,
    wip_limit,
    board_id,
    created_at,
    updated_at
FROM columns";

/// Inclusive rank interval inside one column. `end: None` is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankRange {
    pub start: i64,
    pub end: Option<i64>,
}

impl RankRange {
    /// `[start, +inf)`.
    pub fn from(start: i64) -> Self {
        Self { start, end: None }
    }

    /// `[start, end]`.
    pub fn between(start: i64, end: i64) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }

    /// Returns whether the interval contains no rank.
    pub fn is_empty(&self) -> bool {
        matches!(self.end, Some(end) if end < self.start)
    }

    pub fn contains(&self, rank: i64) -> bool {
        rank >= self.start && self.end.map_or(true, |end| rank <= end)
    }
}

/// Store adapter consumed by the position engine and the lifecycle service.
pub trait TaskStore {
    /// Loads one task by id.
    fn find_task(&self, id: TaskId) -> RepoResult<Option<Task>>;
    /// Loads one column by id.
    fn find_column(&self, id: ColumnId) -> RepoResult<Option<Column>>;
    /// Lists tasks by filter, optionally restricted to projects owned by `owner_id`.
    fn list_tasks(&self, query: &TaskListQuery, owner_id: Option<UserId>)
        -> RepoResult<Vec<Task>>;
    /// Returns `(task_id, position)` pairs of a column ordered by rank, then id.
    fn column_positions(&self, column_id: ColumnId) -> RepoResult<Vec<(TaskId, i64)>>;
    /// Counts tasks in a column.
    fn count_in_column(&self, column_id: ColumnId) -> RepoResult<i64>;
    /// Returns `max(position) + 1`, or `0` for an empty column.
    fn next_position(&self, column_id: ColumnId) -> RepoResult<i64>;
    /// Adds `delta` to the rank of every task in `column_id` whose rank lies in
    /// `range`, skipping `exclude`. Returns the number of shifted rows.
    fn shift_positions(
        &self,
        column_id: ColumnId,
        range: RankRange,
        delta: i64,
        exclude: Option<TaskId>,
    ) -> RepoResult<usize>;
    /// Inserts a task row as-is.
    fn insert_task(&self, task: &Task) -> RepoResult<()>;
    /// Rewrites the non-rank fields of a task.
    fn update_task_fields(&self, task: &Task) -> RepoResult<()>;
    /// Sets the column and rank of one task.
    fn place_task(&self, id: TaskId, column_id: ColumnId, position: i64) -> RepoResult<()>;
    /// Deletes one task row.
    fn delete_task(&self, id: TaskId) -> RepoResult<()>;
}

/// SQLite-backed task store.
pub struct SqliteTaskStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTaskStore<'conn> {
    /// Creates a store from a migrated connection, verifying the schema.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_schema_ready(conn, &["columns", "tasks"])?;
        Ok(Self { conn })
    }

    /// Creates a store without schema checks. Used inside service
    /// transactions whose connection was already verified.
    pub(crate) fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl TaskStore for SqliteTaskStore<'_> {
    fn find_task(&self, id: TaskId) -> RepoResult<Option<Task>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{TASK_SELECT_SQL} WHERE t.id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_task_row(row)?));
        }
        Ok(None)
    }

    fn find_column(&self, id: ColumnId) -> RepoResult<Option<Column>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{COLUMN_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_column_row(row)?));
        }
        Ok(None)
    }

    fn list_tasks(
        &self,
        query: &TaskListQuery,
        owner_id: Option<UserId>,
    ) -> RepoResult<Vec<Task>> {
        let mut sql = TASK_SELECT_SQL.to_string();
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(owner_id) = owner_id {
            sql.push_str(
                " INNER JOIN columns c ON c.id = t.column_id
                  INNER JOIN boards b ON b.id = c.board_id
                  INNER JOIN projects p ON p.id = b.project_id
                  WHERE p.owner_id = ?",
            );
            bind_values.push(Value::Text(owner_id.to_string()));
        } else {
            sql.push_str(" WHERE 1 = 1");
        }

        if let Some(column_id) = query.column_id {
            sql.push_str(" AND t.column_id = ?");
            bind_values.push(Value::Text(column_id.to_string()));
        }
        if let Some(priority) = query.priority {
            sql.push_str(" AND t.priority = ?");
            bind_values.push(Value::Text(priority.as_str().to_string()));
        }
        if let Some(assignee_id) = query.assignee_id {
            sql.push_str(" AND t.assignee_id = ?");
            bind_values.push(Value::Text(assignee_id.to_string()));
        }

        sql.push_str(" ORDER BY t.position ASC, t.column_id ASC, t.id ASC LIMIT ? OFFSET ?");
        bind_values.push(Value::Integer(i64::from(normalize_page_limit(query.limit))));
        bind_values.push(Value::Integer(i64::from(query.skip)));

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut tasks = Vec::new();
        while let Some(row) = rows.next()? {
            tasks.push(parse_task_row(row)?);
        }
        Ok(tasks)
    }

    fn column_positions(&self, column_id: ColumnId) -> RepoResult<Vec<(TaskId, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, position
             FROM tasks
             WHERE column_id = ?1
             ORDER BY position ASC, id ASC;",
        )?;
        let mut rows = stmt.query([column_id.to_string()])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            let id_text: String = row.get(0)?;
            items.push((parse_uuid(&id_text, "tasks.id")?, row.get(1)?));
        }
        Ok(items)
    }

    fn count_in_column(&self, column_id: ColumnId) -> RepoResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM tasks WHERE column_id = ?1;",
            [column_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn next_position(&self, column_id: ColumnId) -> RepoResult<i64> {
        let next = self.conn.query_row(
            "SELECT COALESCE(MAX(position), -1) + 1
             FROM tasks
             WHERE column_id = ?1;",
            [column_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(next)
    }

    fn shift_positions(
        &self,
        column_id: ColumnId,
        range: RankRange,
        delta: i64,
        exclude: Option<TaskId>,
    ) -> RepoResult<usize> {
        if range.is_empty() || delta == 0 {
            return Ok(0);
        }
        let changed = self.conn.execute(
            "UPDATE tasks
             SET position = position + ?2,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE column_id = ?1
               AND position >= ?3
               AND (?4 IS NULL OR position <= ?4)
               AND (?5 IS NULL OR id <> ?5);",
            params![
                column_id.to_string(),
                delta,
                range.start,
                range.end,
                exclude.map(|value| value.to_string()),
            ],
        )?;
        Ok(changed)
    }

    fn insert_task(&self, task: &Task) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO tasks (
                id,
                title,
                description,
                position,
                priority,
                due_at,
                column_id,
                assignee_id,
                created_by,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11);",
            params![
                task.id.to_string(),
                task.title.as_str(),
                task.description.as_deref(),
                task.position,
                task.priority.as_str(),
                task.due_at,
                task.column_id.to_string(),
                task.assignee_id.map(|value| value.to_string()),
                task.created_by.to_string(),
                task.created_at,
                task.updated_at,
            ],
        )?;
        Ok(())
    }

    fn update_task_fields(&self, task: &Task) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE tasks
             SET
                title = ?2,
                description = ?3,
                priority = ?4,
                due_at = ?5,
                assignee_id = ?6,
                updated_at = ?7
             WHERE id = ?1;",
            params![
                task.id.to_string(),
                task.title.as_str(),
                task.description.as_deref(),
                task.priority.as_str(),
                task.due_at,
                task.assignee_id.map(|value| value.to_string()),
                task.updated_at,
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found(EntityKind::Task, task.id));
        }
        Ok(())
    }

    fn place_task(&self, id: TaskId, column_id: ColumnId, position: i64) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE tasks
             SET column_id = ?2,
                 position = ?3,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![id.to_string(), column_id.to_string(), position],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found(EntityKind::Task, id));
        }
        Ok(())
    }

    fn delete_task(&self, id: TaskId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM tasks WHERE id = ?1;", [id.to_string()])?;
        if changed == 0 {
            return Err(RepoError::not_found(EntityKind::Task, id));
        }
        Ok(())
    }
}

/// Returns the id of every column, ordered by board then rank.
pub fn list_all_column_ids(conn: &Connection) -> RepoResult<Vec<ColumnId>> {
    let mut stmt = conn.prepare("SELECT id FROM columns ORDER BY board_id ASC, position ASC;")?;
    let mut rows = stmt.query([])?;
    let mut ids = Vec::new();
    while let Some(row) = rows.next()? {
        let value: String = row.get(0)?;
        ids.push(parse_uuid(&value, "columns.id")?);
    }
    Ok(ids)
}

fn parse_task_row(row: &Row<'_>) -> RepoResult<Task> {
    let id_text: String = row.get("id")?;
    let column_text: String = row.get("column_id")?;
    let creator_text: String = row.get("created_by")?;

    let priority_text: String = row.get("priority")?;
    let priority = TaskPriority::parse(&priority_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid task priority `{priority_text}` in tasks.priority"
        ))
    })?;

    Ok(Task {
        id: parse_uuid(&id_text, "tasks.id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        priority,
        due_at: row.get("due_at")?,
        position: row.get("position")?,
        column_id: parse_uuid(&column_text, "tasks.column_id")?,
        assignee_id: parse_optional_uuid(row.get("assignee_id")?, "tasks.assignee_id")?,
        created_by: parse_uuid(&creator_text, "tasks.created_by")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub(crate) fn parse_column_row(row: &Row<'_>) -> RepoResult<Column> {
    let id_text: String = row.get("id")?;
    let board_text: String = row.get("board_id")?;
    Ok(Column {
        id: parse_uuid(&id_text, "columns.id")?,
        title: row.get("title")?,
        position: row.get("position")?,
        wip_limit: row.get("wip_limit")?,
        board_id: parse_uuid(&board_text, "columns.board_id")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
