//! Activity log persistence.
//!
//! Entries are append-only. `task_id` is stored without a foreign key so the
//! `task_deleted` entry survives the row it describes.

use crate::model::activity::{ActivityAction, ActivityEntry};
use crate::model::task::TaskId;
use crate::repo::{ensure_schema_ready, parse_optional_uuid, parse_uuid, RepoError, RepoResult};
use rusqlite::{params, Connection, Row};

/// Repository interface for task activity.
pub trait ActivityRepository {
    fn append(&self, entry: &ActivityEntry) -> RepoResult<()>;
    /// Lists entries for one task, newest first.
    fn list_for_task(&self, task_id: TaskId) -> RepoResult<Vec<ActivityEntry>>;
}

/// SQLite-backed activity repository.
pub struct SqliteActivityRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteActivityRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_schema_ready(conn, &["activity_logs"])?;
        Ok(Self { conn })
    }

    pub(crate) fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl ActivityRepository for SqliteActivityRepository<'_> {
    fn append(&self, entry: &ActivityEntry) -> RepoResult<()> {
        let meta_data = entry
            .meta_data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|err| RepoError::InvalidData(format!("activity meta_data: {err}")))?;
        self.conn.execute(
            "INSERT INTO activity_logs (id, action, description, meta_data, task_id, user_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                entry.id.to_string(),
                entry.action.as_str(),
                entry.description.as_deref(),
                meta_data,
                entry.task_id.map(|value| value.to_string()),
                entry.user_id.to_string(),
                entry.created_at,
            ],
        )?;
        Ok(())
    }

    fn list_for_task(&self, task_id: TaskId) -> RepoResult<Vec<ActivityEntry>> {
        // rowid breaks ties between entries written in the same millisecond.
        let mut stmt = self.conn.prepare(
            "SELECT id, action, description, meta_data, task_id, user_id, created_at
             FROM activity_logs
             WHERE task_id = ?1
             ORDER BY created_at DESC, rowid DESC;",
        )?;
        let mut rows = stmt.query([task_id.to_string()])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_activity_row(row)?);
        }
        Ok(items)
    }
}

fn parse_activity_row(row: &Row<'_>) -> RepoResult<ActivityEntry> {
    let id_text: String = row.get("id")?;
    let user_text: String = row.get("user_id")?;
    let action_text: String = row.get("action")?;
    let action = ActivityAction::parse(&action_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid activity action `{action_text}` in activity_logs.action"
        ))
    })?;
    let meta_text: Option<String> = row.get("meta_data")?;
    let meta_data = meta_text
        .map(|value| serde_json::from_str(&value))
        .transpose()
        .map_err(|err| RepoError::InvalidData(format!("activity_logs.meta_data: {err}")))?;

    Ok(ActivityEntry {
        id: parse_uuid(&id_text, "activity_logs.id")?,
        action,
        description: row.get("description")?,
        meta_data,
        task_id: parse_optional_uuid(row.get("task_id")?, "activity_logs.task_id")?,
        user_id: parse_uuid(&user_text, "activity_logs.user_id")?,
        created_at: row.get("created_at")?,
    })
}
