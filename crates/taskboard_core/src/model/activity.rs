//! Task activity records.

use crate::model::board::UserId;
use crate::model::task::TaskId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type ActivityId = Uuid;

/// Kind of task mutation recorded in the activity log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    TaskCreated,
    TaskUpdated,
    TaskMoved,
    TaskDeleted,
}

impl ActivityAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TaskCreated => "task_created",
            Self::TaskUpdated => "task_updated",
            Self::TaskMoved => "task_moved",
            Self::TaskDeleted => "task_deleted",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "task_created" => Some(Self::TaskCreated),
            "task_updated" => Some(Self::TaskUpdated),
            "task_moved" => Some(Self::TaskMoved),
            "task_deleted" => Some(Self::TaskDeleted),
            _ => None,
        }
    }
}

/// One persisted activity entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: ActivityId,
    pub action: ActivityAction,
    pub description: Option<String>,
    /// Structured details, e.g. `{"from_column": …, "to_position": …}`.
    pub meta_data: Option<serde_json::Value>,
    pub task_id: Option<TaskId>,
    pub user_id: UserId,
    pub created_at: i64,
}
