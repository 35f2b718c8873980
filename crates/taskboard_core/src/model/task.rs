//! Task domain model.
//!
//! # Responsibility
//! - Define the task record and the request shapes that create, patch and move it.
//! - Validate task fields before they reach persistence.
//!
//! # Invariants
//! - `position` is the task's rank among tasks sharing `column_id`.
//! - A `TaskPatch` never carries rank or column changes; those go through
//!   `TaskMove` and the position engine.

use crate::model::board::{ColumnId, UserId};
use serde::{Deserialize, Deserializer, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type TaskId = Uuid;

/// Maximum task title length in characters.
pub const TASK_TITLE_MAX_CHARS: usize = 255;

/// Task priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
}

impl TaskPriority {
    /// Stable storage/wire value.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Parses a stable storage/wire value.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

/// Canonical task record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: Option<String>,
    pub priority: TaskPriority,
    /// Unix epoch milliseconds.
    pub due_at: Option<i64>,
    /// Rank among siblings in `column_id`, dense from 0.
    pub position: i64,
    pub column_id: ColumnId,
    pub assignee_id: Option<UserId>,
    pub created_by: UserId,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Validation errors for task fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskValidationError {
    BlankTitle,
    TitleTooLong { max_chars: usize },
}

impl Display for TaskValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankTitle => write!(f, "task title must not be blank"),
            Self::TitleTooLong { max_chars } => {
                write!(f, "task title must be at most {max_chars} characters")
            }
        }
    }
}

impl Error for TaskValidationError {}

/// Trims and bounds a task title.
pub fn normalize_task_title(title: &str) -> Result<String, TaskValidationError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(TaskValidationError::BlankTitle);
    }
    if trimmed.chars().count() > TASK_TITLE_MAX_CHARS {
        return Err(TaskValidationError::TitleTooLong {
            max_chars: TASK_TITLE_MAX_CHARS,
        });
    }
    Ok(trimmed.to_string())
}

/// Payload for creating a task. The rank is never caller-supplied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTask {
    pub column_id: ColumnId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub due_at: Option<i64>,
    #[serde(default)]
    pub assignee_id: Option<UserId>,
}

impl NewTask {
    pub fn new(column_id: ColumnId, title: impl Into<String>) -> Self {
        Self {
            column_id,
            title: title.into(),
            description: None,
            priority: TaskPriority::default(),
            due_at: None,
            assignee_id: None,
        }
    }
}

/// Partial task update.
///
/// Outer `None` means "leave untouched". For nullable fields the inner
/// `Option` distinguishes an explicit `null` (clear) from a new value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(
        default,
        deserialize_with = "present_or_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<TaskPriority>,
    #[serde(
        default,
        deserialize_with = "present_or_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub due_at: Option<Option<i64>>,
    #[serde(
        default,
        deserialize_with = "present_or_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub assignee_id: Option<Option<UserId>>,
}

impl TaskPatch {
    /// Returns whether the patch carries no field at all.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.priority.is_none()
            && self.due_at.is_none()
            && self.assignee_id.is_none()
    }

    /// Names of the fields present in the patch, in declaration order.
    pub fn changed_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.title.is_some() {
            fields.push("title");
        }
        if self.description.is_some() {
            fields.push("description");
        }
        if self.priority.is_some() {
            fields.push("priority");
        }
        if self.due_at.is_some() {
            fields.push("due_at");
        }
        if self.assignee_id.is_some() {
            fields.push("assignee_id");
        }
        fields
    }

    /// Merges present fields into `task`. Rank and column are never touched.
    pub fn apply_to(&self, task: &mut Task) -> Result<(), TaskValidationError> {
        if let Some(title) = &self.title {
            task.title = normalize_task_title(title)?;
        }
        if let Some(description) = &self.description {
            task.description = description.clone();
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(due_at) = self.due_at {
            task.due_at = due_at;
        }
        if let Some(assignee_id) = self.assignee_id {
            task.assignee_id = assignee_id;
        }
        Ok(())
    }
}

// A present key always lands here, so `null` becomes `Some(None)`; an absent
// key falls back to `#[serde(default)]` and stays `None`.
fn present_or_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Move request: destination column and requested rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskMove {
    pub column_id: ColumnId,
    pub position: u32,
}

/// Filter and paging options for task listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskListQuery {
    #[serde(default)]
    pub column_id: Option<ColumnId>,
    #[serde(default)]
    pub priority: Option<TaskPriority>,
    #[serde(default)]
    pub assignee_id: Option<UserId>,
    #[serde(default)]
    pub skip: u32,
    #[serde(default)]
    pub limit: Option<u32>,
}
