//! Account and board-structure records.
//!
//! Projects are owned by one user. Boards hang off a project and columns off a
//! board; column `position` orders columns within their board the same way
//! task `position` orders tasks within a column.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type UserId = Uuid;
pub type ProjectId = Uuid;
pub type BoardId = Uuid;
pub type ColumnId = Uuid;

/// Maximum project/board name length in characters.
pub const NAME_MAX_CHARS: usize = 255;
/// Maximum column title length in characters.
pub const COLUMN_TITLE_MAX_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: UserId,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    pub id: BoardId,
    pub name: String,
    pub project_id: ProjectId,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Board column holding an ordered task list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub id: ColumnId,
    pub title: String,
    /// Rank among sibling columns of the same board.
    pub position: i64,
    /// Optional capacity limit. Enforced only under `CapacityPolicy::Enforce`.
    pub wip_limit: Option<i64>,
    pub board_id: BoardId,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProject {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBoard {
    pub project_id: ProjectId,
    pub name: String,
}

/// Column creation payload. Without `position` the column goes to the tail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewColumn {
    pub board_id: BoardId,
    pub title: String,
    #[serde(default)]
    pub position: Option<u32>,
    #[serde(default)]
    pub wip_limit: Option<i64>,
}

/// Trims `value` and checks it is non-empty and at most `max_chars` long.
///
/// Returns the trimmed value, or a message naming `field`.
pub fn normalize_label(field: &str, value: &str, max_chars: usize) -> Result<String, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(format!("{field} must not be blank"));
    }
    if trimmed.chars().count() > max_chars {
        return Err(format!("{field} must be at most {max_chars} characters"));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::normalize_label;

    #[test]
    fn normalize_label_trims_and_bounds() {
        assert_eq!(normalize_label("name", "  Inbox ", 10).unwrap(), "Inbox");
        assert!(normalize_label("name", "   ", 10)
            .unwrap_err()
            .contains("blank"));
        assert!(normalize_label("name", "abcdef", 5)
            .unwrap_err()
            .contains("at most 5"));
    }
}
