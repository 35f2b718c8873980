//! Project/board/column repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist the ownership hierarchy above tasks: projects, boards, columns.
//! - Answer "who owns this board/column" for ownership checks.
//!
//! # Invariants
//! - Column listing is deterministic: `position ASC, id ASC`.
//! - Project listing is deterministic: `created_at ASC, id ASC`.

use crate::model::board::{Board, BoardId, Column, ColumnId, Project, ProjectId, UserId};
use crate::model::normalize_page_limit;
use crate::repo::task_repo::{parse_column_row, COLUMN_SELECT_SQL};
use crate::repo::{ensure_schema_ready, parse_uuid, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row};

const PROJECT_SELECT_SQL: &str = "SELECT
    id,
    name,
    description,
    owner_id,
    created_at,
    updated_at
FROM projects";

const BOARD_SELECT_SQL: &str = "SELECT
    id,
    name,
    project_id,
    created_at,
    updated_at
FROM boards";

/// Repository interface for the project/board/column hierarchy.
pub trait BoardRepository {
    fn insert_project(&self, project: &Project) -> RepoResult<()>;
    fn get_project(&self, id: ProjectId) -> RepoResult<Option<Project>>;
    fn list_projects(&self, owner_id: UserId, skip: u32, limit: Option<u32>)
        -> RepoResult<Vec<Project>>;
    fn insert_board(&self, board: &Board) -> RepoResult<()>;
    fn get_board(&self, id: BoardId) -> RepoResult<Option<Board>>;
    fn list_boards(&self, project_id: ProjectId) -> RepoResult<Vec<Board>>;
    fn insert_column(&self, column: &Column) -> RepoResult<()>;
    fn get_column(&self, id: ColumnId) -> RepoResult<Option<Column>>;
    fn list_columns(&self, board_id: BoardId) -> RepoResult<Vec<Column>>;
    fn count_columns(&self, board_id: BoardId) -> RepoResult<i64>;
    /// Adds `delta` to every column rank `>= from` in one board.
    fn shift_column_positions(&self, board_id: BoardId, from: i64, delta: i64)
        -> RepoResult<usize>;
    /// Owner of the project that holds `board_id`.
    fn board_owner(&self, board_id: BoardId) -> RepoResult<Option<UserId>>;
    /// Owner of the project that holds `column_id`.
    fn column_owner(&self, column_id: ColumnId) -> RepoResult<Option<UserId>>;
}

/// SQLite-backed board repository.
pub struct SqliteBoardRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteBoardRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_schema_ready(conn, &["projects", "boards", "columns"])?;
        Ok(Self { conn })
    }

    pub(crate) fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl BoardRepository for SqliteBoardRepository<'_> {
    fn insert_project(&self, project: &Project) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO projects (id, name, description, owner_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                project.id.to_string(),
                project.name.as_str(),
                project.description.as_deref(),
                project.owner_id.to_string(),
                project.created_at,
                project.updated_at,
            ],
        )?;
        Ok(())
    }

    fn get_project(&self, id: ProjectId) -> RepoResult<Option<Project>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{PROJECT_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_project_row(row)?));
        }
        Ok(None)
    }

    fn list_projects(
        &self,
        owner_id: UserId,
        skip: u32,
        limit: Option<u32>,
    ) -> RepoResult<Vec<Project>> {
        let mut stmt = self.conn.prepare(&format!(
            "{PROJECT_SELECT_SQL}
             WHERE owner_id = ?1
             ORDER BY created_at ASC, id ASC
             LIMIT ?2 OFFSET ?3;"
        ))?;
        let mut rows = stmt.query(params![
            owner_id.to_string(),
            i64::from(normalize_page_limit(limit)),
            i64::from(skip),
        ])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_project_row(row)?);
        }
        Ok(items)
    }

    fn insert_board(&self, board: &Board) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO boards (id, name, project_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                board.id.to_string(),
                board.name.as_str(),
                board.project_id.to_string(),
                board.created_at,
                board.updated_at,
            ],
        )?;
        Ok(())
    }

    fn get_board(&self, id: BoardId) -> RepoResult<Option<Board>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{BOARD_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_board_row(row)?));
        }
        Ok(None)
    }

    fn list_boards(&self, project_id: ProjectId) -> RepoResult<Vec<Board>> {
        let mut stmt = self.conn.prepare(&format!(
            "{BOARD_SELECT_SQL}
             WHERE project_id = ?1
             ORDER BY created_at ASC, id ASC;"
        ))?;
        let mut rows = stmt.query([project_id.to_string()])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_board_row(row)?);
        }
        Ok(items)
    }

    fn insert_column(&self, column: &Column) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO columns (id, title, position, wip_limit, board_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                column.id.to_string(),
                column.title.as_str(),
                column.position,
                column.wip_limit,
                column.board_id.to_string(),
                column.created_at,
                column.updated_at,
            ],
        )?;
        Ok(())
    }

    fn get_column(&self, id: ColumnId) -> RepoResult<Option<Column>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{COLUMN_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_column_row(row)?));
        }
        Ok(None)
    }

    fn list_columns(&self, board_id: BoardId) -> RepoResult<Vec<Column>> {
        let mut stmt = self.conn.prepare(&format!(
            "{COLUMN_SELECT_SQL}
             WHERE board_id = ?1
             ORDER BY position ASC, id ASC;"
        ))?;
        let mut rows = stmt.query([board_id.to_string()])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_column_row(row)?);
        }
        Ok(items)
    }

    fn count_columns(&self, board_id: BoardId) -> RepoResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM columns WHERE board_id = ?1;",
            [board_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn shift_column_positions(
        &self,
        board_id: BoardId,
        from: i64,
        delta: i64,
    ) -> RepoResult<usize> {
        let changed = self.conn.execute(
            "UPDATE columns
             SET position = position + ?3,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE board_id = ?1
               AND position >= ?2;",
            params![board_id.to_string(), from, delta],
        )?;
        Ok(changed)
    }

    fn board_owner(&self, board_id: BoardId) -> RepoResult<Option<UserId>> {
        let owner: Option<String> = self
            .conn
            .query_row(
                "SELECT p.owner_id
                 FROM boards b
                 INNER JOIN projects p ON p.id = b.project_id
                 WHERE b.id = ?1;",
                [board_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        owner
            .map(|value| parse_uuid(&value, "projects.owner_id"))
            .transpose()
    }

    fn column_owner(&self, column_id: ColumnId) -> RepoResult<Option<UserId>> {
        let owner: Option<String> = self
            .conn
            .query_row(
                "SELECT p.owner_id
                 FROM columns c
                 INNER JOIN boards b ON b.id = c.board_id
                 INNER JOIN projects p ON p.id = b.project_id
                 WHERE c.id = ?1;",
                [column_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        owner
            .map(|value| parse_uuid(&value, "projects.owner_id"))
            .transpose()
    }
}

fn parse_project_row(row: &Row<'_>) -> RepoResult<Project> {
    let id_text: String = row.get("id")?;
    let owner_text: String = row.get("owner_id")?;
    Ok(Project {
        id: parse_uuid(&id_text, "projects.id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        owner_id: parse_uuid(&owner_text, "projects.owner_id")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn parse_board_row(row: &Row<'_>) -> RepoResult<Board> {
    let id_text: String = row.get("id")?;
    let project_text: String = row.get("project_id")?;
    Ok(Board {
        id: parse_uuid(&id_text, "boards.id")?,
        name: row.get("name")?,
        project_id: parse_uuid(&project_text, "boards.project_id")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
