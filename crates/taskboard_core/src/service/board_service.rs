//! Account and board-structure use-cases.
//!
//! # Responsibility
//! - Provision users.
//! - Create and read projects, boards and columns on behalf of their owner.
//!
//! # Invariants
//! - Only the owning user may read or extend a project and anything below it.
//! - Column ranks within a board stay dense, like task ranks within a column.

use crate::auth::{ensure_owner, ensure_user, Principal};
use crate::db::now_epoch_ms;
use crate::engine::clamp_rank;
use crate::model::board::{
    normalize_label, Board, BoardId, Column, ColumnId, NewBoard, NewColumn, NewProject, NewUser,
    Project, ProjectId, User, UserId, COLUMN_TITLE_MAX_CHARS, NAME_MAX_CHARS,
};
use crate::repo::account_repo::{AccountRepository, SqliteAccountRepository};
use crate::repo::board_repo::{BoardRepository, SqliteBoardRepository};
use crate::repo::EntityKind;
use crate::service::{ensure_column_owner, unit_of_work, ServiceError};
use rusqlite::Connection;
use uuid::Uuid;

/// Board-structure service bound to one connection.
pub struct BoardService<'conn> {
    conn: &'conn Connection,
}

impl<'conn> BoardService<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Creates an active user. Duplicate username or email is a validation
    /// failure.
    pub fn create_user(&self, new_user: NewUser) -> Result<User, ServiceError> {
        let username = normalize_label("username", &new_user.username, NAME_MAX_CHARS)
            .map_err(ServiceError::Validation)?;
        let email = normalize_label("email", &new_user.email, NAME_MAX_CHARS)
            .map_err(ServiceError::Validation)?;
        if !email.contains('@') {
            return Err(ServiceError::Validation(
                "email must contain `@`".to_string(),
            ));
        }
        let full_name = new_user
            .full_name
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        let now = now_epoch_ms();
        let user = User {
            id: Uuid::new_v4(),
            username,
            email,
            full_name,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        unit_of_work(self.conn, "user_create", |tx| {
            SqliteAccountRepository::new(tx).create_user(&user)?;
            Ok(())
        })?;
        log::info!(
            "event=user_create module=service status=ok user_id={}",
            user.id
        );
        Ok(user)
    }

    pub fn get_user(&self, user_id: UserId) -> Result<User, ServiceError> {
        SqliteAccountRepository::try_new(self.conn)?
            .get_user(user_id)?
            .ok_or_else(|| ServiceError::not_found(EntityKind::User, user_id))
    }

    pub fn create_project(
        &self,
        principal: &Principal,
        new_project: NewProject,
    ) -> Result<Project, ServiceError> {
        let name = normalize_label("project name", &new_project.name, NAME_MAX_CHARS)
            .map_err(ServiceError::Validation)?;
        let now = now_epoch_ms();
        let project = Project {
            id: Uuid::new_v4(),
            name,
            description: new_project.description,
            owner_id: principal.user_id,
            created_at: now,
            updated_at: now,
        };
        unit_of_work(self.conn, "project_create", |tx| {
            SqliteBoardRepository::new(tx).insert_project(&project)?;
            Ok(())
        })?;
        log::info!(
            "event=project_create module=service status=ok project_id={} owner_id={}",
            project.id,
            project.owner_id
        );
        Ok(project)
    }

    /// Lists the principal's own projects, oldest first.
    pub fn list_projects(
        &self,
        principal: &Principal,
        skip: u32,
        limit: Option<u32>,
    ) -> Result<Vec<Project>, ServiceError> {
        Ok(SqliteBoardRepository::try_new(self.conn)?.list_projects(
            principal.user_id,
            skip,
            limit,
        )?)
    }

    pub fn get_project(
        &self,
        principal: &Principal,
        project_id: ProjectId,
    ) -> Result<Project, ServiceError> {
        load_owned_project(&SqliteBoardRepository::try_new(self.conn)?, principal, project_id)
    }

    pub fn create_board(
        &self,
        principal: &Principal,
        new_board: NewBoard,
    ) -> Result<Board, ServiceError> {
        let name = normalize_label("board name", &new_board.name, NAME_MAX_CHARS)
            .map_err(ServiceError::Validation)?;
        let board = unit_of_work(self.conn, "board_create", |tx| {
            let boards = SqliteBoardRepository::new(tx);
            load_owned_project(&boards, principal, new_board.project_id)?;
            let now = now_epoch_ms();
            let board = Board {
                id: Uuid::new_v4(),
                name: name.clone(),
                project_id: new_board.project_id,
                created_at: now,
                updated_at: now,
            };
            boards.insert_board(&board)?;
            Ok(board)
        })?;
        log::info!(
            "event=board_create module=service status=ok board_id={} project_id={}",
            board.id,
            board.project_id
        );
        Ok(board)
    }

    pub fn list_boards(
        &self,
        principal: &Principal,
        project_id: ProjectId,
    ) -> Result<Vec<Board>, ServiceError> {
        let boards = SqliteBoardRepository::try_new(self.conn)?;
        load_owned_project(&boards, principal, project_id)?;
        Ok(boards.list_boards(project_id)?)
    }

    pub fn get_board(
        &self,
        principal: &Principal,
        board_id: BoardId,
    ) -> Result<Board, ServiceError> {
        let boards = SqliteBoardRepository::try_new(self.conn)?;
        load_owned_board(&boards, principal, board_id)
    }

    /// Creates a column at the tail of its board, or at the clamped
    /// `position` with later siblings shifted up.
    pub fn create_column(
        &self,
        principal: &Principal,
        new_column: NewColumn,
    ) -> Result<Column, ServiceError> {
        let title = normalize_label("column title", &new_column.title, COLUMN_TITLE_MAX_CHARS)
            .map_err(ServiceError::Validation)?;
        if matches!(new_column.wip_limit, Some(limit) if limit < 1) {
            return Err(ServiceError::Validation(
                "wip_limit must be at least 1".to_string(),
            ));
        }

        let column = unit_of_work(self.conn, "column_create", |tx| {
            let boards = SqliteBoardRepository::new(tx);
            load_owned_board(&boards, principal, new_column.board_id)?;

            let count = boards.count_columns(new_column.board_id)?;
            let position = match new_column.position {
                Some(requested) => clamp_rank(i64::from(requested), count),
                None => count,
            };
            boards.shift_column_positions(new_column.board_id, position, 1)?;

            let now = now_epoch_ms();
            let column = Column {
                id: Uuid::new_v4(),
                title: title.clone(),
                position,
                wip_limit: new_column.wip_limit,
                board_id: new_column.board_id,
                created_at: now,
                updated_at: now,
            };
            boards.insert_column(&column)?;
            Ok(column)
        })?;
        log::info!(
            "event=column_create module=service status=ok column_id={} board_id={} position={}",
            column.id,
            column.board_id,
            column.position
        );
        Ok(column)
    }

    /// Lists a board's columns in rank order.
    pub fn list_columns(
        &self,
        principal: &Principal,
        board_id: BoardId,
    ) -> Result<Vec<Column>, ServiceError> {
        let boards = SqliteBoardRepository::try_new(self.conn)?;
        load_owned_board(&boards, principal, board_id)?;
        Ok(boards.list_columns(board_id)?)
    }

    pub fn get_column(
        &self,
        principal: &Principal,
        column_id: ColumnId,
    ) -> Result<Column, ServiceError> {
        let boards = SqliteBoardRepository::try_new(self.conn)?;
        ensure_column_owner(&boards, principal, column_id)?;
        boards
            .get_column(column_id)?
            .ok_or_else(|| ServiceError::not_found(EntityKind::Column, column_id))
    }
}

fn load_owned_project(
    boards: &impl BoardRepository,
    principal: &Principal,
    project_id: ProjectId,
) -> Result<Project, ServiceError> {
    let project = boards
        .get_project(project_id)?
        .ok_or_else(|| ServiceError::not_found(EntityKind::Project, project_id))?;
    ensure_owner(principal, &project)?;
    Ok(project)
}

fn load_owned_board(
    boards: &impl BoardRepository,
    principal: &Principal,
    board_id: BoardId,
) -> Result<Board, ServiceError> {
    let owner = boards
        .board_owner(board_id)?
        .ok_or_else(|| ServiceError::not_found(EntityKind::Board, board_id))?;
    ensure_user(principal, owner)?;
    boards
        .get_board(board_id)?
        .ok_or_else(|| ServiceError::not_found(EntityKind::Board, board_id))
}
