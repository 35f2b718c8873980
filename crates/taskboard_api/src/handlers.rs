//! Request handlers.
//!
//! Handlers only translate HTTP into service calls. Ownership, validation and
//! rank bookkeeping all live in the core services.

use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath, ApiQuery, Bearer};
use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use taskboard_core::{
    core_version, ActivityEntry, Board, BoardId, BoardService, Column, ColumnId, IssuedToken,
    NewBoard, NewColumn, NewProject, NewTask, Project, ProjectId, SqliteTokenGate, Task, TaskId,
    TaskListQuery, TaskMove, TaskPatch, TaskService, User,
};

type ApiResult<T> = Result<T, ApiError>;

/// Offset paging shared by list endpoints.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Paging {
    #[serde(default)]
    pub skip: u32,
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthBody {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactBody {
    pub column_id: ColumnId,
    pub rewritten: usize,
}

pub async fn health(State(state): State<AppState>) -> ApiResult<Json<HealthBody>> {
    state
        .run_public(|conn| {
            conn.query_row("SELECT 1;", [], |_| Ok(()))?;
            Ok(())
        })
        .await?;
    Ok(Json(HealthBody {
        status: "ok".to_string(),
        version: core_version().to_string(),
    }))
}

// Auth

pub async fn current_user(State(state): State<AppState>, bearer: Bearer) -> ApiResult<Json<User>> {
    let user = state
        .run_as(bearer, move |conn, principal, _| {
            BoardService::new(conn).get_user(principal.user_id)
        })
        .await?;
    Ok(Json(user))
}

/// Issues a new token and revokes the presented one.
pub async fn refresh_token(
    State(state): State<AppState>,
    bearer: Bearer,
) -> ApiResult<Json<IssuedToken>> {
    let presented = bearer.clone();
    let ttl = state.token_ttl();
    let issued = state
        .run_as(bearer, move |conn, _, _| {
            Ok(SqliteTokenGate::with_ttl(conn, ttl).refresh(presented.as_str())?)
        })
        .await?;
    Ok(Json(issued))
}

pub async fn logout(State(state): State<AppState>, bearer: Bearer) -> ApiResult<StatusCode> {
    let presented = bearer.clone();
    state
        .run_as(bearer, move |conn, _, _| {
            SqliteTokenGate::new(conn).revoke(presented.as_str())?;
            Ok(())
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// Tasks

pub async fn create_task(
    State(state): State<AppState>,
    bearer: Bearer,
    ApiJson(new_task): ApiJson<NewTask>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    let task = state
        .run_as(bearer, move |conn, principal, policy| {
            TaskService::new(conn, policy).create_task(principal, new_task)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn list_tasks(
    State(state): State<AppState>,
    bearer: Bearer,
    ApiQuery(query): ApiQuery<TaskListQuery>,
) -> ApiResult<Json<Vec<Task>>> {
    let tasks = state
        .run_as(bearer, move |conn, principal, policy| {
            TaskService::new(conn, policy).list_tasks(principal, &query)
        })
        .await?;
    Ok(Json(tasks))
}

pub async fn get_task(
    State(state): State<AppState>,
    bearer: Bearer,
    ApiPath(task_id): ApiPath<TaskId>,
) -> ApiResult<Json<Task>> {
    let task = state
        .run_as(bearer, move |conn, principal, policy| {
            TaskService::new(conn, policy).get_task(principal, task_id)
        })
        .await?;
    Ok(Json(task))
}

pub async fn update_task(
    State(state): State<AppState>,
    bearer: Bearer,
    ApiPath(task_id): ApiPath<TaskId>,
    ApiJson(patch): ApiJson<TaskPatch>,
) -> ApiResult<Json<Task>> {
    let task = state
        .run_as(bearer, move |conn, principal, policy| {
            TaskService::new(conn, policy).update_task(principal, task_id, patch)
        })
        .await?;
    Ok(Json(task))
}

pub async fn move_task(
    State(state): State<AppState>,
    bearer: Bearer,
    ApiPath(task_id): ApiPath<TaskId>,
    ApiJson(request): ApiJson<TaskMove>,
) -> ApiResult<Json<Task>> {
    let task = state
        .run_as(bearer, move |conn, principal, policy| {
            TaskService::new(conn, policy).move_task(principal, task_id, request)
        })
        .await?;
    Ok(Json(task))
}

pub async fn delete_task(
    State(state): State<AppState>,
    bearer: Bearer,
    ApiPath(task_id): ApiPath<TaskId>,
) -> ApiResult<StatusCode> {
    state
        .run_as(bearer, move |conn, principal, policy| {
            TaskService::new(conn, policy).delete_task(principal, task_id)
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_activity(
    State(state): State<AppState>,
    bearer: Bearer,
    ApiPath(task_id): ApiPath<TaskId>,
) -> ApiResult<Json<Vec<ActivityEntry>>> {
    let entries = state
        .run_as(bearer, move |conn, principal, policy| {
            TaskService::new(conn, policy).list_activity(principal, task_id)
        })
        .await?;
    Ok(Json(entries))
}

// Columns

pub async fn create_column(
    State(state): State<AppState>,
    bearer: Bearer,
    ApiJson(new_column): ApiJson<NewColumn>,
) -> ApiResult<(StatusCode, Json<Column>)> {
    let column = state
        .run_as(bearer, move |conn, principal, _| {
            BoardService::new(conn).create_column(principal, new_column)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(column)))
}

pub async fn list_column_tasks(
    State(state): State<AppState>,
    bearer: Bearer,
    ApiPath(column_id): ApiPath<ColumnId>,
    ApiQuery(paging): ApiQuery<Paging>,
) -> ApiResult<Json<Vec<Task>>> {
    let tasks = state
        .run_as(bearer, move |conn, principal, policy| {
            TaskService::new(conn, policy).list_column_tasks(
                principal,
                column_id,
                paging.skip,
                paging.limit,
            )
        })
        .await?;
    Ok(Json(tasks))
}

pub async fn compact_column(
    State(state): State<AppState>,
    bearer: Bearer,
    ApiPath(column_id): ApiPath<ColumnId>,
) -> ApiResult<Json<CompactBody>> {
    let rewritten = state
        .run_as(bearer, move |conn, principal, policy| {
            TaskService::new(conn, policy).compact_column(principal, column_id)
        })
        .await?;
    Ok(Json(CompactBody {
        column_id,
        rewritten,
    }))
}

// Projects and boards

pub async fn create_project(
    State(state): State<AppState>,
    bearer: Bearer,
    ApiJson(new_project): ApiJson<NewProject>,
) -> ApiResult<(StatusCode, Json<Project>)> {
    let project = state
        .run_as(bearer, move |conn, principal, _| {
            BoardService::new(conn).create_project(principal, new_project)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(project)))
}

pub async fn list_projects(
    State(state): State<AppState>,
    bearer: Bearer,
    ApiQuery(paging): ApiQuery<Paging>,
) -> ApiResult<Json<Vec<Project>>> {
    let projects = state
        .run_as(bearer, move |conn, principal, _| {
            BoardService::new(conn).list_projects(principal, paging.skip, paging.limit)
        })
        .await?;
    Ok(Json(projects))
}

pub async fn get_project(
    State(state): State<AppState>,
    bearer: Bearer,
    ApiPath(project_id): ApiPath<ProjectId>,
) -> ApiResult<Json<Project>> {
    let project = state
        .run_as(bearer, move |conn, principal, _| {
            BoardService::new(conn).get_project(principal, project_id)
        })
        .await?;
    Ok(Json(project))
}

pub async fn list_project_boards(
    State(state): State<AppState>,
    bearer: Bearer,
    ApiPath(project_id): ApiPath<ProjectId>,
) -> ApiResult<Json<Vec<Board>>> {
    let boards = state
        .run_as(bearer, move |conn, principal, _| {
            BoardService::new(conn).list_boards(principal, project_id)
        })
        .await?;
    Ok(Json(boards))
}

pub async fn create_board(
    State(state): State<AppState>,
    bearer: Bearer,
    ApiJson(new_board): ApiJson<NewBoard>,
) -> ApiResult<(StatusCode, Json<Board>)> {
    let board = state
        .run_as(bearer, move |conn, principal, _| {
            BoardService::new(conn).create_board(principal, new_board)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(board)))
}

pub async fn get_board(
    State(state): State<AppState>,
    bearer: Bearer,
    ApiPath(board_id): ApiPath<BoardId>,
) -> ApiResult<Json<Board>> {
    let board = state
        .run_as(bearer, move |conn, principal, _| {
            BoardService::new(conn).get_board(principal, board_id)
        })
        .await?;
    Ok(Json(board))
}

pub async fn list_board_columns(
    State(state): State<AppState>,
    bearer: Bearer,
    ApiPath(board_id): ApiPath<BoardId>,
) -> ApiResult<Json<Vec<Column>>> {
    let columns = state
        .run_as(bearer, move |conn, principal, _| {
            BoardService::new(conn).list_columns(principal, board_id)
        })
        .await?;
    Ok(Json(columns))
}
