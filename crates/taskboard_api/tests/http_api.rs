use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;
use taskboard_api::{create_router, AppState};
use taskboard_core::{open_db, BoardService, CapacityPolicy, NewUser, SqliteTokenGate};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

struct TestApp {
    _dir: TempDir,
    path: PathBuf,
    router: Router,
}

impl TestApp {
    fn new(policy: CapacityPolicy) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api.db");
        drop(open_db(&path).unwrap());
        let state = AppState::new(path.clone(), Duration::from_secs(5), policy);
        Self {
            _dir: dir,
            path,
            router: create_router(state, &[]),
        }
    }

    fn token_for(&self, username: &str) -> String {
        let conn = open_db(&self.path).unwrap();
        let user = BoardService::new(&conn)
            .create_user(NewUser {
                username: username.to_string(),
                email: format!("{username}@example.com"),
                full_name: None,
            })
            .unwrap();
        SqliteTokenGate::new(&conn).issue_token(user.id).unwrap().token
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        self.send_raw(method, uri, token, body.map(|body| body.to_string()))
            .await
    }

    async fn send_raw(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<String>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    /// Creates project, board and one column per title; returns column ids.
    async fn columns(&self, token: &str, specs: &[(&str, Option<i64>)]) -> Vec<String> {
        let (status, project) = self
            .send(
                Method::POST,
                "/projects",
                Some(token),
                Some(json!({ "name": "Launch" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, board) = self
            .send(
                Method::POST,
                "/boards",
                Some(token),
                Some(json!({ "project_id": project["id"], "name": "Main" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let mut ids = Vec::new();
        for (title, wip_limit) in specs {
            let (status, column) = self
                .send(
                    Method::POST,
                    "/columns",
                    Some(token),
                    Some(json!({
                        "board_id": board["id"],
                        "title": title,
                        "wip_limit": wip_limit,
                    })),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED);
            ids.push(column["id"].as_str().unwrap().to_string());
        }
        ids
    }

    async fn task(&self, token: &str, column_id: &str, title: &str) -> Value {
        let (status, task) = self
            .send(
                Method::POST,
                "/tasks",
                Some(token),
                Some(json!({ "column_id": column_id, "title": title })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "body: {task}");
        task
    }

    async fn column_titles(&self, token: &str, column_id: &str) -> Vec<(String, i64)> {
        let (status, tasks) = self
            .send(
                Method::GET,
                &format!("/columns/{column_id}/tasks"),
                Some(token),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        tasks
            .as_array()
            .unwrap()
            .iter()
            .map(|task| {
                (
                    task["title"].as_str().unwrap().to_string(),
                    task["position"].as_i64().unwrap(),
                )
            })
            .collect()
    }
}

fn ranked(items: &[&str]) -> Vec<(String, i64)> {
    items
        .iter()
        .enumerate()
        .map(|(rank, title)| (title.to_string(), rank as i64))
        .collect()
}

#[tokio::test]
async fn health_needs_no_token() {
    let app = TestApp::new(CapacityPolicy::Advisory);

    let (status, body) = app.send(Method::GET, "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn missing_or_bad_token_is_unauthorized() {
    let app = TestApp::new(CapacityPolicy::Advisory);

    let (status, body) = app.send(Method::GET, "/tasks", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthenticated");

    let (status, _) = app.send(Method::GET, "/tasks", Some("forged"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn task_flow_keeps_ranks_dense() {
    let app = TestApp::new(CapacityPolicy::Advisory);
    let token = app.token_for("ann");
    let columns = app.columns(&token, &[("Todo", None), ("Done", None)]).await;
    let (todo, done) = (&columns[0], &columns[1]);

    let first = app.task(&token, todo, "T0").await;
    app.task(&token, todo, "T1").await;
    app.task(&token, todo, "T2").await;
    assert_eq!(first["position"], 0);
    assert_eq!(first["priority"], "medium");

    let (status, moved) = app
        .send(
            Method::PATCH,
            &format!("/tasks/{}/move", first["id"].as_str().unwrap()),
            Some(&token),
            Some(json!({ "column_id": todo, "position": 2 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(moved["position"], 2);
    assert_eq!(
        app.column_titles(&token, todo).await,
        ranked(&["T1", "T2", "T0"])
    );

    let (status, moved) = app
        .send(
            Method::PATCH,
            &format!("/tasks/{}/move", first["id"].as_str().unwrap()),
            Some(&token),
            Some(json!({ "column_id": done, "position": 50 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(moved["column_id"], done.as_str());
    assert_eq!(moved["position"], 0);
    assert_eq!(app.column_titles(&token, todo).await, ranked(&["T1", "T2"]));
    assert_eq!(app.column_titles(&token, done).await, ranked(&["T0"]));

    let (status, body) = app
        .send(
            Method::DELETE,
            &format!("/tasks/{}", first["id"].as_str().unwrap()),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);

    let (status, activity) = app
        .send(
            Method::GET,
            &format!("/tasks/{}/activity", first["id"].as_str().unwrap()),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let actions: Vec<&str> = activity
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["action"].as_str().unwrap())
        .collect();
    assert_eq!(
        actions,
        vec!["task_deleted", "task_moved", "task_moved", "task_created"]
    );
}

#[tokio::test]
async fn update_merges_fields_and_lists_filter() {
    let app = TestApp::new(CapacityPolicy::Advisory);
    let token = app.token_for("ann");
    let columns = app.columns(&token, &[("Todo", None)]).await;
    let task = app.task(&token, &columns[0], "Draft").await;
    app.task(&token, &columns[0], "Other").await;
    let uri = format!("/tasks/{}", task["id"].as_str().unwrap());

    let (status, updated) = app
        .send(
            Method::PUT,
            &uri,
            Some(&token),
            Some(json!({ "title": "Final", "priority": "high", "description": "ready" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["title"], "Final");
    assert_eq!(updated["position"], 0);

    let (_, cleared) = app
        .send(
            Method::PUT,
            &uri,
            Some(&token),
            Some(json!({ "description": null })),
        )
        .await;
    assert_eq!(cleared["description"], Value::Null);
    assert_eq!(cleared["priority"], "high");

    let (status, high) = app
        .send(Method::GET, "/tasks?priority=high", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(high.as_array().unwrap().len(), 1);
    assert_eq!(high[0]["title"], "Final");

    let (_, paged) = app
        .send(Method::GET, "/tasks?skip=1&limit=1", Some(&token), None)
        .await;
    assert_eq!(paged.as_array().unwrap().len(), 1);
    assert_eq!(paged[0]["title"], "Other");
}

#[tokio::test]
async fn errors_map_to_statuses() {
    let app = TestApp::new(CapacityPolicy::Enforce);
    let ann = app.token_for("ann");
    let bob = app.token_for("bob");
    let columns = app.columns(&ann, &[("Doing", Some(1))]).await;
    let task = app.task(&ann, &columns[0], "Only").await;
    let uri = format!("/tasks/{}", task["id"].as_str().unwrap());

    let (status, body) = app.send(Method::GET, &uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "forbidden");

    let (status, body) = app
        .send(
            Method::GET,
            "/tasks/00000000-0000-4000-8000-000000000000",
            Some(&ann),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");

    let (status, body) = app
        .send(
            Method::POST,
            "/tasks",
            Some(&ann),
            Some(json!({ "column_id": columns[0], "title": "   " })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "validation_error");

    let (status, body) = app
        .send(
            Method::POST,
            "/tasks",
            Some(&ann),
            Some(json!({ "column_id": columns[0], "title": "Overflow" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "capacity_exceeded");
}

#[tokio::test]
async fn compact_endpoint_reports_rewritten_rows() {
    let app = TestApp::new(CapacityPolicy::Advisory);
    let token = app.token_for("ann");
    let columns = app.columns(&token, &[("Todo", None)]).await;
    app.task(&token, &columns[0], "A").await;
    app.task(&token, &columns[0], "B").await;

    let conn = open_db(&app.path).unwrap();
    conn.execute(
        "UPDATE tasks SET position = position + 10 WHERE column_id = ?1;",
        [&columns[0]],
    )
    .unwrap();

    let (status, body) = app
        .send(
            Method::POST,
            &format!("/columns/{}/compact", columns[0]),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rewritten"], 2);
    assert_eq!(app.column_titles(&token, &columns[0]).await, ranked(&["A", "B"]));
}

#[tokio::test]
async fn project_endpoints_are_owner_scoped() {
    let app = TestApp::new(CapacityPolicy::Advisory);
    let ann = app.token_for("ann");
    let bob = app.token_for("bob");
    app.columns(&ann, &[("Todo", None)]).await;

    let (_, anns) = app.send(Method::GET, "/projects", Some(&ann), None).await;
    let (_, bobs) = app.send(Method::GET, "/projects", Some(&bob), None).await;
    assert_eq!(anns.as_array().unwrap().len(), 1);
    assert!(bobs.as_array().unwrap().is_empty());

    let project_id = anns[0]["id"].as_str().unwrap();
    let (status, boards) = app
        .send(
            Method::GET,
            &format!("/projects/{project_id}/boards"),
            Some(&ann),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let board_id = boards[0]["id"].as_str().unwrap();

    let (status, columns) = app
        .send(
            Method::GET,
            &format!("/boards/{board_id}/columns"),
            Some(&ann),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(columns[0]["title"], "Todo");

    let (status, _) = app
        .send(
            Method::GET,
            &format!("/boards/{board_id}"),
            Some(&bob),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

fn assert_validation_error(status: StatusCode, body: &Value) {
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "body: {body}");
    assert_eq!(body["code"], "validation_error");
    assert!(!body["message"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn malformed_input_is_a_json_validation_error() {
    let app = TestApp::new(CapacityPolicy::Advisory);
    let token = app.token_for("ann");
    let columns = app.columns(&token, &[("Todo", None)]).await;
    let task = app.task(&token, &columns[0], "Only").await;
    let task_id = task["id"].as_str().unwrap();

    let (status, body) = app
        .send(Method::GET, "/tasks?priority=urgent", Some(&token), None)
        .await;
    assert_validation_error(status, &body);

    let (status, body) = app
        .send(Method::GET, "/tasks/not-a-uuid", Some(&token), None)
        .await;
    assert_validation_error(status, &body);

    let (status, body) = app
        .send_raw(
            Method::POST,
            "/tasks",
            Some(&token),
            Some("{not json".to_string()),
        )
        .await;
    assert_validation_error(status, &body);

    let (status, body) = app
        .send(
            Method::PUT,
            &format!("/tasks/{task_id}"),
            Some(&token),
            Some(json!({ "priority": "urgent" })),
        )
        .await;
    assert_validation_error(status, &body);

    let (status, body) = app
        .send(
            Method::PATCH,
            &format!("/tasks/{task_id}/move"),
            Some(&token),
            Some(json!({ "column_id": columns[0], "position": -1 })),
        )
        .await;
    assert_validation_error(status, &body);
    assert_eq!(app.column_titles(&token, &columns[0]).await, ranked(&["Only"]));
}

#[tokio::test]
async fn auth_me_returns_the_token_owner() {
    let app = TestApp::new(CapacityPolicy::Advisory);
    let token = app.token_for("ann");

    let (status, user) = app.send(Method::GET, "/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["username"], "ann");
    assert_eq!(user["email"], "ann@example.com");

    let (status, body) = app.send(Method::GET, "/auth/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthenticated");
}

#[tokio::test]
async fn refresh_rotates_the_token() {
    let app = TestApp::new(CapacityPolicy::Advisory);
    let old = app.token_for("ann");

    let (status, issued) = app
        .send(Method::POST, "/auth/refresh", Some(&old), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let fresh = issued["token"].as_str().unwrap().to_string();
    assert_ne!(fresh, old);

    let (status, _) = app.send(Method::GET, "/auth/me", Some(&old), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, user) = app.send(Method::GET, "/auth/me", Some(&fresh), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["id"], issued["user_id"]);
}

#[tokio::test]
async fn logout_revokes_the_presented_token() {
    let app = TestApp::new(CapacityPolicy::Advisory);
    let token = app.token_for("ann");
    let (_, me) = app.send(Method::GET, "/auth/me", Some(&token), None).await;
    let user_id: Uuid = me["id"].as_str().unwrap().parse().unwrap();
    let conn = open_db(&app.path).unwrap();
    let other = SqliteTokenGate::new(&conn).issue_token(user_id).unwrap().token;

    let (status, body) = app
        .send(Method::POST, "/auth/logout", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);

    let (status, _) = app.send(Method::GET, "/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app
        .send(Method::POST, "/auth/logout", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.send(Method::GET, "/auth/me", Some(&other), None).await;
    assert_eq!(status, StatusCode::OK);
}
