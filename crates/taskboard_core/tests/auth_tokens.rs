use std::time::Duration;
use taskboard_core::auth::hash_token;
use taskboard_core::db::open_db_in_memory;
use taskboard_core::{AuthError, AuthGate, BoardService, NewUser, SqliteTokenGate};
use uuid::Uuid;

fn setup_user(conn: &rusqlite::Connection) -> Uuid {
    BoardService::new(conn)
        .create_user(NewUser {
            username: "ann".to_string(),
            email: "ann@example.com".to_string(),
            full_name: Some("Ann Example".to_string()),
        })
        .unwrap()
        .id
}

#[test]
fn issued_token_resolves_raw_and_bearer_forms() {
    let conn = open_db_in_memory().unwrap();
    let user_id = setup_user(&conn);
    let gate = SqliteTokenGate::new(&conn);

    let issued = gate.issue_token(user_id).unwrap();

    assert_eq!(gate.resolve(&issued.token).unwrap().user_id, user_id);
    assert_eq!(
        gate.resolve(&format!("Bearer {}", issued.token))
            .unwrap()
            .user_id,
        user_id
    );
}

#[test]
fn only_token_digest_is_stored() {
    let conn = open_db_in_memory().unwrap();
    let user_id = setup_user(&conn);
    let issued = SqliteTokenGate::new(&conn).issue_token(user_id).unwrap();

    let stored: String = conn
        .query_row("SELECT token_hash FROM auth_tokens;", [], |row| row.get(0))
        .unwrap();
    assert_ne!(stored, issued.token);
    assert_eq!(stored, hash_token(&issued.token));
}

#[test]
fn unknown_and_missing_tokens_are_rejected() {
    let conn = open_db_in_memory().unwrap();
    setup_user(&conn);
    let gate = SqliteTokenGate::new(&conn);

    assert!(matches!(gate.resolve("nope"), Err(AuthError::InvalidToken)));
    assert!(matches!(gate.resolve("Bearer "), Err(AuthError::MissingToken)));
    assert!(matches!(gate.resolve(""), Err(AuthError::MissingToken)));
}

#[test]
fn expired_token_is_rejected_and_purged() {
    let conn = open_db_in_memory().unwrap();
    let user_id = setup_user(&conn);
    let gate = SqliteTokenGate::with_ttl(&conn, Duration::ZERO);

    let issued = gate.issue_token(user_id).unwrap();

    assert!(matches!(
        gate.resolve(&issued.token),
        Err(AuthError::InvalidToken)
    ));
    assert_eq!(gate.purge_expired().unwrap(), 1);
}

#[test]
fn revoked_token_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let user_id = setup_user(&conn);
    let gate = SqliteTokenGate::new(&conn);
    let issued = gate.issue_token(user_id).unwrap();

    assert!(gate.revoke(&issued.token).unwrap());
    assert!(!gate.revoke(&issued.token).unwrap());
    assert!(matches!(
        gate.resolve(&issued.token),
        Err(AuthError::InvalidToken)
    ));
}

#[test]
fn inactive_user_token_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let user_id = setup_user(&conn);
    let gate = SqliteTokenGate::new(&conn);
    let issued = gate.issue_token(user_id).unwrap();

    conn.execute(
        "UPDATE users SET is_active = 0 WHERE id = ?1;",
        [user_id.to_string()],
    )
    .unwrap();

    assert!(matches!(
        gate.resolve(&issued.token),
        Err(AuthError::InvalidToken)
    ));
}

#[test]
fn issuing_for_unknown_user_fails() {
    let conn = open_db_in_memory().unwrap();
    let missing = Uuid::new_v4();

    assert!(matches!(
        SqliteTokenGate::new(&conn).issue_token(missing),
        Err(AuthError::UnknownUser(id)) if id == missing
    ));
}

#[test]
fn issuing_purges_expired_tokens() {
    let conn = open_db_in_memory().unwrap();
    let user_id = setup_user(&conn);
    SqliteTokenGate::with_ttl(&conn, Duration::ZERO)
        .issue_token(user_id)
        .unwrap();

    let live = SqliteTokenGate::new(&conn).issue_token(user_id).unwrap();

    let stored: Vec<String> = conn
        .prepare("SELECT token_hash FROM auth_tokens;")
        .unwrap()
        .query_map([], |row| row.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(stored, vec![hash_token(&live.token)]);
}

#[test]
fn refresh_swaps_old_token_for_new() {
    let conn = open_db_in_memory().unwrap();
    let user_id = setup_user(&conn);
    let gate = SqliteTokenGate::new(&conn);
    let old = gate.issue_token(user_id).unwrap();

    let fresh = gate.refresh(&format!("Bearer {}", old.token)).unwrap();

    assert_ne!(fresh.token, old.token);
    assert_eq!(fresh.user_id, user_id);
    assert_eq!(gate.resolve(&fresh.token).unwrap().user_id, user_id);
    assert!(matches!(gate.resolve(&old.token), Err(AuthError::InvalidToken)));
}

#[test]
fn refresh_rejects_dead_token_and_issues_nothing() {
    let conn = open_db_in_memory().unwrap();
    let user_id = setup_user(&conn);
    let gate = SqliteTokenGate::new(&conn);
    let issued = gate.issue_token(user_id).unwrap();
    gate.revoke(&issued.token).unwrap();

    assert!(matches!(
        gate.refresh(&issued.token),
        Err(AuthError::InvalidToken)
    ));
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM auth_tokens;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0);
}
