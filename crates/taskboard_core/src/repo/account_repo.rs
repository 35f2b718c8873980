//! User account and bearer-token persistence.
//!
//! # Responsibility
//! - Create and load users.
//! - Store token digests with expiry and resolve them back to users.
//!
//! # Invariants
//! - Raw tokens are never persisted; only their SHA-256 hex digest is.
//! - Usernames and emails are unique; collisions surface as `RepoError::Duplicate`.

use crate::model::board::{User, UserId};
use crate::repo::{
    bool_to_int, ensure_schema_ready, int_to_bool, map_unique_violation, parse_uuid,
    RepoResult,
};
use rusqlite::{params, Connection, OptionalExtension, Row};

const USER_SELECT_SQL: &str = "SELECT
    id,
    username,
    email,
    full_name,
    is_active,
    created_at,
    updated_at
FROM users";

/// Repository interface for users and their tokens.
pub trait AccountRepository {
    fn create_user(&self, user: &User) -> RepoResult<()>;
    fn get_user(&self, id: UserId) -> RepoResult<Option<User>>;
    fn user_exists(&self, id: UserId) -> RepoResult<bool>;
    fn insert_token(&self, token_hash: &str, user_id: UserId, expires_at: i64) -> RepoResult<()>;
    /// Returns the owner of an unexpired token digest.
    fn find_token_user(&self, token_hash: &str, now: i64) -> RepoResult<Option<UserId>>;
    /// Returns whether a digest was removed.
    fn delete_token(&self, token_hash: &str) -> RepoResult<bool>;
    /// Removes every token expired at `now`. Returns the number removed.
    fn purge_expired_tokens(&self, now: i64) -> RepoResult<usize>;
}

/// SQLite-backed account repository.
pub struct SqliteAccountRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteAccountRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_schema_ready(conn, &["users", "auth_tokens"])?;
        Ok(Self { conn })
    }

    pub(crate) fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl AccountRepository for SqliteAccountRepository<'_> {
    fn create_user(&self, user: &User) -> RepoResult<()> {
        self.conn
            .execute(
                "INSERT INTO users (id, username, email, full_name, is_active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
                params![
                    user.id.to_string(),
                    user.username.as_str(),
                    user.email.as_str(),
                    user.full_name.as_deref(),
                    bool_to_int(user.is_active),
                    user.created_at,
                    user.updated_at,
                ],
            )
            .map_err(|err| map_unique_violation(err, "username or email already registered"))?;
        Ok(())
    }

    fn get_user(&self, id: UserId) -> RepoResult<Option<User>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{USER_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_user_row(row)?));
        }
        Ok(None)
    }

    fn user_exists(&self, id: UserId) -> RepoResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1);",
            [id.to_string()],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    fn insert_token(&self, token_hash: &str, user_id: UserId, expires_at: i64) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO auth_tokens (token_hash, user_id, expires_at)
             VALUES (?1, ?2, ?3);",
            params![token_hash, user_id.to_string(), expires_at],
        )?;
        Ok(())
    }

    fn find_token_user(&self, token_hash: &str, now: i64) -> RepoResult<Option<UserId>> {
        let user: Option<String> = self
            .conn
            .query_row(
                "SELECT t.user_id
                 FROM auth_tokens t
                 INNER JOIN users u ON u.id = t.user_id
                 WHERE t.token_hash = ?1
                   AND t.expires_at > ?2
                   AND u.is_active = 1;",
                params![token_hash, now],
                |row| row.get(0),
            )
            .optional()?;
        user.map(|value| parse_uuid(&value, "auth_tokens.user_id"))
            .transpose()
    }

    fn delete_token(&self, token_hash: &str) -> RepoResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM auth_tokens WHERE token_hash = ?1;", [token_hash])?;
        Ok(changed > 0)
    }

    fn purge_expired_tokens(&self, now: i64) -> RepoResult<usize> {
        let changed = self
            .conn
            .execute("DELETE FROM auth_tokens WHERE expires_at <= ?1;", [now])?;
        Ok(changed)
    }
}

fn parse_user_row(row: &Row<'_>) -> RepoResult<User> {
    let id_text: String = row.get("id")?;
    Ok(User {
        id: parse_uuid(&id_text, "users.id")?,
        username: row.get("username")?,
        email: row.get("email")?,
        full_name: row.get("full_name")?,
        is_active: int_to_bool(row.get("is_active")?, "users.is_active")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
