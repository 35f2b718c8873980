//! Bearer-token authentication and ownership checks.
//!
//! # Responsibility
//! - Issue opaque bearer tokens and resolve them back to a `Principal`.
//! - Provide the ownership predicate used by services.
//!
//! # Invariants
//! - A raw token is returned exactly once, at issuance. Storage only ever
//!   sees its SHA-256 hex digest.
//! - Unknown, expired and revoked tokens, and tokens of inactive users, all
//!   resolve to the same `AuthError::InvalidToken`.

use crate::db::now_epoch_ms;
use crate::model::board::{Project, UserId};
use crate::repo::account_repo::{AccountRepository, SqliteAccountRepository};
use crate::repo::RepoError;
use rand::RngCore;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::error::Error;
use std::fmt::{Display, Formatter, Write};
use std::time::Duration;

/// Default token lifetime: one week.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

const TOKEN_BYTES: usize = 32;

const BEARER_SCHEME: &str = "Bearer";

/// Authenticated identity of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Principal {
    pub user_id: UserId,
}

impl Principal {
    pub fn new(user_id: UserId) -> Self {
        Self { user_id }
    }
}

/// Errors from token handling and ownership checks.
#[derive(Debug)]
pub enum AuthError {
    /// No credential was supplied.
    MissingToken,
    /// Credential is unknown, expired, revoked or belongs to an inactive user.
    InvalidToken,
    /// Principal does not own the addressed resource.
    Forbidden,
    /// Token issuance targeted a user that does not exist.
    UnknownUser(UserId),
    Repo(RepoError),
}

impl Display for AuthError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingToken => write!(f, "missing bearer token"),
            Self::InvalidToken => write!(f, "invalid or expired token"),
            Self::Forbidden => write!(f, "not allowed to access this resource"),
            Self::UnknownUser(id) => write!(f, "user not found: {id}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for AuthError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for AuthError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Resolves a bearer credential to a principal.
pub trait AuthGate {
    /// Accepts a raw token or a `Bearer <token>` header value.
    fn resolve(&self, bearer: &str) -> Result<Principal, AuthError>;
}

/// Freshly issued token. `token` is not recoverable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub user_id: UserId,
    pub expires_at: i64,
}

/// Token gate backed by the `auth_tokens` table.
pub struct SqliteTokenGate<'conn> {
    conn: &'conn Connection,
    ttl: Duration,
}

impl<'conn> SqliteTokenGate<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self::with_ttl(conn, DEFAULT_TOKEN_TTL)
    }

    pub fn with_ttl(conn: &'conn Connection, ttl: Duration) -> Self {
        Self { conn, ttl }
    }

    fn accounts(&self) -> Result<SqliteAccountRepository<'conn>, AuthError> {
        Ok(SqliteAccountRepository::try_new(self.conn)?)
    }

    /// Issues a new token for an existing user.
    pub fn issue_token(&self, user_id: UserId) -> Result<IssuedToken, AuthError> {
        let accounts = self.accounts()?;
        if !accounts.user_exists(user_id)? {
            return Err(AuthError::UnknownUser(user_id));
        }
        let now = now_epoch_ms();
        let purged = accounts.purge_expired_tokens(now)?;
        let token = generate_token();
        let expires_at = now.saturating_add(self.ttl.as_millis() as i64);
        accounts.insert_token(&hash_token(&token), user_id, expires_at)?;
        log::info!(
            "event=token_issue module=auth status=ok user_id={} expires_at={} purged={}",
            user_id,
            expires_at,
            purged
        );
        Ok(IssuedToken {
            token,
            user_id,
            expires_at,
        })
    }

    /// Revokes a token. Returns whether it existed.
    pub fn revoke(&self, bearer: &str) -> Result<bool, AuthError> {
        let token = strip_bearer(bearer).ok_or(AuthError::MissingToken)?;
        Ok(self.accounts()?.delete_token(&hash_token(token))?)
    }

    /// Swaps a live token for a fresh one. The old token stops resolving.
    ///
    /// Runs as one IMMEDIATE transaction so a failure keeps the old token.
    pub fn refresh(&self, bearer: &str) -> Result<IssuedToken, AuthError> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)
            .map_err(RepoError::from)?;
        let principal = self.resolve(bearer)?;
        let issued = self.issue_token(principal.user_id)?;
        self.revoke(bearer)?;
        tx.commit().map_err(RepoError::from)?;
        log::info!(
            "event=token_refresh module=auth status=ok user_id={}",
            principal.user_id
        );
        Ok(issued)
    }

    /// Deletes expired tokens. Returns the number removed.
    pub fn purge_expired(&self) -> Result<usize, AuthError> {
        let purged = self.accounts()?.purge_expired_tokens(now_epoch_ms())?;
        log::info!("event=token_purge module=auth status=ok purged={}", purged);
        Ok(purged)
    }
}

impl AuthGate for SqliteTokenGate<'_> {
    fn resolve(&self, bearer: &str) -> Result<Principal, AuthError> {
        let token = strip_bearer(bearer).ok_or(AuthError::MissingToken)?;
        match self
            .accounts()?
            .find_token_user(&hash_token(token), now_epoch_ms())?
        {
            Some(user_id) => Ok(Principal::new(user_id)),
            None => {
                log::debug!("event=token_resolve module=auth status=rejected");
                Err(AuthError::InvalidToken)
            }
        }
    }
}

/// Fails with `Forbidden` unless `principal` owns `project`.
pub fn ensure_owner(principal: &Principal, project: &Project) -> Result<(), AuthError> {
    ensure_user(principal, project.owner_id)
}

/// Fails with `Forbidden` unless `principal` is `owner_id`.
pub fn ensure_user(principal: &Principal, owner_id: UserId) -> Result<(), AuthError> {
    if principal.user_id == owner_id {
        Ok(())
    } else {
        Err(AuthError::Forbidden)
    }
}

/// SHA-256 hex digest of a raw token.
pub fn hash_token(token: &str) -> String {
    to_hex(&Sha256::digest(token.as_bytes()))
}

/// 32 bytes from the thread-local CSPRNG, hex encoded.
fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    to_hex(&bytes)
}

fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

fn strip_bearer(value: &str) -> Option<&str> {
    let value = value.trim();
    let token = match value.strip_prefix(BEARER_SCHEME) {
        Some(rest) if rest.is_empty() || rest.starts_with(char::is_whitespace) => rest.trim(),
        _ => value,
    };
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}
