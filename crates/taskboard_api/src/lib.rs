//! JSON-over-HTTP surface for the task board.
//!
//! # Responsibility
//! - Map HTTP requests onto `taskboard_core` services.
//! - Authenticate every request except `/health` with a bearer token.
//! - Let token holders inspect, rotate and revoke their own token.
//!
//! # Invariants
//! - Each request runs on the blocking pool with its own SQLite connection.
//! - Status codes follow the core error kind, never the message text.
//! - Malformed bodies, queries and path ids are `422 validation_error`.

pub mod error;
pub mod extract;
pub mod handlers;
pub mod routes;
pub mod server;
pub mod state;

pub use error::{ApiError, ErrorBody};
pub use extract::{ApiJson, ApiPath, ApiQuery, Bearer};
pub use routes::create_router;
pub use server::{serve, ServeError};
pub use state::AppState;
