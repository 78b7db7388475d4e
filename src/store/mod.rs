//! Persistence layer: libSQL-backed storage for users, registration
//! sessions, and nutrition records.

pub mod libsql_backend;
pub mod migrations;
pub mod sessions;
pub mod traits;
pub mod users;

pub use libsql_backend::LibSqlBackend;
pub use sessions::{SessionStore, spawn_session_sweeper};
pub use traits::Database;
pub use users::UserDirectory;
