//! Generic repository and unit-of-work layer over a pluggable store session.
//!
//! Application code talks to [`Repository`] / [`AsyncRepository`]; a
//! [`Session`] implementation (the bundled [`SqliteSession`] or any other)
//! does the actual storage work.

pub mod db;
pub mod logging;
pub mod model;
pub mod query;
pub mod repo;
pub mod session;

pub use db::{open_db, open_db_in_memory, open_db_with, DbError, DbResult, StoreOptions};
pub use logging::{default_log_level, init_logging, init_logging_with, logging_status, LogConfig};
pub use model::key::RecordKey;
pub use model::record::{Record, RecordMeta, RowVersion};
pub use model::validation::{FieldError, RecordValidation};
pub use query::{Filter, Includes, OrderBy, Query, ReadOptions};
pub use repo::{
    AsyncReadOnlyRepository, AsyncRepository, ReadOnlyRepository, RepoError, RepoResult,
    Repository, SessionRepository, ValidationFailure,
};
pub use session::{
    AsyncSession, ChangeKind, EntryId, EntryState, SaveReport, SavedEntry, Session, SessionError,
    SessionResult, SqliteSession,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
