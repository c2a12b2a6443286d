//! Unit-of-work commit and commit error translation.
//!
//! # Invariants
//! - A failed commit leaves durable storage untouched.
//! - Validation failures are the only errors rewritten; conflicts map to
//!   their own variant and everything else passes through as `Store`.

use super::{RepoError, RepoResult, SessionRepository, ValidationFailure};
use crate::session::{AsyncSession, SaveReport, Session, SessionError};
use log::{info, warn};
use std::time::Instant;

impl<S: Session> SessionRepository<'_, S> {
    pub(crate) fn commit(&mut self) -> RepoResult<SaveReport> {
        let started_at = Instant::now();
        let result = self.session.save_changes();
        finish_commit("save", started_at, result)
    }
}

impl<S: AsyncSession> SessionRepository<'_, S> {
    pub(crate) async fn commit_async(&mut self) -> RepoResult<SaveReport> {
        let started_at = Instant::now();
        let result = self.session.save_changes_async().await;
        finish_commit("save_async", started_at, result)
    }
}

fn finish_commit(
    op: &str,
    started_at: Instant,
    result: Result<SaveReport, SessionError>,
) -> RepoResult<SaveReport> {
    match result {
        Ok(report) => {
            info!(
                "event=repo_commit module=repo op={} status=ok affected={} duration_ms={}",
                op,
                report.affected(),
                started_at.elapsed().as_millis()
            );
            Ok(report)
        }
        Err(err) => {
            let err = translate_commit_error(err);
            warn!(
                "event=repo_commit module=repo op={} status=error error_code={} duration_ms={}",
                op,
                error_code(&err),
                started_at.elapsed().as_millis()
            );
            Err(err)
        }
    }
}

/// Maps a session commit failure onto the repository error surface.
pub(crate) fn translate_commit_error(err: SessionError) -> RepoError {
    match err {
        SessionError::Validation { message, records } => {
            RepoError::ValidationFailed(ValidationFailure::from_store(&message, records))
        }
        SessionError::Concurrency { type_name, id } => {
            RepoError::ConcurrencyConflict { type_name, id }
        }
        other => RepoError::Store(other),
    }
}

fn error_code(err: &RepoError) -> &'static str {
    match err {
        RepoError::ValidationFailed(_) => "validation_failed",
        RepoError::ConcurrencyConflict { .. } => "concurrency_conflict",
        RepoError::Store(SessionError::Db(_)) => "store_unavailable",
        RepoError::Store(_) => "store_error",
        RepoError::AmbiguousResult { .. } | RepoError::NotFound { .. } => "unexpected",
    }
}

#[cfg(test)]
mod tests {
    use super::translate_commit_error;
    use crate::db::DbError;
    use crate::model::validation::{FieldError, RecordValidation};
    use crate::repo::RepoError;
    use crate::session::SessionError;

    #[test]
    fn validation_is_aggregated() {
        let err = translate_commit_error(SessionError::Validation {
            message: "Validation failed for one or more records.".to_string(),
            records: vec![
                RecordValidation {
                    type_name: "customer",
                    key: None,
                    errors: vec![FieldError::new("name", "Name is required.")],
                },
                RecordValidation {
                    type_name: "customer",
                    key: None,
                    errors: vec![FieldError::new("email", "Email is invalid.")],
                },
            ],
        });

        let failure = match err {
            RepoError::ValidationFailed(failure) => failure,
            other => panic!("expected validation failure, got {other:?}"),
        };
        assert_eq!(
            failure.message(),
            "Validation failed for one or more records. The validation errors are: Name is required.; Email is invalid."
        );
    }

    #[test]
    fn conflict_and_store_errors_are_not_rewritten() {
        let conflict = translate_commit_error(SessionError::Concurrency {
            type_name: "customer",
            id: "7".to_string(),
        });
        assert!(matches!(
            conflict,
            RepoError::ConcurrencyConflict { type_name: "customer", ref id } if id == "7"
        ));

        let store = translate_commit_error(SessionError::Db(DbError::SchemaNotReady {
            expected_version: 1,
            actual_version: 0,
        }));
        assert!(matches!(
            store,
            RepoError::Store(SessionError::Db(DbError::SchemaNotReady { .. }))
        ));
    }
}
