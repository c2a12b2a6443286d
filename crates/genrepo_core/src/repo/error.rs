//! Repository-level error semantics.

use crate::model::validation::{FieldError, RecordValidation};
use crate::session::SessionError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Error returned by repository operations.
#[derive(Debug)]
pub enum RepoError {
    /// `get_one` matched more than one record.
    AmbiguousResult { type_name: &'static str },
    /// `delete_by_id` found no record with that id.
    NotFound { type_name: &'static str, id: String },
    /// A commit was rejected by field rules; nothing was applied.
    ValidationFailed(ValidationFailure),
    /// A commit hit a stale version; nothing was applied. Reload and retry.
    ConcurrencyConflict { type_name: &'static str, id: String },
    /// Any other session failure, passed through unchanged.
    Store(SessionError),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AmbiguousResult { type_name } => {
                write!(f, "query matched more than one {type_name} record")
            }
            Self::NotFound { type_name, id } => write!(f, "{type_name} not found: {id}"),
            Self::ValidationFailed(failure) => write!(f, "{}", failure.message()),
            Self::ConcurrencyConflict { type_name, id } => write!(
                f,
                "concurrency conflict on {type_name}/{id}: record changed since it was loaded"
            ),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::AmbiguousResult { .. }
            | Self::NotFound { .. }
            | Self::ValidationFailed(_)
            | Self::ConcurrencyConflict { .. } => None,
        }
    }
}

impl From<SessionError> for RepoError {
    fn from(value: SessionError) -> Self {
        Self::Store(value)
    }
}

/// Aggregated validation report for one commit.
///
/// Keeps the per-record details and a single combined message listing every
/// individual violation separated by `"; "`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    message: String,
    records: Vec<RecordValidation>,
}

impl ValidationFailure {
    /// Builds the combined report from the store's summary and details.
    pub fn from_store(store_message: &str, records: Vec<RecordValidation>) -> Self {
        let joined = records
            .iter()
            .flat_map(|record| record.errors.iter())
            .map(|error| error.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");

        Self {
            message: format!("{store_message} The validation errors are: {joined}"),
            records,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn records(&self) -> &[RecordValidation] {
        &self.records
    }

    /// Every individual violation across all records.
    pub fn errors(&self) -> impl Iterator<Item = &FieldError> {
        self.records.iter().flat_map(|record| record.errors.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::{RepoError, ValidationFailure};
    use crate::model::validation::{FieldError, RecordValidation};

    #[test]
    fn validation_messages_are_joined_in_order() {
        let failure = ValidationFailure::from_store(
            "Validation failed.",
            vec![
                RecordValidation {
                    type_name: "customer",
                    key: None,
                    errors: vec![FieldError::new("email", "Email is required.")],
                },
                RecordValidation {
                    type_name: "customer",
                    key: Some("4".to_string()),
                    errors: vec![
                        FieldError::new("name", "Name is too long."),
                        FieldError::new("age", "Age must be positive."),
                    ],
                },
            ],
        );

        assert_eq!(
            failure.message(),
            "Validation failed. The validation errors are: Email is required.; Name is too long.; Age must be positive."
        );
        assert_eq!(failure.records().len(), 2);
        assert_eq!(failure.errors().count(), 3);
    }

    #[test]
    fn display_uses_combined_message() {
        let failure = ValidationFailure::from_store("Failed.", Vec::new());
        let err = RepoError::ValidationFailed(failure);
        assert_eq!(err.to_string(), "Failed. The validation errors are: ");
    }
}
