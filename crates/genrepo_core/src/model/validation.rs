//! Field-level validation results reported by a store at save time.

use std::fmt::{Display, Formatter};

/// One violated rule on one field of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Field (property) name the rule applies to.
    pub property: String,
    /// Human-readable message for the violated rule.
    pub message: String,
}

impl FieldError {
    pub fn new(property: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            message: message.into(),
        }
    }
}

impl Display for FieldError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.property, self.message)
    }
}

/// All validation failures found on one tracked record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordValidation {
    /// `Record::TYPE_NAME` of the failing record.
    pub type_name: &'static str,
    /// Encoded key, or `None` for a record that was never persisted.
    pub key: Option<String>,
    /// Violations in the order the record reported them.
    pub errors: Vec<FieldError>,
}

impl RecordValidation {
    /// Returns whether the record passed validation.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}
