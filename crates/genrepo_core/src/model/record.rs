//! Record contract shared by every persisted type.
//!
//! # Responsibility
//! - Define the identity + audit + concurrency-token shape all records carry.
//! - Expose the contract as a trait so repository code stays generic.
//!
//! # Invariants
//! - `id` is assigned by the store and never changes after first persistence.
//! - `created_date` is stamped once at creation and never rewritten.
//! - `modified_date` is only set by updates.
//! - `version` is authored by the store only; callers never set it.

use crate::model::key::RecordKey;
use crate::model::validation::FieldError;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Opaque optimistic-concurrency token maintained by the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowVersion(Vec<u8>);

impl RowVersion {
    /// Wraps store-produced token bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Display for RowVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Identity, display label, audit fields and concurrency token of a record.
///
/// Embed one of these in every record type and return it from
/// [`Record::meta`]. Fields are private so that identity and version can only
/// be written through the store-side hooks below.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecordMeta<K> {
    id: K,
    name: Option<String>,
    created_date: Option<DateTime<Utc>>,
    modified_date: Option<DateTime<Utc>>,
    created_by: Option<String>,
    modified_by: Option<String>,
    version: Option<RowVersion>,
}

impl<K: RecordKey> RecordMeta<K> {
    /// Creates metadata for a transient record (unassigned key).
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates transient metadata carrying a display label.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Rebuilds metadata for a record that already exists in a store, e.g.
    /// when reconstructing a detached record from external input.
    pub fn persisted(id: K, version: RowVersion) -> Self {
        Self {
            id,
            version: Some(version),
            ..Self::default()
        }
    }

    pub fn id(&self) -> &K {
        &self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: Option<String>) {
        self.name = name;
    }

    /// Creation timestamp; falls back to "now" while unset.
    pub fn created_date(&self) -> DateTime<Utc> {
        self.created_date.unwrap_or_else(Utc::now)
    }

    /// Returns whether a creation timestamp has actually been stamped.
    pub fn has_created_date(&self) -> bool {
        self.created_date.is_some()
    }

    pub fn modified_date(&self) -> Option<DateTime<Utc>> {
        self.modified_date
    }

    pub fn created_by(&self) -> Option<&str> {
        self.created_by.as_deref()
    }

    pub fn modified_by(&self) -> Option<&str> {
        self.modified_by.as_deref()
    }

    pub fn version(&self) -> Option<&RowVersion> {
        self.version.as_ref()
    }

    /// Returns whether the record has never been persisted.
    pub fn is_transient(&self) -> bool {
        self.id.is_unassigned()
    }

    pub(crate) fn stamp_created(&mut self, at: DateTime<Utc>, by: Option<String>) {
        self.created_date = Some(at);
        self.created_by = by;
    }

    pub(crate) fn stamp_modified(&mut self, at: DateTime<Utc>, by: Option<String>) {
        self.modified_date = Some(at);
        self.modified_by = by;
    }

    /// Store-side hook: sets the identity of a newly inserted record.
    ///
    /// Session implementations call this; application code should not.
    pub fn assign_identity(&mut self, id: K) {
        self.id = id;
    }

    /// Store-side hook: records the token produced by a successful write.
    ///
    /// Session implementations call this; application code should not.
    pub fn assign_version(&mut self, version: RowVersion) {
        self.version = Some(version);
    }

    /// Store-side hook: restores the persisted creation stamp so an update
    /// can never rewrite it.
    pub fn restore_created(&mut self, at: Option<DateTime<Utc>>, by: Option<String>) {
        self.created_date = at;
        self.created_by = by;
    }
}

/// Contract every persisted record type implements.
///
/// Repository operations are generic over this trait; the store decides how
/// records are laid out but relies on the shape exposed through [`RecordMeta`].
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Identity type, generated by the store for new records.
    type Id: RecordKey;

    /// Stable name of the record type, used as its storage namespace.
    const TYPE_NAME: &'static str;

    fn meta(&self) -> &RecordMeta<Self::Id>;

    fn meta_mut(&mut self) -> &mut RecordMeta<Self::Id>;

    /// Names of related data that callers may ask to eager-load.
    fn relations() -> &'static [&'static str] {
        &[]
    }

    /// Field rules checked by the store before a pending write is applied.
    fn validate(&self) -> Vec<FieldError> {
        Vec::new()
    }

    fn id(&self) -> &Self::Id {
        self.meta().id()
    }

    fn version(&self) -> Option<&RowVersion> {
        self.meta().version()
    }
}
