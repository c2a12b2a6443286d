//! Session boundary consumed by the repository layer.
//!
//! # Responsibility
//! - Define what the repository needs from a store session: querying,
//!   change registration, attachment state and atomic commit.
//! - Provide the shared vocabulary (`EntryId`, `EntryState`, `SaveReport`,
//!   `SessionError`) session implementations report through.
//!
//! # Invariants
//! - Registering changes never touches durable storage; only
//!   `save_changes` does, and it applies all pending changes or none.
//! - Validation failures and version conflicts are reported as distinct
//!   error variants.
//! - Sessions own no repository logic; the repository owns no store logic.

use crate::db::DbError;
use crate::model::key::RecordKey;
use crate::model::record::{Record, RowVersion};
use crate::model::validation::RecordValidation;
use crate::query::{Filter, Query};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod sqlite;
pub mod tracker;

pub use sqlite::SqliteSession;
pub use tracker::ChangeTracker;

pub type SessionResult<T> = Result<T, SessionError>;

/// Handle for one entry tracked by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(u64);

impl EntryId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }
}

impl Display for EntryId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "entry#{}", self.0)
    }
}

/// Tracking state of a record relative to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Not tracked by the session.
    Detached,
    /// Tracked; nothing pending.
    Unchanged,
    /// Pending insertion.
    Added,
    /// Pending full overwrite.
    Modified,
    /// Pending removal.
    Deleted,
}

impl EntryState {
    pub fn is_pending(self) -> bool {
        matches!(self, Self::Added | Self::Modified | Self::Deleted)
    }
}

/// Kind of write a committed entry produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Inserted,
    Updated,
    Deleted,
}

/// Store-assigned state of one entry written by a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedEntry {
    pub entry: EntryId,
    pub type_name: &'static str,
    /// Encoded record key (see `RecordKey::encode_key`).
    pub key: String,
    pub kind: ChangeKind,
    /// New concurrency token; `None` for deletions.
    pub version: Option<RowVersion>,
    /// Creation stamp as persisted.
    pub created_date: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
}

/// Outcome of a successful commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveReport {
    entries: Vec<SavedEntry>,
}

impl SaveReport {
    pub fn new(entries: Vec<SavedEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[SavedEntry] {
        &self.entries
    }

    /// Number of rows written.
    pub fn affected(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn find(&self, entry: EntryId) -> Option<&SavedEntry> {
        self.entries.iter().find(|saved| saved.entry == entry)
    }

    /// Copies store-assigned identity, version and creation stamp onto the
    /// caller's instance of a written record.
    ///
    /// Returns `false` when `entry` was not written as a `T` or was deleted.
    pub fn refresh<T: Record>(&self, entry: EntryId, record: &mut T) -> bool {
        let Some(saved) = self
            .find(entry)
            .filter(|saved| saved.type_name == T::TYPE_NAME && saved.kind != ChangeKind::Deleted)
        else {
            return false;
        };
        let Some(id) = T::Id::parse_key(&saved.key) else {
            return false;
        };

        let meta = record.meta_mut();
        meta.assign_identity(id);
        if let Some(version) = &saved.version {
            meta.assign_version(version.clone());
        }
        meta.restore_created(saved.created_date, saved.created_by.clone());
        true
    }
}

/// Errors reported by a session.
#[derive(Debug)]
pub enum SessionError {
    /// Storage engine failure (connectivity, I/O, SQL).
    Db(DbError),
    /// Record could not be converted to or from its stored form.
    Serialization(serde_json::Error),
    /// One or more pending records violated field rules; nothing was applied.
    Validation {
        message: String,
        records: Vec<RecordValidation>,
    },
    /// A pending update/removal carried a stale version; nothing was applied.
    Concurrency { type_name: &'static str, id: String },
    /// Requested eager-load name is not a relation of the record type.
    UnknownInclude {
        type_name: &'static str,
        relation: String,
    },
    /// Only persisted records (assigned key) can be attached.
    MissingKey { type_name: &'static str },
    /// Entry handle does not belong to this session.
    UnknownEntry(EntryId),
    /// Persisted data does not match the record contract.
    InvalidData(String),
    /// Background execution of a store call failed.
    Worker(String),
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Serialization(err) => write!(f, "record serialization failed: {err}"),
            Self::Validation { message, .. } => write!(f, "{message}"),
            Self::Concurrency { type_name, id } => write!(
                f,
                "record {type_name}/{id} was modified or deleted since it was loaded"
            ),
            Self::UnknownInclude {
                type_name,
                relation,
            } => write!(f, "`{relation}` is not a relation of {type_name}"),
            Self::MissingKey { type_name } => {
                write!(f, "cannot attach a {type_name} record without an assigned id")
            }
            Self::UnknownEntry(entry) => write!(f, "{entry} is not tracked by this session"),
            Self::InvalidData(message) => write!(f, "invalid persisted record data: {message}"),
            Self::Worker(message) => write!(f, "store worker failed: {message}"),
        }
    }
}

impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Serialization(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for SessionError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for SessionError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value)
    }
}

/// Blocking store session.
///
/// One session is one unit of work. It is not meant to serve several
/// in-flight operations at once; callers own its lifecycle.
pub trait Session {
    /// Runs a composed query (filter -> order -> skip -> take).
    fn query<T: Record>(&self, query: &Query<T>) -> SessionResult<Vec<T>>;

    fn count<T: Record>(&self, filter: Option<&Filter<T>>) -> SessionResult<usize>;

    /// Existence probe; must not require materializing all matches.
    fn exists<T: Record>(&self, filter: Option<&Filter<T>>) -> SessionResult<bool>;

    fn find<T: Record>(&self, id: &T::Id) -> SessionResult<Option<T>>;

    /// Attachment state of the record with the same type and key.
    fn entry_state<T: Record>(&self, record: &T) -> EntryState;

    /// Entry tracking the record with the same type and key, if any.
    ///
    /// A record without an assigned key is matched against pending
    /// insertions registered from an equal value.
    fn tracked_entry<T: Record>(&self, record: &T) -> Option<EntryId>;

    /// Registers `record` as pending insertion.
    fn add<T: Record>(&mut self, record: &T) -> SessionResult<EntryId>;

    /// Starts tracking `record` as unchanged. If the same key is already
    /// tracked, its snapshot is replaced and its state kept.
    fn attach<T: Record>(&mut self, record: &T) -> SessionResult<EntryId>;

    fn set_state(&mut self, entry: EntryId, state: EntryState) -> SessionResult<()>;

    /// Current state of a tracked entry; `Detached` once it is gone.
    fn state_of(&self, entry: EntryId) -> EntryState;

    /// Atomically applies every pending change.
    fn save_changes(&mut self) -> SessionResult<SaveReport>;
}

/// Suspend-capable variants of the store round trips of [`Session`].
///
/// Change registration stays on [`Session`]; it never waits on the store.
#[async_trait]
pub trait AsyncSession: Session + Send + Sync {
    async fn query_async<T: Record>(&self, query: &Query<T>) -> SessionResult<Vec<T>>;

    async fn count_async<T: Record>(&self, filter: Option<&Filter<T>>) -> SessionResult<usize>;

    async fn exists_async<T: Record>(&self, filter: Option<&Filter<T>>) -> SessionResult<bool>;

    async fn find_async<T: Record>(&self, id: &T::Id) -> SessionResult<Option<T>>;

    async fn save_changes_async(&mut self) -> SessionResult<SaveReport>;
}
