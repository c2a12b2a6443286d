//! Reusable change tracker for session implementations.
//!
//! # Responsibility
//! - Keep pending insert/update/remove bookkeeping for records of any type.
//! - Hand a session an owned plan of pending changes and fold committed
//!   results back into tracking state.
//!
//! # Invariants
//! - Entries are snapshots; later edits to the caller's instance are not
//!   seen until the record is registered again.
//! - Entries with an assigned key are unique per `(type_name, key)`.
//! - Removing a pending insertion cancels it instead of scheduling a delete.
//! - Tracking state only changes on commit through [`ChangeTracker::accept`].

use crate::model::key::RecordKey;
use crate::model::record::{Record, RowVersion};
use crate::model::validation::FieldError;
use crate::session::{ChangeKind, EntryId, EntryState, SavedEntry, SessionError, SessionResult};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Store-produced values written onto a record during commit.
#[derive(Debug, Clone)]
pub struct StoreStamp {
    pub key: String,
    pub version: RowVersion,
    /// Persisted creation stamp to keep on update; `None` on insert.
    pub preserve_created: Option<(Option<DateTime<Utc>>, Option<String>)>,
}

/// Audit columns of a stamped record, for stores that index them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditColumns {
    pub created_date: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    pub modified_date: Option<DateTime<Utc>>,
    pub modified_by: Option<String>,
}

/// Record body after store stamping.
#[derive(Debug, Clone)]
pub struct StampedRecord {
    pub body: Value,
    pub audit: AuditColumns,
}

/// Per-type operations captured when a record is registered.
#[derive(Clone, Copy)]
struct EntryHooks {
    validate: fn(&Value) -> SessionResult<Vec<FieldError>>,
    generate_key: fn(i64) -> Option<String>,
    stamp: fn(&Value, &StoreStamp) -> SessionResult<StampedRecord>,
}

impl EntryHooks {
    fn of<T: Record>() -> Self {
        Self {
            validate: validate_snapshot::<T>,
            generate_key: generate_key::<T>,
            stamp: stamp_snapshot::<T>,
        }
    }
}

struct TrackedEntry {
    id: EntryId,
    type_name: &'static str,
    key: Option<String>,
    state: EntryState,
    version: Option<RowVersion>,
    snapshot: Value,
    hooks: EntryHooks,
}

/// One pending change, detached from the tracker so it can cross threads.
#[derive(Clone)]
pub struct PendingChange {
    pub entry: EntryId,
    pub type_name: &'static str,
    /// `None` for insertions.
    pub key: Option<String>,
    pub kind: ChangeKind,
    /// Version the caller last observed; the store compares it on commit.
    pub expected_version: Option<RowVersion>,
    snapshot: Value,
    hooks: EntryHooks,
}

impl PendingChange {
    /// Runs the record type's field rules against the pending snapshot.
    pub fn validate(&self) -> SessionResult<Vec<FieldError>> {
        (self.hooks.validate)(&self.snapshot)
    }

    /// Encodes a store-generated key for an insertion.
    pub fn generate_key(&self, sequence: i64) -> Option<String> {
        (self.hooks.generate_key)(sequence)
    }

    /// Writes store-assigned values into the snapshot.
    pub fn stamp(&self, stamp: &StoreStamp) -> SessionResult<StampedRecord> {
        (self.hooks.stamp)(&self.snapshot, stamp)
    }
}

/// A change the store has durably applied.
#[derive(Debug, Clone)]
pub struct CommittedChange {
    pub saved: SavedEntry,
    /// Final stored body; `None` for deletions.
    pub body: Option<Value>,
}

/// Type-erased pending-change bookkeeping.
#[derive(Default)]
pub struct ChangeTracker {
    entries: Vec<TrackedEntry>,
    next_id: u64,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pending insertion. Insertions are never merged.
    pub fn add<T: Record>(&mut self, record: &T) -> SessionResult<EntryId> {
        self.push(record, None, EntryState::Added)
    }

    /// Tracks a persisted record as unchanged, or refreshes the snapshot of
    /// an entry already tracking the same key.
    pub fn attach<T: Record>(&mut self, record: &T) -> SessionResult<EntryId> {
        let id = record.id();
        if id.is_unassigned() {
            return Err(SessionError::MissingKey {
                type_name: T::TYPE_NAME,
            });
        }
        let key = id.encode_key();

        if let Some(existing) = self.position(T::TYPE_NAME, &key) {
            let entry = &mut self.entries[existing];
            entry.snapshot = serde_json::to_value(record)?;
            entry.version = record.version().cloned();
            entry.hooks = EntryHooks::of::<T>();
            return Ok(entry.id);
        }

        self.push(record, Some(key), EntryState::Unchanged)
    }

    /// Entry tracking the record with the same type and key.
    ///
    /// A transient record matches the pending insertion registered with an
    /// identical snapshot.
    pub fn tracked<T: Record>(&self, record: &T) -> Option<EntryId> {
        let id = record.id();
        if !id.is_unassigned() {
            return self
                .position(T::TYPE_NAME, &id.encode_key())
                .map(|index| self.entries[index].id);
        }

        let snapshot = serde_json::to_value(record).ok()?;
        self.entries
            .iter()
            .find(|tracked| {
                tracked.type_name == T::TYPE_NAME
                    && tracked.key.is_none()
                    && tracked.snapshot == snapshot
            })
            .map(|tracked| tracked.id)
    }

    pub fn state_of_record<T: Record>(&self, record: &T) -> EntryState {
        self.tracked(record)
            .map_or(EntryState::Detached, |entry| self.state(entry))
    }

    pub fn state(&self, entry: EntryId) -> EntryState {
        self.entries
            .iter()
            .find(|tracked| tracked.id == entry)
            .map_or(EntryState::Detached, |tracked| tracked.state)
    }

    /// Moves an entry to `state`.
    ///
    /// `Detached` stops tracking. `Deleted` on a pending insertion cancels it.
    pub fn set_state(&mut self, entry: EntryId, state: EntryState) -> SessionResult<()> {
        let index = self
            .entries
            .iter()
            .position(|tracked| tracked.id == entry)
            .ok_or(SessionError::UnknownEntry(entry))?;

        let current = self.entries[index].state;
        match (current, state) {
            (_, EntryState::Detached) | (EntryState::Added, EntryState::Deleted) => {
                self.entries.remove(index);
            }
            (EntryState::Added, EntryState::Modified | EntryState::Unchanged) => {
                // Still unsaved; it stays an insertion.
            }
            _ => self.entries[index].state = state,
        }
        Ok(())
    }

    pub fn has_changes(&self) -> bool {
        self.entries.iter().any(|tracked| tracked.state.is_pending())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pending changes in registration order.
    pub fn pending(&self) -> Vec<PendingChange> {
        self.entries
            .iter()
            .filter_map(|tracked| {
                let kind = match tracked.state {
                    EntryState::Added => ChangeKind::Inserted,
                    EntryState::Modified => ChangeKind::Updated,
                    EntryState::Deleted => ChangeKind::Deleted,
                    EntryState::Unchanged | EntryState::Detached => return None,
                };
                Some(PendingChange {
                    entry: tracked.id,
                    type_name: tracked.type_name,
                    key: tracked.key.clone(),
                    kind,
                    expected_version: tracked.version.clone(),
                    snapshot: tracked.snapshot.clone(),
                    hooks: tracked.hooks,
                })
            })
            .collect()
    }

    /// Folds a successful commit back into tracking state.
    pub fn accept(&mut self, committed: &[CommittedChange]) {
        for change in committed {
            let Some(index) = self
                .entries
                .iter()
                .position(|tracked| tracked.id == change.saved.entry)
            else {
                continue;
            };

            match (change.saved.kind, &change.body) {
                (ChangeKind::Deleted, _) | (_, None) => {
                    self.entries.remove(index);
                }
                (ChangeKind::Inserted | ChangeKind::Updated, Some(body)) => {
                    let tracked = &mut self.entries[index];
                    tracked.key = Some(change.saved.key.clone());
                    tracked.version = change.saved.version.clone();
                    tracked.snapshot = body.clone();
                    tracked.state = EntryState::Unchanged;
                }
            }
        }
    }

    /// Stops tracking everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn push<T: Record>(
        &mut self,
        record: &T,
        key: Option<String>,
        state: EntryState,
    ) -> SessionResult<EntryId> {
        self.next_id += 1;
        let id = EntryId::new(self.next_id);
        self.entries.push(TrackedEntry {
            id,
            type_name: T::TYPE_NAME,
            key,
            state,
            version: record.version().cloned(),
            snapshot: serde_json::to_value(record)?,
            hooks: EntryHooks::of::<T>(),
        });
        Ok(id)
    }

    fn position(&self, type_name: &str, key: &str) -> Option<usize> {
        self.entries.iter().position(|tracked| {
            tracked.type_name == type_name && tracked.key.as_deref() == Some(key)
        })
    }
}

fn validate_snapshot<T: Record>(snapshot: &Value) -> SessionResult<Vec<FieldError>> {
    let record: T = serde_json::from_value(snapshot.clone())?;
    Ok(record.validate())
}

fn generate_key<T: Record>(sequence: i64) -> Option<String> {
    T::Id::from_sequence(sequence).map(|key| key.encode_key())
}

fn stamp_snapshot<T: Record>(snapshot: &Value, stamp: &StoreStamp) -> SessionResult<StampedRecord> {
    let mut record: T = serde_json::from_value(snapshot.clone())?;
    let key = T::Id::parse_key(&stamp.key).ok_or_else(|| {
        SessionError::InvalidData(format!(
            "key `{}` is not a valid {} id",
            stamp.key,
            T::TYPE_NAME
        ))
    })?;

    let meta = record.meta_mut();
    meta.assign_identity(key);
    meta.assign_version(stamp.version.clone());
    if let Some((created_date, created_by)) = &stamp.preserve_created {
        meta.restore_created(*created_date, created_by.clone());
    }

    let meta = record.meta();
    let audit = AuditColumns {
        created_date: meta.has_created_date().then(|| meta.created_date()),
        created_by: meta.created_by().map(str::to_string),
        modified_date: meta.modified_date(),
        modified_by: meta.modified_by().map(str::to_string),
    };

    Ok(StampedRecord {
        body: serde_json::to_value(&record)?,
        audit,
    })
}
