//! SQLite-backed reference session.
//!
//! # Responsibility
//! - Store records of any type as JSON bodies keyed by `(type_name, key)`.
//! - Evaluate composed queries and apply tracked changes atomically.
//!
//! # Invariants
//! - Default order is insertion order (`records.seq`).
//! - Every write bumps the database-wide row clock; the new value is the
//!   record's version.
//! - Updates and deletes match on the caller's last observed version; a
//!   mismatch rolls the whole commit back.
//! - Updates keep the persisted creation stamp.
//! - Nothing is written when any pending record fails validation.

use crate::db::migrations::ensure_schema_ready;
use crate::db::{open_db_in_memory, open_db_with, StoreOptions};
use crate::model::key::RecordKey;
use crate::model::record::{Record, RowVersion};
use crate::model::validation::RecordValidation;
use crate::query::{Filter, Includes, Query};
use crate::session::tracker::{ChangeTracker, CommittedChange, PendingChange, StoreStamp};
use crate::session::{
    AsyncSession, ChangeKind, EntryId, EntryState, SaveReport, SavedEntry, Session, SessionError,
    SessionResult,
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, warn};
use parking_lot::Mutex;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Handle;

const VALIDATION_FAILED_MESSAGE: &str = "Validation failed for one or more records.";

const SELECT_BODIES_SQL: &str = "SELECT body FROM records WHERE type_name = ?1 ORDER BY seq ASC";

/// Reference [`Session`] over a migrated SQLite connection.
///
/// Connection and tracking state share one lock so that a commit and the
/// tracking update that follows it happen together, even when the caller
/// stops waiting on an async save.
pub struct SqliteSession {
    shared: Arc<Mutex<SessionState>>,
}

struct SessionState {
    conn: Connection,
    tracker: ChangeTracker,
}

impl SqliteSession {
    /// Wraps a connection whose schema is already migrated.
    pub fn try_new(conn: Connection) -> SessionResult<Self> {
        ensure_schema_ready(&conn)?;
        Ok(Self {
            shared: Arc::new(Mutex::new(SessionState {
                conn,
                tracker: ChangeTracker::new(),
            })),
        })
    }

    pub fn open(path: impl AsRef<Path>, options: &StoreOptions) -> SessionResult<Self> {
        Self::try_new(open_db_with(path, options)?)
    }

    pub fn open_in_memory() -> SessionResult<Self> {
        Self::try_new(open_db_in_memory()?)
    }

    /// Returns whether any change is waiting for a commit.
    pub fn has_changes(&self) -> bool {
        self.shared.lock().tracker.has_changes()
    }

    /// Stops tracking every entry without touching the store.
    pub fn reset(&mut self) {
        self.shared.lock().tracker.clear();
    }

    async fn run_blocking<R, F>(&self, work: F) -> SessionResult<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut SessionState) -> SessionResult<R> + Send + 'static,
    {
        let runtime = Handle::try_current()
            .map_err(|err| SessionError::Worker(format!("no tokio runtime: {err}")))?;
        let shared = Arc::clone(&self.shared);
        runtime
            .spawn_blocking(move || {
                let mut state = shared.lock();
                work(&mut *state)
            })
            .await
            .map_err(|err| SessionError::Worker(err.to_string()))?
    }
}

impl SessionState {
    fn commit(&mut self) -> SessionResult<SaveReport> {
        let pending = self.tracker.pending();
        if pending.is_empty() {
            debug!("event=session_save module=session status=noop");
            return Ok(SaveReport::default());
        }

        let started_at = Instant::now();
        check_validation(&pending)?;

        let committed = match write_pending(&mut self.conn, &pending) {
            Ok(committed) => committed,
            Err(err) => {
                warn!(
                    "event=session_save module=session status=error pending={} duration_ms={} error={}",
                    pending.len(),
                    started_at.elapsed().as_millis(),
                    err
                );
                return Err(err);
            }
        };

        self.tracker.accept(&committed);
        let report = SaveReport::new(committed.into_iter().map(|change| change.saved).collect());
        debug!(
            "event=session_save module=session status=ok affected={} duration_ms={}",
            report.affected(),
            started_at.elapsed().as_millis()
        );
        Ok(report)
    }
}

impl Session for SqliteSession {
    fn query<T: Record>(&self, query: &Query<T>) -> SessionResult<Vec<T>> {
        load_rows(&self.shared.lock().conn, query)
    }

    fn count<T: Record>(&self, filter: Option<&Filter<T>>) -> SessionResult<usize> {
        count_rows(&self.shared.lock().conn, filter)
    }

    fn exists<T: Record>(&self, filter: Option<&Filter<T>>) -> SessionResult<bool> {
        any_row(&self.shared.lock().conn, filter)
    }

    fn find<T: Record>(&self, id: &T::Id) -> SessionResult<Option<T>> {
        find_row(&self.shared.lock().conn, &id.encode_key())
    }

    fn entry_state<T: Record>(&self, record: &T) -> EntryState {
        self.shared.lock().tracker.state_of_record(record)
    }

    fn tracked_entry<T: Record>(&self, record: &T) -> Option<EntryId> {
        self.shared.lock().tracker.tracked(record)
    }

    fn add<T: Record>(&mut self, record: &T) -> SessionResult<EntryId> {
        self.shared.lock().tracker.add(record)
    }

    fn attach<T: Record>(&mut self, record: &T) -> SessionResult<EntryId> {
        self.shared.lock().tracker.attach(record)
    }

    fn set_state(&mut self, entry: EntryId, state: EntryState) -> SessionResult<()> {
        self.shared.lock().tracker.set_state(entry, state)
    }

    fn state_of(&self, entry: EntryId) -> EntryState {
        self.shared.lock().tracker.state(entry)
    }

    fn save_changes(&mut self) -> SessionResult<SaveReport> {
        self.shared.lock().commit()
    }
}

/// Store calls run on the blocking pool of the current Tokio runtime.
/// Polled outside a runtime they fail with `SessionError::Worker`.
#[async_trait]
impl AsyncSession for SqliteSession {
    async fn query_async<T: Record>(&self, query: &Query<T>) -> SessionResult<Vec<T>> {
        let query = query.clone();
        self.run_blocking(move |state| load_rows(&state.conn, &query))
            .await
    }

    async fn count_async<T: Record>(&self, filter: Option<&Filter<T>>) -> SessionResult<usize> {
        let filter = filter.cloned();
        self.run_blocking(move |state| count_rows(&state.conn, filter.as_ref()))
            .await
    }

    async fn exists_async<T: Record>(&self, filter: Option<&Filter<T>>) -> SessionResult<bool> {
        let filter = filter.cloned();
        self.run_blocking(move |state| any_row(&state.conn, filter.as_ref()))
            .await
    }

    async fn find_async<T: Record>(&self, id: &T::Id) -> SessionResult<Option<T>> {
        let key = id.encode_key();
        self.run_blocking(move |state| find_row::<T>(&state.conn, &key))
            .await
    }

    async fn save_changes_async(&mut self) -> SessionResult<SaveReport> {
        self.run_blocking(SessionState::commit).await
    }
}

fn load_rows<T: Record>(conn: &Connection, query: &Query<T>) -> SessionResult<Vec<T>> {
    ensure_includes::<T>(query.includes())?;
    let started_at = Instant::now();

    let rows = if query.is_window_only() {
        load_window::<T>(conn, query.skip(), query.take())?
    } else {
        query.apply(load_all::<T>(conn)?)
    };

    debug!(
        "event=session_query module=session status=ok type={} includes={} rows={} duration_ms={}",
        T::TYPE_NAME,
        query.includes().len(),
        rows.len(),
        started_at.elapsed().as_millis()
    );
    Ok(rows)
}

fn load_all<T: Record>(conn: &Connection) -> SessionResult<Vec<T>> {
    let mut stmt = conn.prepare(SELECT_BODIES_SQL)?;
    let mut rows = stmt.query([T::TYPE_NAME])?;
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        let body: String = row.get(0)?;
        records.push(decode_body(&body)?);
    }
    Ok(records)
}

fn load_window<T: Record>(
    conn: &Connection,
    skip: Option<usize>,
    take: Option<usize>,
) -> SessionResult<Vec<T>> {
    let mut sql = String::from("SELECT body FROM records WHERE type_name = ?");
    let mut bind_values = vec![SqlValue::Text(T::TYPE_NAME.to_string())];
    sql.push_str(" ORDER BY seq ASC");

    let offset = skip.unwrap_or(0);
    if let Some(limit) = take {
        sql.push_str(" LIMIT ?");
        bind_values.push(SqlValue::Integer(to_sql_int(limit)));
        if offset > 0 {
            sql.push_str(" OFFSET ?");
            bind_values.push(SqlValue::Integer(to_sql_int(offset)));
        }
    } else if offset > 0 {
        sql.push_str(" LIMIT -1 OFFSET ?");
        bind_values.push(SqlValue::Integer(to_sql_int(offset)));
    }

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(bind_values))?;
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        let body: String = row.get(0)?;
        records.push(decode_body(&body)?);
    }
    Ok(records)
}

fn count_rows<T: Record>(conn: &Connection, filter: Option<&Filter<T>>) -> SessionResult<usize> {
    let Some(filter) = filter else {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM records WHERE type_name = ?1",
            [T::TYPE_NAME],
            |row| row.get(0),
        )?;
        return usize::try_from(count)
            .map_err(|_| SessionError::InvalidData(format!("negative row count {count}")));
    };

    let mut stmt = conn.prepare(SELECT_BODIES_SQL)?;
    let mut rows = stmt.query([T::TYPE_NAME])?;
    let mut count = 0;
    while let Some(row) = rows.next()? {
        let body: String = row.get(0)?;
        if filter.matches(&decode_body::<T>(&body)?) {
            count += 1;
        }
    }
    Ok(count)
}

fn any_row<T: Record>(conn: &Connection, filter: Option<&Filter<T>>) -> SessionResult<bool> {
    let Some(filter) = filter else {
        let exists: i64 = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM records WHERE type_name = ?1)",
            [T::TYPE_NAME],
            |row| row.get(0),
        )?;
        return Ok(exists == 1);
    };

    let mut stmt = conn.prepare(SELECT_BODIES_SQL)?;
    let mut rows = stmt.query([T::TYPE_NAME])?;
    while let Some(row) = rows.next()? {
        let body: String = row.get(0)?;
        if filter.matches(&decode_body::<T>(&body)?) {
            return Ok(true);
        }
    }
    Ok(false)
}

fn find_row<T: Record>(conn: &Connection, key: &str) -> SessionResult<Option<T>> {
    let body: Option<String> = conn
        .query_row(
            "SELECT body FROM records WHERE type_name = ?1 AND record_key = ?2",
            params![T::TYPE_NAME, key],
            |row| row.get(0),
        )
        .optional()?;
    body.as_deref().map(decode_body::<T>).transpose()
}

fn ensure_includes<T: Record>(includes: &Includes) -> SessionResult<()> {
    let relations = T::relations();
    match includes
        .iter()
        .find(|name| !relations.iter().any(|relation| relation == name))
    {
        Some(unknown) => Err(SessionError::UnknownInclude {
            type_name: T::TYPE_NAME,
            relation: unknown.to_string(),
        }),
        None => Ok(()),
    }
}

fn check_validation(pending: &[PendingChange]) -> SessionResult<()> {
    let mut failures = Vec::new();
    for change in pending
        .iter()
        .filter(|change| change.kind != ChangeKind::Deleted)
    {
        let errors = change.validate()?;
        if !errors.is_empty() {
            failures.push(RecordValidation {
                type_name: change.type_name,
                key: change.key.clone(),
                errors,
            });
        }
    }

    if failures.is_empty() {
        return Ok(());
    }

    warn!(
        "event=session_save module=session status=invalid failing_records={}",
        failures.len()
    );
    Err(SessionError::Validation {
        message: VALIDATION_FAILED_MESSAGE.to_string(),
        records: failures,
    })
}

fn write_pending(
    conn: &mut Connection,
    pending: &[PendingChange],
) -> SessionResult<Vec<CommittedChange>> {
    let tx = conn.transaction()?;
    let mut committed = Vec::with_capacity(pending.len());
    for change in pending {
        let written = match change.kind {
            ChangeKind::Inserted => insert_record(&tx, change)?,
            ChangeKind::Updated => update_record(&tx, change)?,
            ChangeKind::Deleted => delete_record(&tx, change)?,
        };
        committed.push(written);
    }
    tx.commit()?;
    Ok(committed)
}

fn insert_record(tx: &Transaction<'_>, change: &PendingChange) -> SessionResult<CommittedChange> {
    let sequence = next_key_sequence(tx, change.type_name)?;
    let key = change.generate_key(sequence).ok_or_else(|| {
        SessionError::InvalidData(format!(
            "cannot derive a {} id from sequence {sequence}",
            change.type_name
        ))
    })?;
    let version = next_row_version(tx)?;
    let stamped = change.stamp(&StoreStamp {
        key: key.clone(),
        version: version.clone(),
        preserve_created: None,
    })?;

    tx.execute(
        "INSERT INTO records (
            type_name,
            record_key,
            version,
            created_at,
            created_by,
            modified_at,
            modified_by,
            body
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
        params![
            change.type_name,
            key.as_str(),
            version.as_bytes(),
            stamped.audit.created_date.map(format_timestamp),
            stamped.audit.created_by.as_deref(),
            stamped.audit.modified_date.map(format_timestamp),
            stamped.audit.modified_by.as_deref(),
            stamped.body.to_string(),
        ],
    )?;

    Ok(CommittedChange {
        saved: SavedEntry {
            entry: change.entry,
            type_name: change.type_name,
            key,
            kind: ChangeKind::Inserted,
            version: Some(version),
            created_date: stamped.audit.created_date,
            created_by: stamped.audit.created_by,
        },
        body: Some(stamped.body),
    })
}

fn update_record(tx: &Transaction<'_>, change: &PendingChange) -> SessionResult<CommittedChange> {
    let key = tracked_key(change)?;
    let stored: Option<(Option<String>, Option<String>)> = tx
        .query_row(
            "SELECT created_at, created_by FROM records WHERE type_name = ?1 AND record_key = ?2",
            params![change.type_name, key],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let Some((created_at, created_by)) = stored else {
        return Err(conflict(change, key));
    };
    let created_date = created_at.as_deref().map(parse_timestamp).transpose()?;

    let version = next_row_version(tx)?;
    let stamped = change.stamp(&StoreStamp {
        key: key.to_string(),
        version: version.clone(),
        preserve_created: Some((created_date, created_by.clone())),
    })?;

    let changed = tx.execute(
        "UPDATE records
         SET
            version = ?1,
            modified_at = ?2,
            modified_by = ?3,
            body = ?4
         WHERE type_name = ?5
           AND record_key = ?6
           AND version = ?7;",
        params![
            version.as_bytes(),
            stamped.audit.modified_date.map(format_timestamp),
            stamped.audit.modified_by.as_deref(),
            stamped.body.to_string(),
            change.type_name,
            key,
            change.expected_version.as_ref().map(RowVersion::as_bytes),
        ],
    )?;
    if changed == 0 {
        return Err(conflict(change, key));
    }

    Ok(CommittedChange {
        saved: SavedEntry {
            entry: change.entry,
            type_name: change.type_name,
            key: key.to_string(),
            kind: ChangeKind::Updated,
            version: Some(version),
            created_date,
            created_by,
        },
        body: Some(stamped.body),
    })
}

fn delete_record(tx: &Transaction<'_>, change: &PendingChange) -> SessionResult<CommittedChange> {
    let key = tracked_key(change)?;
    let changed = tx.execute(
        "DELETE FROM records
         WHERE type_name = ?1
           AND record_key = ?2
           AND version = ?3;",
        params![
            change.type_name,
            key,
            change.expected_version.as_ref().map(RowVersion::as_bytes),
        ],
    )?;
    if changed == 0 {
        return Err(conflict(change, key));
    }

    Ok(CommittedChange {
        saved: SavedEntry {
            entry: change.entry,
            type_name: change.type_name,
            key: key.to_string(),
            kind: ChangeKind::Deleted,
            version: None,
            created_date: None,
            created_by: None,
        },
        body: None,
    })
}

fn tracked_key(change: &PendingChange) -> SessionResult<&str> {
    change.key.as_deref().ok_or(SessionError::MissingKey {
        type_name: change.type_name,
    })
}

fn conflict(change: &PendingChange, key: &str) -> SessionError {
    warn!(
        "event=session_save module=session status=conflict type={} id={}",
        change.type_name, key
    );
    SessionError::Concurrency {
        type_name: change.type_name,
        id: key.to_string(),
    }
}

fn next_key_sequence(tx: &Transaction<'_>, type_name: &str) -> SessionResult<i64> {
    let value: i64 = tx.query_row(
        "INSERT INTO key_sequences (type_name, next_value) VALUES (?1, 1)
         ON CONFLICT (type_name) DO UPDATE SET next_value = next_value + 1
         RETURNING next_value;",
        [type_name],
        |row| row.get(0),
    )?;
    Ok(value)
}

fn next_row_version(tx: &Transaction<'_>) -> SessionResult<RowVersion> {
    let value: i64 = tx.query_row(
        "UPDATE row_clock SET value = value + 1 WHERE id = 1 RETURNING value;",
        [],
        |row| row.get(0),
    )?;
    Ok(RowVersion::from_bytes(value.to_be_bytes().to_vec()))
}

fn decode_body<T: Record>(body: &str) -> SessionResult<T> {
    Ok(serde_json::from_str(body)?)
}

fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_timestamp(value: &str) -> SessionResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|_| SessionError::InvalidData(format!("invalid timestamp `{value}` in records")))
}

fn to_sql_int(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::{format_timestamp, parse_timestamp, SqliteSession};
    use crate::db::DbError;
    use crate::session::SessionError;
    use chrono::Utc;
    use rusqlite::Connection;

    #[test]
    fn timestamps_round_trip_exactly() {
        let now = Utc::now();
        assert_eq!(parse_timestamp(&format_timestamp(now)).unwrap(), now);
    }

    #[test]
    fn unmigrated_connection_is_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        let result = SqliteSession::try_new(conn);
        assert!(matches!(
            result,
            Err(SessionError::Db(DbError::SchemaNotReady {
                actual_version: 0,
                ..
            }))
        ));
    }
}
