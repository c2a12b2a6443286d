//! Write tracker: stamps audit metadata and registers pending changes.
//!
//! # Invariants
//! - No operation here writes to durable storage.
//! - `create` sets the creation stamp; `update` sets the modification stamp
//!   and never touches the creation stamp.
//! - A record is attached before a state transition if the session does not
//!   already track it.

use super::{
    AsyncReadOnlyRepository, AsyncRepository, ReadOnlyRepository, RepoError, RepoResult,
    Repository, SessionRepository,
};
use crate::model::key::RecordKey;
use crate::model::record::Record;
use crate::session::{AsyncSession, EntryId, EntryState, SaveReport, Session};
use async_trait::async_trait;
use chrono::Utc;
use log::debug;

impl<S: Session> SessionRepository<'_, S> {
    fn mark_deleted<T: Record>(&mut self, record: &T) -> RepoResult<EntryId> {
        let entry = match self.session.tracked_entry(record) {
            Some(entry) => entry,
            None => self.session.attach(record)?,
        };
        self.session.set_state(entry, EntryState::Deleted)?;

        debug!(
            "event=repo_write module=repo op=delete type={} id={} entry={}",
            T::TYPE_NAME,
            record.id(),
            entry
        );
        Ok(entry)
    }
}

impl<S: Session> Repository for SessionRepository<'_, S> {
    fn create<T: Record>(
        &mut self,
        record: &mut T,
        created_by: Option<&str>,
    ) -> RepoResult<EntryId> {
        record
            .meta_mut()
            .stamp_created(Utc::now(), created_by.map(str::to_string));
        let entry = self.session.add(record)?;

        debug!(
            "event=repo_write module=repo op=create type={} entry={}",
            T::TYPE_NAME,
            entry
        );
        Ok(entry)
    }

    fn update<T: Record>(
        &mut self,
        record: &mut T,
        modified_by: Option<&str>,
    ) -> RepoResult<EntryId> {
        record
            .meta_mut()
            .stamp_modified(Utc::now(), modified_by.map(str::to_string));

        let was_tracked = self.session.entry_state(record) != EntryState::Detached;
        let entry = self.session.attach(record)?;
        self.session.set_state(entry, EntryState::Modified)?;

        debug!(
            "event=repo_write module=repo op=update type={} id={} entry={} attached={}",
            T::TYPE_NAME,
            record.id(),
            entry,
            !was_tracked
        );
        Ok(entry)
    }

    fn delete_by_id<T: Record>(&mut self, id: &T::Id) -> RepoResult<EntryId> {
        let record = self
            .get_by_id::<T>(id)?
            .ok_or_else(|| RepoError::NotFound {
                type_name: T::TYPE_NAME,
                id: id.encode_key(),
            })?;
        self.mark_deleted(&record)
    }

    fn delete<T: Record>(&mut self, record: &T) -> RepoResult<EntryId> {
        self.mark_deleted(record)
    }

    fn detach(&mut self, entry: EntryId) -> RepoResult<()> {
        let previous = self.session.state_of(entry);
        self.session.set_state(entry, EntryState::Detached)?;

        debug!(
            "event=repo_write module=repo op=detach entry={} previous={:?}",
            entry, previous
        );
        Ok(())
    }

    fn save(&mut self) -> RepoResult<SaveReport> {
        self.commit()
    }
}

#[async_trait]
impl<S: AsyncSession> AsyncRepository for SessionRepository<'_, S> {
    async fn create_async<T: Record>(
        &mut self,
        record: &mut T,
        created_by: Option<&str>,
    ) -> RepoResult<EntryId> {
        self.create(record, created_by)
    }

    async fn update_async<T: Record>(
        &mut self,
        record: &mut T,
        modified_by: Option<&str>,
    ) -> RepoResult<EntryId> {
        self.update(record, modified_by)
    }

    async fn delete_by_id_async<T: Record>(&mut self, id: &T::Id) -> RepoResult<EntryId> {
        let loaded: Option<T> = self.get_by_id_async(id).await?;
        let record = loaded.ok_or_else(|| RepoError::NotFound {
            type_name: T::TYPE_NAME,
            id: id.encode_key(),
        })?;
        self.mark_deleted(&record)
    }

    async fn delete_async<T: Record>(&mut self, record: &T) -> RepoResult<EntryId> {
        self.mark_deleted(record)
    }

    async fn detach_async(&mut self, entry: EntryId) -> RepoResult<()> {
        self.detach(entry)
    }

    async fn save_async(&mut self) -> RepoResult<SaveReport> {
        self.commit_async().await
    }
}
