//! Generic repository over any [`Record`] type.
//!
//! # Responsibility
//! - Define the read-only and read/write repository contracts, blocking and
//!   suspend-capable.
//! - Translate repository calls into session queries and change
//!   registrations; translate commit failures into repository errors.
//!
//! # Invariants
//! - Write operations only register intent; nothing is durable until
//!   `save`/`save_async` returns `Ok`.
//! - Read operations never register changes.
//! - Blocking and async variants share query composition and produce the
//!   same results for the same store state.
//!
//! # See also
//! - `session` for the store boundary these traits sit on.

use crate::model::record::Record;
use crate::query::{Filter, Includes, OrderBy, ReadOptions};
use crate::session::{EntryId, SaveReport};
use async_trait::async_trait;

pub mod commit;
pub mod error;
pub mod read;
pub mod write;

pub use error::{RepoError, RepoResult, ValidationFailure};

/// Read access to records of any type.
pub trait ReadOnlyRepository {
    /// Every record of `T`, ordered and windowed by `options`.
    fn get_all<T: Record>(&self, options: &ReadOptions<T>) -> RepoResult<Vec<T>>;

    /// Records of `T` matching `filter` (all when `None`).
    fn get<T: Record>(
        &self,
        filter: Option<&Filter<T>>,
        options: &ReadOptions<T>,
    ) -> RepoResult<Vec<T>>;

    /// The single match, `None` when nothing matches.
    ///
    /// # Errors
    /// - `RepoError::AmbiguousResult` when more than one record matches.
    fn get_one<T: Record>(
        &self,
        filter: Option<&Filter<T>>,
        includes: &Includes,
    ) -> RepoResult<Option<T>>;

    /// First match after ordering; store order when `order_by` is `None`.
    fn get_first<T: Record>(
        &self,
        filter: Option<&Filter<T>>,
        order_by: Option<&OrderBy<T>>,
        includes: &Includes,
    ) -> RepoResult<Option<T>>;

    fn get_by_id<T: Record>(&self, id: &T::Id) -> RepoResult<Option<T>>;

    fn get_count<T: Record>(&self, filter: Option<&Filter<T>>) -> RepoResult<usize>;

    fn get_exists<T: Record>(&self, filter: Option<&Filter<T>>) -> RepoResult<bool>;
}

/// Read access plus pending writes and commit.
pub trait Repository: ReadOnlyRepository {
    /// Stamps creation metadata and registers `record` for insertion.
    fn create<T: Record>(
        &mut self,
        record: &mut T,
        created_by: Option<&str>,
    ) -> RepoResult<EntryId>;

    /// Stamps modification metadata and registers a full overwrite of
    /// `record`, attaching it first when the session does not track it.
    fn update<T: Record>(
        &mut self,
        record: &mut T,
        modified_by: Option<&str>,
    ) -> RepoResult<EntryId>;

    /// Loads the record with `id` and registers it for removal.
    ///
    /// # Errors
    /// - `RepoError::NotFound` when no such record exists.
    fn delete_by_id<T: Record>(&mut self, id: &T::Id) -> RepoResult<EntryId>;

    /// Registers `record` for removal, attaching it first when detached.
    fn delete<T: Record>(&mut self, record: &T) -> RepoResult<EntryId>;

    /// Withdraws the pending change registered under `entry` and stops
    /// tracking it. A rejected insertion is fixed by detaching its entry and
    /// calling `create` again with the corrected record.
    ///
    /// # Errors
    /// - `RepoError::Store` when `entry` is not tracked by the session.
    fn detach(&mut self, entry: EntryId) -> RepoResult<()>;

    /// Commits every pending change atomically.
    ///
    /// # Errors
    /// - `RepoError::ValidationFailed` listing every violation of the batch.
    /// - `RepoError::ConcurrencyConflict` when a version check fails.
    /// - `RepoError::Store` for any other session failure.
    fn save(&mut self) -> RepoResult<SaveReport>;
}

#[async_trait]
pub trait AsyncReadOnlyRepository: Send + Sync {
    async fn get_all_async<T: Record>(&self, options: &ReadOptions<T>) -> RepoResult<Vec<T>>;

    async fn get_async<T: Record>(
        &self,
        filter: Option<&Filter<T>>,
        options: &ReadOptions<T>,
    ) -> RepoResult<Vec<T>>;

    async fn get_one_async<T: Record>(
        &self,
        filter: Option<&Filter<T>>,
        includes: &Includes,
    ) -> RepoResult<Option<T>>;

    async fn get_first_async<T: Record>(
        &self,
        filter: Option<&Filter<T>>,
        order_by: Option<&OrderBy<T>>,
        includes: &Includes,
    ) -> RepoResult<Option<T>>;

    async fn get_by_id_async<T: Record>(&self, id: &T::Id) -> RepoResult<Option<T>>;

    async fn get_count_async<T: Record>(&self, filter: Option<&Filter<T>>) -> RepoResult<usize>;

    async fn get_exists_async<T: Record>(&self, filter: Option<&Filter<T>>) -> RepoResult<bool>;
}

/// Suspend-capable counterpart of [`Repository`].
///
/// Registration itself never waits on the store; only `delete_by_id_async`
/// (which loads first) and `save_async` suspend.
#[async_trait]
pub trait AsyncRepository: AsyncReadOnlyRepository {
    async fn create_async<T: Record>(
        &mut self,
        record: &mut T,
        created_by: Option<&str>,
    ) -> RepoResult<EntryId>;

    async fn update_async<T: Record>(
        &mut self,
        record: &mut T,
        modified_by: Option<&str>,
    ) -> RepoResult<EntryId>;

    async fn delete_by_id_async<T: Record>(&mut self, id: &T::Id) -> RepoResult<EntryId>;

    async fn delete_async<T: Record>(&mut self, record: &T) -> RepoResult<EntryId>;

    async fn detach_async(&mut self, entry: EntryId) -> RepoResult<()>;

    async fn save_async(&mut self) -> RepoResult<SaveReport>;
}

/// Repository bound to one session for one unit of work.
pub struct SessionRepository<'s, S> {
    session: &'s mut S,
}

impl<'s, S> SessionRepository<'s, S> {
    pub fn new(session: &'s mut S) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &S {
        self.session
    }
}
