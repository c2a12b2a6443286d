//! Read engine: query composition and single-result semantics.
//!
//! # Invariants
//! - `get_one` probes at most two rows; more than one match is an error.
//! - `get_first` probes at most one row and never fails on multiple matches.
//! - Blocking and async paths build their queries through the same helpers.

use super::{
    AsyncReadOnlyRepository, ReadOnlyRepository, RepoError, RepoResult, SessionRepository,
};
use crate::model::key::RecordKey;
use crate::model::record::Record;
use crate::query::{Filter, Includes, OrderBy, Query, ReadOptions};
use crate::session::{AsyncSession, Session, SessionError};
use async_trait::async_trait;
use log::{debug, warn};

fn single_query<T: Record>(filter: Option<&Filter<T>>, includes: &Includes) -> Query<T> {
    Query::all()
        .with_filter(filter.cloned())
        .with_includes(includes.clone())
        .with_take(Some(2))
}

fn first_query<T: Record>(
    filter: Option<&Filter<T>>,
    order_by: Option<&OrderBy<T>>,
    includes: &Includes,
) -> Query<T> {
    Query::all()
        .with_filter(filter.cloned())
        .with_order(order_by.cloned())
        .with_includes(includes.clone())
        .with_take(Some(1))
}

fn pick_single<T: Record>(rows: Vec<T>) -> RepoResult<Option<T>> {
    let mut rows = rows.into_iter();
    let first = rows.next();
    if rows.next().is_some() {
        debug!(
            "event=repo_read module=repo op=get_one type={} status=ambiguous",
            T::TYPE_NAME
        );
        return Err(RepoError::AmbiguousResult {
            type_name: T::TYPE_NAME,
        });
    }
    Ok(first)
}

fn logged<T, V>(op: &str, result: Result<V, SessionError>) -> RepoResult<V>
where
    T: Record,
{
    match result {
        Ok(value) => {
            debug!(
                "event=repo_read module=repo op={} type={} status=ok",
                op,
                T::TYPE_NAME
            );
            Ok(value)
        }
        Err(err) => {
            warn!(
                "event=repo_read module=repo op={} type={} status=error error={}",
                op,
                T::TYPE_NAME,
                err
            );
            Err(err.into())
        }
    }
}

impl<S: Session> ReadOnlyRepository for SessionRepository<'_, S> {
    fn get_all<T: Record>(&self, options: &ReadOptions<T>) -> RepoResult<Vec<T>> {
        self.get(None, options)
    }

    fn get<T: Record>(
        &self,
        filter: Option<&Filter<T>>,
        options: &ReadOptions<T>,
    ) -> RepoResult<Vec<T>> {
        let query = Query::compose(filter, options);
        logged::<T, _>("get", self.session.query(&query))
    }

    fn get_one<T: Record>(
        &self,
        filter: Option<&Filter<T>>,
        includes: &Includes,
    ) -> RepoResult<Option<T>> {
        let rows = logged::<T, _>(
            "get_one",
            self.session.query(&single_query(filter, includes)),
        )?;
        pick_single(rows)
    }

    fn get_first<T: Record>(
        &self,
        filter: Option<&Filter<T>>,
        order_by: Option<&OrderBy<T>>,
        includes: &Includes,
    ) -> RepoResult<Option<T>> {
        let query = first_query(filter, order_by, includes);
        let rows = logged::<T, _>("get_first", self.session.query(&query))?;
        Ok(rows.into_iter().next())
    }

    fn get_by_id<T: Record>(&self, id: &T::Id) -> RepoResult<Option<T>> {
        if id.is_unassigned() {
            return Ok(None);
        }
        logged::<T, _>("get_by_id", self.session.find::<T>(id))
    }

    fn get_count<T: Record>(&self, filter: Option<&Filter<T>>) -> RepoResult<usize> {
        logged::<T, _>("get_count", self.session.count(filter))
    }

    fn get_exists<T: Record>(&self, filter: Option<&Filter<T>>) -> RepoResult<bool> {
        logged::<T, _>("get_exists", self.session.exists(filter))
    }
}

#[async_trait]
impl<S: AsyncSession> AsyncReadOnlyRepository for SessionRepository<'_, S> {
    async fn get_all_async<T: Record>(&self, options: &ReadOptions<T>) -> RepoResult<Vec<T>> {
        self.get_async(None, options).await
    }

    async fn get_async<T: Record>(
        &self,
        filter: Option<&Filter<T>>,
        options: &ReadOptions<T>,
    ) -> RepoResult<Vec<T>> {
        let query = Query::compose(filter, options);
        logged::<T, _>("get", self.session.query_async(&query).await)
    }

    async fn get_one_async<T: Record>(
        &self,
        filter: Option<&Filter<T>>,
        includes: &Includes,
    ) -> RepoResult<Option<T>> {
        let query = single_query(filter, includes);
        let rows = logged::<T, _>("get_one", self.session.query_async(&query).await)?;
        pick_single(rows)
    }

    async fn get_first_async<T: Record>(
        &self,
        filter: Option<&Filter<T>>,
        order_by: Option<&OrderBy<T>>,
        includes: &Includes,
    ) -> RepoResult<Option<T>> {
        let query = first_query(filter, order_by, includes);
        let rows = logged::<T, _>("get_first", self.session.query_async(&query).await)?;
        Ok(rows.into_iter().next())
    }

    async fn get_by_id_async<T: Record>(&self, id: &T::Id) -> RepoResult<Option<T>> {
        if id.is_unassigned() {
            return Ok(None);
        }
        logged::<T, _>("get_by_id", self.session.find_async(id).await)
    }

    async fn get_count_async<T: Record>(&self, filter: Option<&Filter<T>>) -> RepoResult<usize> {
        logged::<T, _>("get_count", self.session.count_async(filter).await)
    }

    async fn get_exists_async<T: Record>(&self, filter: Option<&Filter<T>>) -> RepoResult<bool> {
        logged::<T, _>("get_exists", self.session.exists_async(filter).await)
    }
}
