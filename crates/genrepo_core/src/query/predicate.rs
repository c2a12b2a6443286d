//! Opaque filter and ordering values.
//!
//! Callers build these from closures; the repository passes them to the
//! session untouched and never interprets them.

use std::cmp::Ordering;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Predicate selecting which records a query matches.
pub struct Filter<T>(Arc<dyn Fn(&T) -> bool + Send + Sync>);

impl<T> Filter<T> {
    pub fn new(predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(predicate))
    }

    pub fn matches(&self, record: &T) -> bool {
        (self.0)(record)
    }
}

impl<T> Clone for Filter<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> Debug for Filter<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("Filter(..)")
    }
}

/// Total ordering applied to matched records before paging.
pub struct OrderBy<T>(Arc<dyn Fn(&T, &T) -> Ordering + Send + Sync>);

impl<T: 'static> OrderBy<T> {
    pub fn new(compare: impl Fn(&T, &T) -> Ordering + Send + Sync + 'static) -> Self {
        Self(Arc::new(compare))
    }

    /// Ascending by the extracted key.
    pub fn asc_by<K: Ord>(key: impl Fn(&T) -> K + Send + Sync + 'static) -> Self {
        Self::new(move |left, right| key(left).cmp(&key(right)))
    }

    /// Descending by the extracted key.
    pub fn desc_by<K: Ord>(key: impl Fn(&T) -> K + Send + Sync + 'static) -> Self {
        Self::new(move |left, right| key(right).cmp(&key(left)))
    }

    /// Breaks ties of `self` with `next`.
    pub fn then(self, next: OrderBy<T>) -> Self {
        Self::new(move |left, right| {
            self.compare(left, right)
                .then_with(|| next.compare(left, right))
        })
    }
}

impl<T> OrderBy<T> {
    pub fn compare(&self, left: &T, right: &T) -> Ordering {
        (self.0)(left, right)
    }
}

impl<T> Clone for OrderBy<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> Debug for OrderBy<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("OrderBy(..)")
    }
}
