//! Query composition values handed from the read engine to a session.
//!
//! # Responsibility
//! - Carry caller-supplied filter, order, eager-load and paging choices.
//! - Define the single evaluation order every session must honor.
//!
//! # Invariants
//! - Evaluation order is filter -> order -> skip -> take.
//! - Absent `skip`/`take` mean an unbounded result.
//! - Absent order means the store's default order.

mod includes;
mod predicate;

pub use includes::Includes;
pub use predicate::{Filter, OrderBy};

/// Caller-facing options shared by collection reads.
pub struct ReadOptions<T> {
    pub order_by: Option<OrderBy<T>>,
    pub includes: Includes,
    pub skip: Option<usize>,
    pub take: Option<usize>,
}

impl<T> Default for ReadOptions<T> {
    fn default() -> Self {
        Self {
            order_by: None,
            includes: Includes::none(),
            skip: None,
            take: None,
        }
    }
}

impl<T> Clone for ReadOptions<T> {
    fn clone(&self) -> Self {
        Self {
            order_by: self.order_by.clone(),
            includes: self.includes.clone(),
            skip: self.skip,
            take: self.take,
        }
    }
}

impl<T> std::fmt::Debug for ReadOptions<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadOptions")
            .field("order_by", &self.order_by)
            .field("includes", &self.includes)
            .field("skip", &self.skip)
            .field("take", &self.take)
            .finish()
    }
}

impl<T> ReadOptions<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order_by(mut self, order_by: OrderBy<T>) -> Self {
        self.order_by = Some(order_by);
        self
    }

    pub fn includes(mut self, includes: Includes) -> Self {
        self.includes = includes;
        self
    }

    /// Sets both paging bounds.
    pub fn page(mut self, skip: usize, take: usize) -> Self {
        self.skip = Some(skip);
        self.take = Some(take);
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn take(mut self, take: usize) -> Self {
        self.take = Some(take);
        self
    }
}

/// One composed retrieval against a single record type.
pub struct Query<T> {
    filter: Option<Filter<T>>,
    order_by: Option<OrderBy<T>>,
    includes: Includes,
    skip: Option<usize>,
    take: Option<usize>,
}

impl<T> Clone for Query<T> {
    fn clone(&self) -> Self {
        Self {
            filter: self.filter.clone(),
            order_by: self.order_by.clone(),
            includes: self.includes.clone(),
            skip: self.skip,
            take: self.take,
        }
    }
}

impl<T> std::fmt::Debug for Query<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("filter", &self.filter)
            .field("order_by", &self.order_by)
            .field("includes", &self.includes)
            .field("skip", &self.skip)
            .field("take", &self.take)
            .finish()
    }
}

impl<T> Query<T> {
    /// Unfiltered, unordered, unbounded query.
    pub fn all() -> Self {
        Self {
            filter: None,
            order_by: None,
            includes: Includes::none(),
            skip: None,
            take: None,
        }
    }

    /// Combines an optional filter with collection read options.
    pub fn compose(filter: Option<&Filter<T>>, options: &ReadOptions<T>) -> Self {
        Self {
            filter: filter.cloned(),
            order_by: options.order_by.clone(),
            includes: options.includes.clone(),
            skip: options.skip,
            take: options.take,
        }
    }

    pub fn with_filter(mut self, filter: Option<Filter<T>>) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_order(mut self, order_by: Option<OrderBy<T>>) -> Self {
        self.order_by = order_by;
        self
    }

    pub fn with_includes(mut self, includes: Includes) -> Self {
        self.includes = includes;
        self
    }

    pub fn with_take(mut self, take: Option<usize>) -> Self {
        self.take = take;
        self
    }

    pub fn filter(&self) -> Option<&Filter<T>> {
        self.filter.as_ref()
    }

    pub fn order(&self) -> Option<&OrderBy<T>> {
        self.order_by.as_ref()
    }

    pub fn includes(&self) -> &Includes {
        &self.includes
    }

    pub fn skip(&self) -> Option<usize> {
        self.skip
    }

    pub fn take(&self) -> Option<usize> {
        self.take
    }

    /// Returns whether only paging applies, so a store may page natively.
    pub fn is_window_only(&self) -> bool {
        self.filter.is_none() && self.order_by.is_none()
    }

    /// Evaluates this query over rows already in the store's default order.
    ///
    /// Sessions that load candidate rows into memory use this so that the
    /// filter -> order -> skip -> take contract lives in one place.
    pub fn apply(&self, rows: impl IntoIterator<Item = T>) -> Vec<T> {
        let matched = rows
            .into_iter()
            .filter(|row| self.filter.as_ref().map_or(true, |filter| filter.matches(row)));

        let skip = self.skip.unwrap_or(0);
        let take = self.take.unwrap_or(usize::MAX);

        match &self.order_by {
            Some(order_by) => {
                let mut sorted: Vec<T> = matched.collect();
                sorted.sort_by(|left, right| order_by.compare(left, right));
                sorted.into_iter().skip(skip).take(take).collect()
            }
            None => matched.skip(skip).take(take).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Filter, Includes, OrderBy, Query, ReadOptions};

    #[test]
    fn apply_skips_then_takes_after_ordering() {
        let rows = vec!['F', 'B', 'D', 'A', 'E', 'C'];
        let options = ReadOptions::new()
            .order_by(OrderBy::asc_by(|value: &char| *value))
            .page(2, 3);

        let page = Query::compose(None, &options).apply(rows);
        assert_eq!(page, vec!['C', 'D', 'E']);
    }

    #[test]
    fn apply_filters_before_paging() {
        let filter = Filter::new(|value: &i32| value % 2 == 0);
        let options = ReadOptions::new().skip(1);

        let page = Query::compose(Some(&filter), &options).apply(1..=10);
        assert_eq!(page, vec![4, 6, 8, 10]);
    }

    #[test]
    fn apply_without_paging_returns_everything_in_default_order() {
        let query = Query::<i32>::all();
        assert!(query.is_window_only());
        assert_eq!(query.apply(vec![3, 1, 2]), vec![3, 1, 2]);
    }

    #[test]
    fn take_zero_returns_empty() {
        let query = Query::<i32>::all().with_take(Some(0));
        assert!(query.apply(vec![1, 2]).is_empty());
    }

    #[test]
    fn compose_carries_includes() {
        let options = ReadOptions::<i32>::new().includes(Includes::parse("Orders"));
        let query = Query::compose(None, &options);
        assert_eq!(query.includes().iter().collect::<Vec<_>>(), vec!["Orders"]);
    }
}
