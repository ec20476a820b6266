//! Purpose: Define the contract between engines and the application's data source.
//! Exports: `Identified`, `Page`, `PageFetcher`.
//! Role: The only seam through which an engine reaches the network (or any backend).
//! Invariants: Item identity (`Identified::id`) is the sole merge key.
//! Invariants: A page holds at most `take` items; `total`, when present, counts the
//! Invariants: whole collection, not the page.

use super::error::FetchResult;
use std::fmt;
use std::future::Future;
use std::hash::Hash;

/// A record with a stable identifier.
pub trait Identified {
    type Id: Clone + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static;

    fn id(&self) -> &Self::Id;
}

#[derive(Clone, Debug, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: Option<usize>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self { items, total: None }
    }

    pub fn with_total(mut self, total: usize) -> Self {
        self.total = Some(total);
        self
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Per-entity data source.
///
/// `fetch_page` returns the slice `[skip, skip + take)` of the collection in
/// display order. `fetch_by_id` fails with `ErrorKind::NotFound` when the id is
/// absent; any transport or server failure is reported with another kind.
pub trait PageFetcher: Send + Sync + 'static {
    type Item: Identified + Clone + Send + Sync + 'static;

    fn fetch_page(
        &self,
        take: usize,
        skip: usize,
    ) -> impl Future<Output = FetchResult<Page<Self::Item>>> + Send;

    fn fetch_by_id(
        &self,
        id: &<Self::Item as Identified>::Id,
    ) -> impl Future<Output = FetchResult<Self::Item>> + Send;
}
