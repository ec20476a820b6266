//! Purpose: Drive incremental loading of one collection through a `PageFetcher`.
//! Exports: `PaginationEngine`, `EngineConfig`, `DEFAULT_PAGE_SIZE`.
//! Role: Framework-free state machine shared by both store adapters.
//! Invariants: At most one list fetch is in flight; extra `load_next` calls are no-ops.
//! Invariants: Every list fetch carries the generation it started in; results from an
//! Invariants: older generation (superseded by `refresh` or `dispose`) are dropped.
//! Invariants: State changes happen under the lock and never across an `.await`;
//! Invariants: listeners are notified after the lock is released.

use super::error::{ErrorKind, FetchError, FetchResult};
use super::fetch::{Identified, Page, PageFetcher};
use super::notify::{Listeners, Subscription};
use super::state::CollectionState;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

pub const DEFAULT_PAGE_SIZE: usize = 10;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct EngineConfig {
    pub page_size: usize,
}

impl EngineConfig {
    pub fn new(page_size: usize) -> Self {
        Self { page_size }
    }

    pub fn validate(&self) -> FetchResult<()> {
        if self.page_size == 0 {
            return Err(FetchError::new(ErrorKind::Usage)
                .with_message("page size must be greater than zero")
                .with_hint("Use a positive value like 10."));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

type Snapshot<F> = Arc<CollectionState<<F as PageFetcher>::Item>>;

struct Inner<T> {
    state: Arc<CollectionState<T>>,
    generation: u64,
    disposed: bool,
}

#[derive(Clone, Copy, Debug)]
struct Ticket {
    generation: u64,
    skip: usize,
}

pub struct PaginationEngine<F: PageFetcher> {
    fetcher: F,
    page_size: usize,
    inner: Mutex<Inner<F::Item>>,
    listeners: Listeners<CollectionState<F::Item>>,
}

impl<F: PageFetcher> PaginationEngine<F> {
    pub fn new(fetcher: F, config: EngineConfig) -> FetchResult<Self> {
        config.validate()?;
        Ok(Self {
            fetcher,
            page_size: config.page_size,
            inner: Mutex::new(Inner {
                state: Arc::new(CollectionState::default()),
                generation: 0,
                disposed: false,
            }),
            listeners: Listeners::new(),
        })
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Current state; the same `Arc` is returned until the next transition.
    pub fn snapshot(&self) -> Snapshot<F> {
        Arc::clone(&self.lock().state)
    }

    pub fn subscribe(
        &self,
        listener: impl Fn(&CollectionState<F::Item>) + Send + Sync + 'static,
    ) -> Subscription {
        self.listeners.subscribe(listener)
    }

    pub fn is_disposed(&self) -> bool {
        self.lock().disposed
    }

    /// Fetch the page after the last one received.
    ///
    /// Failures land in the state's `error` slot rather than the return value.
    pub async fn load_next(&self) {
        let Some(ticket) = self.begin_load_next() else {
            return;
        };
        self.run_list_fetch(ticket).await;
    }

    /// Drop every loaded item and fetch the first page again.
    ///
    /// Any list fetch still in flight is superseded and its result ignored.
    pub async fn refresh(&self) {
        let Some(ticket) = self.begin_refresh() else {
            return;
        };
        self.run_list_fetch(ticket).await;
    }

    /// Load one item for a detail view.
    ///
    /// The item fills the `selected` slot and refreshes the list copy when the id
    /// is already listed; it is never inserted into the list.
    pub async fn get_detail(&self, id: &<F::Item as Identified>::Id) -> FetchResult<F::Item> {
        match self.fetcher.fetch_by_id(id).await {
            Ok(item) => {
                let returned = item.clone();
                self.transition(|state| {
                    let listed = state.refresh_in_place(item.clone());
                    debug!(id = %item.id(), listed, "detail loaded");
                    state.select(Some(item));
                    true
                });
                Ok(returned)
            }
            Err(err) => {
                warn!(id = %id, error = %err, "detail fetch failed");
                Err(err)
            }
        }
    }

    /// Insert or replace an item without a network call; new ids go to the head.
    pub fn upsert_local(&self, item: F::Item) {
        self.transition(|state| {
            state.upsert_front(item);
            true
        });
    }

    pub fn remove_local(&self, id: &<F::Item as Identified>::Id) -> Option<F::Item> {
        let mut removed = None;
        self.transition(|state| {
            removed = state.remove(id);
            removed.is_some()
        });
        removed
    }

    pub fn clear_selected(&self) {
        self.transition(|state| {
            if state.selected().is_none() {
                return false;
            }
            state.select(None);
            true
        });
    }

    /// Detach all listeners and ignore every later operation and pending result.
    pub fn dispose(&self) {
        {
            let mut inner = self.lock();
            inner.disposed = true;
            inner.generation += 1;
        }
        self.listeners.clear();
    }

    fn begin_load_next(&self) -> Option<Ticket> {
        let (ticket, snapshot) = {
            let mut inner = self.lock();
            if inner.disposed || inner.state.is_loading() || !inner.state.has_more() {
                return None;
            }
            let generation = inner.generation;
            let state = Arc::make_mut(&mut inner.state);
            state.begin_fetch();
            let ticket = Ticket {
                generation,
                skip: state.skip(),
            };
            (ticket, Arc::clone(&inner.state))
        };
        self.listeners.notify(&snapshot);
        Some(ticket)
    }

    fn begin_refresh(&self) -> Option<Ticket> {
        let (ticket, snapshot) = {
            let mut inner = self.lock();
            if inner.disposed {
                return None;
            }
            inner.generation += 1;
            let generation = inner.generation;
            let state = Arc::make_mut(&mut inner.state);
            state.reset();
            state.begin_fetch();
            let ticket = Ticket { generation, skip: 0 };
            (ticket, Arc::clone(&inner.state))
        };
        debug!(generation = ticket.generation, "refresh started");
        self.listeners.notify(&snapshot);
        Some(ticket)
    }

    async fn run_list_fetch(&self, ticket: Ticket) {
        debug!(take = self.page_size, skip = ticket.skip, "fetching page");
        let result = self.fetcher.fetch_page(self.page_size, ticket.skip).await;
        self.finish_list_fetch(ticket, result);
    }

    fn finish_list_fetch(&self, ticket: Ticket, result: FetchResult<Page<F::Item>>) {
        let snapshot = {
            let mut inner = self.lock();
            if inner.generation != ticket.generation {
                debug!(
                    generation = ticket.generation,
                    current = inner.generation,
                    skip = ticket.skip,
                    "discarding superseded page"
                );
                return;
            }
            let page_size = self.page_size;
            let state = Arc::make_mut(&mut inner.state);
            match result {
                Ok(page) => {
                    debug!(received = page.len(), skip = ticket.skip, "page loaded");
                    state.apply_page(page, page_size);
                }
                Err(err) => {
                    warn!(skip = ticket.skip, error = %err, "page fetch failed");
                    state.fail(err.with_skip(ticket.skip as u64));
                }
            }
            Arc::clone(&inner.state)
        };
        self.listeners.notify(&snapshot);
    }

    fn transition(&self, apply: impl FnOnce(&mut CollectionState<F::Item>) -> bool) {
        let snapshot = {
            let mut inner = self.lock();
            if inner.disposed {
                return;
            }
            // Work on a scratch copy so an unchanged state keeps its identity.
            let mut next = CollectionState::clone(&inner.state);
            if !apply(&mut next) {
                return;
            }
            inner.state = Arc::new(next);
            Arc::clone(&inner.state)
        };
        self.listeners.notify(&snapshot);
    }

    fn lock(&self) -> MutexGuard<'_, Inner<F::Item>> {
        self.inner
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}

impl<F: PageFetcher> std::fmt::Debug for PaginationEngine<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("PaginationEngine")
            .field("page_size", &self.page_size)
            .field("generation", &inner.generation)
            .field("items", &inner.state.len())
            .field("skip", &inner.state.skip())
            .field("has_more", &inner.state.has_more())
            .field("is_loading", &inner.state.is_loading())
            .field("disposed", &inner.disposed)
            .finish()
    }
}
