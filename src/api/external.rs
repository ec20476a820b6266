//! Purpose: Expose pagination engines as process-wide subscribable stores.
//! Exports: `ExternalStore`, `StoreRegistry`.
//! Role: Store binding for consumers outside any screen tree (badges, background tasks).
//! Invariants: A registry holds at most one store per fetcher type; every handle
//! Invariants: obtained for that type drives the same engine.
//! Invariants: `snapshot()` returns a pointer-equal `Arc` until the state changes.

use crate::core::engine::{EngineConfig, PaginationEngine};
use crate::core::error::FetchResult;
use crate::core::fetch::{Identified, PageFetcher};
use crate::core::notify::Subscription;
use crate::core::state::CollectionState;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use tokio::sync::watch;

type ItemId<F> = <<F as PageFetcher>::Item as Identified>::Id;

pub struct ExternalStore<F: PageFetcher> {
    engine: Arc<PaginationEngine<F>>,
}

impl<F: PageFetcher> Clone for ExternalStore<F> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
        }
    }
}

impl<F: PageFetcher> ExternalStore<F> {
    pub fn new(fetcher: F, config: EngineConfig) -> FetchResult<Self> {
        Ok(Self {
            engine: Arc::new(PaginationEngine::new(fetcher, config)?),
        })
    }

    pub fn engine(&self) -> &Arc<PaginationEngine<F>> {
        &self.engine
    }

    pub fn subscribe(
        &self,
        listener: impl Fn(&CollectionState<F::Item>) + Send + Sync + 'static,
    ) -> Subscription {
        self.engine.subscribe(listener)
    }

    pub fn snapshot(&self) -> Arc<CollectionState<F::Item>> {
        self.engine.snapshot()
    }

    /// Channel view of the store for async render loops.
    ///
    /// The receiver starts at the current snapshot and sees every later one;
    /// the returned `Subscription` keeps the channel fed.
    pub fn watch(
        &self,
    ) -> (
        watch::Receiver<Arc<CollectionState<F::Item>>>,
        Subscription,
    ) {
        let (tx, rx) = watch::channel(self.engine.snapshot());
        let weak = Arc::downgrade(&self.engine);
        let subscription = self.engine.subscribe(move |_| {
            if let Some(engine) = weak.upgrade() {
                tx.send_replace(engine.snapshot());
            }
        });
        (rx, subscription)
    }

    pub async fn load_next(&self) {
        self.engine.load_next().await;
    }

    pub async fn refresh(&self) {
        self.engine.refresh().await;
    }

    pub async fn get_detail(&self, id: &ItemId<F>) -> FetchResult<F::Item> {
        self.engine.get_detail(id).await
    }

    pub fn upsert_local(&self, item: F::Item) {
        self.engine.upsert_local(item);
    }

    pub fn remove_local(&self, id: &ItemId<F>) -> Option<F::Item> {
        self.engine.remove_local(id)
    }

    pub fn clear_selected(&self) {
        self.engine.clear_selected();
    }
}

/// One store per fetcher type.
#[derive(Default)]
pub struct StoreRegistry {
    stores: Mutex<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry shared by the whole process.
    pub fn global() -> &'static StoreRegistry {
        static GLOBAL: OnceLock<StoreRegistry> = OnceLock::new();
        GLOBAL.get_or_init(StoreRegistry::new)
    }

    /// Return the store for `F`, building it with `init` on first use.
    ///
    /// `init` runs without the registry lock held, so it may use the registry
    /// itself. If two callers race, the first store inserted wins and the other
    /// engine is dropped unused.
    pub fn get_or_init<F: PageFetcher>(
        &self,
        init: impl FnOnce() -> (F, EngineConfig),
    ) -> FetchResult<ExternalStore<F>> {
        if let Some(store) = self.get::<F>() {
            return Ok(store);
        }
        let (fetcher, config) = init();
        let built = ExternalStore::new(fetcher, config)?;
        let mut stores = self.lock();
        let entry = stores
            .entry(TypeId::of::<F>())
            .or_insert_with(|| Box::new(built.clone()) as Box<dyn Any + Send + Sync>);
        Ok(entry
            .downcast_ref::<ExternalStore<F>>()
            .cloned()
            .unwrap_or(built))
    }

    pub fn get<F: PageFetcher>(&self) -> Option<ExternalStore<F>> {
        self.lock()
            .get(&TypeId::of::<F>())
            .and_then(|entry| entry.downcast_ref::<ExternalStore<F>>())
            .cloned()
    }

    /// Drop the store for `F`; handles already handed out keep working.
    pub fn remove<F: PageFetcher>(&self) -> bool {
        self.lock().remove(&TypeId::of::<F>()).is_some()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TypeId, Box<dyn Any + Send + Sync>>> {
        self.stores
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::{ExternalStore, StoreRegistry};
    use crate::core::engine::EngineConfig;
    use crate::core::error::{ErrorKind, FetchError, FetchResult};
    use crate::core::fetch::{Identified, Page, PageFetcher};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Debug)]
    struct Beacon {
        id: String,
    }

    impl Identified for Beacon {
        type Id = String;

        fn id(&self) -> &String {
            &self.id
        }
    }

    #[derive(Default)]
    struct Beacons {
        calls: AtomicUsize,
    }

    impl PageFetcher for Beacons {
        type Item = Beacon;

        async fn fetch_page(&self, take: usize, skip: usize) -> FetchResult<Page<Beacon>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let items = (skip..(skip + take).min(3))
                .map(|n| Beacon {
                    id: format!("b-{n}"),
                })
                .collect();
            Ok(Page::new(items))
        }

        async fn fetch_by_id(&self, id: &String) -> FetchResult<Beacon> {
            Err(FetchError::new(ErrorKind::NotFound).with_id(id))
        }
    }

    struct Other;

    impl PageFetcher for Other {
        type Item = Beacon;

        async fn fetch_page(&self, _take: usize, _skip: usize) -> FetchResult<Page<Beacon>> {
            Ok(Page::new(Vec::new()))
        }

        async fn fetch_by_id(&self, id: &String) -> FetchResult<Beacon> {
            Err(FetchError::not_found(id))
        }
    }

    #[tokio::test]
    async fn registry_shares_one_store_per_fetcher_type() {
        let registry = StoreRegistry::new();
        let badge = registry
            .get_or_init(|| (Beacons::default(), EngineConfig::default()))
            .expect("badge store");
        let screen = registry
            .get_or_init(|| (Beacons::default(), EngineConfig::new(1)))
            .expect("screen store");

        let seen = Arc::new(AtomicUsize::new(0));
        let _subscription = {
            let seen = Arc::clone(&seen);
            badge.subscribe(move |state| {
                seen.store(state.len(), Ordering::SeqCst);
            })
        };
        screen.refresh().await;

        assert_eq!(seen.load(Ordering::SeqCst), 3);
        assert_eq!(badge.snapshot().len(), 3);
        assert_eq!(screen.engine().page_size(), 10);
        assert!(registry.get::<Other>().is_none());
        assert!(registry.get::<Beacons>().is_some());
    }

    #[tokio::test]
    async fn snapshot_identity_changes_only_on_transition() {
        let store = ExternalStore::new(Beacons::default(), EngineConfig::default()).expect("store");
        let first = store.snapshot();
        assert!(Arc::ptr_eq(&first, &store.snapshot()));

        store.load_next().await;
        let loaded = store.snapshot();
        assert!(!Arc::ptr_eq(&first, &loaded));
        assert!(Arc::ptr_eq(&loaded, &store.snapshot()));

        // has_more is false now, so this is a no-op
        store.load_next().await;
        assert!(Arc::ptr_eq(&loaded, &store.snapshot()));
        assert_eq!(store.engine().fetcher().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn watch_tracks_latest_snapshot() {
        let store = ExternalStore::new(Beacons::default(), EngineConfig::default()).expect("store");
        let (mut rx, _subscription) = store.watch();
        assert!(rx.borrow_and_update().is_empty());

        store.upsert_local(Beacon {
            id: "local".to_string(),
        });
        assert!(rx.has_changed().expect("sender alive"));
        let state = rx.borrow_and_update().clone();
        assert_eq!(state.items()[0].id, "local");
        assert!(Arc::ptr_eq(&state, &store.snapshot()));
    }

    #[test]
    fn registry_surfaces_config_errors() {
        let registry = StoreRegistry::new();
        let err = registry
            .get_or_init(|| (Other, EngineConfig::new(0)))
            .err()
            .expect("usage error");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert!(registry.get::<Other>().is_none());
        assert!(!registry.remove::<Other>());
    }

    #[test]
    fn init_may_use_the_registry() {
        let registry = StoreRegistry::new();
        let outer = registry
            .get_or_init(|| {
                let inner = registry
                    .get_or_init(|| (Other, EngineConfig::new(2)))
                    .expect("inner store");
                assert_eq!(inner.engine().page_size(), 2);
                (Beacons::default(), EngineConfig::default())
            })
            .expect("outer store");

        assert_eq!(outer.engine().page_size(), 10);
        assert!(registry.get::<Other>().is_some());
        let again = registry
            .get_or_init(|| (Beacons::default(), EngineConfig::new(1)))
            .expect("existing store");
        assert!(Arc::ptr_eq(outer.engine(), again.engine()));
    }
}
