//! Purpose: Scope one pagination engine to a provider and hand out consumer handles.
//! Exports: `StoreProvider`, `StoreConsumer`.
//! Role: Tree-scoped store binding (one engine per mounted screen subtree).
//! Invariants: A provider owns exactly one engine for its whole lifetime.
//! Invariants: Dropping the provider disposes the engine; consumers then fail with `Usage`.
//! Invariants: Providers never share engines.

use crate::core::engine::{EngineConfig, PaginationEngine};
use crate::core::error::{ErrorKind, FetchError, FetchResult};
use crate::core::fetch::{Identified, PageFetcher};
use crate::core::notify::Subscription;
use crate::core::state::CollectionState;
use std::sync::{Arc, Weak};

type ItemId<F> = <<F as PageFetcher>::Item as Identified>::Id;

pub struct StoreProvider<F: PageFetcher> {
    engine: Arc<PaginationEngine<F>>,
}

impl<F: PageFetcher> StoreProvider<F> {
    pub fn mount(fetcher: F, config: EngineConfig) -> FetchResult<Self> {
        let engine = PaginationEngine::new(fetcher, config)?;
        Ok(Self {
            engine: Arc::new(engine),
        })
    }

    pub fn consumer(&self) -> StoreConsumer<F> {
        StoreConsumer {
            engine: Arc::downgrade(&self.engine),
        }
    }
}

impl<F: PageFetcher> Drop for StoreProvider<F> {
    fn drop(&mut self) {
        self.engine.dispose();
    }
}

/// Handle used by descendants of a provider; cheap to clone.
pub struct StoreConsumer<F: PageFetcher> {
    engine: Weak<PaginationEngine<F>>,
}

impl<F: PageFetcher> Clone for StoreConsumer<F> {
    fn clone(&self) -> Self {
        Self {
            engine: Weak::clone(&self.engine),
        }
    }
}

impl<F: PageFetcher> StoreConsumer<F> {
    fn engine(&self) -> FetchResult<Arc<PaginationEngine<F>>> {
        self.engine
            .upgrade()
            .filter(|engine| !engine.is_disposed())
            .ok_or_else(|| {
                FetchError::new(ErrorKind::Usage)
                    .with_message("consumer used outside its provider")
                    .with_hint("Keep the StoreProvider alive while consumers are in use.")
            })
    }

    pub fn is_mounted(&self) -> bool {
        self.engine().is_ok()
    }

    pub fn snapshot(&self) -> FetchResult<Arc<CollectionState<F::Item>>> {
        Ok(self.engine()?.snapshot())
    }

    pub fn subscribe(
        &self,
        listener: impl Fn(&CollectionState<F::Item>) + Send + Sync + 'static,
    ) -> FetchResult<Subscription> {
        Ok(self.engine()?.subscribe(listener))
    }

    /// List failures are reported through the state; only an unmounted provider
    /// yields `Err` here.
    pub async fn load_next(&self) -> FetchResult<()> {
        self.engine()?.load_next().await;
        Ok(())
    }

    pub async fn refresh(&self) -> FetchResult<()> {
        self.engine()?.refresh().await;
        Ok(())
    }

    pub async fn get_detail(&self, id: &ItemId<F>) -> FetchResult<F::Item> {
        self.engine()?.get_detail(id).await
    }

    pub fn upsert_local(&self, item: F::Item) -> FetchResult<()> {
        self.engine()?.upsert_local(item);
        Ok(())
    }

    pub fn remove_local(&self, id: &ItemId<F>) -> FetchResult<Option<F::Item>> {
        Ok(self.engine()?.remove_local(id))
    }

    pub fn clear_selected(&self) -> FetchResult<()> {
        self.engine()?.clear_selected();
        Ok(())
    }
}
