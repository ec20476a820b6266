//! Purpose: Provide synchronous change notification for collection state.
//! Exports: `Listeners`, `Subscription`.
//! Role: Observer list the engine fires after every state transition.
//! Invariants: Listeners run after the registry lock is released; a listener may
//! Invariants: subscribe, unsubscribe, or read engine state without deadlocking.
//! Invariants: Dropping a `Subscription` removes its listener exactly once.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

type Callback<S> = Arc<dyn Fn(&S) + Send + Sync>;

struct Registry<S> {
    next_id: u64,
    entries: Vec<(u64, Callback<S>)>,
}

pub(crate) struct Listeners<S> {
    registry: Arc<Mutex<Registry<S>>>,
}

impl<S: 'static> Listeners<S> {
    pub(crate) fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    pub(crate) fn subscribe(&self, listener: impl Fn(&S) + Send + Sync + 'static) -> Subscription {
        let id = {
            let mut registry = lock(&self.registry);
            let id = registry.next_id;
            registry.next_id += 1;
            registry.entries.push((id, Arc::new(listener)));
            id
        };
        let weak: Weak<Mutex<Registry<S>>> = Arc::downgrade(&self.registry);
        Subscription {
            unsubscribe: Some(Box::new(move || {
                if let Some(registry) = weak.upgrade() {
                    lock(&registry).entries.retain(|(entry, _)| *entry != id);
                }
            })),
        }
    }

    pub(crate) fn notify(&self, state: &S) {
        let callbacks: Vec<Callback<S>> = lock(&self.registry)
            .entries
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in callbacks {
            callback(state);
        }
    }

    pub(crate) fn clear(&self) {
        lock(&self.registry).entries.clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        lock(&self.registry).entries.len()
    }
}

fn lock<S>(registry: &Mutex<Registry<S>>) -> MutexGuard<'_, Registry<S>> {
    registry
        .lock()
        .unwrap_or_else(|poison| poison.into_inner())
}

/// Handle returned by `subscribe`; the listener stays registered until it drops.
#[must_use = "dropping a Subscription unsubscribes its listener"]
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Keep the listener registered for the lifetime of its source.
    pub fn detach(mut self) {
        self.unsubscribe = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}
