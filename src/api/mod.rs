//! Purpose: Define the public Rust API boundary for beacon stores.
//! Exports: Engine, adapters, fetcher contract, HTTP fetcher, and error types.
//! Role: Public, additive-only surface used by the CLI and embedding applications.
//! Invariants: Both store bindings wrap the same `PaginationEngine`; neither adds paging logic.

mod context;
mod external;
mod remote;

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::engine::{DEFAULT_PAGE_SIZE, EngineConfig, PaginationEngine};
pub use crate::core::error::{ErrorKind, FetchError, FetchResult};
pub use crate::core::fetch::{Identified, Page, PageFetcher};
pub use crate::core::notify::Subscription;
pub use crate::core::state::CollectionState;
pub use context::{StoreConsumer, StoreProvider};
pub use external::{ExternalStore, StoreRegistry};
pub use remote::{RemoteClient, RemoteCollection, RemoteEntity};
