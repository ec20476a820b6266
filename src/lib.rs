//! Purpose: Paginated, subscribable collection stores for the beacon client.
//! Exports: `api` (engine, adapters, HTTP fetcher), `entities` (wire types), `core`.
//! Role: Library backing the `beacon` binary and embedding applications.
//! Invariants: `api` is the supported surface; `core` stays framework-free.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
pub mod core;
pub mod entities;
