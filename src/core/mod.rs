// Core modules implementing collection state, paging, notification, and errors.
pub mod engine;
pub mod error;
pub mod fetch;
pub mod notify;
pub mod state;
