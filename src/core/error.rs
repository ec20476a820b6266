//! Purpose: Define the single error type surfaced by fetchers, engines, and adapters.
//! Exports: `FetchError`, `ErrorKind`, `FetchResult`, `to_exit_code`.
//! Role: Shared error model for the library, the HTTP fetcher, and the CLI.
//! Invariants: `ErrorKind` values and their exit codes are stable.
//! Invariants: `NotFound` is the only kind detail screens need to branch on.
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

pub type FetchResult<T> = Result<T, FetchError>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Internal,
    Usage,
    NotFound,
    Busy,
    Permission,
    Io,
}

/// Clones share the underlying cause, so a recorded error can be reported as-is.
#[derive(Clone, Debug)]
pub struct FetchError {
    kind: ErrorKind,
    message: Option<String>,
    hint: Option<String>,
    collection: Option<String>,
    id: Option<String>,
    skip: Option<u64>,
    source: Option<Arc<dyn StdError + Send + Sync>>,
}

impl FetchError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            hint: None,
            collection: None,
            id: None,
            skip: None,
            source: None,
        }
    }

    pub fn not_found(id: impl fmt::Display) -> Self {
        Self::new(ErrorKind::NotFound)
            .with_message("item not found")
            .with_id(id)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    pub fn collection(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn skip(&self) -> Option<u64> {
        self.skip
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    pub fn with_id(mut self, id: impl fmt::Display) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn with_skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(collection) = &self.collection {
            write!(f, " (collection: {collection})")?;
        }
        if let Some(id) = &self.id {
            write!(f, " (id: {id})")?;
        }
        if let Some(skip) = self.skip {
            write!(f, " (skip: {skip})")?;
        }
        Ok(())
    }
}

impl StdError for FetchError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

pub fn to_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Internal => 1,
        ErrorKind::Usage => 2,
        ErrorKind::NotFound => 3,
        ErrorKind::Busy => 5,
        ErrorKind::Permission => 6,
        ErrorKind::Io => 8,
    }
}
