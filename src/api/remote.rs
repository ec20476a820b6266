//! Purpose: Provide an HTTP page fetcher for the beacon API (JSON envelopes).
//! Exports: `RemoteClient`, `RemoteCollection`, `RemoteEntity`.
//! Role: Default `PageFetcher` implementation used by the CLI and embedding apps.
//! Invariants: Lists are `GET /v0/<collection>?take=&skip=` -> `{"items":[..],"total":n}`.
//! Invariants: Details are `GET /v0/<collection>/<id>` -> `{"item":{..}}`; 404 maps to `NotFound`.
//! Invariants: Blocking HTTP runs on tokio's blocking pool, never on an async worker.
#![allow(clippy::result_large_err)]

use crate::core::error::{ErrorKind, FetchError, FetchResult};
use crate::core::fetch::{Identified, Page, PageFetcher};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// An entity served under `/v0/<COLLECTION>`.
pub trait RemoteEntity: Identified + DeserializeOwned + Clone + Send + Sync + 'static {
    const COLLECTION: &'static str;
}

#[derive(Clone)]
pub struct RemoteClient {
    inner: Arc<RemoteClientInner>,
}

struct RemoteClientInner {
    base_url: Url,
    token: Option<String>,
    agent: ureq::Agent,
}

#[derive(Deserialize)]
struct PageEnvelope<T> {
    items: Vec<T>,
    #[serde(default)]
    total: Option<usize>,
}

#[derive(Deserialize)]
struct ItemEnvelope<T> {
    item: T,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: RemoteError,
}

#[derive(Deserialize)]
struct RemoteError {
    kind: String,
    message: Option<String>,
    hint: Option<String>,
    collection: Option<String>,
    id: Option<String>,
}

impl RemoteClient {
    pub fn new(base_url: impl Into<String>) -> FetchResult<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        let agent = ureq::AgentBuilder::new().build();
        Ok(Self {
            inner: Arc::new(RemoteClientInner {
                base_url,
                token: None,
                agent,
            }),
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.token = Some(token.into());
        } else {
            self.inner = Arc::new(RemoteClientInner {
                base_url: self.inner.base_url.clone(),
                token: Some(token.into()),
                agent: self.inner.agent.clone(),
            });
        }
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.agent = agent;
        } else {
            self.inner = Arc::new(RemoteClientInner {
                base_url: self.inner.base_url.clone(),
                token: self.inner.token.clone(),
                agent,
            });
        }
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    pub fn collection<T: RemoteEntity>(&self) -> RemoteCollection<T> {
        RemoteCollection {
            client: self.clone(),
            marker: PhantomData,
        }
    }

    pub fn fetch_page_blocking<T: RemoteEntity>(
        &self,
        take: usize,
        skip: usize,
    ) -> FetchResult<Page<T>> {
        let mut url = build_url(&self.inner.base_url, &["v0", T::COLLECTION])?;
        url.query_pairs_mut()
            .append_pair("take", &take.to_string())
            .append_pair("skip", &skip.to_string());
        let envelope: PageEnvelope<T> = self
            .get_json(&url)
            .map_err(|err| err.with_collection(T::COLLECTION).with_skip(skip as u64))?;
        debug!(
            collection = T::COLLECTION,
            take,
            skip,
            received = envelope.items.len(),
            "remote page"
        );
        Ok(Page {
            items: envelope.items,
            total: envelope.total,
        })
    }

    pub fn fetch_by_id_blocking<T: RemoteEntity>(&self, id: &T::Id) -> FetchResult<T> {
        let id_segment = id.to_string();
        let url = build_url(&self.inner.base_url, &["v0", T::COLLECTION, &id_segment])?;
        let envelope: ItemEnvelope<T> = self
            .get_json(&url)
            .map_err(|err| err.with_collection(T::COLLECTION).with_id(&id_segment))?;
        Ok(envelope.item)
    }

    fn get_json<R>(&self, url: &Url) -> FetchResult<R>
    where
        R: DeserializeOwned,
    {
        let mut request = self
            .inner
            .agent
            .get(url.as_str())
            .set("Accept", "application/json");
        if let Some(token) = &self.inner.token {
            request = request.set("Authorization", &format!("Bearer {token}"));
        }
        match request.call() {
            Ok(resp) => read_json_response(resp),
            Err(ureq::Error::Status(code, resp)) => Err(parse_error_response(code, resp)),
            Err(ureq::Error::Transport(err)) => Err(FetchError::new(ErrorKind::Io)
                .with_message("request failed")
                .with_source(err)),
        }
    }
}

impl std::fmt::Debug for RemoteClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteClient")
            .field("base_url", &self.inner.base_url.as_str())
            .field("token", &self.inner.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// `PageFetcher` for one entity type over a shared `RemoteClient`.
pub struct RemoteCollection<T> {
    client: RemoteClient,
    marker: PhantomData<fn() -> T>,
}

impl<T> Clone for RemoteCollection<T> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            marker: PhantomData,
        }
    }
}

impl<T: RemoteEntity> PageFetcher for RemoteCollection<T> {
    type Item = T;

    async fn fetch_page(&self, take: usize, skip: usize) -> FetchResult<Page<T>> {
        let client = self.client.clone();
        tokio::task::spawn_blocking(move || client.fetch_page_blocking::<T>(take, skip))
            .await
            .map_err(join_error)?
    }

    async fn fetch_by_id(&self, id: &T::Id) -> FetchResult<T> {
        let client = self.client.clone();
        let id = id.clone();
        tokio::task::spawn_blocking(move || client.fetch_by_id_blocking::<T>(&id))
            .await
            .map_err(join_error)?
    }
}

fn join_error(err: tokio::task::JoinError) -> FetchError {
    FetchError::new(ErrorKind::Internal)
        .with_message("fetch task failed")
        .with_source(err)
}

fn normalize_base_url(raw: String) -> FetchResult<Url> {
    let mut url = Url::parse(&raw).map_err(|err| {
        FetchError::new(ErrorKind::Usage)
            .with_message("invalid remote base url")
            .with_source(err)
    })?;
    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(FetchError::new(ErrorKind::Usage)
            .with_message("remote base url must use http or https scheme"));
    }
    if url.path() != "/" && !url.path().is_empty() {
        return Err(FetchError::new(ErrorKind::Usage)
            .with_message("remote base url must not include a path"));
    }
    url.set_path("/");
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

fn build_url(base_url: &Url, segments: &[&str]) -> FetchResult<Url> {
    let mut url = base_url.clone();
    {
        let mut path = url.path_segments_mut().map_err(|_| {
            FetchError::new(ErrorKind::Usage).with_message("remote base url cannot be a base")
        })?;
        path.clear();
        for segment in segments {
            path.push(segment);
        }
    }
    Ok(url)
}

fn read_json_response<R>(response: ureq::Response) -> FetchResult<R>
where
    R: DeserializeOwned,
{
    let body = response.into_string().map_err(|err| {
        FetchError::new(ErrorKind::Io)
            .with_message("failed to read response body")
            .with_source(err)
    })?;
    serde_json::from_str(&body).map_err(|err| {
        FetchError::new(ErrorKind::Internal)
            .with_message("invalid response json")
            .with_source(err)
    })
}

fn parse_error_response(status: u16, response: ureq::Response) -> FetchError {
    let body = response.into_string().unwrap_or_default();
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(&body) {
        return error_from_remote(envelope.error);
    }
    let kind = error_kind_from_status(status);
    FetchError::new(kind).with_message(format!("remote error status {status}"))
}

fn error_from_remote(remote: RemoteError) -> FetchError {
    let mut err = FetchError::new(parse_error_kind(&remote.kind));
    if let Some(message) = remote.message {
        err = err.with_message(message);
    }
    if let Some(hint) = remote.hint {
        err = err.with_hint(hint);
    }
    if let Some(collection) = remote.collection {
        err = err.with_collection(collection);
    }
    if let Some(id) = remote.id {
        err = err.with_id(id);
    }
    err
}

fn parse_error_kind(kind: &str) -> ErrorKind {
    match kind {
        "Internal" => ErrorKind::Internal,
        "Usage" => ErrorKind::Usage,
        "NotFound" => ErrorKind::NotFound,
        "Busy" => ErrorKind::Busy,
        "Permission" => ErrorKind::Permission,
        "Io" => ErrorKind::Io,
        _ => ErrorKind::Internal,
    }
}

fn error_kind_from_status(status: u16) -> ErrorKind {
    match status {
        400 | 413 | 422 => ErrorKind::Usage,
        401 | 403 => ErrorKind::Permission,
        404 => ErrorKind::NotFound,
        423 | 429 => ErrorKind::Busy,
        500..=599 => ErrorKind::Internal,
        _ => ErrorKind::Io,
    }
}
