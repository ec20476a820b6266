//! Purpose: Provide a loopback HTTP/JSON server exposing paged beacon collections.
//! Exports: `ServeConfig`, `serve`, `init_tracing`.
//! Role: Axum-based reference backend for `RemoteCollection` and local development.
//! Invariants: Envelopes match the ones `RemoteClient` decodes; error kinds remain stable.
//! Invariants: Loopback-only unless explicitly allowed.
//! Notes: Data is deterministic in-memory fixtures, newest first.

use axum::extract::{Path as AxumPath, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use beacon_store::api::{DEFAULT_PAGE_SIZE, ErrorKind, FetchError, Identified};
use beacon_store::entities::{
    BeaconNotification, Collection, CommunityPost, JournalEntry, MoodLog,
};

/// 2026-10-01T00:00:00Z; fixture timestamps count back from here.
const FIXTURE_EPOCH: i64 = 1_790_812_800;

#[derive(Clone, Debug)]
pub struct ServeConfig {
    pub bind: SocketAddr,
    pub token: Option<String>,
    pub allow_non_loopback: bool,
    pub seed: usize,
    pub max_take: usize,
}

struct AppState {
    fixtures: Fixtures,
    token: Option<String>,
    max_take: usize,
}

struct Fixtures {
    journal: Vec<JournalEntry>,
    moods: Vec<MoodLog>,
    beacons: Vec<BeaconNotification>,
    community: Vec<CommunityPost>,
}

pub async fn serve(config: ServeConfig) -> Result<(), FetchError> {
    validate_config(&config)?;

    let state = Arc::new(AppState {
        fixtures: Fixtures::generate(config.seed)?,
        token: config.token,
        max_take: config.max_take,
    });

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/v0/:collection", get(list_items))
        .route("/v0/:collection/:id", get(get_item))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|err| {
            FetchError::new(ErrorKind::Io)
                .with_message("failed to bind server")
                .with_source(err)
        })?;
    info!(bind = %config.bind, seed = config.seed, "serving beacon collections");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| {
            FetchError::new(ErrorKind::Io)
                .with_message("server failed")
                .with_source(err)
        })
}

pub fn init_tracing(default_directive: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn is_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(addr) => addr.is_loopback(),
        IpAddr::V6(addr) => addr.is_loopback(),
    }
}

fn validate_config(config: &ServeConfig) -> Result<(), FetchError> {
    if !is_loopback(config.bind.ip()) && !config.allow_non_loopback {
        return Err(FetchError::new(ErrorKind::Usage)
            .with_message("non-loopback bind requires explicit opt-in")
            .with_hint("Re-run with --allow-non-loopback or use a loopback address."));
    }

    if config.max_take == 0 {
        return Err(FetchError::new(ErrorKind::Usage)
            .with_message("--max-take must be greater than zero")
            .with_hint("Use a positive value like 100."));
    }

    if config.token.as_deref().is_some_and(str::is_empty) {
        return Err(FetchError::new(ErrorKind::Usage)
            .with_message("--token must not be empty")
            .with_hint("Omit --token to serve without authentication."));
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    #[cfg(not(unix))]
    ctrl_c.await;
}

impl Fixtures {
    fn generate(seed: usize) -> Result<Self, FetchError> {
        const LABELS: [&str; 5] = ["heavy", "low", "steady", "calm", "bright"];
        const ROOMS: [&str; 3] = ["morning-checkins", "gratitude", "hard-days"];
        const CONTACTS: [&str; 4] = ["ada", "sam", "noor", "kit"];

        let mut journal = Vec::with_capacity(seed);
        let mut moods = Vec::with_capacity(seed);
        let mut beacons = Vec::with_capacity(seed);
        let mut community = Vec::with_capacity(seed);
        // Index 0 is the newest row; ids grow with recency.
        for age in 0..seed {
            let id = (seed - age) as u64;
            let score = (id % 5) as u8 + 1;
            journal.push(JournalEntry {
                id,
                title: format!("Entry {id}"),
                body: format!("Journal entry number {id}."),
                mood_score: (id % 2 == 0).then_some(score),
                created_at: timestamp(age, 0)?,
            });
            moods.push(MoodLog {
                id,
                score,
                label: LABELS[usize::from(score) - 1].to_string(),
                note: (id % 3 == 0).then(|| format!("note {id}")),
                logged_at: timestamp(age, 15)?,
            });
            beacons.push(BeaconNotification {
                id: format!("bcn-{id:04}"),
                sender: CONTACTS[age % CONTACTS.len()].to_string(),
                message: format!("Checking in ({id})"),
                replied: age % 4 == 3,
                sent_at: timestamp(age, 30)?,
            });
            community.push(CommunityPost {
                id,
                room: ROOMS[age % ROOMS.len()].to_string(),
                author: CONTACTS[(age + 1) % CONTACTS.len()].to_string(),
                body: format!("Post {id}"),
                reply_count: (id % 7) as u32,
                posted_at: timestamp(age, 45)?,
            });
        }
        Ok(Self {
            journal,
            moods,
            beacons,
            community,
        })
    }

    fn page(&self, collection: Collection, take: usize, skip: usize) -> serde_json::Value {
        match collection {
            Collection::Journal => page_json(&self.journal, take, skip),
            Collection::Moods => page_json(&self.moods, take, skip),
            Collection::Beacons => page_json(&self.beacons, take, skip),
            Collection::Community => page_json(&self.community, take, skip),
        }
    }

    fn item(&self, collection: Collection, id: &str) -> Result<serde_json::Value, FetchError> {
        let found = match collection {
            Collection::Journal => find_numeric(&self.journal, id),
            Collection::Moods => find_numeric(&self.moods, id),
            Collection::Community => find_numeric(&self.community, id),
            Collection::Beacons => find_item(&self.beacons, &id.to_string()),
        };
        found.map_err(|err| err.with_collection(collection.as_str()))
    }
}

fn timestamp(age_hours: usize, minute: i64) -> Result<String, FetchError> {
    let unix = FIXTURE_EPOCH - (age_hours as i64) * 3600 + minute * 60;
    OffsetDateTime::from_unix_timestamp(unix)
        .map_err(|err| {
            FetchError::new(ErrorKind::Internal)
                .with_message("fixture timestamp out of range")
                .with_source(err)
        })?
        .format(&Rfc3339)
        .map_err(|err| {
            FetchError::new(ErrorKind::Internal)
                .with_message("failed to format fixture timestamp")
                .with_source(err)
        })
}

fn page_json<T: Serialize>(rows: &[T], take: usize, skip: usize) -> serde_json::Value {
    let items: Vec<&T> = rows.iter().skip(skip).take(take).collect();
    json!({ "items": items, "total": rows.len() })
}

fn find_numeric<T>(rows: &[T], id: &str) -> Result<serde_json::Value, FetchError>
where
    T: Serialize + Identified<Id = u64>,
{
    let parsed = id
        .parse::<u64>()
        .map_err(|_| FetchError::not_found(id).with_message("id must be numeric"))?;
    find_item(rows, &parsed)
}

fn find_item<T>(rows: &[T], id: &T::Id) -> Result<serde_json::Value, FetchError>
where
    T: Serialize + Identified,
{
    let row = rows
        .iter()
        .find(|row| row.id() == id)
        .ok_or_else(|| FetchError::not_found(id))?;
    serde_json::to_value(row)
        .map(|item| json!({ "item": item }))
        .map_err(|err| {
            FetchError::new(ErrorKind::Internal)
                .with_message("failed to encode item")
                .with_source(err)
        })
}

fn authorize(headers: &HeaderMap, state: &AppState) -> Result<(), FetchError> {
    let Some(token) = state.token.as_ref() else {
        return Ok(());
    };
    let Some(value) = headers.get(axum::http::header::AUTHORIZATION) else {
        return Err(FetchError::new(ErrorKind::Permission).with_message("missing bearer token"));
    };
    let value = value.to_str().unwrap_or_default();
    let expected = format!("Bearer {token}");
    if value != expected {
        return Err(FetchError::new(ErrorKind::Permission).with_message("invalid bearer token"));
    }
    Ok(())
}

fn resolve_collection(segment: &str) -> Result<Collection, FetchError> {
    Collection::parse(segment).ok_or_else(|| {
        FetchError::new(ErrorKind::NotFound)
            .with_message("unknown collection")
            .with_collection(segment)
    })
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    take: Option<usize>,
    skip: Option<usize>,
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    kind: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    collection: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
}

async fn healthz() -> Response {
    json_response(json!({ "ok": true }))
}

async fn list_items(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath(collection): AxumPath<String>,
    Query(query): Query<PageQuery>,
) -> Response {
    if let Err(err) = authorize(&headers, &state) {
        return error_response(err);
    }
    let collection = match resolve_collection(&collection) {
        Ok(collection) => collection,
        Err(err) => return error_response(err),
    };
    let take = query.take.unwrap_or(DEFAULT_PAGE_SIZE);
    if take == 0 || take > state.max_take {
        return error_response(
            FetchError::new(ErrorKind::Usage)
                .with_message("take out of range")
                .with_hint(format!("Use 1 <= take <= {}.", state.max_take))
                .with_collection(collection.as_str()),
        );
    }
    let skip = query.skip.unwrap_or(0);
    json_response(state.fixtures.page(collection, take, skip))
}

async fn get_item(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath((collection, id)): AxumPath<(String, String)>,
) -> Response {
    if let Err(err) = authorize(&headers, &state) {
        return error_response(err);
    }
    let result = resolve_collection(&collection)
        .and_then(|collection| state.fixtures.item(collection, &id));
    match result {
        Ok(body) => json_response(body),
        Err(err) => error_response(err),
    }
}

fn json_response(payload: serde_json::Value) -> Response {
    let mut response = Json(payload).into_response();
    response
        .headers_mut()
        .insert("beacon-api-version", HeaderValue::from_static("0"));
    response
}

fn error_response(err: FetchError) -> Response {
    let status = match err.kind() {
        ErrorKind::Usage => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Busy => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::Permission => StatusCode::UNAUTHORIZED,
        ErrorKind::Io | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let body = ErrorEnvelope {
        error: ErrorBody {
            kind: format!("{:?}", err.kind()),
            message: err.message().unwrap_or("error").to_string(),
            hint: err.hint().map(str::to_string),
            collection: err.collection().map(str::to_string),
            id: err.id().map(str::to_string),
        },
    };
    let mut response = (status, Json(body)).into_response();
    response
        .headers_mut()
        .insert("beacon-api-version", HeaderValue::from_static("0"));
    response
}

#[cfg(test)]
mod tests {
    use super::{ErrorKind, Fixtures, ServeConfig, serve, validate_config};
    use beacon_store::entities::Collection;

    fn config(bind: &str) -> ServeConfig {
        ServeConfig {
            bind: bind.parse().expect("bind"),
            token: None,
            allow_non_loopback: false,
            seed: 12,
            max_take: 100,
        }
    }

    #[tokio::test]
    async fn serve_rejects_non_loopback_bind() {
        let err = serve(config("0.0.0.0:0"))
            .await
            .expect_err("expected usage error");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn non_loopback_allowed_with_flag() {
        let mut config = config("0.0.0.0:0");
        config.allow_non_loopback = true;
        validate_config(&config).expect("config ok");
    }

    #[test]
    fn limits_require_positive_values() {
        let mut config = config("127.0.0.1:0");
        config.max_take = 0;
        let err = validate_config(&config).expect_err("expected usage error");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn empty_token_is_rejected() {
        let mut config = config("127.0.0.1:0");
        config.token = Some(String::new());
        let err = validate_config(&config).expect_err("expected usage error");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn fixtures_page_newest_first_with_total() {
        let fixtures = Fixtures::generate(12).expect("fixtures");
        let page = fixtures.page(Collection::Journal, 10, 0);
        let items = page["items"].as_array().expect("items");
        assert_eq!(items.len(), 10);
        assert_eq!(items[0]["id"], 12);
        assert_eq!(items[0]["created_at"], "2026-10-01T00:00:00Z");
        assert_eq!(page["total"], 12);

        let tail = fixtures.page(Collection::Journal, 10, 10);
        assert_eq!(tail["items"].as_array().expect("items").len(), 2);
        let past_end = fixtures.page(Collection::Moods, 10, 50);
        assert!(past_end["items"].as_array().expect("items").is_empty());
    }

    #[test]
    fn fixtures_lookup_by_id() {
        let fixtures = Fixtures::generate(5).expect("fixtures");
        let found = fixtures.item(Collection::Beacons, "bcn-0003").expect("beacon");
        assert_eq!(found["item"]["id"], "bcn-0003");

        let err = fixtures
            .item(Collection::Community, "99")
            .expect_err("missing");
        assert!(err.is_not_found());
        assert_eq!(err.collection(), Some("community"));

        let err = fixtures.item(Collection::Journal, "abc").expect_err("bad id");
        assert!(err.is_not_found());
    }
}
