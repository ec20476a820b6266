//! Purpose: End-to-end tests for the HTTP fetcher against `beacon serve`.
//! Exports: None (integration test module).
//! Role: Validate paging, detail lookups, and error propagation across TCP.
//! Invariants: Uses a loopback-only server with deterministic fixtures.
//! Invariants: Bounded waits avoid test flakiness.
//! Invariants: Server processes are cleaned up on drop.

use beacon_store::api::{
    EngineConfig, ErrorKind, ExternalStore, PageFetcher, PaginationEngine, RemoteClient,
    StoreProvider,
};
use beacon_store::entities::{BeaconNotification, CommunityPost, JournalEntry, MoodLog};
use std::io::Read;
use std::net::{SocketAddr, TcpListener};
use std::process::{Child, Command, Stdio};
use std::sync::{Mutex, MutexGuard};
use std::thread::sleep;
use std::time::{Duration, Instant};

type TestResult<T> = Result<T, Box<dyn std::error::Error>>;

static SERVER_LOCK: Mutex<()> = Mutex::new(());

struct TestServer {
    child: Child,
    base_url: String,
    _server_guard: MutexGuard<'static, ()>,
}

impl TestServer {
    fn start(seed: usize) -> TestResult<Self> {
        Self::start_with_token(seed, None)
    }

    fn start_with_token(seed: usize, token: Option<&str>) -> TestResult<Self> {
        let guard = SERVER_LOCK
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        let mut last_err: Option<Box<dyn std::error::Error>> = None;
        for _attempt in 0..3 {
            let port = pick_port()?;
            let bind = format!("127.0.0.1:{port}");
            let base_url = format!("http://{bind}");

            let mut command = Command::new(env!("CARGO_BIN_EXE_beacon"));
            command
                .arg("serve")
                .arg("--bind")
                .arg(&bind)
                .arg("--seed")
                .arg(seed.to_string())
                .stdout(Stdio::null())
                .stderr(Stdio::piped());
            if let Some(token) = token {
                command.arg("--token").arg(token);
            }
            let mut child = command.spawn()?;

            match wait_for_server(&mut child, bind.parse()?) {
                Ok(()) => {
                    return Ok(Self {
                        child,
                        base_url,
                        _server_guard: guard,
                    });
                }
                Err(err) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    last_err = Some(err);
                    sleep(Duration::from_millis(30));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| "server failed to start".into()))
    }

    fn client(&self) -> TestResult<RemoteClient> {
        Ok(RemoteClient::new(self.base_url.clone())?)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

#[tokio::test]
async fn remote_paging_walks_every_page() -> TestResult<()> {
    let server = TestServer::start(25)?;
    let engine = PaginationEngine::new(
        server.client()?.collection::<JournalEntry>(),
        EngineConfig::new(10),
    )?;

    engine.load_next().await;
    let state = engine.snapshot();
    assert_eq!(state.len(), 10);
    assert_eq!(state.skip(), 10);
    assert_eq!(state.total(), Some(25));
    assert!(state.has_more());
    assert_eq!(state.items()[0].id, 25);

    engine.load_next().await;
    engine.load_next().await;
    let state = engine.snapshot();
    assert_eq!(state.len(), 25);
    assert_eq!(state.skip(), 25);
    assert!(!state.has_more());
    assert!(state.error().is_none());
    let ids: Vec<u64> = state.items().iter().map(|entry| entry.id).collect();
    let expected: Vec<u64> = (1..=25).rev().collect();
    assert_eq!(ids, expected);

    engine.load_next().await;
    assert!(std::sync::Arc::ptr_eq(&state, &engine.snapshot()));
    Ok(())
}

#[tokio::test]
async fn remote_exact_multiple_ends_on_empty_page() -> TestResult<()> {
    let server = TestServer::start(20)?;
    let fetcher = server.client()?.collection::<MoodLog>();
    let page = fetcher.fetch_page(10, 20).await?;
    assert!(page.is_empty());
    assert_eq!(page.total, Some(20));

    let engine = PaginationEngine::new(fetcher, EngineConfig::new(10))?;
    engine.load_next().await;
    engine.load_next().await;
    let state = engine.snapshot();
    assert_eq!(state.len(), 20);
    assert!(!state.has_more());
    Ok(())
}

#[tokio::test]
async fn remote_detail_found_and_missing() -> TestResult<()> {
    let server = TestServer::start(12)?;
    let fetcher = server.client()?.collection::<BeaconNotification>();

    let beacon = fetcher.fetch_by_id(&"bcn-0003".to_string()).await?;
    assert_eq!(beacon.id, "bcn-0003");

    let err = fetcher
        .fetch_by_id(&"bcn-9999".to_string())
        .await
        .expect_err("missing beacon");
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.collection(), Some("beacons"));
    Ok(())
}

#[tokio::test]
async fn remote_detail_merges_into_provider_state() -> TestResult<()> {
    let server = TestServer::start(12)?;
    let provider = StoreProvider::mount(
        server.client()?.collection::<CommunityPost>(),
        EngineConfig::new(5),
    )?;
    let consumer = provider.consumer();
    consumer.load_next().await?;

    let post = consumer.get_detail(&10).await?;
    assert_eq!(post.id, 10);
    let state = consumer.snapshot()?;
    assert_eq!(state.selected().map(|post| post.id), Some(10));
    assert_eq!(state.len(), 5);
    assert!(state.contains(&10));

    let err = consumer.get_detail(&404).await.expect_err("missing post");
    assert!(err.is_not_found());
    assert_eq!(consumer.snapshot()?.len(), 5);
    Ok(())
}

#[tokio::test]
async fn remote_token_is_required_when_configured() -> TestResult<()> {
    let server = TestServer::start_with_token(6, Some("s3cret"))?;

    let anonymous = ExternalStore::new(
        server.client()?.collection::<JournalEntry>(),
        EngineConfig::default(),
    )?;
    anonymous.load_next().await;
    let state = anonymous.snapshot();
    let err = state.error().expect("permission error");
    assert_eq!(err.kind(), ErrorKind::Permission);
    assert_eq!(err.skip(), Some(0));
    assert!(state.is_empty());

    let authorized = ExternalStore::new(
        server
            .client()?
            .with_token("s3cret")
            .collection::<JournalEntry>(),
        EngineConfig::default(),
    )?;
    authorized.load_next().await;
    let state = authorized.snapshot();
    assert!(state.error().is_none());
    assert_eq!(state.len(), 6);
    assert!(!state.has_more());
    Ok(())
}

#[tokio::test]
async fn remote_oversized_take_is_usage_error() -> TestResult<()> {
    let server = TestServer::start(3)?;
    let fetcher = server.client()?.collection::<JournalEntry>();
    let err = fetcher
        .fetch_page(1_000, 0)
        .await
        .expect_err("take above max");
    assert_eq!(err.kind(), ErrorKind::Usage);
    assert!(err.hint().is_some());
    Ok(())
}

#[tokio::test]
async fn remote_unreachable_server_is_io_error() -> TestResult<()> {
    let port = pick_port()?;
    let client = RemoteClient::new(format!("http://127.0.0.1:{port}"))?
        .with_timeout(Duration::from_millis(500));
    let engine = PaginationEngine::new(client.collection::<MoodLog>(), EngineConfig::default())?;
    engine.load_next().await;
    let state = engine.snapshot();
    assert_eq!(
        state.error().map(|err| err.kind()),
        Some(ErrorKind::Io)
    );
    assert!(!state.is_loading());
    Ok(())
}

fn pick_port() -> TestResult<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}

fn wait_for_server(child: &mut Child, addr: SocketAddr) -> TestResult<()> {
    let url = format!("http://{addr}/healthz");
    let start = Instant::now();
    loop {
        if let Ok(resp) = ureq::get(&url).call() {
            if resp.status() == 200 {
                return Ok(());
            }
        }
        if let Some(status) = child.try_wait()? {
            let mut stderr = String::new();
            if let Some(mut pipe) = child.stderr.take() {
                let _ = pipe.read_to_string(&mut stderr);
            }
            let detail = stderr.trim();
            return Err(format!(
                "server exited before ready (status: {status}, stderr: {})",
                if detail.is_empty() { "<empty>" } else { detail }
            )
            .into());
        }
        if start.elapsed() > Duration::from_secs(8) {
            return Err("server did not start in time".into());
        }
        sleep(Duration::from_millis(20));
    }
}
