//! Purpose: `beacon` CLI entry point.
//! Role: Binary crate root; parses args, runs commands, emits JSON on stdout.
//! Invariants: Commands emit one JSON document on stdout (pretty on a TTY).
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
//! Invariants: All paging goes through a registry-owned `ExternalStore`.
#![allow(clippy::result_large_err)]
use std::error::Error as StdError;
use std::io::{self, IsTerminal};
use std::net::SocketAddr;
use std::str::FromStr;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum, error::ErrorKind as ClapErrorKind};
use clap_complete::aot::Shell;
use serde::Serialize;
use serde_json::{Map, Value, json};

mod command_dispatch;
mod serve;

use beacon_store::api::{
    CollectionState, DEFAULT_PAGE_SIZE, EngineConfig, ErrorKind, FetchError, RemoteClient,
    RemoteCollection, RemoteEntity, StoreRegistry, to_exit_code,
};
use beacon_store::entities::Collection;

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, (FetchError, ColorMode)> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    (
                        FetchError::new(ErrorKind::Io)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome { exit_code });
            }
            _ => {
                return Err((
                    FetchError::new(ErrorKind::Usage)
                        .with_message(clap_error_summary(&err))
                        .with_hint("Try `beacon --help`."),
                    ColorMode::Auto,
                ));
            }
        },
    };

    let color_mode = cli.color;
    command_dispatch::dispatch_command(cli.command).map_err(|err| (err, color_mode))
}

#[derive(Parser)]
#[command(
    name = "beacon",
    version,
    about = "Page through beacon collections (journal, moods, beacons, community)",
    long_about = None,
    after_help = r#"EXAMPLES
  $ beacon serve --seed 25                                   # Terminal 1
  $ beacon page journal --url http://127.0.0.1:7380          # first page
  $ beacon page moods --url http://127.0.0.1:7380 --all      # every page
  $ beacon show beacons bcn-0003 --url http://127.0.0.1:7380"#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        default_value = "auto",
        value_enum,
        help = "Colorize stderr diagnostics: auto|always|never"
    )]
    color: ColorMode,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

fn parse_collection(raw: &str) -> Result<Collection, String> {
    Collection::parse(raw).ok_or_else(|| {
        let names: Vec<&str> = Collection::ALL.iter().map(|c| c.as_str()).collect();
        format!("unknown collection '{raw}' (expected one of: {})", names.join(", "))
    })
}

#[derive(Subcommand)]
enum Command {
    #[command(
        about = "Load pages of a collection and print the resulting state",
        after_help = r#"EXAMPLES
  $ beacon page journal --url http://127.0.0.1:7380
  $ beacon page community --url http://127.0.0.1:7380 --pages 3 --page-size 5"#
    )]
    Page {
        #[arg(
            value_parser = parse_collection,
            help = "Collection to page through: journal|moods|beacons|community"
        )]
        collection: Collection,
        #[command(flatten)]
        remote: RemoteArgs,
        #[arg(long, default_value_t = 1, help = "Number of pages to load")]
        pages: usize,
        #[arg(long, conflicts_with = "pages", help = "Load until the collection is exhausted")]
        all: bool,
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE, help = "Items per page")]
        page_size: usize,
    },
    #[command(about = "Fetch one item by id")]
    Show {
        #[arg(
            value_parser = parse_collection,
            help = "Collection the item belongs to: journal|moods|beacons|community"
        )]
        collection: Collection,
        #[arg(help = "Item id")]
        id: String,
        #[command(flatten)]
        remote: RemoteArgs,
    },
    #[command(
        about = "Serve in-memory collections over HTTP",
        long_about = r#"Serve deterministic fixture collections over HTTP/JSON.

Endpoints:
  GET /healthz
  GET /v0/<collection>?take=N&skip=M
  GET /v0/<collection>/<id>"#
    )]
    Serve(ServeArgs),
    #[command(about = "Generate shell completion scripts")]
    Completion {
        #[arg(help = "Shell to generate completions for")]
        shell: Shell,
    },
}

#[derive(clap::Args)]
struct RemoteArgs {
    #[arg(long, help = "Server base URL, e.g. http://127.0.0.1:7380")]
    url: String,
    #[arg(long, help = "Bearer token sent with each request")]
    token: Option<String>,
    #[arg(long, default_value_t = 10_000, help = "Request timeout in milliseconds")]
    timeout_ms: u64,
}

#[derive(clap::Args)]
struct ServeArgs {
    #[arg(long, default_value = "127.0.0.1:7380", help = "Address to bind")]
    bind: SocketAddr,
    #[arg(long, help = "Require this bearer token on every request")]
    token: Option<String>,
    #[arg(long, help = "Allow binding a non-loopback address")]
    allow_non_loopback: bool,
    #[arg(long, default_value_t = 42, help = "Items generated per collection")]
    seed: usize,
    #[arg(long, default_value_t = 100, help = "Largest accepted take")]
    max_take: usize,
}

#[derive(Copy, Clone, Debug)]
enum PageBudget {
    Pages(usize),
    All,
}

fn remote_client(remote: &RemoteArgs) -> Result<RemoteClient, FetchError> {
    if remote.timeout_ms == 0 {
        return Err(FetchError::new(ErrorKind::Usage)
            .with_message("--timeout-ms must be greater than zero")
            .with_hint("Use a positive value like 10000."));
    }
    let mut client = RemoteClient::new(remote.url.clone())?
        .with_timeout(std::time::Duration::from_millis(remote.timeout_ms));
    if let Some(token) = &remote.token {
        client = client.with_token(token.clone());
    }
    Ok(client)
}

fn build_runtime() -> Result<tokio::runtime::Runtime, FetchError> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| {
            FetchError::new(ErrorKind::Internal)
                .with_message("failed to start runtime")
                .with_source(err)
        })
}

fn page_collection<T>(
    client: &RemoteClient,
    page_size: usize,
    budget: PageBudget,
) -> Result<Value, FetchError>
where
    T: RemoteEntity + Serialize,
{
    if let PageBudget::Pages(0) = budget {
        return Err(FetchError::new(ErrorKind::Usage)
            .with_message("--pages must be greater than zero")
            .with_hint("Use --pages 1 or --all."));
    }
    let store = StoreRegistry::global().get_or_init::<RemoteCollection<T>>(|| {
        (client.collection::<T>(), EngineConfig::new(page_size))
    })?;
    let runtime = build_runtime()?;
    let state = runtime.block_on(async {
        store.refresh().await;
        let mut loaded = 1;
        loop {
            let state = store.snapshot();
            let done = match budget {
                PageBudget::Pages(limit) => loaded >= limit,
                PageBudget::All => false,
            };
            if done || !state.has_more() || state.error().is_some() {
                return state;
            }
            store.load_next().await;
            loaded += 1;
        }
    });
    if let Some(err) = state.error() {
        return Err(FetchError::clone(err));
    }
    Ok(state_json(T::COLLECTION, &state))
}

fn show_item<T>(client: &RemoteClient, raw_id: &str) -> Result<Value, FetchError>
where
    T: RemoteEntity + Serialize,
    T::Id: FromStr,
{
    let id = raw_id.parse::<T::Id>().map_err(|_| {
        FetchError::new(ErrorKind::Usage)
            .with_message(format!("invalid id for {}", T::COLLECTION))
            .with_id(raw_id)
    })?;
    let store = StoreRegistry::global()
        .get_or_init::<RemoteCollection<T>>(|| (client.collection::<T>(), EngineConfig::default()))?;
    let runtime = build_runtime()?;
    let item = runtime.block_on(store.get_detail(&id))?;
    serde_json::to_value(&item).map_err(|err| {
        FetchError::new(ErrorKind::Internal)
            .with_message("failed to encode item")
            .with_source(err)
    })
}

fn state_json<T: Serialize>(collection: &str, state: &CollectionState<T>) -> Value {
    json!({
        "collection": collection,
        "items": state.items(),
        "count": state.len(),
        "skip": state.skip(),
        "has_more": state.has_more(),
        "total": state.total(),
    })
}

fn emit_json(value: Value) {
    let json = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

#[derive(Copy, Clone, Debug)]
enum AnsiColor {
    Red,
    Yellow,
}

fn colorize_label(label: &str, enabled: bool, color: AnsiColor) -> String {
    if !enabled {
        return label.to_string();
    }
    let code = match color {
        AnsiColor::Red => "31",
        AnsiColor::Yellow => "33",
    };
    format!("\u{1b}[{code}m{label}\u{1b}[0m")
}

fn emit_error(err: &FetchError, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
        return;
    }

    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &FetchError) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::NotFound => "not found".to_string(),
        ErrorKind::Busy => "server is busy".to_string(),
        ErrorKind::Permission => "permission denied".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
    }
}

fn error_causes(err: &FetchError) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &FetchError) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(collection) = err.collection() {
        inner.insert("collection".to_string(), json!(collection));
    }
    if let Some(id) = err.id() {
        inner.insert("id".to_string(), json!(id));
    }
    if let Some(skip) = err.skip() {
        inner.insert("skip".to_string(), json!(skip));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &FetchError, use_color: bool) -> String {
    let mut lines = vec![format!(
        "{} {}",
        colorize_label("error:", use_color, AnsiColor::Red),
        error_message(err)
    )];
    if let Some(hint) = err.hint() {
        lines.push(format!(
            "{} {hint}",
            colorize_label("hint:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(id) = err.id() {
        lines.push(format!(
            "{} {id}",
            colorize_label("id:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(cause) = error_causes(err).first() {
        lines.push(format!(
            "{} {cause}",
            colorize_label("caused by:", use_color, AnsiColor::Yellow)
        ));
    }
    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}
