//! Command implementations for revstore.
//!
//! Handles:
//! - one-shot reads and writes against the local database
//! - watch: stream committed writes until Ctrl+C
//! - gc / run: one collection pass, or the periodic collector until Ctrl+C
//!
//! Results are printed to stdout as JSON; logs go to stderr.

use std::fs;
use std::io::Read;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::{json, Value};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use revstore_engine::{
    BackendOptions, GarbageCollector, GcOptions, GcReport, NotifierOptions, StorageBackend,
};
use revstore_storage::RocksKv;
use revstore_types::{
    Action, HistoryRequest, ListRequest, ListRequestKey, ListResponse, ReadRequest, ReadResponse,
    Settings, WriteEvent, WrittenEvent,
};

use crate::cli::{Cli, Commands, PayloadArgs};

/// Load configuration (defaults -> file -> env) and apply CLI overrides.
pub fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings =
        Settings::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(db_path) = &cli.db_path {
        settings.db_path = db_path.clone();
    }
    if let Some(log_level) = &cli.log_level {
        settings.log_level = log_level.clone();
    }
    Ok(settings)
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

/// An open database and the engine over it.
pub struct Store {
    kv: Arc<RocksKv>,
    pub backend: Arc<StorageBackend>,
}

impl Store {
    pub fn open(settings: &Settings) -> Result<Self> {
        let db_path = settings.expanded_db_path();
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent).context("Failed to create database directory")?;
        }
        let kv = Arc::new(RocksKv::open(&db_path).context("Failed to open storage")?);
        let options = BackendOptions {
            node_id: settings.node_id,
            notifier: NotifierOptions::from(&settings.notifier),
        };
        let backend = Arc::new(StorageBackend::new(kv.clone(), options));
        Ok(Self { kv, backend })
    }
}

/// Run a command to completion.
pub async fn execute(settings: Settings, command: Commands) -> Result<()> {
    let store = Store::open(&settings)?;
    match command {
        Commands::Watch => watch(&store).await,
        Commands::Run => run(&store, &settings).await,
        command => {
            let output = execute_once(&store, &settings, &command)?;
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
    }
}

/// Run a one-shot command and return its JSON output.
pub fn execute_once(store: &Store, settings: &Settings, command: &Commands) -> Result<Value> {
    let backend = &store.backend;
    match command {
        Commands::Create { key, payload } => {
            let event = WriteEvent::new(key.to_key(), Action::Created, read_payload(payload)?)
                .with_folder(payload.folder.clone());
            let rv = backend.write_event(event).context("Create failed")?;
            Ok(json!({ "key": key.to_key().to_string(), "resource_version": rv }))
        }
        Commands::Update {
            key,
            payload,
            previous_rv,
        } => {
            let event = WriteEvent::new(key.to_key(), Action::Updated, read_payload(payload)?)
                .with_folder(payload.folder.clone())
                .with_previous_rv(*previous_rv);
            let rv = backend.write_event(event).context("Update failed")?;
            Ok(json!({ "key": key.to_key().to_string(), "resource_version": rv }))
        }
        Commands::Delete { key, previous_rv } => {
            let event = WriteEvent::new(key.to_key(), Action::Deleted, Vec::new())
                .with_previous_rv(*previous_rv);
            let rv = backend.write_event(event).context("Delete failed")?;
            Ok(json!({ "key": key.to_key().to_string(), "resource_version": rv }))
        }
        Commands::Get { key, rv } => {
            let resp = backend
                .read_resource(&ReadRequest::at(key.to_key(), *rv))
                .with_context(|| format!("Failed to read {}", key.to_key()))?;
            Ok(render_response(&resp))
        }
        Commands::List {
            group,
            resource,
            namespace,
            limit,
            token,
            rv,
        } => {
            let req = ListRequest {
                key: ListRequestKey::new(namespace.as_str(), group.as_str(), resource.as_str()),
                limit: *limit,
                next_page_token: token.clone().unwrap_or_default(),
                resource_version: *rv,
            };
            let resp = backend.list(&req).context("List failed")?;
            Ok(render_list(&resp))
        }
        Commands::History {
            key,
            rv,
            version_match,
            limit,
            token,
        } => {
            let mut req = HistoryRequest::new(&key.to_key())
                .with_version(*rv, (*version_match).into())
                .with_limit(*limit);
            if let Some(token) = token {
                req = req.with_token(token.clone());
            }
            let resp = backend.history(&req).context("History failed")?;
            Ok(render_list(&resp))
        }
        Commands::Trash { key } => {
            let resp = backend
                .history(&HistoryRequest::trash(&key.to_key()))
                .context("Trash lookup failed")?;
            Ok(render_list(&resp))
        }
        Commands::Stats {
            namespace,
            min_count,
        } => {
            let stats = backend
                .get_resource_stats(namespace, *min_count)
                .context("Stats failed")?;
            Ok(serde_json::to_value(stats)?)
        }
        Commands::Gc { dry_run } => {
            let mut options = GcOptions::from(&settings.gc);
            options.dry_run |= *dry_run;
            let report = backend
                .run_garbage_collection(&options, &CancellationToken::new())
                .context("Garbage collection failed")?;
            if !report.dry_run && report.total_deleted() > 0 {
                store.kv.compact().context("Compaction failed")?;
            }
            Ok(render_report(&report))
        }
        Commands::Watch | Commands::Run => {
            anyhow::bail!("{:?} runs until interrupted and has no single result", command)
        }
    }
}

/// Print every committed write as one JSON line until Ctrl+C.
async fn watch(store: &Store) -> Result<()> {
    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    let mut rx = store
        .backend
        .watch_write_events(cancel.clone())
        .context("Failed to start watch")?;
    while let Some(event) = rx.recv().await {
        println!("{}", serde_json::to_string(&render_event(&event))?);
    }
    Ok(())
}

/// Run the periodic garbage collector until Ctrl+C.
async fn run(store: &Store, settings: &Settings) -> Result<()> {
    info!("revstore starting...");
    info!("  Database path: {}", settings.db_path);
    info!("  GC enabled: {}", settings.gc.enabled);
    info!("  GC interval: {}s", settings.gc.interval_secs);

    let cancel = CancellationToken::new();
    let collector = GarbageCollector::new(store.backend.clone(), GcOptions::from(&settings.gc));
    let handle = collector.start(cancel.clone());

    cancel_on_ctrl_c(cancel.clone()).await;
    if let Err(e) = handle.await {
        warn!("Garbage collector task failed: {}", e);
    }
    store.kv.flush().context("Failed to flush storage")?;
    info!("revstore stopped");
    Ok(())
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    tokio::select! {
        _ = cancel.cancelled() => return,
        result = signal::ctrl_c() => match result {
            Ok(()) => info!("Received Ctrl+C, shutting down..."),
            Err(e) => warn!("Failed to listen for Ctrl+C: {}", e),
        },
    }
    cancel.cancel();
}

/// Payload from `--file`, or stdin when no file is given.
fn read_payload(args: &PayloadArgs) -> Result<Vec<u8>> {
    match &args.file {
        Some(path) => fs::read(path).with_context(|| format!("Failed to read {}", path)),
        None => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .context("Failed to read payload from stdin")?;
            Ok(buf)
        }
    }
}

/// Payloads are shown as JSON when they parse, as text otherwise.
fn render_value(value: &[u8]) -> Value {
    serde_json::from_slice(value)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(value).into_owned()))
}

fn render_response(resp: &ReadResponse) -> Value {
    json!({
        "key": resp.key.to_string(),
        "resource_version": resp.resource_version,
        "folder": resp.folder,
        "value": render_value(&resp.value),
    })
}

fn render_list(resp: &ListResponse) -> Value {
    json!({
        "items": resp.items.iter().map(render_response).collect::<Vec<_>>(),
        "resource_version": resp.resource_version,
        "next_page_token": resp.next_page_token,
    })
}

fn render_event(event: &WrittenEvent) -> Value {
    json!({
        "key": event.key.to_string(),
        "action": event.action.as_str(),
        "resource_version": event.resource_version,
        "previous_rv": event.previous_rv,
        "folder": event.folder,
        "timestamp": event.timestamp.to_rfc3339(),
        "value": render_value(&event.value),
    })
}

fn render_report(report: &GcReport) -> Value {
    json!({
        "dry_run": report.dry_run,
        "deleted": report.deleted,
        "failed": report.failed,
        "events_deleted": report.events_deleted,
    })
}
