//! Tagwake player entry point.
//!
//! ```text
//! main()
//!  └─ load_config()            -- --config or platform default
//!  └─ run
//!       ├─ radio adapter       (simulated or BLE)
//!       ├─ discovery engine    (Tokio task)
//!       ├─ DispatchSynchronizer ◄── discovery events
//!       ├─ presentation task   (stdout)
//!       └─ inbox task          (JSON lines on stdin)
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use tagwake_player::application::discover_tags::{spawn_discovery_engine, DiscoveryEvent};
use tagwake_player::application::dispatch_messages::{DispatchSynchronizer, PresenterAvailability};
use tagwake_player::application::manage_tags::TagRegistry;
use tagwake_player::infrastructure::inbox::run_inbox;
use tagwake_player::infrastructure::presentation::{run_presentation, ConsolePresenter};
use tagwake_player::infrastructure::radio::simulated::SimulatedRadio;
use tagwake_player::infrastructure::radio::{RadioAdapter, RadioEvent, RADIO_EVENT_CAPACITY};
use tagwake_player::infrastructure::storage::config::{load_config, AppConfig, RadioBackend};
use tagwake_player::infrastructure::storage::registry::FileTagRegistry;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Holds messages until the tag they are addressed to is detected nearby.
#[derive(Debug, Parser)]
#[command(name = "tagwake", version)]
struct Cli {
    /// Config file.  Defaults to the platform config directory.
    #[arg(long, env = "TAGWAKE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand, PartialEq, Eq)]
enum Command {
    /// Read messages from stdin and deliver them when their tag shows up (default).
    Run,
    /// Run a single scan window and print every tag found.
    Scan {
        /// Add newly found tags to the registry.
        #[arg(long)]
        register: bool,
    },
    /// List the tag registry.
    Tags,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();
    let config = load_config(config_path).context("failed to load configuration")?;

    // `RUST_LOG` wins over the configured level.  Logs go to stderr so stdout
    // stays reserved for presented messages.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.player.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config, config_path).await,
        Command::Scan { register } => scan(config, config_path, register).await,
        Command::Tags => list_tags(&config, config_path),
    }
}

async fn run(config: AppConfig, config_path: Option<&Path>) -> anyhow::Result<()> {
    info!(backend = ?config.radio.backend, "tagwake starting");

    let (radio_tx, radio_rx) = mpsc::channel(RADIO_EVENT_CAPACITY);
    let radio = build_radio(&config, radio_tx).await?;
    let (discovery, discovery_events, engine) =
        spawn_discovery_engine(radio, radio_rx, config.discovery_config());

    let (presenter, presenter_rx) = ConsolePresenter::new();
    let mut dispatcher = DispatchSynchronizer::new(
        config.dispatch_config(),
        Arc::new(discovery.clone()),
        Arc::new(presenter),
    );
    if config.dispatch.validate_identities {
        let path = config.registry_path(config_path)?;
        let registry = FileTagRegistry::open(&path)
            .with_context(|| format!("failed to open tag registry {}", path.display()))?;
        dispatcher = dispatcher.with_registry(Arc::new(registry));
    }
    let dispatcher = Arc::new(dispatcher);
    if !config.player.presenter_attached {
        dispatcher
            .set_presenter_availability(PresenterAvailability::Detached)
            .await;
    }

    tokio::spawn(Arc::clone(&dispatcher).consume_discovery_events(discovery_events));
    let presentation = tokio::spawn(run_presentation(
        presenter_rx,
        Arc::clone(&dispatcher),
        config.char_interval(),
        tokio::io::stdout(),
    ));

    let inbox_dispatcher = Arc::clone(&dispatcher);
    tokio::spawn(async move {
        match run_inbox(BufReader::new(tokio::io::stdin()), inbox_dispatcher).await {
            Ok(accepted) => info!(accepted, "stdin closed, still waiting for tags"),
            Err(e) => error!(error = %e, "failed to read stdin"),
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;
    info!("received Ctrl+C, shutting down");

    discovery.shutdown().await;
    if let Err(e) = engine.await {
        warn!(error = %e, "discovery engine task failed");
    }
    presentation.abort();

    let snapshot = dispatcher.snapshot().await;
    if snapshot.queue_len > 0 {
        warn!(queued = snapshot.queue_len, state = %snapshot.state, "undelivered messages dropped at exit");
    }
    info!("tagwake stopped");
    Ok(())
}

async fn scan(config: AppConfig, config_path: Option<&Path>, register: bool) -> anyhow::Result<()> {
    let registry = if register {
        let path = config.registry_path(config_path)?;
        let registry = FileTagRegistry::open(&path)
            .with_context(|| format!("failed to open tag registry {}", path.display()))?;
        Some(registry)
    } else {
        None
    };

    let (radio_tx, radio_rx) = mpsc::channel(RADIO_EVENT_CAPACITY);
    let radio = build_radio(&config, radio_tx).await?;
    let (discovery, mut events, engine) = spawn_discovery_engine(radio, radio_rx, config.discovery_config());

    discovery.start_scan().await.context("could not start scan")?;
    info!(window_ms = config.discovery.scan_window_ms, "scanning");

    let mut found = HashSet::new();
    while let Some(event) = events.recv().await {
        match event {
            DiscoveryEvent::IdentityFound(identity) => {
                if !found.insert(identity.id().to_string()) {
                    continue;
                }
                println!("{identity}");
                let Some(registry) = &registry else {
                    continue;
                };
                if registry.get_tag(identity.id()).is_some() {
                    debug!(identity = %identity, "already registered");
                    continue;
                }
                registry
                    .persist_tag(identity.clone())
                    .with_context(|| format!("failed to register {identity}"))?;
                println!("  registered");
            }
            DiscoveryEvent::ScanEnded => break,
            DiscoveryEvent::ScanStateChanged { .. } => {}
        }
    }

    discovery.shutdown().await;
    if let Err(e) = engine.await {
        warn!(error = %e, "discovery engine task failed");
    }
    info!(found = found.len(), "scan finished");
    Ok(())
}

fn list_tags(config: &AppConfig, config_path: Option<&Path>) -> anyhow::Result<()> {
    let path = config.registry_path(config_path)?;
    let registry = FileTagRegistry::open(&path)
        .with_context(|| format!("failed to open tag registry {}", path.display()))?;

    let tags = registry.list_tags();
    if tags.is_empty() {
        println!("no tags registered in {}", registry.path().display());
    }
    for tag in tags {
        let marker = if tag.is_interactive() { "" } else { " [passive]" };
        println!("{tag}{marker}");
    }
    Ok(())
}

async fn build_radio(
    config: &AppConfig,
    events: mpsc::Sender<RadioEvent>,
) -> anyhow::Result<Arc<dyn RadioAdapter>> {
    match config.radio.backend {
        RadioBackend::Simulated => {
            if config.radio.peers.is_empty() {
                warn!("simulated radio has no peers configured, no tag will ever be found");
            }
            Ok(Arc::new(SimulatedRadio::new(config.radio.peers.clone(), events)))
        }
        RadioBackend::Ble => open_ble(events).await,
    }
}

#[cfg(feature = "ble")]
async fn open_ble(events: mpsc::Sender<RadioEvent>) -> anyhow::Result<Arc<dyn RadioAdapter>> {
    use tagwake_player::infrastructure::radio::ble::BleRadio;

    let radio = BleRadio::open(events)
        .await
        .context("could not open bluetooth adapter")?;
    Ok(Arc::new(radio))
}

#[cfg(not(feature = "ble"))]
async fn open_ble(_events: mpsc::Sender<RadioEvent>) -> anyhow::Result<Arc<dyn RadioAdapter>> {
    anyhow::bail!("radio backend \"ble\" needs a build with `--features ble`")
}

// ── Tests ─────────────────────────────────────────────────────────────────────
