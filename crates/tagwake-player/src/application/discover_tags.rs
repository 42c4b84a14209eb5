//! Use case: run time-boxed scans and stream the identities of nearby tags.
//!
//! The discovery engine is a single task that owns the whole scan lifecycle.
//! It consumes three inputs through one `tokio::select!` loop:
//!
//! 1. Commands from [`DiscoveryHandle`]s (start a scan, shut down).
//! 2. [`RadioEvent`]s from the radio adapter.
//! 3. The scan window deadline.
//!
//! Because only this task touches the per-peer [`DeviceSession`]s, the arena
//! of sessions keyed by address needs no locking.  An advertisement from an
//! address without a live session starts a connection attempt; the session
//! then decides which radio operation comes next and the engine carries it
//! out.  Once a session settles its entry is dropped, so the next
//! advertisement from that peer reads it again.
//!
//! Identities are streamed as soon as a session completes, not batched at
//! the end of the window, so a waiting message can be delivered while the
//! scan is still running.  A scan request that joins a running window gets
//! the identities found so far replayed, since the requester missed them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tagwake_core::{
    DeviceSession, Identity, IdentitySchema, PeerAddress, ReadOutcome, SessionOutcome, SessionState,
    SessionStep,
};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use super::attribute_reader::AttributeReader;
use crate::infrastructure::radio::{RadioAdapter, RadioEvent};

/// Default scan window.
pub const DEFAULT_SCAN_WINDOW: Duration = Duration::from_secs(10);

const COMMAND_CAPACITY: usize = 16;
const EVENT_CAPACITY: usize = 64;

/// Engine parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// How long a scan runs before it is stopped.
    pub scan_window: Duration,
    /// Attributes a peer must expose to be recognised as a tag.
    pub schema: IdentitySchema,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            scan_window: DEFAULT_SCAN_WINDOW,
            schema: IdentitySchema::default(),
        }
    }
}

/// Notifications emitted by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    /// Emitted on every real scan start and once when the window ends.
    ScanStateChanged { scanning: bool },
    /// A device session completed with a tag identity.  Also replayed for
    /// every tag already found when a scan request joins a running window.
    IdentityFound(Identity),
    /// The scan window ended.  Exactly once per started scan.
    ScanEnded,
}

/// Successful reply to [`DiscoveryHandle::start_scan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStart {
    Started,
    /// A scan was already running; no new window was opened.
    AlreadyScanning,
}

/// Errors returned by [`DiscoveryHandle::start_scan`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScanError {
    /// The radio could not start scanning.
    #[error("scan unavailable: {0}")]
    Unavailable(String),
    /// The engine task is no longer running.
    #[error("discovery engine stopped")]
    EngineStopped,
}

enum Command {
    StartScan {
        reply: oneshot::Sender<Result<ScanStart, ScanError>>,
    },
    Shutdown,
}

/// Cloneable handle used to control a running discovery engine.
#[derive(Debug, Clone)]
pub struct DiscoveryHandle {
    commands: mpsc::Sender<Command>,
}

impl DiscoveryHandle {
    /// Requests a scan.  Idempotent while a scan is running.
    ///
    /// # Errors
    ///
    /// - [`ScanError::Unavailable`] if the radio refused to scan.
    /// - [`ScanError::EngineStopped`] if the engine task has exited.
    pub async fn start_scan(&self) -> Result<ScanStart, ScanError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::StartScan { reply })
            .await
            .map_err(|_| ScanError::EngineStopped)?;
        response.await.map_err(|_| ScanError::EngineStopped)?
    }

    /// Returns `true` while the engine task is accepting commands.
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    /// Asks the engine to end any running scan and exit.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
    }
}

/// Spawns the discovery engine task.
///
/// Returns the control handle, the receiver for [`DiscoveryEvent`]s, and the
/// task handle.  The task exits when shut down, when every handle is dropped,
/// or when the radio event channel closes.
pub fn spawn_discovery_engine(
    radio: Arc<dyn RadioAdapter>,
    radio_events: mpsc::Receiver<RadioEvent>,
    config: DiscoveryConfig,
) -> (DiscoveryHandle, mpsc::Receiver<DiscoveryEvent>, JoinHandle<()>) {
    let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
    let (event_tx, event_rx) = mpsc::channel(EVENT_CAPACITY);

    let engine = DiscoveryEngine {
        reader: AttributeReader::new(Arc::clone(&radio)),
        radio,
        config,
        events: event_tx,
        scan: None,
    };
    let task = tokio::spawn(engine.run(command_rx, radio_events));

    (DiscoveryHandle { commands: command_tx }, event_rx, task)
}

/// State of one scan window.
struct ScanSession {
    started_at: Instant,
    deadline: Instant,
    /// Live sessions keyed by peer address.
    sessions: HashMap<PeerAddress, DeviceSession>,
    connection_attempts: usize,
    /// Latest identity per tag id found in this window.
    discovered: HashMap<String, Identity>,
}

impl ScanSession {
    fn new(window: Duration) -> Self {
        let started_at = Instant::now();
        Self {
            started_at,
            deadline: started_at + window,
            sessions: HashMap::new(),
            connection_attempts: 0,
            discovered: HashMap::new(),
        }
    }
}

struct DiscoveryEngine {
    radio: Arc<dyn RadioAdapter>,
    reader: AttributeReader,
    config: DiscoveryConfig,
    events: mpsc::Sender<DiscoveryEvent>,
    scan: Option<ScanSession>,
}

impl DiscoveryEngine {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut radio_events: mpsc::Receiver<RadioEvent>,
    ) {
        info!(
            window_ms = self.config.scan_window.as_millis() as u64,
            "discovery engine started"
        );

        loop {
            let deadline = self.scan.as_ref().map(|scan| scan.deadline);
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::StartScan { reply }) => {
                        let result = self.start_scan().await;
                        let _ = reply.send(result);
                    }
                    Some(Command::Shutdown) | None => break,
                },
                event = radio_events.recv() => match event {
                    Some(event) => self.on_radio_event(event).await,
                    None => {
                        warn!("radio event channel closed");
                        break;
                    }
                },
                () = wait_for_deadline(deadline) => self.end_scan().await,
            }
        }

        self.end_scan().await;
        info!("discovery engine stopped");
    }

    async fn start_scan(&mut self) -> Result<ScanStart, ScanError> {
        if let Some(scan) = &self.scan {
            let found: Vec<Identity> = scan.discovered.values().cloned().collect();
            debug!(replayed = found.len(), "scan requested while already scanning");
            for identity in found {
                self.emit(DiscoveryEvent::IdentityFound(identity)).await;
            }
            return Ok(ScanStart::AlreadyScanning);
        }

        if let Err(e) = self.radio.start_scan().await {
            warn!(error = %e, "radio refused to scan");
            return Err(ScanError::Unavailable(e.to_string()));
        }

        self.scan = Some(ScanSession::new(self.config.scan_window));
        info!(
            window_ms = self.config.scan_window.as_millis() as u64,
            "scan started"
        );
        self.emit(DiscoveryEvent::ScanStateChanged { scanning: true })
            .await;
        Ok(ScanStart::Started)
    }

    /// Stops the radio scan, releases every live session and announces the end.
    async fn end_scan(&mut self) {
        let Some(scan) = self.scan.take() else {
            return;
        };

        self.radio.stop_scan().await;
        for peer in scan.sessions.keys() {
            self.reader.cancel(peer);
            self.radio.disconnect(peer);
        }

        info!(
            found = scan.discovered.len(),
            unfinished = scan.sessions.len(),
            attempts = scan.connection_attempts,
            elapsed_ms = scan.started_at.elapsed().as_millis() as u64,
            "scan window ended"
        );
        self.emit(DiscoveryEvent::ScanStateChanged { scanning: false })
            .await;
        self.emit(DiscoveryEvent::ScanEnded).await;
    }

    async fn on_radio_event(&mut self, event: RadioEvent) {
        trace!(peer = %event.peer(), event = ?event, "radio event");
        match event {
            RadioEvent::Advertisement { peer, name } => self.on_advertisement(peer, name).await,
            RadioEvent::Connected { peer } => {
                self.advance(&peer, |session| session.on_connected()).await;
            }
            RadioEvent::ConnectFailed { peer, reason } => {
                self.advance(&peer, |session| session.on_connection_lost(reason))
                    .await;
            }
            RadioEvent::Disconnected { peer } => {
                // A session still connecting belongs to a newer attempt than
                // the link that went down.
                let connecting = self
                    .session_mut(&peer)
                    .is_some_and(|session| *session.state() == SessionState::Connecting);
                if connecting {
                    debug!(peer = %peer, "stale disconnect for a reconnecting peer");
                    return;
                }
                self.advance(&peer, |session| session.on_connection_lost("peer disconnected"))
                    .await;
            }
            RadioEvent::AttributesDiscovered { peer, result } => match result {
                Ok(declared) => {
                    self.advance(&peer, |session| session.on_attributes_discovered(&declared))
                        .await;
                }
                Err(reason) => {
                    let reason = format!("attribute discovery failed: {reason}");
                    self.advance(&peer, |session| session.on_connection_lost(reason))
                        .await;
                }
            },
            RadioEvent::ReadCompleted {
                peer,
                attribute,
                outcome,
            } => {
                if self.reader.complete(&peer, &attribute) {
                    self.advance(&peer, |session| session.on_read_completed(attribute, outcome))
                        .await;
                }
            }
        }
    }

    async fn on_advertisement(&mut self, peer: PeerAddress, name: Option<String>) {
        let Some(scan) = self.scan.as_mut() else {
            return;
        };
        if scan.sessions.contains_key(&peer) {
            return;
        }

        debug!(peer = %peer, name = ?name, "advertisement, connecting");
        scan.connection_attempts += 1;
        scan.sessions
            .insert(peer.clone(), DeviceSession::new(peer.clone(), self.config.schema));

        if let Err(e) = self.radio.connect(&peer) {
            self.advance(&peer, |session| session.on_connection_lost(e.to_string()))
                .await;
        }
    }

    /// Feeds one event into the live session for `peer`, if there is one.
    async fn advance(&mut self, peer: &PeerAddress, event: impl FnOnce(&mut DeviceSession) -> SessionStep) {
        let Some(session) = self.session_mut(peer) else {
            debug!(peer = %peer, "event for peer without a live session");
            return;
        };
        let step = event(session);
        self.drive(peer, step).await;
    }

    /// Carries out session steps until one is waiting on the radio.
    async fn drive(&mut self, peer: &PeerAddress, mut step: SessionStep) {
        loop {
            step = match step {
                SessionStep::Ignored => return,
                SessionStep::Discover => match self.radio.discover_attributes(peer) {
                    Ok(()) => return,
                    Err(e) => match self.session_mut(peer) {
                        Some(session) => session.on_connection_lost(e.to_string()),
                        None => return,
                    },
                },
                SessionStep::Read(attribute) => match self.reader.read(peer, attribute) {
                    Ok(()) => return,
                    Err(e) => match self.session_mut(peer) {
                        Some(session) => {
                            session.on_read_completed(attribute, ReadOutcome::Failure(e.to_string()))
                        }
                        None => return,
                    },
                },
                SessionStep::Finished(outcome) => {
                    self.finish_session(peer, outcome).await;
                    return;
                }
            };
        }
    }

    async fn finish_session(&mut self, peer: &PeerAddress, outcome: SessionOutcome) {
        self.reader.cancel(peer);
        self.radio.disconnect(peer);

        let Some(scan) = self.scan.as_mut() else {
            return;
        };
        scan.sessions.remove(peer);

        match outcome {
            SessionOutcome::Completed(Some(identity)) => {
                scan.discovered
                    .insert(identity.id().to_string(), identity.clone());
                info!(
                    peer = %peer,
                    identity = %identity,
                    elapsed_ms = scan.started_at.elapsed().as_millis() as u64,
                    "tag identified"
                );
                self.emit(DiscoveryEvent::IdentityFound(identity)).await;
            }
            SessionOutcome::Completed(None) => {
                debug!(peer = %peer, "peer does not expose a tag identity");
            }
            SessionOutcome::Aborted(error) => {
                warn!(peer = %peer, error = %error, "device session aborted");
            }
        }
    }

    fn session_mut(&mut self, peer: &PeerAddress) -> Option<&mut DeviceSession> {
        self.scan.as_mut()?.sessions.get_mut(peer)
    }

    async fn emit(&self, event: DiscoveryEvent) {
        if self.events.send(event).await.is_err() {
            debug!("no discovery event listener");
        }
    }
}

async fn wait_for_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
