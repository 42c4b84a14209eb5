//! Use case: hold messages until their recipient tag is physically present.
//!
//! The [`DispatchSynchronizer`] owns the pending queue and the process-wide
//! [`ActivityState`].  It sits between three collaborators:
//!
//! - A [`ScanController`] it asks for a scan when the first message arrives
//!   while idle (in production, the discovery engine's handle).
//! - The discovery event stream, fed in through [`on_identity`] and
//!   [`on_scan_ended`] (or [`consume_discovery_events`]).
//! - A [`DeliverySink`] that receives matched messages and scan indicators.
//!
//! # Locking
//!
//! All state and queue mutation happens under a single `tokio::sync::Mutex`.
//! The lock is released before any collaborator is called, so a sink that
//! calls straight back into the synchronizer (for example to report delivery
//! complete) cannot deadlock.
//!
//! # Waits
//!
//! Every `Idle → AwaitingScan` transition starts a new *wait* and bumps a
//! generation counter.  Timers (scan retry, scan-ended timeout) capture the
//! generation they were armed for and do nothing if it has moved on, so a
//! timer left over from an earlier wait can never end a later one.
//!
//! [`on_identity`]: DispatchSynchronizer::on_identity
//! [`on_scan_ended`]: DispatchSynchronizer::on_scan_ended
//! [`consume_discovery_events`]: DispatchSynchronizer::consume_discovery_events

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tagwake_core::{ActivityState, Identity, PendingMessage, PendingQueue, QueueError};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use super::discover_tags::{DiscoveryEvent, DiscoveryHandle, ScanError, ScanStart};
use super::manage_tags::TagRegistry;

pub const DEFAULT_QUEUE_CAPACITY: usize = 64;
pub const DEFAULT_SCAN_ENDED_TIMEOUT: Duration = Duration::from_millis(3000);
pub const DEFAULT_SCAN_RETRY_DELAY: Duration = Duration::from_millis(1000);
pub const DEFAULT_SCAN_START_ATTEMPTS: u32 = 5;

// ── Collaborator traits ───────────────────────────────────────────────────────

/// Something that can start a scan on the synchronizer's behalf.
#[async_trait]
pub trait ScanController: Send + Sync {
    /// Returns `false` while the scanner cannot accept requests yet.
    fn is_ready(&self) -> bool;

    /// Requests a scan.  Must not open a second window while one is running.
    async fn start_scan(&self) -> Result<ScanStart, ScanError>;
}

#[async_trait]
impl ScanController for DiscoveryHandle {
    fn is_ready(&self) -> bool {
        self.is_running()
    }

    async fn start_scan(&self) -> Result<ScanStart, ScanError> {
        DiscoveryHandle::start_scan(self).await
    }
}

/// How a matched batch should be shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentationMode {
    /// A presenter is attached and shows the batch directly.
    InPlace,
    /// No presenter is attached; one has to be brought up first.
    Launch,
}

/// Whether a presenter is currently attached to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PresenterAvailability {
    #[default]
    Attached,
    Detached,
}

impl PresenterAvailability {
    fn mode(self) -> PresentationMode {
        match self {
            PresenterAvailability::Attached => PresentationMode::InPlace,
            PresenterAvailability::Detached => PresentationMode::Launch,
        }
    }
}

/// Receives the synchronizer's output.
///
/// Both methods are called without the synchronizer's lock held and must not
/// block; hand long-running work to another task.
pub trait DeliverySink: Send + Sync {
    /// Messages addressed to a tag that was just detected.  Never empty.
    fn on_matched_messages(&self, messages: Vec<PendingMessage>, mode: PresentationMode);

    /// The discovery engine started or stopped scanning.
    fn on_scan_state_changed(&self, scanning: bool);
}

// ── Configuration and errors ──────────────────────────────────────────────────

/// Synchronizer parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    pub queue_capacity: usize,
    /// Grace period after a scan ends without a match before going idle.
    pub scan_ended_timeout: Duration,
    /// Delay between scan start attempts when the scanner is not available.
    pub scan_retry_delay: Duration,
    /// Total scan start attempts per wait, including the first.
    pub scan_start_attempts: u32,
    /// When set, identities unknown to the tag registry are ignored.
    pub validate_identities: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            scan_ended_timeout: DEFAULT_SCAN_ENDED_TIMEOUT,
            scan_retry_delay: DEFAULT_SCAN_RETRY_DELAY,
            scan_start_attempts: DEFAULT_SCAN_START_ATTEMPTS,
            validate_identities: false,
        }
    }
}

/// Errors returned by [`DispatchSynchronizer::enqueue`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("invalid message: {0}")]
    InvalidMessage(String),
    /// The queue is full; the message was not accepted.
    #[error("message queue is full ({capacity} messages)")]
    QueueOverflow { capacity: usize },
}

impl From<QueueError> for DispatchError {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::Overflow { capacity } => DispatchError::QueueOverflow { capacity },
        }
    }
}

/// A queued message as reported by [`DispatchSynchronizer::snapshot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedMessage {
    pub recipient_id: String,
    pub payload: String,
}

/// Point-in-time view of the synchronizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchSnapshot {
    pub state: ActivityState,
    pub queue_len: usize,
    /// Queued messages, oldest first.
    pub queued: Vec<QueuedMessage>,
}

// ── Synchronizer ──────────────────────────────────────────────────────────────

struct Inner {
    state: ActivityState,
    queue: PendingQueue,
    wait_generation: u64,
    availability: PresenterAvailability,
}

impl Inner {
    fn is_current_wait(&self, generation: u64) -> bool {
        self.state == ActivityState::AwaitingScan && self.wait_generation == generation
    }
}

/// Gates delivery of queued messages on the presence of their recipient tag.
pub struct DispatchSynchronizer {
    inner: Mutex<Inner>,
    config: DispatchConfig,
    scanner: Arc<dyn ScanController>,
    sink: Arc<dyn DeliverySink>,
    registry: Option<Arc<dyn TagRegistry>>,
}

impl DispatchSynchronizer {
    pub fn new(config: DispatchConfig, scanner: Arc<dyn ScanController>, sink: Arc<dyn DeliverySink>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: ActivityState::Idle,
                queue: PendingQueue::with_capacity(config.queue_capacity),
                wait_generation: 0,
                availability: PresenterAvailability::default(),
            }),
            config,
            scanner,
            sink,
            registry: None,
        }
    }

    /// Attaches the registry consulted when `validate_identities` is set.
    pub fn with_registry(mut self, registry: Arc<dyn TagRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Queues a message for `recipient_id`.
    ///
    /// When the synchronizer is idle this starts a new wait and requests a
    /// scan.  The first attempt is made before returning; if the scanner is
    /// not ready or refuses, further attempts run in the background.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::InvalidMessage`] for an empty recipient or payload.
    /// - [`DispatchError::QueueOverflow`] when the queue is full.  Nothing
    ///   already queued is dropped.
    pub async fn enqueue(
        self: &Arc<Self>,
        recipient_id: impl Into<String>,
        payload: impl Into<String>,
    ) -> Result<(), DispatchError> {
        let recipient_id = recipient_id.into();
        let payload = payload.into();
        if recipient_id.trim().is_empty() {
            return Err(DispatchError::InvalidMessage("recipient id is empty".to_string()));
        }
        if payload.is_empty() {
            return Err(DispatchError::InvalidMessage("payload is empty".to_string()));
        }

        let generation = {
            let mut inner = self.inner.lock().await;
            if let Err(e) = inner.queue.push(PendingMessage::new(recipient_id.clone(), payload)) {
                warn!(recipient = %recipient_id, error = %e, "message rejected");
                return Err(e.into());
            }
            debug!(
                recipient = %recipient_id,
                queued = inner.queue.len(),
                state = %inner.state,
                "message enqueued"
            );

            if !inner.state.accepts_scan_request() {
                return Ok(());
            }
            inner.state = ActivityState::AwaitingScan;
            inner.wait_generation += 1;
            inner.wait_generation
        };

        self.request_scan(generation).await;
        Ok(())
    }

    /// A tag was identified by the discovery engine.
    ///
    /// Only acted upon while awaiting a scan.  Messages addressed to the tag
    /// are handed to the sink and the synchronizer starts delivering; every
    /// other message stays queued in its original order.
    pub async fn on_identity(&self, identity: Identity) {
        {
            let inner = self.inner.lock().await;
            if inner.state != ActivityState::AwaitingScan {
                debug!(identity = %identity, state = %inner.state, "identity outside a wait");
                return;
            }
        }

        if self.config.validate_identities {
            if let Some(registry) = &self.registry {
                if registry.get_tag(identity.id()).is_none() {
                    info!(identity = %identity, "ignoring unregistered tag");
                    return;
                }
            }
        }

        let (matched, mode) = {
            let mut inner = self.inner.lock().await;
            if inner.state != ActivityState::AwaitingScan {
                return;
            }
            let partition = inner.queue.take_addressed_to(identity.id());
            if partition.is_empty() {
                debug!(identity = %identity, queued = partition.retained, "no messages for tag");
                return;
            }
            inner.state = ActivityState::Delivering;
            info!(
                identity = %identity,
                delivered = partition.matched.len(),
                retained = partition.retained,
                "delivering messages"
            );
            (partition.matched, inner.availability.mode())
        };

        self.sink.on_matched_messages(matched, mode);
    }

    /// The discovery engine's scan window ended.
    ///
    /// While awaiting a scan, arms the timeout after which the wait is
    /// abandoned and the synchronizer goes idle with its queue intact.
    pub async fn on_scan_ended(self: &Arc<Self>) {
        let generation = {
            let inner = self.inner.lock().await;
            if inner.state != ActivityState::AwaitingScan {
                return;
            }
            inner.wait_generation
        };

        let timeout = self.config.scan_ended_timeout;
        debug!(timeout_ms = timeout.as_millis() as u64, "scan ended without a match");

        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let mut inner = this.inner.lock().await;
            if inner.is_current_wait(generation) {
                inner.state = ActivityState::Idle;
                info!(queued = inner.queue.len(), "no recipient found, going idle");
            }
        });
    }

    /// The presenter finished showing the last matched batch.
    pub async fn on_delivery_complete(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state == ActivityState::Delivering {
            inner.state = ActivityState::Idle;
            info!(queued = inner.queue.len(), "delivery complete");
        }
    }

    /// Forwards the scan indicator to the sink.
    pub fn on_scan_state_changed(&self, scanning: bool) {
        self.sink.on_scan_state_changed(scanning);
    }

    pub async fn set_presenter_availability(&self, availability: PresenterAvailability) {
        self.inner.lock().await.availability = availability;
    }

    pub async fn state(&self) -> ActivityState {
        self.inner.lock().await.state
    }

    pub async fn snapshot(&self) -> DispatchSnapshot {
        let inner = self.inner.lock().await;
        DispatchSnapshot {
            state: inner.state,
            queue_len: inner.queue.len(),
            queued: inner
                .queue
                .iter()
                .map(|m| QueuedMessage {
                    recipient_id: m.recipient_id.clone(),
                    payload: m.payload.clone(),
                })
                .collect(),
        }
    }

    /// Applies discovery events until the stream closes.
    pub async fn consume_discovery_events(self: Arc<Self>, mut events: mpsc::Receiver<DiscoveryEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                DiscoveryEvent::ScanStateChanged { scanning } => self.on_scan_state_changed(scanning),
                DiscoveryEvent::IdentityFound(identity) => self.on_identity(identity).await,
                DiscoveryEvent::ScanEnded => self.on_scan_ended().await,
            }
        }
        debug!("discovery event stream closed");
    }

    async fn request_scan(self: &Arc<Self>, generation: u64) {
        if self.try_start_scan(1).await {
            return;
        }
        let this = Arc::clone(self);
        tokio::spawn(async move { this.retry_scan(generation).await });
    }

    async fn retry_scan(self: Arc<Self>, generation: u64) {
        let attempts = self.config.scan_start_attempts.max(1);
        for attempt in 2..=attempts {
            tokio::time::sleep(self.config.scan_retry_delay).await;
            if !self.inner.lock().await.is_current_wait(generation) {
                return;
            }
            if self.try_start_scan(attempt).await {
                return;
            }
        }

        let mut inner = self.inner.lock().await;
        if inner.is_current_wait(generation) {
            inner.state = ActivityState::Idle;
            warn!(
                attempts,
                queued = inner.queue.len(),
                "could not start a scan, waiting for the next message"
            );
        }
    }

    async fn try_start_scan(&self, attempt: u32) -> bool {
        if !self.scanner.is_ready() {
            warn!(attempt, "scanner not ready");
            return false;
        }
        match self.scanner.start_scan().await {
            Ok(ScanStart::Started) => {
                info!(attempt, "scan requested");
                true
            }
            Ok(ScanStart::AlreadyScanning) => {
                debug!("scan already running");
                true
            }
            Err(e) => {
                warn!(attempt, error = %e, "scan request failed");
                false
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
