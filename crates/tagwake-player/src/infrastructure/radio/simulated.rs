//! In-process radio with scripted peers.
//!
//! Each [`SimulatedPeer`] describes what a real tag would do: when it starts
//! advertising after a scan begins, whether connecting to it fails, how long
//! each operation takes, and which attributes it declares (optionally with a
//! per-attribute read failure).  Completions are delivered on the event
//! channel from spawned tasks, so they interleave across peers the way a real
//! radio stack's callbacks do.
//!
//! The same peer table is used by tests and by the `simulated` backend of the
//! binary, where it is read from the `[[radio.peers]]` config section.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tagwake_core::{AttributeId, AttributePath, IdentitySchema, PeerAddress, ReadOutcome};
use tokio::sync::mpsc;
use tracing::debug;

use super::{RadioAdapter, RadioError, RadioEvent};

/// One declared attribute of a simulated peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatedAttribute {
    pub service: AttributeId,
    pub attribute: AttributeId,
    /// Value returned by a successful read, encoded as UTF-8.
    #[serde(default)]
    pub value: String,
    /// When set, every read of this attribute fails with this reason.
    #[serde(default)]
    pub fail: Option<String>,
}

impl SimulatedAttribute {
    pub fn path(&self) -> AttributePath {
        AttributePath::new(self.service, self.attribute)
    }
}

/// Scripted behaviour of one peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatedPeer {
    pub address: PeerAddress,
    /// Advertised local name, if any.
    #[serde(default)]
    pub name: Option<String>,
    /// Delay between scan start and the peer's first advertisement.
    #[serde(default)]
    pub advertise_after_ms: u64,
    /// When `true`, every connection attempt fails.
    #[serde(default)]
    pub connect_fails: bool,
    /// Delay before each connect, discovery and read completion.
    #[serde(default = "default_latency_ms")]
    pub latency_ms: u64,
    #[serde(default)]
    pub attributes: Vec<SimulatedAttribute>,
}

fn default_latency_ms() -> u64 {
    20
}

impl SimulatedPeer {
    /// A well-formed tag exposing `id` and `name` under `schema`.
    pub fn tag(address: &str, schema: &IdentitySchema, id: &str, name: &str) -> Self {
        Self {
            address: PeerAddress::from(address),
            name: Some(name.to_string()),
            advertise_after_ms: 0,
            connect_fails: false,
            latency_ms: default_latency_ms(),
            attributes: vec![
                SimulatedAttribute {
                    service: schema.service,
                    attribute: schema.identifier,
                    value: id.to_string(),
                    fail: None,
                },
                SimulatedAttribute {
                    service: schema.service,
                    attribute: schema.display_name,
                    value: name.to_string(),
                    fail: None,
                },
            ],
        }
    }

    /// Makes reads of `attribute` fail with `reason`.
    pub fn failing_read(mut self, attribute: AttributeId, reason: &str) -> Self {
        for attr in &mut self.attributes {
            if attr.attribute == attribute {
                attr.fail = Some(reason.to_string());
            }
        }
        self
    }

    pub fn advertising_after(mut self, ms: u64) -> Self {
        self.advertise_after_ms = ms;
        self
    }

    pub fn with_latency(mut self, ms: u64) -> Self {
        self.latency_ms = ms;
        self
    }

    pub fn refusing_connections(mut self) -> Self {
        self.connect_fails = true;
        self
    }

    fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }
}

#[derive(Debug, Default)]
struct RadioState {
    unavailable: bool,
    scanning: bool,
    /// Bumped on every scan start so stale advertisement tasks stay silent.
    scan_generation: u64,
    connected: HashSet<PeerAddress>,
    scan_starts: usize,
    connect_attempts: HashMap<PeerAddress, usize>,
    reads: Vec<(PeerAddress, AttributePath)>,
}

/// A [`RadioAdapter`] driven entirely by a table of [`SimulatedPeer`]s.
#[derive(Clone)]
pub struct SimulatedRadio {
    peers: Arc<HashMap<PeerAddress, SimulatedPeer>>,
    events: mpsc::Sender<RadioEvent>,
    state: Arc<Mutex<RadioState>>,
}

impl SimulatedRadio {
    /// Creates a radio whose completions are delivered on `events`.
    pub fn new(peers: Vec<SimulatedPeer>, events: mpsc::Sender<RadioEvent>) -> Self {
        let peers = peers.into_iter().map(|p| (p.address.clone(), p)).collect();
        Self {
            peers: Arc::new(peers),
            events,
            state: Arc::new(Mutex::new(RadioState::default())),
        }
    }

    /// Simulates the radio being switched off (or back on).
    pub fn set_available(&self, available: bool) {
        self.state.lock().expect("lock poisoned").unavailable = !available;
    }

    pub fn is_scanning(&self) -> bool {
        self.state.lock().expect("lock poisoned").scanning
    }

    pub fn is_connected(&self, peer: &PeerAddress) -> bool {
        self.state.lock().expect("lock poisoned").connected.contains(peer)
    }

    /// Number of successful `start_scan` calls so far.
    pub fn scan_starts(&self) -> usize {
        self.state.lock().expect("lock poisoned").scan_starts
    }

    /// Number of connection attempts made to `peer`.
    pub fn connect_attempts(&self, peer: &PeerAddress) -> usize {
        self.state
            .lock()
            .expect("lock poisoned")
            .connect_attempts
            .get(peer)
            .copied()
            .unwrap_or(0)
    }

    /// Every read issued so far, in order.
    pub fn reads(&self) -> Vec<(PeerAddress, AttributePath)> {
        self.state.lock().expect("lock poisoned").reads.clone()
    }

    /// Simulates the remote side dropping an open connection.
    pub fn drop_connection(&self, peer: &PeerAddress) {
        let was_connected = self.state.lock().expect("lock poisoned").connected.remove(peer);
        if was_connected {
            self.emit(Duration::ZERO, RadioEvent::Disconnected { peer: peer.clone() });
        }
    }

    fn peer(&self, address: &PeerAddress) -> Result<&SimulatedPeer, RadioError> {
        self.peers
            .get(address)
            .ok_or_else(|| RadioError::UnknownPeer(address.clone()))
    }

    fn require_connected(&self, address: &PeerAddress) -> Result<(), RadioError> {
        if self.is_connected(address) {
            Ok(())
        } else {
            Err(RadioError::NotConnected(address.clone()))
        }
    }

    fn emit(&self, delay: Duration, event: RadioEvent) {
        let events = self.events.clone();
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            // The receiver is gone once the engine has shut down.
            let _ = events.send(event).await;
        });
    }
}

#[async_trait]
impl RadioAdapter for SimulatedRadio {
    async fn start_scan(&self) -> Result<(), RadioError> {
        let generation = {
            let mut state = self.state.lock().expect("lock poisoned");
            if state.unavailable {
                return Err(RadioError::Unavailable("radio is switched off".to_string()));
            }
            state.scanning = true;
            state.scan_generation += 1;
            state.scan_starts += 1;
            state.scan_generation
        };

        for peer in self.peers.values() {
            let events = self.events.clone();
            let state = Arc::clone(&self.state);
            let delay = Duration::from_millis(peer.advertise_after_ms);
            let event = RadioEvent::Advertisement {
                peer: peer.address.clone(),
                name: peer.name.clone(),
            };
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let still_scanning = {
                    let state = state.lock().expect("lock poisoned");
                    state.scanning && state.scan_generation == generation
                };
                if still_scanning {
                    let _ = events.send(event).await;
                }
            });
        }
        debug!(peers = self.peers.len(), "simulated scan started");
        Ok(())
    }

    async fn stop_scan(&self) {
        self.state.lock().expect("lock poisoned").scanning = false;
        debug!("simulated scan stopped");
    }

    fn connect(&self, address: &PeerAddress) -> Result<(), RadioError> {
        let peer = self.peer(address)?;
        *self
            .state
            .lock()
            .expect("lock poisoned")
            .connect_attempts
            .entry(address.clone())
            .or_insert(0) += 1;

        let event = if peer.connect_fails {
            RadioEvent::ConnectFailed {
                peer: address.clone(),
                reason: "peer refused connection".to_string(),
            }
        } else {
            self.state
                .lock()
                .expect("lock poisoned")
                .connected
                .insert(address.clone());
            RadioEvent::Connected {
                peer: address.clone(),
            }
        };
        self.emit(peer.latency(), event);
        Ok(())
    }

    fn discover_attributes(&self, address: &PeerAddress) -> Result<(), RadioError> {
        let peer = self.peer(address)?;
        self.require_connected(address)?;
        let declared = peer.attributes.iter().map(SimulatedAttribute::path).collect();
        self.emit(
            peer.latency(),
            RadioEvent::AttributesDiscovered {
                peer: address.clone(),
                result: Ok(declared),
            },
        );
        Ok(())
    }

    fn read_attribute(&self, address: &PeerAddress, attribute: AttributePath) -> Result<(), RadioError> {
        let peer = self.peer(address)?;
        self.require_connected(address)?;
        self.state
            .lock()
            .expect("lock poisoned")
            .reads
            .push((address.clone(), attribute));

        let outcome = match peer.attributes.iter().find(|a| a.path() == attribute) {
            None => ReadOutcome::Failure("attribute not declared".to_string()),
            Some(SimulatedAttribute {
                fail: Some(reason), ..
            }) => ReadOutcome::Failure(reason.clone()),
            Some(attr) => ReadOutcome::Success(attr.value.clone().into_bytes()),
        };

        // A read whose connection is gone by completion time never completes.
        let events = self.events.clone();
        let state = Arc::clone(&self.state);
        let delay = peer.latency();
        let peer = address.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let connected = state.lock().expect("lock poisoned").connected.contains(&peer);
            if connected {
                let _ = events
                    .send(RadioEvent::ReadCompleted {
                        peer,
                        attribute,
                        outcome,
                    })
                    .await;
            }
        });
        Ok(())
    }

    fn disconnect(&self, address: &PeerAddress) {
        let was_connected = self
            .state
            .lock()
            .expect("lock poisoned")
            .connected
            .remove(address);
        if was_connected {
            debug!(peer = %address, "simulated disconnect");
            self.emit(
                Duration::ZERO,
                RadioEvent::Disconnected {
                    peer: address.clone(),
                },
            );
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn radio_with(peers: Vec<SimulatedPeer>) -> (SimulatedRadio, mpsc::Receiver<RadioEvent>) {
        let (tx, rx) = mpsc::channel(64);
        (SimulatedRadio::new(peers, tx), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_scan_delivers_advertisement_after_delay() {
        // Arrange
        let schema = IdentitySchema::default();
        let peer = SimulatedPeer::tag("AA:01", &schema, "T1", "Alice").advertising_after(500);
        let (radio, mut rx) = radio_with(vec![peer]);

        // Act
        radio.start_scan().await.unwrap();
        let event = rx.recv().await.unwrap();

        // Assert
        assert_eq!(
            event,
            RadioEvent::Advertisement {
                peer: PeerAddress::from("AA:01"),
                name: Some("Alice".to_string()),
            }
        );
        assert_eq!(radio.scan_starts(), 1);
    }

    #[tokio::test]
    async fn test_start_scan_fails_when_unavailable() {
        let (radio, _rx) = radio_with(vec![]);
        radio.set_available(false);

        let result = radio.start_scan().await;

        assert!(matches!(result, Err(RadioError::Unavailable(_))));
        assert!(!radio.is_scanning());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_advertisement_after_stop_scan() {
        // Arrange
        let schema = IdentitySchema::default();
        let peer = SimulatedPeer::tag("AA:01", &schema, "T1", "Alice").advertising_after(500);
        let (radio, mut rx) = radio_with(vec![peer]);

        // Act
        radio.start_scan().await.unwrap();
        radio.stop_scan().await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        // Assert
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_of_failing_attribute_reports_failure() {
        // Arrange
        let schema = IdentitySchema::default();
        let peer = SimulatedPeer::tag("AA:01", &schema, "T1", "Alice")
            .failing_read(schema.display_name, "gatt error 133");
        let (radio, mut rx) = radio_with(vec![peer]);
        let address = PeerAddress::from("AA:01");

        // Act
        radio.connect(&address).unwrap();
        assert!(matches!(rx.recv().await, Some(RadioEvent::Connected { .. })));
        radio.read_attribute(&address, schema.display_name_path()).unwrap();
        let event = rx.recv().await.unwrap();

        // Assert
        assert_eq!(
            event,
            RadioEvent::ReadCompleted {
                peer: address,
                attribute: schema.display_name_path(),
                outcome: ReadOutcome::Failure("gatt error 133".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn test_read_without_connection_is_rejected() {
        let schema = IdentitySchema::default();
        let (radio, _rx) = radio_with(vec![SimulatedPeer::tag("AA:01", &schema, "T1", "Alice")]);

        let result = radio.read_attribute(&PeerAddress::from("AA:01"), schema.identifier_path());

        assert_eq!(result, Err(RadioError::NotConnected(PeerAddress::from("AA:01"))));
    }

    #[tokio::test]
    async fn test_connect_to_unknown_peer_is_rejected() {
        let (radio, _rx) = radio_with(vec![]);

        let result = radio.connect(&PeerAddress::from("ZZ"));

        assert_eq!(result, Err(RadioError::UnknownPeer(PeerAddress::from("ZZ"))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_completion_suppressed_after_disconnect() {
        // Arrange
        let schema = IdentitySchema::default();
        let peer = SimulatedPeer::tag("AA:01", &schema, "T1", "Alice").with_latency(100);
        let (radio, mut rx) = radio_with(vec![peer]);
        let address = PeerAddress::from("AA:01");
        radio.connect(&address).unwrap();
        rx.recv().await.unwrap();

        // Act
        radio.read_attribute(&address, schema.identifier_path()).unwrap();
        radio.disconnect(&address);
        tokio::time::sleep(Duration::from_secs(1)).await;

        // Assert: only the disconnect notification arrives.
        assert_eq!(rx.recv().await, Some(RadioEvent::Disconnected { peer: address }));
        assert!(rx.try_recv().is_err());
    }
}
