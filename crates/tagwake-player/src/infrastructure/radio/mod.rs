//! Radio infrastructure: the boundary between the discovery engine and a
//! short-range radio stack.
//!
//! Radio stacks are callback driven: a connect, an attribute enumeration or a
//! read is requested, and its completion arrives later, possibly interleaved
//! with completions for other peers.  [`RadioAdapter`] mirrors that shape:
//!
//! - Scan start/stop are awaited so that "radio unavailable" can be reported
//!   straight back to whoever asked for the scan.
//! - Peer operations are fire-and-continue.  They return immediately with
//!   `Ok(())` once the request was accepted, and the completion is delivered
//!   later as a [`RadioEvent`] on the channel the adapter was built with.
//!
//! # Sub-modules
//!
//! - **`simulated`** – A configurable in-process radio with scripted peers.
//!   Used by tests and by the binary's default backend.
//! - **`ble`** – Bluetooth LE central via `btleplug` (feature `ble`).

use async_trait::async_trait;
use tagwake_core::{AttributePath, PeerAddress, ReadOutcome};
use thiserror::Error;

pub mod simulated;

#[cfg(feature = "ble")]
pub mod ble;

/// Capacity of the radio event channel.
pub const RADIO_EVENT_CAPACITY: usize = 256;

/// Error type for radio operations that fail before being issued.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RadioError {
    /// The radio is disabled, missing, or does not support scanning.
    #[error("radio unavailable: {0}")]
    Unavailable(String),
    /// The peer has never been seen by this adapter.
    #[error("unknown peer {0}")]
    UnknownPeer(PeerAddress),
    /// The operation needs a connection that is not (or no longer) open.
    #[error("peer {0} is not connected")]
    NotConnected(PeerAddress),
    /// The radio stack rejected the request.
    #[error("radio operation failed: {0}")]
    Operation(String),
}

/// An asynchronous completion or notification from the radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    /// A peer advertised itself while scanning.
    Advertisement {
        peer: PeerAddress,
        name: Option<String>,
    },
    /// A requested connection is open.
    Connected { peer: PeerAddress },
    /// A requested connection could not be established.
    ConnectFailed { peer: PeerAddress, reason: String },
    /// An open connection was closed, by either side.
    Disconnected { peer: PeerAddress },
    /// The peer's declared attributes were enumerated.
    AttributesDiscovered {
        peer: PeerAddress,
        result: Result<Vec<AttributePath>, String>,
    },
    /// A single attribute read completed.
    ReadCompleted {
        peer: PeerAddress,
        attribute: AttributePath,
        outcome: ReadOutcome,
    },
}

impl RadioEvent {
    /// The peer this event concerns.
    pub fn peer(&self) -> &PeerAddress {
        match self {
            RadioEvent::Advertisement { peer, .. }
            | RadioEvent::Connected { peer }
            | RadioEvent::ConnectFailed { peer, .. }
            | RadioEvent::Disconnected { peer }
            | RadioEvent::AttributesDiscovered { peer, .. }
            | RadioEvent::ReadCompleted { peer, .. } => peer,
        }
    }
}

/// Trait abstracting a short-range radio in central role.
///
/// The production implementation wraps the platform Bluetooth stack; tests use
/// [`simulated::SimulatedRadio`].
#[async_trait]
pub trait RadioAdapter: Send + Sync {
    /// Starts delivering [`RadioEvent::Advertisement`]s.
    ///
    /// # Errors
    ///
    /// Returns [`RadioError::Unavailable`] when the radio cannot scan.
    async fn start_scan(&self) -> Result<(), RadioError>;

    /// Stops advertisement delivery.  Open connections are not affected.
    async fn stop_scan(&self);

    /// Requests a connection; completes with `Connected` or `ConnectFailed`.
    fn connect(&self, peer: &PeerAddress) -> Result<(), RadioError>;

    /// Requests the declared attribute set; completes with `AttributesDiscovered`.
    fn discover_attributes(&self, peer: &PeerAddress) -> Result<(), RadioError>;

    /// Requests one attribute read; completes with `ReadCompleted`.
    fn read_attribute(&self, peer: &PeerAddress, attribute: AttributePath) -> Result<(), RadioError>;

    /// Closes the connection to `peer` if one is open or pending.
    fn disconnect(&self, peer: &PeerAddress);
}
