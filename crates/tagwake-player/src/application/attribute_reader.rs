//! Use case: issue single attribute reads against connected peers.
//!
//! The reader is the only place that calls
//! [`RadioAdapter::read_attribute`].  It remembers which attribute each peer
//! has in flight so that a second read is refused and completions that no
//! longer belong to any request (for example after a forced disconnect) can
//! be recognised and dropped.  There are no retries: a failed read is
//! reported once and the caller decides what it means.

use std::collections::HashMap;
use std::sync::Arc;

use tagwake_core::{AttributePath, PeerAddress};
use thiserror::Error;
use tracing::debug;

use crate::infrastructure::radio::{RadioAdapter, RadioError};

/// Errors returned by [`AttributeReader::read`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReadError {
    /// Another read for this peer has not completed yet.
    #[error("read of {attribute} already in flight for {peer}")]
    InFlight {
        peer: PeerAddress,
        attribute: AttributePath,
    },
    #[error(transparent)]
    Radio(#[from] RadioError),
}

/// Tracks at most one outstanding read per peer.
pub struct AttributeReader {
    radio: Arc<dyn RadioAdapter>,
    in_flight: HashMap<PeerAddress, AttributePath>,
}

impl AttributeReader {
    pub fn new(radio: Arc<dyn RadioAdapter>) -> Self {
        Self {
            radio,
            in_flight: HashMap::new(),
        }
    }

    /// Issues exactly one read of `attribute` on `peer`.
    ///
    /// # Errors
    ///
    /// - [`ReadError::InFlight`] if `peer` already has a read outstanding.
    /// - [`ReadError::Radio`] if the radio refused to issue the read.
    pub fn read(&mut self, peer: &PeerAddress, attribute: AttributePath) -> Result<(), ReadError> {
        if let Some(current) = self.in_flight.get(peer) {
            return Err(ReadError::InFlight {
                peer: peer.clone(),
                attribute: *current,
            });
        }
        self.radio.read_attribute(peer, attribute)?;
        self.in_flight.insert(peer.clone(), attribute);
        debug!(peer = %peer, attribute = %attribute, "attribute read issued");
        Ok(())
    }

    /// Records a completion.  Returns `false` when it matches no outstanding read.
    pub fn complete(&mut self, peer: &PeerAddress, attribute: &AttributePath) -> bool {
        match self.in_flight.get(peer) {
            Some(current) if current == attribute => {
                self.in_flight.remove(peer);
                true
            }
            _ => {
                debug!(peer = %peer, attribute = %attribute, "unmatched read completion");
                false
            }
        }
    }

    /// Forgets any outstanding read for `peer`.
    pub fn cancel(&mut self, peer: &PeerAddress) {
        self.in_flight.remove(peer);
    }

    /// Number of reads currently outstanding.
    pub fn outstanding(&self) -> usize {
        self.in_flight.len()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
