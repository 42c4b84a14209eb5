//! Device session: turns one connected peer into zero or one [`Identity`].
//!
//! The session is a pure state machine.  It never talks to the radio itself;
//! every transition returns a [`SessionStep`] telling the caller which radio
//! operation to issue next.  Completions are fed back in with the
//! `on_*` methods.
//!
//! ```text
//! Connecting ──► Discovering ──► Reading ──┬──► Completed(Some(identity))
//!     │               │             │  ▲   ├──► Completed(None)
//!     │               │             └──┘   │
//!     └───────────────┴────────────────────┴──► Aborted(error)
//! ```
//!
//! Reads are strictly sequential: the next read is only returned once the
//! previous one has completed, so there is never more than one read in flight
//! for a peer.  A terminal state is never left; any event arriving after it is
//! answered with [`SessionStep::Ignored`].

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

use super::attribute::{decode_attribute_value, AttributePath, ReadOutcome};
use super::schema::IdentitySchema;
use crate::domain::identity::Identity;

/// Radio address of a peer, as reported by the adapter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerAddress(String);

impl PeerAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PeerAddress {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PeerAddress {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a session was aborted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// The peer became unreachable or disconnected mid-session.
    #[error("connection failure: {0}")]
    ConnectionFailure(String),
    /// A single attribute read failed.
    #[error("reading {attribute} failed: {reason}")]
    AttributeReadFailure {
        attribute: AttributePath,
        reason: String,
    },
}

/// Current state of a [`DeviceSession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Connection requested, not yet established.
    Connecting,
    /// Connected; waiting for the peer's declared attributes.
    Discovering,
    /// One read is outstanding.
    Reading { in_flight: AttributePath },
    /// Read sequence finished.
    Completed(Option<Identity>),
    /// A hardware failure ended the session.
    Aborted(SessionError),
}

/// Terminal result of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed(Option<Identity>),
    Aborted(SessionError),
}

impl SessionOutcome {
    /// The identity produced, if any.
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            SessionOutcome::Completed(identity) => identity.as_ref(),
            SessionOutcome::Aborted(_) => None,
        }
    }
}

/// What the caller must do after feeding an event into the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStep {
    /// Ask the radio for the peer's declared attributes.
    Discover,
    /// Issue exactly one read of this attribute.
    Read(AttributePath),
    /// The session reached a terminal state.
    Finished(SessionOutcome),
    /// The event did not apply to the current state.
    Ignored,
}

/// Per-peer read sequencer and identity builder.
#[derive(Debug)]
pub struct DeviceSession {
    address: PeerAddress,
    schema: IdentitySchema,
    state: SessionState,
    pending: VecDeque<AttributePath>,
    identifier: Option<String>,
    display_name: Option<String>,
}

impl DeviceSession {
    /// Creates a session for a peer whose connection has just been requested.
    pub fn new(address: PeerAddress, schema: IdentitySchema) -> Self {
        Self {
            address,
            schema,
            state: SessionState::Connecting,
            pending: VecDeque::new(),
            identifier: None,
            display_name: None,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Returns `true` once the session is `Completed` or `Aborted`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            SessionState::Completed(_) | SessionState::Aborted(_)
        )
    }

    /// The connection to the peer was established.
    pub fn on_connected(&mut self) -> SessionStep {
        if self.state != SessionState::Connecting {
            return SessionStep::Ignored;
        }
        self.state = SessionState::Discovering;
        SessionStep::Discover
    }

    /// The peer's declared attributes are known.
    ///
    /// Builds the read queue from the schema attributes the peer declares.
    /// If a required attribute is missing the session completes without an
    /// identity, since it could never assemble one.
    pub fn on_attributes_discovered(&mut self, declared: &[AttributePath]) -> SessionStep {
        if self.state != SessionState::Discovering {
            return SessionStep::Ignored;
        }

        let required = self.schema.required_paths();
        self.pending = required
            .iter()
            .filter(|path| declared.contains(path))
            .copied()
            .collect();

        if self.pending.len() < required.len() {
            self.pending.clear();
            return self.finish(SessionOutcome::Completed(None));
        }
        self.read_next()
    }

    /// A read issued for `attribute` completed.
    ///
    /// A failure aborts the session; no partial identity is ever produced.
    pub fn on_read_completed(&mut self, attribute: AttributePath, outcome: ReadOutcome) -> SessionStep {
        match &self.state {
            SessionState::Reading { in_flight } if *in_flight == attribute => {}
            _ => return SessionStep::Ignored,
        }

        match outcome {
            ReadOutcome::Failure(reason) => {
                self.finish(SessionOutcome::Aborted(SessionError::AttributeReadFailure {
                    attribute,
                    reason,
                }))
            }
            ReadOutcome::Success(bytes) => {
                let value = decode_attribute_value(&bytes);
                if attribute == self.schema.identifier_path() {
                    self.identifier = value;
                } else if attribute == self.schema.display_name_path() {
                    self.display_name = value;
                }
                self.read_next()
            }
        }
    }

    /// The connection dropped or could not be established.
    pub fn on_connection_lost(&mut self, reason: impl Into<String>) -> SessionStep {
        if self.is_terminal() {
            return SessionStep::Ignored;
        }
        self.pending.clear();
        self.finish(SessionOutcome::Aborted(SessionError::ConnectionFailure(
            reason.into(),
        )))
    }

    fn read_next(&mut self) -> SessionStep {
        match self.pending.pop_front() {
            Some(next) => {
                self.state = SessionState::Reading { in_flight: next };
                SessionStep::Read(next)
            }
            None => {
                let identity = match (self.identifier.take(), self.display_name.take()) {
                    (Some(id), Some(name)) => Some(Identity::new(id, name, true)),
                    _ => None,
                };
                self.finish(SessionOutcome::Completed(identity))
            }
        }
    }

    fn finish(&mut self, outcome: SessionOutcome) -> SessionStep {
        self.state = match &outcome {
            SessionOutcome::Completed(identity) => SessionState::Completed(identity.clone()),
            SessionOutcome::Aborted(error) => SessionState::Aborted(error.clone()),
        };
        trace!(peer = %self.address, state = ?self.state, "device session finished");
        SessionStep::Finished(outcome)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
