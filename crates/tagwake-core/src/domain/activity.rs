//! Dispatcher activity state.
//!
//! ```text
//!            enqueue                 identity matched
//!   Idle ─────────────► AwaitingScan ────────────────► Delivering
//!    ▲                      │                               │
//!    │  scan-ended timeout  │                               │
//!    ├──────────────────────┘                               │
//!    │                 delivery complete                    │
//!    └──────────────────────────────────────────────────────┘
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Process-wide activity of the message dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ActivityState {
    /// Nothing in progress; the next enqueue triggers a scan.
    #[default]
    Idle,
    /// A scan has been requested and the dispatcher waits for a matching tag.
    AwaitingScan,
    /// Matched messages are being presented.
    Delivering,
}

impl ActivityState {
    /// Returns `true` when a new message should trigger a scan request.
    pub fn accepts_scan_request(self) -> bool {
        matches!(self, ActivityState::Idle)
    }
}

impl fmt::Display for ActivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ActivityState::Idle => "idle",
            ActivityState::AwaitingScan => "awaiting-scan",
            ActivityState::Delivering => "delivering",
        };
        f.write_str(label)
    }
}
