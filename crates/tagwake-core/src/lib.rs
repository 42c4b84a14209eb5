//! # tagwake-core
//!
//! Shared library for Tagwake containing the domain entities, the attribute
//! schema used to recognise a tag, and the per-peer device session state
//! machine.
//!
//! This crate is used by the player application.  It has zero dependencies on
//! radio stacks, async runtimes, or the file system, so everything here can be
//! unit-tested without hardware.
//!
//! # Architecture overview
//!
//! Tagwake holds messages addressed to a physical tag and releases them only
//! once that tag is detected nearby.  This crate defines:
//!
//! - **`domain`** – Pure business values: the tag [`Identity`], the
//!   [`PendingMessage`] waiting for its recipient, the bounded
//!   [`PendingQueue`] that holds them, and the [`ActivityState`] of the
//!   dispatcher.
//!
//! - **`protocol`** – How a tag is read: opaque 128-bit attribute identifiers,
//!   the fixed [`IdentitySchema`] and the [`DeviceSession`] that turns one
//!   connected peer into zero or one identity.

pub mod domain;
pub mod protocol;

pub use domain::activity::ActivityState;
pub use domain::identity::Identity;
pub use domain::message::PendingMessage;
pub use domain::queue::{Partition, PendingQueue, QueueError};
pub use protocol::attribute::{decode_attribute_value, AttributeId, AttributePath, ReadOutcome};
pub use protocol::schema::IdentitySchema;
pub use protocol::session::{
    DeviceSession, PeerAddress, SessionError, SessionOutcome, SessionState, SessionStep,
};
