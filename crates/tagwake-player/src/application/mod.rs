//! Application layer use cases for the player.
//!
//! Use cases here depend on abstractions (the [`RadioAdapter`] and the
//! collaborator traits declared alongside each use case) rather than on
//! concrete radio stacks or output devices.
//!
//! # Sub-modules
//!
//! - **`attribute_reader`** – Issues single attribute reads against connected
//!   peers and enforces one outstanding read per peer.
//!
//! - **`discover_tags`** – The discovery engine: owns the scan window, runs one
//!   device session per peer, and streams discovered identities.
//!
//! - **`dispatch_messages`** – The dispatch synchronizer: the pending message
//!   queue and the idle / awaiting-scan / delivering state machine.
//!
//! - **`manage_tags`** – The tag registry interface used to validate
//!   identities, plus an in-memory implementation.
//!
//! [`RadioAdapter`]: crate::infrastructure::radio::RadioAdapter

pub mod attribute_reader;
pub mod discover_tags;
pub mod dispatch_messages;
pub mod manage_tags;
