//! tagwake-player library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does the player do?
//!
//! Messages arrive addressed to a physical tag.  The player keeps them queued
//! and only releases them once that tag is detected nearby:
//!
//! 1. A message is enqueued with the [`application::dispatch_messages`]
//!    synchronizer, which asks the discovery engine for a scan.
//! 2. The [`application::discover_tags`] engine scans for peers, connects to
//!    each one, and reads its identity attributes through the
//!    [`application::attribute_reader`].
//! 3. Every identity found is streamed back to the synchronizer, which hands
//!    the messages addressed to it to the presenter.
//! 4. If the scan ends without a match, the wait times out and the messages
//!    stay queued for the next trigger.

/// Application layer: discovery, attribute reads, message dispatch, tag registry.
pub mod application;

/// Infrastructure layer: radio adapters, storage, presentation, message inbox.
pub mod infrastructure;
