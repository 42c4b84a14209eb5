//! Domain entities for Tagwake.
//!
//! This module contains pure business logic with no infrastructure
//! dependencies.  Code in the player (radio adapters, timers, presentation)
//! depends on these types, but nothing here depends on the player.

/// The activity state of the message dispatcher.
pub mod activity;

/// The resolved identity of a detected tag.
pub mod identity;

/// A message waiting for its recipient tag.
pub mod message;

/// The bounded queue of pending messages and its partitioning rules.
pub mod queue;
