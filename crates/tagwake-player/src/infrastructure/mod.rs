//! Infrastructure layer for the player.
//!
//! Contains the adapters facing the outside world: radio stacks, the
//! configuration and tag registry files, the console presenter and the
//! message inbox.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `tagwake_core`; the application layer only reaches in here for the
//! [`radio::RadioAdapter`] boundary.

pub mod inbox;
pub mod presentation;
pub mod radio;
pub mod storage;
