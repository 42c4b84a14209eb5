//! Storage infrastructure: configuration and tag registry persistence.
//!
//! - `config` reads the TOML configuration from the platform config directory
//!   (or an explicit path) and falls back to defaults on first run.
//! - `registry` keeps the list of known tags in a small TOML file next to it.

pub mod config;
pub mod registry;
