//! Tag read protocol.
//!
//! - **`attribute`** – 128-bit attribute identifiers, declared attribute
//!   paths, read outcomes and value decoding.
//! - **`schema`** – The fixed identity schema: one service scope with an
//!   identifier attribute and a display-name attribute.
//! - **`session`** – The per-peer state machine that sequences attribute reads
//!   and assembles an [`crate::Identity`].

pub mod attribute;
pub mod schema;
pub mod session;
