//! Known-tag lookup.
//!
//! The [`TagRegistry`] trait is the read side of the tag catalogue: the
//! dispatch synchronizer can consult it to reject identities that were never
//! registered, and the `tags` command lists it.  Writes are backend specific
//! (see `infrastructure::storage::registry::FileTagRegistry`).

use tagwake_core::Identity;

/// Read access to the set of known tags.
#[cfg_attr(test, mockall::automock)]
pub trait TagRegistry: Send + Sync {
    /// Looks up a tag by its identifier.
    fn get_tag(&self, id: &str) -> Option<Identity>;

    /// Returns every known tag.
    fn list_tags(&self) -> Vec<Identity>;
}
