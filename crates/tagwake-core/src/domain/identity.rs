//! Tag identity value.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// The resolved representation of a physically detected tag.
///
/// Two identities are equal when their `id`s are equal; the display name and
/// interactivity flag do not take part in equality or hashing.  This lets a
/// `HashSet<Identity>` collapse repeated detections of the same tag even when
/// the tag was renamed in between.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    id: String,
    #[serde(rename = "name")]
    display_name: String,
    #[serde(rename = "interactive", default)]
    is_interactive: bool,
}

impl Identity {
    /// Creates a new identity.
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, is_interactive: bool) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            is_interactive,
        }
    }

    /// The tag identifier messages are addressed to.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Human-readable tag name.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn is_interactive(&self) -> bool {
        self.is_interactive
    }
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Identity {}

impl Hash for Identity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name, self.id)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_identities_with_same_id_are_equal_regardless_of_name() {
        // Arrange
        let a = Identity::new("T1", "Kitchen", true);
        let b = Identity::new("T1", "Hallway", false);

        // Act / Assert
        assert_eq!(a, b);
    }

    #[test]
    fn test_identities_with_different_ids_are_not_equal() {
        let a = Identity::new("T1", "Tag", true);
        let b = Identity::new("T2", "Tag", true);
        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_set_collapses_identities_by_id() {
        // Arrange
        let mut set = HashSet::new();

        // Act
        set.insert(Identity::new("T1", "first", true));
        set.insert(Identity::new("T1", "second", true));
        set.insert(Identity::new("T2", "other", true));

        // Assert
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_display_renders_name_then_id() {
        let identity = Identity::new("1234", "Antique Clock", true);
        assert_eq!(identity.to_string(), "Antique Clock (1234)");
    }
}
