//! The identity schema a peer must expose to be recognised as a tag.

use serde::{Deserialize, Serialize};

use super::attribute::{AttributeId, AttributePath};

/// Service scope holding the identity attributes (0x1802).
pub const DEFAULT_SERVICE: AttributeId = AttributeId::from_short(0x1802);
/// Attribute carrying the tag identifier (0x2A06).
pub const DEFAULT_IDENTIFIER: AttributeId = AttributeId::from_short(0x2A06);
/// Attribute carrying the human-readable tag name (0xDB5C).
pub const DEFAULT_DISPLAY_NAME: AttributeId = AttributeId::from_short(0xDB5C);

/// Fixed identity schema: one service containing two required attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentitySchema {
    #[serde(default = "default_service")]
    pub service: AttributeId,
    #[serde(default = "default_identifier")]
    pub identifier: AttributeId,
    #[serde(default = "default_display_name")]
    pub display_name: AttributeId,
}

fn default_service() -> AttributeId {
    DEFAULT_SERVICE
}
fn default_identifier() -> AttributeId {
    DEFAULT_IDENTIFIER
}
fn default_display_name() -> AttributeId {
    DEFAULT_DISPLAY_NAME
}

impl Default for IdentitySchema {
    fn default() -> Self {
        Self {
            service: DEFAULT_SERVICE,
            identifier: DEFAULT_IDENTIFIER,
            display_name: DEFAULT_DISPLAY_NAME,
        }
    }
}

impl IdentitySchema {
    /// Path of the identifier attribute.
    pub fn identifier_path(&self) -> AttributePath {
        AttributePath::new(self.service, self.identifier)
    }

    /// Path of the display-name attribute.
    pub fn display_name_path(&self) -> AttributePath {
        AttributePath::new(self.service, self.display_name)
    }

    /// Required attribute paths, in the order they are read.
    pub fn required_paths(&self) -> [AttributePath; 2] {
        [self.identifier_path(), self.display_name_path()]
    }
}
