//! Attribute identifiers and read outcomes.
//!
//! Tags expose their data as attributes grouped under services.  Both services
//! and attributes are named by opaque 128-bit identifiers.  Most tags use
//! 16-bit "short" identifiers that expand against the Bluetooth base UUID
//! `0000xxxx-0000-1000-8000-00805f9b34fb`; [`AttributeId::from_short`] and the
//! `FromStr` impl accept both forms.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Bluetooth base UUID with the 16-bit slot zeroed.
const BASE_UUID: u128 = 0x0000_0000_0000_1000_8000_0080_5f9b_34fb;

/// Error returned when an attribute identifier cannot be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid attribute identifier {0:?}: expected a UUID or a 16-bit hex short id")]
pub struct AttributeIdError(pub String);

/// Opaque 128-bit identifier of a service or attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AttributeId(Uuid);

impl AttributeId {
    /// Wraps a full 128-bit identifier.
    pub const fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Expands a 16-bit short identifier against the Bluetooth base UUID.
    pub const fn from_short(short: u16) -> Self {
        Self(Uuid::from_u128(BASE_UUID | ((short as u128) << 96)))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for AttributeId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl FromStr for AttributeId {
    type Err = AttributeIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(uuid) = Uuid::parse_str(trimmed) {
            return Ok(Self(uuid));
        }
        let hex = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        if hex.is_empty() || hex.len() > 4 {
            return Err(AttributeIdError(s.to_string()));
        }
        u16::from_str_radix(hex, 16)
            .map(Self::from_short)
            .map_err(|_| AttributeIdError(s.to_string()))
    }
}

impl TryFrom<String> for AttributeId {
    type Error = AttributeIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AttributeId> for String {
    fn from(id: AttributeId) -> Self {
        id.0.to_string()
    }
}

impl fmt::Display for AttributeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A declared attribute on a peer: the attribute id within its service scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttributePath {
    pub service: AttributeId,
    pub attribute: AttributeId,
}

impl AttributePath {
    pub const fn new(service: AttributeId, attribute: AttributeId) -> Self {
        Self { service, attribute }
    }
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.service, self.attribute)
    }
}

/// Completion of a single attribute read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The read returned these raw bytes (possibly empty).
    Success(Vec<u8>),
    /// The read failed; the reason is free-form text from the radio stack.
    Failure(String),
}

/// Decodes a raw attribute value into text.
///
/// Returns `None` for an empty value, which tags use to signal "not set".
/// Trailing NUL padding is stripped and invalid UTF-8 sequences are replaced
/// rather than rejected.
pub fn decode_attribute_value(raw: &[u8]) -> Option<String> {
    let end = raw.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
    if end == 0 {
        return None;
    }
    Some(String::from_utf8_lossy(&raw[..end]).into_owned())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
