//! Pending message value.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// A message held until its recipient tag is physically present.
///
/// A `PendingMessage` is owned by the dispatcher's queue from the moment it is
/// enqueued until it is matched against a detected identity, at which point
/// ownership moves to the delivery sink.  It is deliberately not `Clone`: a
/// message can only ever be in one place.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMessage {
    pub recipient_id: String,
    pub payload: String,
    pub enqueued_at: SystemTime,
}

impl PendingMessage {
    /// Creates a message stamped with the current wall-clock time.
    pub fn new(recipient_id: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            recipient_id: recipient_id.into(),
            payload: payload.into(),
            enqueued_at: SystemTime::now(),
        }
    }

    /// Returns `true` if this message is addressed to the tag `id`.
    ///
    /// Matching is exact, case-sensitive string equality.
    pub fn is_addressed_to(&self, id: &str) -> bool {
        self.recipient_id == id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_addressed_to_matches_exact_id() {
        let msg = PendingMessage::new("T1", "hello");
        assert!(msg.is_addressed_to("T1"));
    }

    #[test]
    fn test_is_addressed_to_is_case_sensitive() {
        let msg = PendingMessage::new("T1", "hello");
        assert!(!msg.is_addressed_to("t1"));
        assert!(!msg.is_addressed_to("T10"));
    }

    #[test]
    fn test_new_stamps_enqueue_time() {
        // Arrange
        let before = SystemTime::now();

        // Act
        let msg = PendingMessage::new("T1", "hello");

        // Assert
        assert!(msg.enqueued_at >= before);
    }
}
