//! Line-oriented message inbox.
//!
//! Each input line is one JSON object:
//!
//! ```json
//! {"recipient": "T1", "payload": "dinner is ready"}
//! ```
//!
//! Valid lines are handed to [`DispatchSynchronizer::enqueue`].  Blank lines
//! are skipped silently; malformed or rejected lines are logged and skipped.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};

use crate::application::dispatch_messages::DispatchSynchronizer;

/// One inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub recipient: String,
    pub payload: String,
}

#[derive(Debug, Error)]
pub enum InboxError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Parses one inbox line.
///
/// # Errors
///
/// Returns [`InboxError::Malformed`] if the line is not a JSON object with
/// string `recipient` and `payload` fields.
pub fn parse_line(line: &str) -> Result<InboundMessage, InboxError> {
    Ok(serde_json::from_str(line)?)
}

/// Reads messages from `reader` until end of input.
///
/// Returns the number of messages accepted by the dispatcher.
///
/// # Errors
///
/// Only read errors on `reader` are returned; bad lines are skipped.
pub async fn run_inbox<R>(reader: R, dispatcher: Arc<DispatchSynchronizer>) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut accepted = 0;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let message = match parse_line(line) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "skipping inbox line");
                continue;
            }
        };
        match dispatcher.enqueue(message.recipient.clone(), message.payload).await {
            Ok(()) => {
                accepted += 1;
                debug!(recipient = %message.recipient, "inbox message accepted");
            }
            Err(e) => warn!(recipient = %message.recipient, error = %e, "inbox message rejected"),
        }
    }

    info!(accepted, "inbox closed");
    Ok(accepted)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::discover_tags::{ScanError, ScanStart};
    use crate::application::dispatch_messages::{
        DeliverySink, DispatchConfig, PresentationMode, ScanController,
    };
    use async_trait::async_trait;
    use tagwake_core::{ActivityState, PendingMessage};
    use tokio::io::BufReader;

    struct AlwaysStarts;

    #[async_trait]
    impl ScanController for AlwaysStarts {
        fn is_ready(&self) -> bool {
            true
        }

        async fn start_scan(&self) -> Result<ScanStart, ScanError> {
            Ok(ScanStart::Started)
        }
    }

    struct NullSink;

    impl DeliverySink for NullSink {
        fn on_matched_messages(&self, _messages: Vec<PendingMessage>, _mode: PresentationMode) {}
        fn on_scan_state_changed(&self, _scanning: bool) {}
    }

    fn dispatcher(capacity: usize) -> Arc<DispatchSynchronizer> {
        let config = DispatchConfig {
            queue_capacity: capacity,
            ..DispatchConfig::default()
        };
        Arc::new(DispatchSynchronizer::new(config, Arc::new(AlwaysStarts), Arc::new(NullSink)))
    }

    #[test]
    fn test_parse_line_reads_fields() {
        let message = parse_line(r#"{"recipient":"T1","payload":"hello"}"#).unwrap();

        assert_eq!(
            message,
            InboundMessage {
                recipient: "T1".to_string(),
                payload: "hello".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_line_rejects_missing_payload() {
        assert!(parse_line(r#"{"recipient":"T1"}"#).is_err());
    }

    #[tokio::test]
    async fn test_run_inbox_skips_bad_lines_and_counts_accepted() {
        // Arrange
        let input = tokio_test::io::Builder::new()
            .read(b"{\"recipient\":\"T1\",\"payload\":\"a\"}\n")
            .read(b"not json\n\n")
            .read(b"{\"recipient\":\"\",\"payload\":\"b\"}\n")
            .read(b"{\"recipient\":\"T2\",\"payload\":\"c\"}\n")
            .build();
        let sync = dispatcher(8);

        // Act
        let accepted = run_inbox(BufReader::new(input), Arc::clone(&sync)).await.unwrap();

        // Assert
        assert_eq!(accepted, 2);
        let snapshot = sync.snapshot().await;
        assert_eq!(snapshot.queue_len, 2);
        assert_eq!(snapshot.state, ActivityState::AwaitingScan);
    }

    #[tokio::test]
    async fn test_run_inbox_overflow_is_logged_not_fatal() {
        let input = tokio_test::io::Builder::new()
            .read(b"{\"recipient\":\"T1\",\"payload\":\"a\"}\n{\"recipient\":\"T1\",\"payload\":\"b\"}\n")
            .build();
        let sync = dispatcher(1);

        let accepted = run_inbox(BufReader::new(input), Arc::clone(&sync)).await.unwrap();

        assert_eq!(accepted, 1);
        assert_eq!(sync.snapshot().await.queue_len, 1);
    }
}
