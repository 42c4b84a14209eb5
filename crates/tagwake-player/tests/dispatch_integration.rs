//! End-to-end tests: simulated radio → discovery engine → dispatch synchronizer.
//!
//! # Purpose
//!
//! These tests wire the real discovery engine to a [`DispatchSynchronizer`]
//! exactly as the `tagwake run` command does, with a [`SimulatedRadio`] in
//! place of the Bluetooth stack and a recording sink in place of the console.
//! They verify:
//!
//! - A message for a tag that is present is delivered, and only that message.
//! - Messages for absent tags survive a scan with no match, the wait times
//!   out, and the next message starts a fresh scan.
//! - A message queued while a scan window is already running still reaches a
//!   tag that was read earlier in that window.
//! - A radio that cannot scan does not wedge the synchronizer.
//!
//! All tests run on paused Tokio time, so a 10 s scan window costs nothing.
//!
//! ```text
//! enqueue ─► DispatchSynchronizer ─► DiscoveryHandle::start_scan
//!                   ▲                          │
//!                   │ IdentityFound / ScanEnded│
//!                   └──── discovery engine ◄───┘◄── SimulatedRadio
//! ```

use std::sync::Arc;
use std::time::Duration;

use tagwake_core::{ActivityState, IdentitySchema, PeerAddress, PendingMessage};
use tagwake_player::application::discover_tags::{spawn_discovery_engine, DiscoveryConfig};
use tagwake_player::application::dispatch_messages::{
    DeliverySink, DispatchConfig, DispatchSynchronizer, PresentationMode,
};
use tagwake_player::infrastructure::radio::simulated::{SimulatedPeer, SimulatedRadio};
use tagwake_player::infrastructure::radio::RadioEvent;
use tokio::sync::mpsc;

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Sink that forwards every matched batch to the test.
struct ChannelSink {
    batches: mpsc::UnboundedSender<Vec<(String, String)>>,
}

impl DeliverySink for ChannelSink {
    fn on_matched_messages(&self, messages: Vec<PendingMessage>, _mode: PresentationMode) {
        let batch = messages
            .into_iter()
            .map(|m| (m.recipient_id, m.payload))
            .collect();
        let _ = self.batches.send(batch);
    }

    fn on_scan_state_changed(&self, _scanning: bool) {}
}

struct Pipeline {
    radio: SimulatedRadio,
    radio_tx: mpsc::Sender<RadioEvent>,
    sync: Arc<DispatchSynchronizer>,
    batches: mpsc::UnboundedReceiver<Vec<(String, String)>>,
}

fn pipeline(peers: Vec<SimulatedPeer>) -> Pipeline {
    let (radio_tx, radio_rx) = mpsc::channel(64);
    let radio = SimulatedRadio::new(peers, radio_tx.clone());
    let (handle, events, _engine) =
        spawn_discovery_engine(Arc::new(radio.clone()), radio_rx, DiscoveryConfig::default());

    let (batch_tx, batches) = mpsc::unbounded_channel();
    let sync = Arc::new(DispatchSynchronizer::new(
        DispatchConfig::default(),
        Arc::new(handle),
        Arc::new(ChannelSink { batches: batch_tx }),
    ));
    tokio::spawn(Arc::clone(&sync).consume_discovery_events(events));

    Pipeline {
        radio,
        radio_tx,
        sync,
        batches,
    }
}

fn pair(recipient: &str, payload: &str) -> (String, String) {
    (recipient.to_string(), payload.to_string())
}

async fn queued(sync: &DispatchSynchronizer) -> Vec<(String, String)> {
    sync.snapshot()
        .await
        .queued
        .into_iter()
        .map(|m| (m.recipient_id, m.payload))
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_present_tag_receives_its_message() {
    // Arrange
    let schema = IdentitySchema::default();
    let mut p = pipeline(vec![
        SimulatedPeer::tag("AA:01", &schema, "T1", "Kitchen").advertising_after(1500)
    ]);

    // Act
    p.sync.enqueue("T1", "hello").await.unwrap();
    let batch = p.batches.recv().await.unwrap();

    // Assert
    assert_eq!(batch, vec![pair("T1", "hello")]);
    assert_eq!(p.sync.state().await, ActivityState::Delivering);

    p.sync.on_delivery_complete().await;
    assert_eq!(p.sync.state().await, ActivityState::Idle);
    assert_eq!(p.radio.scan_starts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_only_present_recipient_is_delivered_rest_keep_order() {
    // Arrange: only T2 is in range.
    let schema = IdentitySchema::default();
    let mut p = pipeline(vec![SimulatedPeer::tag("AA:02", &schema, "T2", "Porch")]);

    // Act
    p.sync.enqueue("T1", "a").await.unwrap();
    p.sync.enqueue("T2", "b").await.unwrap();
    p.sync.enqueue("T1", "c").await.unwrap();
    let batch = p.batches.recv().await.unwrap();

    // Assert
    assert_eq!(batch, vec![pair("T2", "b")]);
    assert_eq!(queued(&p.sync).await, vec![pair("T1", "a"), pair("T1", "c")]);
}

#[tokio::test(start_paused = true)]
async fn test_absent_recipient_times_out_and_next_message_rescans() {
    // Arrange: a tag is nearby but it is not the recipient.
    let schema = IdentitySchema::default();
    let mut p = pipeline(vec![SimulatedPeer::tag("AA:09", &schema, "T9", "Garage")]);
    p.sync.enqueue("T1", "a").await.unwrap();

    // Act: scan window (10 s) plus scan-ended timeout (3 s).
    tokio::time::sleep(Duration::from_millis(12_000)).await;
    let still_waiting = p.sync.state().await;
    tokio::time::sleep(Duration::from_millis(2_000)).await;

    // Assert
    assert_eq!(still_waiting, ActivityState::AwaitingScan);
    assert_eq!(p.sync.state().await, ActivityState::Idle);
    assert_eq!(queued(&p.sync).await, vec![pair("T1", "a")]);
    assert!(p.batches.try_recv().is_err());

    p.sync.enqueue("T1", "b").await.unwrap();
    assert_eq!(p.radio.scan_starts(), 2);
    assert_eq!(p.sync.state().await, ActivityState::AwaitingScan);
}

#[tokio::test(start_paused = true)]
async fn test_tag_with_broken_name_attribute_never_delivers() {
    // Arrange
    let schema = IdentitySchema::default();
    let mut p = pipeline(vec![
        SimulatedPeer::tag("AA:01", &schema, "T1", "Kitchen")
            .failing_read(schema.display_name, "gatt error 133"),
        SimulatedPeer::tag("AA:02", &schema, "T2", "Porch"),
    ]);

    // Act
    p.sync.enqueue("T1", "a").await.unwrap();
    p.sync.enqueue("T2", "b").await.unwrap();
    let batch = p.batches.recv().await.unwrap();

    // Assert
    assert_eq!(batch, vec![pair("T2", "b")]);
    assert_eq!(queued(&p.sync).await, vec![pair("T1", "a")]);
}

#[tokio::test(start_paused = true)]
async fn test_radio_off_gives_up_and_keeps_queue() {
    // Arrange
    let p = pipeline(vec![]);
    p.radio.set_available(false);

    // Act: default policy is 5 attempts, 1 s apart.
    p.sync.enqueue("T1", "a").await.unwrap();
    tokio::time::sleep(Duration::from_secs(6)).await;

    // Assert
    assert_eq!(p.sync.state().await, ActivityState::Idle);
    assert_eq!(queued(&p.sync).await, vec![pair("T1", "a")]);
    assert_eq!(p.radio.scan_starts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_message_queued_mid_window_reaches_tag_read_earlier() {
    // Arrange: first delivery happens early in the window.
    let schema = IdentitySchema::default();
    let mut p = pipeline(vec![SimulatedPeer::tag("AA:01", &schema, "T1", "Kitchen")]);
    let peer = PeerAddress::from("AA:01");
    p.sync.enqueue("T1", "first").await.unwrap();
    assert_eq!(p.batches.recv().await.unwrap(), vec![pair("T1", "first")]);
    p.sync.on_delivery_complete().await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    // Act: same window, the tag is still around and advertises again.
    p.sync.enqueue("T1", "second").await.unwrap();
    p.radio_tx
        .send(RadioEvent::Advertisement {
            peer: peer.clone(),
            name: None,
        })
        .await
        .unwrap();
    let batch = p.batches.recv().await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    // Assert
    assert_eq!(batch, vec![pair("T1", "second")]);
    assert_eq!(p.sync.state().await, ActivityState::Delivering);
    assert!(queued(&p.sync).await.is_empty());
    assert_eq!(p.radio.scan_starts(), 1);
    assert_eq!(p.radio.connect_attempts(&peer), 2);
    assert!(p.batches.try_recv().is_err());
}
