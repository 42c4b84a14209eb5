//! Console presentation of delivered messages.
//!
//! [`ConsolePresenter`] is the [`DeliverySink`] used by the binary.  The sink
//! methods only push onto an unbounded channel; the actual rendering happens
//! in [`run_presentation`], which types the batch out one character at a
//! time (with a terminal bell per character) and then reports delivery
//! complete back to the synchronizer.
//!
//! A batch is rendered as `"<first payload>: <message count>"`.

use std::sync::Arc;
use std::time::Duration;

use tagwake_core::PendingMessage;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::application::dispatch_messages::{
    DeliverySink, DispatchSynchronizer, PresentationMode, PresenterAvailability,
};

const BELL: char = '\u{7}';

/// Work items for the presentation task.
#[derive(Debug)]
pub enum PresenterCommand {
    Deliver {
        messages: Vec<PendingMessage>,
        mode: PresentationMode,
    },
    ScanState { scanning: bool },
}

/// [`DeliverySink`] that forwards to [`run_presentation`].
pub struct ConsolePresenter {
    commands: mpsc::UnboundedSender<PresenterCommand>,
}

impl ConsolePresenter {
    /// Creates the sink and the receiver to hand to [`run_presentation`].
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PresenterCommand>) {
        let (commands, rx) = mpsc::unbounded_channel();
        (Self { commands }, rx)
    }

    fn send(&self, command: PresenterCommand) {
        if self.commands.send(command).is_err() {
            warn!("presentation task is gone, dropping output");
        }
    }
}

impl DeliverySink for ConsolePresenter {
    fn on_matched_messages(&self, messages: Vec<PendingMessage>, mode: PresentationMode) {
        self.send(PresenterCommand::Deliver { messages, mode });
    }

    fn on_scan_state_changed(&self, scanning: bool) {
        self.send(PresenterCommand::ScanState { scanning });
    }
}

/// Text shown for a matched batch.
pub fn render_text(messages: &[PendingMessage]) -> Option<String> {
    let first = messages.first()?;
    Some(format!("{}: {}", first.payload, messages.len()))
}

/// Renders presenter commands to `out` until the channel closes.
///
/// Every delivered batch ends with
/// [`DispatchSynchronizer::on_delivery_complete`], so the synchronizer can
/// accept the next wait.
pub async fn run_presentation<W: AsyncWrite + Unpin + Send>(
    mut commands: mpsc::UnboundedReceiver<PresenterCommand>,
    dispatcher: Arc<DispatchSynchronizer>,
    char_interval: Duration,
    mut out: W,
) {
    while let Some(command) = commands.recv().await {
        match command {
            PresenterCommand::ScanState { scanning } => {
                let line = if scanning { "* scanning\n" } else { "* scan stopped\n" };
                if let Err(e) = write_flushed(&mut out, line).await {
                    warn!(error = %e, "console write failed");
                }
            }
            PresenterCommand::Deliver { messages, mode } => {
                if mode == PresentationMode::Launch {
                    info!("presenter detached, bringing it up");
                    dispatcher
                        .set_presenter_availability(PresenterAvailability::Attached)
                        .await;
                }
                if let Some(text) = render_text(&messages) {
                    debug!(messages = messages.len(), "presenting batch");
                    if let Err(e) = type_out(&mut out, &text, char_interval).await {
                        warn!(error = %e, "console write failed");
                    }
                }
                dispatcher.on_delivery_complete().await;
            }
        }
    }
    debug!("presentation task finished");
}

async fn type_out<W: AsyncWrite + Unpin>(
    out: &mut W,
    text: &str,
    char_interval: Duration,
) -> std::io::Result<()> {
    for c in text.chars() {
        write_flushed(out, &format!("{c}{BELL}")).await?;
        tokio::time::sleep(char_interval).await;
    }
    write_flushed(out, "\n").await
}

async fn write_flushed<W: AsyncWrite + Unpin>(out: &mut W, text: &str) -> std::io::Result<()> {
    out.write_all(text.as_bytes()).await?;
    out.flush().await
}

// ── Tests ─────────────────────────────────────────────────────────────────────
