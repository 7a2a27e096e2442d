//! Notification dispatch.
//!
//! Turns one `notification` frame into plaintext: base64url-decode the
//! payload, resolve the channel's subscription, decrypt, and hand the
//! result to a [`NotificationSink`]. Every failure is contained here; a
//! corrupt notification is logged and dropped and never reaches the
//! receive loop.

// Rust guideline compliant 2026-02

use std::io::Write;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL, Engine};
use tokio::sync::mpsc;

use super::ece;
use super::subscription::SubscriptionStore;
use crate::push_service::protocol::Notification;

/// A decrypted notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedNotification {
    /// Channel the notification arrived on.
    pub channel_id: String,
    /// Application data.
    pub plaintext: Vec<u8>,
}

/// Destination for decrypted notifications.
pub trait NotificationSink {
    /// Accept one decrypted notification.
    fn emit(&mut self, notification: DecodedNotification);
}

/// Writes each plaintext as one line (lossy UTF-8) to a writer.
#[derive(Debug)]
pub struct WriterSink<W: Write> {
    writer: W,
}

impl<W: Write> WriterSink<W> {
    /// Wrap `writer`.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Return the wrapped writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl WriterSink<std::io::Stdout> {
    /// Sink that prints to standard output.
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> NotificationSink for WriterSink<W> {
    fn emit(&mut self, notification: DecodedNotification) {
        let text = String::from_utf8_lossy(&notification.plaintext);
        let written = writeln!(self.writer, "{text}").and_then(|()| self.writer.flush());
        if let Err(e) = written {
            log::error!(
                "[Dispatch] Failed to write notification for channel {}: {}",
                notification.channel_id,
                e
            );
        }
    }
}

/// Forwards notifications over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<DecodedNotification>,
}

impl ChannelSink {
    /// Create a sink and the receiver that drains it.
    pub fn unbounded() -> (Self, mpsc::UnboundedReceiver<DecodedNotification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelSink {
    fn emit(&mut self, notification: DecodedNotification) {
        if self.tx.send(notification).is_err() {
            log::warn!("[Dispatch] Receiver dropped; notification discarded");
        }
    }
}

/// What happened to one notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Decrypted and emitted.
    Delivered,
    /// The `data` field was not valid base64url.
    Undecodable,
    /// No local subscription for the channel.
    UnknownChannel,
    /// Decryption failed.
    DecryptFailed,
}

/// Decrypts notifications and emits them to a sink.
#[derive(Debug)]
pub struct NotificationDispatcher<S: NotificationSink> {
    sink: S,
}

impl<S: NotificationSink> NotificationDispatcher<S> {
    /// Create a dispatcher writing to `sink`.
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    /// Borrow the sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Handle one notification frame.
    pub fn handle(
        &mut self,
        subscriptions: &SubscriptionStore,
        notification: &Notification,
    ) -> DispatchOutcome {
        let channel_id = notification.channel_id.as_str();

        let payload = match BASE64URL.decode(notification.data.as_bytes()) {
            Ok(payload) => payload,
            Err(e) => {
                log::warn!(
                    "[Dispatch] Dropping notification for channel {}: bad base64url ({})",
                    channel_id,
                    e
                );
                return DispatchOutcome::Undecodable;
            }
        };

        let subscription = match subscriptions.lookup(channel_id) {
            Ok(subscription) => subscription,
            Err(e) => {
                log::warn!("[Dispatch] Dropping notification: {}", e);
                return DispatchOutcome::UnknownChannel;
            }
        };

        match ece::decrypt_payload(&payload, subscription) {
            Ok(plaintext) => {
                log::debug!(
                    "[Dispatch] Decrypted {} bytes for channel {}",
                    plaintext.len(),
                    channel_id
                );
                self.sink.emit(DecodedNotification {
                    channel_id: channel_id.to_string(),
                    plaintext,
                });
                DispatchOutcome::Delivered
            }
            Err(e) => {
                log::warn!(
                    "[Dispatch] Dropping notification for channel {}: {}",
                    channel_id,
                    e
                );
                DispatchOutcome::DecryptFailed
            }
        }
    }
}
