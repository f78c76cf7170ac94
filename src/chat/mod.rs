//! Message emission.
//!
//! The engine talks to players only through [`Notifier`]: send a line of
//! plain text to a chat, or replace the text of a message it sent earlier.
//! Transports (a bot API client, a test harness) implement the trait.

use std::sync::atomic::{AtomicI64, Ordering};

use tokio::sync::mpsc;
use tracing::info;

use crate::core::{ChatId, MessageId};

/// Delivery failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifyError {
    /// Transport is gone.
    #[error("notifier closed")]
    Closed,

    /// Transport rejected the message.
    #[error("delivery failed: {0}")]
    Rejected(String),
}

/// Outbound message sink.
pub trait Notifier: Send + Sync {
    /// Deliver `text`, returning the id of the new message.
    fn send(&self, chat: ChatId, text: &str) -> Result<MessageId, NotifyError>;

    /// Replace the text of a previously sent message.
    fn edit(&self, chat: ChatId, message: MessageId, text: &str) -> Result<(), NotifyError>;
}

/// Writes every message to the log.
#[derive(Debug, Default)]
pub struct LogNotifier {
    next_id: AtomicI64,
}

impl LogNotifier {
    /// New notifier.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Notifier for LogNotifier {
    fn send(&self, chat: ChatId, text: &str) -> Result<MessageId, NotifyError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        info!(chat, message = id, "{}", text);
        Ok(id)
    }

    fn edit(&self, chat: ChatId, message: MessageId, text: &str) -> Result<(), NotifyError> {
        info!(chat, message, edited = true, "{}", text);
        Ok(())
    }
}

/// Message as seen by a [`ChannelNotifier`] receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    /// New message.
    Send {
        /// Target chat.
        chat: ChatId,
        /// Assigned id.
        message: MessageId,
        /// Body.
        text: String,
    },
    /// Replacement text for an earlier message.
    Edit {
        /// Target chat.
        chat: ChatId,
        /// Edited message.
        message: MessageId,
        /// New body.
        text: String,
    },
}

impl Outgoing {
    /// Message body.
    pub fn text(&self) -> &str {
        match self {
            Outgoing::Send { text, .. } | Outgoing::Edit { text, .. } => text,
        }
    }
}

/// Forwards every message into a tokio channel.
#[derive(Debug)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Outgoing>,
    next_id: AtomicI64,
}

impl ChannelNotifier {
    /// Notifier plus the receiving end of its channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Outgoing>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                next_id: AtomicI64::new(0),
            },
            rx,
        )
    }
}

impl Notifier for ChannelNotifier {
    fn send(&self, chat: ChatId, text: &str) -> Result<MessageId, NotifyError> {
        let message = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.tx
            .send(Outgoing::Send {
                chat,
                message,
                text: text.to_string(),
            })
            .map_err(|_| NotifyError::Closed)?;
        Ok(message)
    }

    fn edit(&self, chat: ChatId, message: MessageId, text: &str) -> Result<(), NotifyError> {
        self.tx
            .send(Outgoing::Edit {
                chat,
                message,
                text: text.to_string(),
            })
            .map_err(|_| NotifyError::Closed)
    }
}
