//! Cross-context command queue
//!
//! The broker event-loop task holds a [`CommandSender`] and only ever
//! enqueues; the bridge loop owns the [`CommandChannel`] and drains it once
//! per tick without waiting.

use crate::protocol::RawCommand;
use thiserror::Error;
use tokio::sync::mpsc;

/// The receiving side of the bridge loop has been dropped
#[derive(Debug, Error, PartialEq, Eq)]
#[error("command channel closed")]
pub struct ChannelClosed;

/// Cloneable producer handle for inbound commands
#[derive(Debug, Clone)]
pub struct CommandSender {
    inner: mpsc::UnboundedSender<RawCommand>,
}

impl CommandSender {
    /// Queue a raw command; never blocks
    pub fn enqueue(&self, command: RawCommand) -> Result<(), ChannelClosed> {
        self.inner.send(command).map_err(|_| ChannelClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

/// Unbounded FIFO owned by the bridge loop
#[derive(Debug)]
pub struct CommandChannel {
    sender: CommandSender,
    receiver: mpsc::UnboundedReceiver<RawCommand>,
}

impl CommandChannel {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            sender: CommandSender { inner: tx },
            receiver: rx,
        }
    }

    /// A new producer handle for this channel
    pub fn sender(&self) -> CommandSender {
        self.sender.clone()
    }

    /// Drain everything queued right now, oldest first
    ///
    /// Returns an empty vector immediately when nothing is queued. Items
    /// enqueued while the drain is running may land in this batch or the next.
    pub fn try_dequeue_all(&mut self) -> Vec<RawCommand> {
        let mut drained = Vec::new();
        while let Ok(command) = self.receiver.try_recv() {
            drained.push(command);
        }
        drained
    }
}

impl Default for CommandChannel {
    fn default() -> Self {
        Self::new()
    }
}
