//! Outbound queue handle
//!
//! Producer side of the bounded queue drained by the writer task. Cheap to
//! clone; any number of producers may hold one.

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use crate::error::SendError;
use crate::event::{self, Event};

/// Sender half of a connection's outbound queue
#[derive(Debug, Clone)]
pub struct Outbox {
    /// Payload channel to the writer task
    sender: mpsc::Sender<Vec<u8>>,
    /// One-shot close signal shared with the connection
    closing: CancellationToken,
}

impl Outbox {
    pub(crate) fn new(sender: mpsc::Sender<Vec<u8>>, closing: CancellationToken) -> Self {
        Self { sender, closing }
    }

    /// Queue a payload, waiting while the queue is full
    ///
    /// Returns an error once the connection is closing: nothing queued after
    /// `close()` reaches the peer. A send still waiting for room when
    /// `close()` is called fails the same way.
    pub async fn send(&self, payload: impl Into<Vec<u8>>) -> Result<(), SendError> {
        if self.closing.is_cancelled() {
            return Err(SendError::ChannelClosed);
        }
        tokio::select! {
            biased;
            _ = self.closing.cancelled() => Err(SendError::ChannelClosed),
            result = self.sender.send(payload.into()) => {
                result.map_err(|_| SendError::ChannelClosed)
            }
        }
    }

    /// Queue a payload without waiting
    ///
    /// Safe to call from event handlers, which run synchronously.
    pub fn try_send(&self, payload: impl Into<Vec<u8>>) -> Result<(), SendError> {
        if self.closing.is_cancelled() {
            return Err(SendError::ChannelClosed);
        }
        self.sender.try_send(payload.into()).map_err(|e| match e {
            TrySendError::Full(_) => SendError::Full,
            TrySendError::Closed(_) => SendError::ChannelClosed,
        })
    }

    /// Encode `{"name": name, "payload": payload}` and queue it
    pub async fn emit<T: Serialize>(&self, name: &str, payload: &T) -> Result<(), SendError> {
        let frame = encode_envelope(name, payload)?;
        self.send(frame).await
    }

    /// Non-blocking variant of [`emit`](Self::emit)
    pub fn try_emit<T: Serialize>(&self, name: &str, payload: &T) -> Result<(), SendError> {
        let frame = encode_envelope(name, payload)?;
        self.try_send(frame)
    }

    /// Close the queue; the writer drains it and sends a close frame
    pub fn close(&self) {
        self.closing.cancel();
    }

    /// Check if the queue no longer accepts payloads
    pub fn is_closed(&self) -> bool {
        self.closing.is_cancelled() || self.sender.is_closed()
    }

    /// Handle that does not keep the queue open
    ///
    /// Event handlers should capture this instead of an `Outbox`, so dropping
    /// every `Connection` still ends the writer.
    pub fn downgrade(&self) -> WeakOutbox {
        WeakOutbox {
            sender: self.sender.downgrade(),
            closing: self.closing.clone(),
        }
    }
}

/// Non-owning counterpart of [`Outbox`]
#[derive(Debug, Clone)]
pub struct WeakOutbox {
    sender: mpsc::WeakSender<Vec<u8>>,
    closing: CancellationToken,
}

impl WeakOutbox {
    /// Get a usable `Outbox`, or `None` once every strong handle is gone
    pub fn upgrade(&self) -> Option<Outbox> {
        let sender = self.sender.upgrade()?;
        Some(Outbox::new(sender, self.closing.clone()))
    }
}

fn encode_envelope<T: Serialize>(name: &str, payload: &T) -> Result<String, SendError> {
    let event = Event::new(name, serde_json::to_value(payload)?);
    Ok(event::encode(&event)?)
}
