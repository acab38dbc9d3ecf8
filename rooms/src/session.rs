use events::Envelope;
use log::*;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Unique identifier for a bidirectional session (server-generated)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Outbound half of a bidirectional session. Cheap to clone; every clone
/// writes into the same per-session buffer.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    sender: mpsc::Sender<Envelope>,
}

impl SessionHandle {
    pub fn new(sender: mpsc::Sender<Envelope>) -> Self {
        Self {
            id: SessionId::new(),
            sender,
        }
    }

    /// A handle together with the receiver its session drains.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self::new(tx), rx)
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Write a frame without waiting. Returns false when the session is gone
    /// or its buffer is full.
    pub fn send(&self, envelope: &Envelope) -> bool {
        match self.sender.try_send(envelope.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(
                    "Session {} is not keeping up, skipped {}",
                    self.id.as_str(),
                    envelope.event_type
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(
                    "Session {} is closed, skipped {}",
                    self.id.as_str(),
                    envelope.event_type
                );
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}
