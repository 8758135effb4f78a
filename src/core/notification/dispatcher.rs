use std::sync::{Mutex, PoisonError};

use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use super::Envelope;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("dispatcher rejected envelope: {0}")]
    Rejected(String),
}

/// Receiver of notification envelopes (event bus, metrics sink, ...).
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, envelope: Envelope) -> Result<(), DispatchError>;
}

/// Fire-and-forget delivery: failures are logged and never reach the caller.
pub fn publish(dispatcher: &dyn Dispatcher, envelope: Envelope) {
    let msg = envelope.msg().unwrap_or_default().to_string();
    if let Err(e) = dispatcher.dispatch(envelope) {
        warn!(%msg, "failed to dispatch notification: {}", e);
    }
}

/// In-process pub/sub bus. Publishing with no subscribers is not an error.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Envelope>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.sender.subscribe()
    }
}

impl Dispatcher for EventBus {
    fn dispatch(&self, envelope: Envelope) -> Result<(), DispatchError> {
        match self.sender.send(envelope) {
            Ok(receivers) => trace!(receivers, "envelope dispatched"),
            Err(_) => debug!("envelope dropped, no subscribers"),
        }
        Ok(())
    }
}

/// Buffers envelopes produced inside a store transaction until it commits.
#[derive(Default)]
pub struct Outbox {
    pending: Mutex<Vec<Envelope>>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delivers everything buffered, in order. Returns the number of envelopes flushed.
    pub fn flush(self, target: &dyn Dispatcher) -> usize {
        let pending = self
            .pending
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        let count = pending.len();
        for envelope in pending {
            publish(target, envelope);
        }
        count
    }
}

impl Dispatcher for Outbox {
    fn dispatch(&self, envelope: Envelope) -> Result<(), DispatchError> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(envelope);
        Ok(())
    }
}
