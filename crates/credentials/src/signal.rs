//! Process-local invalidation signals: fire-and-forget, no payload.
//!
//! Explicit pub/sub instead of an ambient event bus — the bus is
//! constructed once and handed to both the interceptor pipeline and the
//! auth state machine.

use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// The primary session has become unusable (refresh failed, idle
    /// timeout tripped, or logout).
    PrimaryInvalidated,
    /// The platform key has become unusable (rejected or expired).
    PlatformInvalidated,
}

#[derive(Debug, Clone)]
pub struct SignalBus {
    tx: broadcast::Sender<Signal>,
}

impl SignalBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(32);
        Self { tx }
    }

    /// Publish a signal. Having no subscribers is not an error.
    pub fn publish(&self, signal: Signal) {
        let receivers = self.tx.send(signal).unwrap_or(0);
        tracing::debug!(?signal, receivers, "invalidation signal published");
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Signal> {
        self.tx.subscribe()
    }
}

impl Default for SignalBus {
    fn default() -> Self {
        Self::new()
    }
}
