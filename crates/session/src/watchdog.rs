//! Periodic expiry poll for the platform key.
//!
//! The watchdog's only side effect is signal emission; clearing the key is
//! the decision of whoever owns it (normally the operator UI reacting to
//! the signal).

use std::{sync::Arc, time::Duration};

use {tokio::time::MissedTickBehavior, tracing::debug};

use juris_credentials::{PlatformKeyStore, Signal, SignalBus, now_ms};

/// Re-evaluate the platform key's TTL/idle state every `period` and
/// publish [`Signal::PlatformInvalidated`] while a held key is lapsed.
pub fn spawn_platform_watchdog(
    store: Arc<PlatformKeyStore>,
    bus: SignalBus,
    period: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if store.record().is_none() {
                continue;
            }
            let state = store.session_state(now_ms());
            if !state.valid {
                debug!(reason = ?state.reason, "platform key lapsed");
                bus.publish(Signal::PlatformInvalidated);
            }
        }
    })
}
