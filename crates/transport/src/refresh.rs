//! Single-flight coordination for credential refresh.
//!
//! N requests failing on the same expired credential in the same tick must
//! produce exactly one network refresh; all N observe its single outcome.

use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::{BoxFuture, FutureExt, Shared};

use crate::error::TransportError;

type InflightFuture = Shared<BoxFuture<'static, Result<(), TransportError>>>;

/// At most one outstanding refresh per credential domain. Construct one per
/// domain and share it by reference.
#[derive(Clone, Default)]
pub struct RefreshCoordinator {
    slot: Arc<Mutex<Option<InflightFuture>>>,
}

fn lock(slot: &Mutex<Option<InflightFuture>>) -> MutexGuard<'_, Option<InflightFuture>> {
    slot.lock().unwrap_or_else(|e| e.into_inner())
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the in-flight refresh if one exists, otherwise start one.
    ///
    /// `start` is only invoked when no refresh is outstanding. The slot is
    /// cleared unconditionally when the underlying operation settles, so
    /// the next failure can trigger a fresh attempt. Failures propagate to
    /// every waiting caller; there is no internal retry.
    pub async fn ensure_refreshed<F, Fut>(&self, start: F) -> Result<(), TransportError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), TransportError>> + Send + 'static,
    {
        let inflight = {
            let mut slot = lock(&self.slot);
            if let Some(existing) = slot.as_ref() {
                existing.clone()
            } else {
                let slot_handle = Arc::clone(&self.slot);
                let underlying = start();
                let shared: InflightFuture = async move {
                    let result = underlying.await;
                    lock(&slot_handle).take();
                    result
                }
                .boxed()
                .shared();
                *slot = Some(shared.clone());
                // Drive the refresh to settlement even if every waiter is
                // dropped; otherwise the slot would stay occupied forever.
                tokio::spawn(shared.clone());
                shared
            }
        };
        inflight.await
    }

    pub fn is_inflight(&self) -> bool {
        lock(&self.slot).is_some()
    }
}
