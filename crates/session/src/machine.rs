//! The auth state machine: a tri-state session status derived from two
//! dependent identity lookups and a cross-cutting invalidation flag.
//!
//! The machine owns only the derived status and cached lookup results; it
//! never writes credentials.

use std::sync::{
    Arc, Mutex, MutexGuard,
    atomic::{AtomicBool, Ordering},
};

use {
    tokio::sync::broadcast,
    tracing::{debug, warn},
};

use {
    juris_credentials::{IdleTracker, Signal, SignalBus},
    juris_transport::{ApiClient, TenantProfile, UserProfile},
};

/// Derived session status. Never stored — recomputed from the parts on
/// every read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    Loading,
    Authenticated,
    Unauthenticated,
}

/// Lifecycle of one dependent lookup.
#[derive(Debug, Clone)]
pub enum QueryState<T> {
    Pending,
    Ready(T),
    Failed,
}

impl<T> QueryState<T> {
    fn ready(&self) -> Option<&T> {
        match self {
            Self::Ready(value) => Some(value),
            _ => None,
        }
    }
}

/// Status derivation, in precedence order: the manual invalidation flag
/// beats everything; then the identity lookup; then the tenant lookup,
/// which only exists once identity succeeded.
pub fn derive_status<U, T>(
    invalidated: bool,
    user: &QueryState<U>,
    tenant: &QueryState<T>,
) -> AuthStatus {
    if invalidated {
        return AuthStatus::Unauthenticated;
    }
    match user {
        QueryState::Pending => AuthStatus::Loading,
        QueryState::Failed => AuthStatus::Unauthenticated,
        QueryState::Ready(_) => match tenant {
            QueryState::Pending => AuthStatus::Loading,
            QueryState::Failed => AuthStatus::Unauthenticated,
            QueryState::Ready(_) => AuthStatus::Authenticated,
        },
    }
}

struct MachineState {
    user: Mutex<QueryState<UserProfile>>,
    tenant: Mutex<QueryState<TenantProfile>>,
    invalidated: AtomicBool,
}

impl MachineState {
    fn new() -> Self {
        Self {
            user: Mutex::new(QueryState::Pending),
            tenant: Mutex::new(QueryState::Pending),
            invalidated: AtomicBool::new(false),
        }
    }

    fn user(&self) -> MutexGuard<'_, QueryState<UserProfile>> {
        self.user.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn tenant(&self) -> MutexGuard<'_, QueryState<TenantProfile>> {
        self.tenant.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Drop cached identity data; dependent lookups are disabled until an
    /// explicit refresh.
    fn purge(&self) {
        *self.user() = QueryState::Failed;
        *self.tenant() = QueryState::Failed;
    }
}

/// The application-facing session capability.
pub struct AuthSession {
    state: Arc<MachineState>,
    client: ApiClient,
    idle: Arc<IdleTracker>,
}

impl AuthSession {
    /// Build the machine and subscribe it to the invalidation bus. Must be
    /// called within a tokio runtime.
    ///
    /// The subscription is what lets a 401 deep inside an unrelated
    /// request degrade the whole application's auth state at once.
    pub fn new(client: ApiClient, idle: Arc<IdleTracker>, bus: &SignalBus) -> Self {
        let state = Arc::new(MachineState::new());
        spawn_signal_listener(&state, bus);
        Self {
            state,
            client,
            idle,
        }
    }

    pub fn status(&self) -> AuthStatus {
        derive_status(
            self.state.invalidated.load(Ordering::SeqCst),
            &self.state.user(),
            &self.state.tenant(),
        )
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.state.user().ready().cloned()
    }

    pub fn tenant(&self) -> Option<TenantProfile> {
        self.state.tenant().ready().cloned()
    }

    /// Clear the invalidation flag and re-run both dependent lookups.
    ///
    /// This is the only way back to `Loading`; used at startup and after
    /// external events that change server-side identity (e.g. accepting an
    /// invite) without a full restart.
    pub async fn refresh_session(&self) {
        self.state.invalidated.store(false, Ordering::SeqCst);
        self.run_lookups().await;
    }

    /// Tear the session down. Order matters: the server call goes first so
    /// the cookie is revoked before local state, leaving no window where a
    /// concurrent request could still succeed against a torn-down client.
    pub async fn logout(&self) {
        if let Err(e) = self.client.logout().await {
            debug!(error = %e, "logout call failed (ignored)");
        }
        self.state.invalidated.store(true, Ordering::SeqCst);
        self.idle.clear();
        self.state.purge();
    }

    async fn run_lookups(&self) {
        *self.state.user() = QueryState::Pending;
        *self.state.tenant() = QueryState::Pending;

        match self.client.me().await {
            Ok(user) => {
                debug!(user = %user.id, "identity lookup succeeded");
                *self.state.user() = QueryState::Ready(user);
            },
            Err(e) => {
                warn!(error = %e, "identity lookup failed");
                *self.state.user() = QueryState::Failed;
                // The tenant lookup is gated on identity; it never runs.
                *self.state.tenant() = QueryState::Failed;
                return;
            },
        }

        match self.client.tenant_me().await {
            Ok(tenant) => {
                *self.state.tenant() = QueryState::Ready(tenant);
            },
            Err(e) => {
                warn!(error = %e, "tenant lookup failed");
                *self.state.tenant() = QueryState::Failed;
            },
        }
    }
}

fn spawn_signal_listener(state: &Arc<MachineState>, bus: &SignalBus) {
    let mut rx = bus.subscribe();
    let weak = Arc::downgrade(state);
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(Signal::PrimaryInvalidated) => {
                    // Stop listening once the machine is gone.
                    let Some(state) = weak.upgrade() else { break };
                    state.invalidated.store(true, Ordering::SeqCst);
                    state.purge();
                },
                // The platform key has its own owner; nothing cached here.
                Ok(Signal::PlatformInvalidated) => {},
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "signal listener lagged");
                },
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
