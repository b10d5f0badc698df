//! One-shot wiring of the whole session core.
//!
//! Everything mutable and shared (the refresh slot, the stores, the bus)
//! is constructed here exactly once and handed to its consumers by
//! reference, instead of living in ambient globals.

use std::{path::Path, sync::Arc};

use secrecy::SecretString;

use {
    juris_config::JurisConfig,
    juris_credentials::{
        ExpiryPolicy, FileActivityStore, IdleTracker, PlatformKeyStore, SignalBus, now_ms,
    },
    juris_transport::ApiClient,
};

use crate::{machine::AuthSession, watchdog::spawn_platform_watchdog};

/// The assembled session core. Dropping it stops the watchdog; in-flight
/// requests resolve unobserved.
pub struct SessionCore {
    pub client: ApiClient,
    pub session: AuthSession,
    pub idle: Arc<IdleTracker>,
    pub platform: Arc<PlatformKeyStore>,
    pub bus: SignalBus,
    watchdog: tokio::task::JoinHandle<()>,
}

impl SessionCore {
    /// Wire the core from configuration, using the default data directory.
    /// Must be called within a tokio runtime.
    ///
    /// `plan` is the tenant's plan slug, which may carry an idle-timeout
    /// override.
    pub fn from_config(config: &JurisConfig, plan: Option<&str>) -> anyhow::Result<Self> {
        Self::from_config_in(config, plan, &juris_config::data_dir())
    }

    /// Wire the core with an explicit data directory (tests).
    pub fn from_config_in(
        config: &JurisConfig,
        plan: Option<&str>,
        data_dir: &Path,
    ) -> anyhow::Result<Self> {
        let now = now_ms();
        let bus = SignalBus::new();

        let activity = Arc::new(FileActivityStore::new(data_dir.join("activity.json")));
        let idle = Arc::new(IdleTracker::new(
            activity,
            config.session.idle_timeout_for(plan),
            config.session.touch_throttle(),
            now,
        ));

        let platform = Arc::new(PlatformKeyStore::new(
            ExpiryPolicy::with_ttl(
                config.platform.absolute_ttl(),
                config.platform.idle_timeout(),
            ),
            data_dir.join("platform_key.json"),
        ));
        if let Some(key) = &config.platform.admin_key {
            platform.set_key(SecretString::new(key.clone()), now);
        }

        let client = ApiClient::new(
            &config.api.base_url,
            idle.clone(),
            platform.clone(),
            bus.clone(),
        )?;
        let session = AuthSession::new(client.clone(), idle.clone(), &bus);
        let watchdog =
            spawn_platform_watchdog(platform.clone(), bus.clone(), config.platform.poll_interval());

        Ok(Self {
            client,
            session,
            idle,
            platform,
            bus,
            watchdog,
        })
    }
}

impl Drop for SessionCore {
    fn drop(&mut self) {
        self.watchdog.abort();
    }
}
