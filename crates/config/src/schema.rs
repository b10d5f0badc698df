//! Config schema for the session/credential coordination core.
//!
//! Only the sections this core consumes are modelled here; the rest of the
//! application configures itself independently.

use std::{collections::HashMap, time::Duration};

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JurisConfig {
    pub api: ApiConfig,
    pub session: SessionConfig,
    pub platform: PlatformConfig,
}

/// Backend API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL all endpoint paths are joined onto, without a trailing slash.
    pub base_url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api/v1".into(),
        }
    }
}

/// Primary-session policy. The primary credential is a server-managed
/// cookie; the only client-side clock is the idle timeout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Idle timeout in minutes when the tenant's plan has no override.
    pub idle_timeout_minutes: u64,

    /// Per-plan-tier idle timeout overrides, keyed by plan slug.
    pub plan_idle_timeout_minutes: HashMap<String, u64>,

    /// Minimum seconds between persisted activity writes.
    pub touch_throttle_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_minutes: 480,
            plan_idle_timeout_minutes: HashMap::new(),
            touch_throttle_secs: 5,
        }
    }
}

impl SessionConfig {
    /// Idle timeout for a plan tier, falling back to the default.
    pub fn idle_timeout_for(&self, plan: Option<&str>) -> Duration {
        let minutes = plan
            .and_then(|p| self.plan_idle_timeout_minutes.get(p).copied())
            .unwrap_or(self.idle_timeout_minutes);
        Duration::from_secs(minutes * 60)
    }

    pub fn touch_throttle(&self) -> Duration {
        Duration::from_secs(self.touch_throttle_secs)
    }
}

/// Elevated (operator) credential policy. Unlike the primary session, the
/// platform key has both an absolute TTL and an idle timeout, enforced
/// locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Optional pre-provisioned key (normally entered at the operator login
    /// screen; env var `JURIS_PLATFORM_ADMIN_KEY` takes precedence).
    pub admin_key: Option<String>,

    pub idle_timeout_minutes: u64,
    pub absolute_ttl_hours: u64,

    /// How often the watchdog re-evaluates the key's expiry state.
    pub poll_interval_secs: u64,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            admin_key: None,
            idle_timeout_minutes: 30,
            absolute_ttl_hours: 8,
            poll_interval_secs: 30,
        }
    }
}

impl PlatformConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_minutes * 60)
    }

    pub fn absolute_ttl(&self) -> Duration {
        Duration::from_secs(self.absolute_ttl_hours * 3600)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}
