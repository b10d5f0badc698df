use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// The two independent credential domains. They never share storage keys,
/// timers, or policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialDomain {
    /// Regular end-user session (server-managed httpOnly cookie).
    Primary,
    /// Elevated operator key sent as an explicit header.
    Platform,
}

impl CredentialDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Platform => "platform",
        }
    }
}

impl std::fmt::Display for CredentialDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current wall-clock time in unix milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Expiry metadata for one credential domain.
///
/// Invariant: `last_activity_at_ms >= issued_at_ms`. Construction heals
/// missing or inverted metadata instead of denying access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub issued_at_ms: u64,
    #[serde(default)]
    pub last_activity_at_ms: u64,
}

impl CredentialRecord {
    /// A record for a credential (re)established now.
    pub fn new(now_ms: u64) -> Self {
        Self {
            issued_at_ms: now_ms,
            last_activity_at_ms: now_ms,
        }
    }

    /// Rebuild a record from possibly-missing stored metadata. Missing
    /// fields are initialized to `now_ms` so stale storage never locks a
    /// user out on its own.
    pub fn from_parts(issued: Option<u64>, last_activity: Option<u64>, now_ms: u64) -> Self {
        let issued_at_ms = issued.unwrap_or(now_ms);
        let last_activity_at_ms = last_activity.unwrap_or(issued_at_ms).max(issued_at_ms);
        Self {
            issued_at_ms,
            last_activity_at_ms,
        }
    }

    /// Record activity. Never moves the activity clock backwards.
    pub fn touch(&mut self, now_ms: u64) {
        if now_ms > self.last_activity_at_ms {
            self.last_activity_at_ms = now_ms;
        }
    }

    pub fn idle_for_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_activity_at_ms)
    }

    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.issued_at_ms)
    }
}
