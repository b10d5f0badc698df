//! One generic expiry policy evaluated per domain: idle-only for the
//! primary session, idle + absolute TTL for the platform key.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::record::CredentialRecord;

#[derive(Debug, Clone, Copy)]
pub struct ExpiryPolicy {
    /// Invalid once `now - issued_at > absolute_ttl`, regardless of
    /// activity. `None` when the absolute lifetime is server-enforced.
    pub absolute_ttl: Option<Duration>,
    /// Invalid once `now - last_activity_at > idle_timeout`.
    pub idle_timeout: Duration,
}

impl ExpiryPolicy {
    pub fn idle_only(idle_timeout: Duration) -> Self {
        Self {
            absolute_ttl: None,
            idle_timeout,
        }
    }

    pub fn with_ttl(absolute_ttl: Duration, idle_timeout: Duration) -> Self {
        Self {
            absolute_ttl: Some(absolute_ttl),
            idle_timeout,
        }
    }

    /// Evaluate a credential's metadata against both clocks.
    ///
    /// TTL is checked before idle: an over-age credential is invalid even
    /// if it was used a second ago.
    pub fn evaluate(&self, record: Option<&CredentialRecord>, now_ms: u64) -> SessionState {
        let Some(record) = record else {
            return SessionState::invalid(InvalidReason::Missing);
        };
        if let Some(ttl) = self.absolute_ttl
            && record.age_ms(now_ms) > ttl.as_millis() as u64
        {
            return SessionState::invalid(InvalidReason::Ttl);
        }
        if record.idle_for_ms(now_ms) > self.idle_timeout.as_millis() as u64 {
            return SessionState::invalid(InvalidReason::Idle);
        }
        SessionState::valid()
    }
}

/// Result of an expiry evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionState {
    pub valid: bool,
    pub reason: Option<InvalidReason>,
}

impl SessionState {
    pub fn valid() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    pub fn invalid(reason: InvalidReason) -> Self {
        Self {
            valid: false,
            reason: Some(reason),
        }
    }
}

/// Why a credential is locally invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidReason {
    Missing,
    Ttl,
    Idle,
}

/// Reason code carried to the re-authentication entry point so the login
/// screen can explain why the user landed there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReauthReason {
    Idle,
    Ttl,
    /// Produced only by server responses (account lockout), never locally.
    Locked,
    Unauthorized,
}

impl ReauthReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Ttl => "ttl",
            Self::Locked => "locked",
            Self::Unauthorized => "unauthorized",
        }
    }
}

impl From<InvalidReason> for ReauthReason {
    fn from(reason: InvalidReason) -> Self {
        match reason {
            InvalidReason::Idle => Self::Idle,
            InvalidReason::Ttl => Self::Ttl,
            InvalidReason::Missing => Self::Unauthorized,
        }
    }
}

impl std::fmt::Display for ReauthReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
