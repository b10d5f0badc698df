//! Process-scoped store for the elevated platform key.
//!
//! The key lives in memory only and dies with the process — an elevated
//! credential must not silently survive a restart. Older builds persisted
//! it to disk; a one-time migration imports such a legacy file and deletes
//! it.

use std::{
    path::PathBuf,
    sync::{Mutex, MutexGuard},
};

use {
    secrecy::SecretString,
    serde::Deserialize,
    tracing::{debug, warn},
};

use crate::{
    policy::{ExpiryPolicy, SessionState},
    record::CredentialRecord,
};

/// On-disk shape written by older builds. Early versions stored only the
/// key, so the timestamps are optional and healed on import.
#[derive(Debug, Deserialize)]
struct LegacyKeyFile {
    key: String,
    #[serde(default)]
    issued_at_ms: Option<u64>,
    #[serde(default)]
    last_activity_at_ms: Option<u64>,
}

struct PlatformEntry {
    secret: SecretString,
    record: CredentialRecord,
}

pub struct PlatformKeyStore {
    entry: Mutex<Option<PlatformEntry>>,
    legacy_path: PathBuf,
    policy: ExpiryPolicy,
}

impl PlatformKeyStore {
    pub fn new(policy: ExpiryPolicy, legacy_path: PathBuf) -> Self {
        Self {
            entry: Mutex::new(None),
            legacy_path,
            policy,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<PlatformEntry>> {
        self.entry.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store a freshly entered key. Resets both expiry clocks.
    pub fn set_key(&self, key: SecretString, now_ms: u64) {
        *self.lock() = Some(PlatformEntry {
            secret: key,
            record: CredentialRecord::new(now_ms),
        });
    }

    /// Snapshot of the key for attachment to a request, if one is held.
    pub fn key(&self) -> Option<SecretString> {
        self.lock().as_ref().map(|e| e.secret.clone())
    }

    pub fn record(&self) -> Option<CredentialRecord> {
        self.lock().as_ref().map(|e| e.record)
    }

    /// A request sent with this key counts as activity.
    pub fn touch(&self, now_ms: u64) {
        if let Some(entry) = self.lock().as_mut() {
            entry.record.touch(now_ms);
        }
    }

    /// Drop the key and both timestamps together.
    pub fn clear(&self) {
        *self.lock() = None;
    }

    /// Import a key left behind by older builds, deleting the legacy file.
    ///
    /// Idempotent: runs on every state check and is a no-op when nothing
    /// legacy exists. An already-held key is never overwritten.
    pub fn migrate_legacy(&self, now_ms: u64) -> anyhow::Result<bool> {
        if !self.legacy_path.exists() {
            return Ok(false);
        }
        let data = std::fs::read_to_string(&self.legacy_path)?;
        let parsed: Option<LegacyKeyFile> = match serde_json::from_str(&data) {
            Ok(f) => Some(f),
            Err(e) => {
                warn!(path = %self.legacy_path.display(), error = %e, "unreadable legacy key file, discarding");
                None
            },
        };

        let mut imported = false;
        if let Some(file) = parsed {
            let mut entry = self.lock();
            if entry.is_none() {
                let record = CredentialRecord::from_parts(
                    file.issued_at_ms,
                    file.last_activity_at_ms,
                    now_ms,
                );
                *entry = Some(PlatformEntry {
                    secret: SecretString::new(file.key),
                    record,
                });
                imported = true;
            }
        }

        // The legacy location is retired either way.
        std::fs::remove_file(&self.legacy_path)?;
        if imported {
            debug!(path = %self.legacy_path.display(), "migrated legacy platform key");
        }
        Ok(imported)
    }

    /// Run the legacy migration, then evaluate TTL + idle.
    pub fn session_state(&self, now_ms: u64) -> SessionState {
        if let Err(e) = self.migrate_legacy(now_ms) {
            warn!(error = %e, "legacy platform key migration failed");
        }
        self.policy.evaluate(self.record().as_ref(), now_ms)
    }

    pub fn policy(&self) -> ExpiryPolicy {
        self.policy
    }
}
