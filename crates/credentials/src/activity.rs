use std::{
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use tracing::warn;

use crate::record::CredentialRecord;

/// Per-domain credential metadata store: read / write / touch / clear.
///
/// Implementations are synchronous, fallible I/O. `clear` must remove all
/// metadata atomically — there is no partial state where timestamps survive
/// a cleared credential.
pub trait CredentialStore: Send + Sync {
    fn read(&self) -> anyhow::Result<Option<CredentialRecord>>;
    fn write(&self, record: &CredentialRecord) -> anyhow::Result<()>;
    /// Update `last_activity_at_ms` only, healing a missing record.
    fn touch(&self, now_ms: u64) -> anyhow::Result<()>;
    fn clear(&self) -> anyhow::Result<()>;
}

/// JSON-file-backed store for the primary domain's idle clock.
///
/// Deliberately on disk: every window of the same user shares one idle
/// clock. The credential itself is an httpOnly cookie the client never
/// sees — only the activity metadata lives here.
#[derive(Debug, Clone)]
pub struct FileActivityStore {
    path: PathBuf,
}

impl FileActivityStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl CredentialStore for FileActivityStore {
    fn read(&self) -> anyhow::Result<Option<CredentialRecord>> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        // A corrupt file is treated as absent; the next touch rewrites it.
        match serde_json::from_str(&data) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "unreadable activity file, ignoring");
                Ok(None)
            },
        }
    }

    fn write(&self, record: &CredentialRecord) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(record)?;
        std::fs::write(&self.path, data)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }

    fn touch(&self, now_ms: u64) -> anyhow::Result<()> {
        let mut record = self
            .read()?
            .unwrap_or_else(|| CredentialRecord::new(now_ms));
        record.touch(now_ms);
        self.write(&record)
    }

    fn clear(&self) -> anyhow::Result<()> {
        // Single-file removal: all metadata goes at once.
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Answers "has this credential gone idle?" and records user activity.
///
/// Writes are throttled so high-frequency interaction events (continuous
/// pointer movement) cost at most one storage write per throttle window.
/// The idle-timeout error bound equals the throttle window.
pub struct IdleTracker {
    store: Arc<dyn CredentialStore>,
    idle_timeout: Duration,
    throttle: Duration,
    last_persist_ms: Mutex<Option<u64>>,
}

impl IdleTracker {
    /// Wrap a store. If the store holds no record yet, a baseline touch is
    /// written so `is_idle_expired` never spuriously reports true on a
    /// fresh session.
    pub fn new(
        store: Arc<dyn CredentialStore>,
        idle_timeout: Duration,
        throttle: Duration,
        now_ms: u64,
    ) -> Self {
        let mut last_persist = None;
        match store.read() {
            Ok(None) => {
                if let Err(e) = store.touch(now_ms) {
                    warn!(error = %e, "failed to seed activity baseline");
                } else {
                    last_persist = Some(now_ms);
                }
            },
            Ok(Some(_)) => {},
            Err(e) => warn!(error = %e, "failed to read activity store"),
        }
        Self {
            store,
            idle_timeout,
            throttle,
            last_persist_ms: Mutex::new(last_persist),
        }
    }

    fn last_persist(&self) -> MutexGuard<'_, Option<u64>> {
        self.last_persist_ms
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    /// Record user activity. Skipped when the previous persisted write is
    /// closer than the throttle window.
    pub fn touch(&self, now_ms: u64) {
        let mut last = self.last_persist();
        if let Some(prev) = *last
            && now_ms.saturating_sub(prev) < self.throttle.as_millis() as u64
        {
            return;
        }
        match self.store.touch(now_ms) {
            Ok(()) => *last = Some(now_ms),
            Err(e) => warn!(error = %e, "failed to persist activity"),
        }
    }

    /// Pure comparison against the configured idle timeout. Missing or
    /// unreadable metadata never denies access on its own.
    pub fn is_idle_expired(&self, now_ms: u64) -> bool {
        match self.store.read() {
            Ok(Some(record)) => record.idle_for_ms(now_ms) > self.idle_timeout.as_millis() as u64,
            Ok(None) => false,
            Err(e) => {
                warn!(error = %e, "failed to read activity store");
                false
            },
        }
    }

    /// Drop all idle metadata (logout teardown).
    pub fn clear(&self) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "failed to clear activity store");
        }
        *self.last_persist() = None;
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }
}
