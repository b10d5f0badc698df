use std::{
    path::{Path, PathBuf},
    sync::Mutex,
};

use tracing::{debug, warn};

use crate::schema::JurisConfig;

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["juris.toml", "juris.json"];

/// Override for the config directory, set via `set_config_dir()`.
static CONFIG_DIR_OVERRIDE: Mutex<Option<PathBuf>> = Mutex::new(None);

fn lock_override() -> std::sync::MutexGuard<'static, Option<PathBuf>> {
    CONFIG_DIR_OVERRIDE
        .lock()
        .unwrap_or_else(|e| e.into_inner())
}

/// Set a custom config directory. When set, discovery only looks in this
/// directory — project-local and user-global paths are skipped. Each call
/// replaces the previous override (tests rely on this).
pub fn set_config_dir(path: PathBuf) {
    *lock_override() = Some(path);
}

/// Clear the config directory override, restoring default discovery.
pub fn clear_config_dir() {
    *lock_override() = None;
}

/// Load config from the given path (TOML or JSON by extension).
pub fn load_config(path: &Path) -> anyhow::Result<JurisConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");
    let cfg = match ext {
        "toml" => toml::from_str(&raw)?,
        "json" => serde_json::from_str(&raw)?,
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    };
    Ok(cfg)
}

/// Discover and load config from standard locations, then apply env
/// overrides.
///
/// Search order:
/// 1. `./juris.{toml,json}` (project-local)
/// 2. `~/.config/juris/juris.{toml,json}` (user-global)
///
/// Returns `JurisConfig::default()` (plus env overrides) if no config file
/// is found or the file fails to parse.
pub fn discover_and_load() -> JurisConfig {
    let mut cfg = match find_config_file() {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            match load_config(&path) {
                Ok(cfg) => cfg,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
                    JurisConfig::default()
                },
            }
        },
        None => {
            debug!("no config file found, using defaults");
            JurisConfig::default()
        },
    };
    apply_env_overrides(&mut cfg);
    cfg
}

/// Env vars win over file values for the fields deployments most often
/// inject at runtime.
fn apply_env_overrides(cfg: &mut JurisConfig) {
    if let Ok(v) = std::env::var("JURIS_API_BASE_URL")
        && !v.is_empty()
    {
        cfg.api.base_url = v;
    }
    if let Ok(v) = std::env::var("JURIS_PLATFORM_ADMIN_KEY")
        && !v.is_empty()
    {
        cfg.platform.admin_key = Some(v);
    }
}

fn find_config_file() -> Option<PathBuf> {
    if let Some(dir) = lock_override().clone() {
        for name in CONFIG_FILENAMES {
            let p = dir.join(name);
            if p.exists() {
                return Some(p);
            }
        }
        // Override is set — don't fall through to other locations.
        return None;
    }

    // Project-local
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    // User-global: ~/.config/juris/
    if let Some(dir) = home_dir().map(|h| h.join(".config").join("juris")) {
        for name in CONFIG_FILENAMES {
            let p = dir.join(name);
            if p.exists() {
                return Some(p);
            }
        }
    }

    None
}

/// Data directory for persisted client state (activity clocks, legacy key
/// files): `~/.juris/`.
pub fn data_dir() -> PathBuf {
    home_dir()
        .map(|h| h.join(".juris"))
        .unwrap_or_else(|| PathBuf::from(".juris"))
}

fn home_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
}
