//! Configuration file – reads/writes `~/.epmem/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use epmem_runtime::LogFormat;
use epmem_types::{EpmemConfig, RecordPolicy};

/// Persisted shell configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Console log format; `EPMEM_LOG_FORMAT` still wins at startup.
    #[serde(default)]
    pub log_format: LogFormat,

    /// Number of shell lines kept for the `history` command.
    #[serde(default = "default_prompt_history")]
    pub prompt_history: usize,

    /// Engine tunables.
    #[serde(default)]
    pub tunables: EpmemConfig,
}

fn default_prompt_history() -> usize {
    100
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_format: LogFormat::default(),
            prompt_history: default_prompt_history(),
            tunables: EpmemConfig::default(),
        }
    }
}

/// Return the path to `~/.epmem/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".epmem").join("config.toml")
}

/// Load the config from disk.  `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config = toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    cfg.tunables
        .validate()
        .map_err(|e| format!("Invalid tunables in {}: {}", path.display(), e))?;
    Ok(Some(cfg))
}

/// Apply `EPMEM_*` environment overrides to `cfg`.  Unparseable values are
/// ignored.
///
/// | Variable | Config field |
/// |---|---|
/// | `EPMEM_MIN_STORE_SIZE` | `tunables.min_store_size` |
/// | `EPMEM_UBIQUITY_FRACTION` | `tunables.ubiquity_fraction` |
/// | `EPMEM_UBIQUITY_FLOOR` | `tunables.ubiquity_floor` |
/// | `EPMEM_RECORD_POLICY` | `tunables.record_policy` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("EPMEM_MIN_STORE_SIZE")
        && let Ok(n) = v.trim().parse::<usize>()
    {
        cfg.tunables.min_store_size = n;
    }
    if let Ok(v) = std::env::var("EPMEM_UBIQUITY_FRACTION")
        && let Ok(f) = v.trim().parse::<f64>()
    {
        cfg.tunables.ubiquity_fraction = f;
    }
    if let Ok(v) = std::env::var("EPMEM_UBIQUITY_FLOOR")
        && let Ok(n) = v.trim().parse::<usize>()
    {
        cfg.tunables.ubiquity_floor = n;
    }
    if let Ok(v) = std::env::var("EPMEM_RECORD_POLICY")
        && let Ok(policy) = v.parse::<RecordPolicy>()
    {
        cfg.tunables.record_policy = policy;
    }
}

/// Save the config, creating `~/.epmem/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
