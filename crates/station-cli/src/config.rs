//! Station configuration – reads/writes `~/.station/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Persisted station settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Address the request listener binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Address of the mobile platform's radio link.
    #[serde(default = "default_platform_addr")]
    pub platform_addr: String,

    /// JSON file holding the slot table.
    #[serde(default = "default_inventory_file")]
    pub inventory_file: PathBuf,

    /// Silence tolerated before the platform is considered disconnected.
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,

    /// Drive an in-process simulated platform instead of dialling
    /// `platform_addr`.
    #[serde(default)]
    pub simulate: bool,
}

fn default_listen_addr() -> String {
    "0.0.0.0:7070".to_string()
}
fn default_platform_addr() -> String {
    "127.0.0.1:7071".to_string()
}
fn default_inventory_file() -> PathBuf {
    station_dir_for_home(&home_dir()).join("inventory.json")
}
fn default_heartbeat_timeout_ms() -> u64 {
    2000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            platform_addr: default_platform_addr(),
            inventory_file: default_inventory_file(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            simulate: false,
        }
    }
}

impl Config {
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }
}

fn home_dir() -> String {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string())
}

fn station_dir_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".station")
}

/// Return the path to `~/.station/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(&home_dir())
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    station_dir_for_home(home).join("config.toml")
}

/// Load the config from `path`, with environment overrides applied.
/// Returns `None` if the file does not exist.
pub fn load_from(path: &Path) -> Result<Option<Config>, String> {
    let mut cfg = read_from(path)?;
    if let Some(cfg) = cfg.as_mut() {
        apply_env_overrides(cfg);
    }
    Ok(cfg)
}

/// Parse the file at `path` as-is.
pub(crate) fn read_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    if cfg.heartbeat_timeout_ms == 0 {
        return Err("Invalid config: heartbeat_timeout_ms must be greater than 0".to_string());
    }
    Ok(Some(cfg))
}

/// Apply `STATION_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `STATION_LISTEN_ADDR` | `listen_addr` |
/// | `STATION_PLATFORM_ADDR` | `platform_addr` |
/// | `STATION_INVENTORY_FILE` | `inventory_file` |
/// | `STATION_HEARTBEAT_TIMEOUT_MS` | `heartbeat_timeout_ms` |
/// | `STATION_SIMULATE` | `simulate` (`true`/`false`/`1`/`0`) |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("STATION_LISTEN_ADDR") {
        cfg.listen_addr = v;
    }
    if let Ok(v) = std::env::var("STATION_PLATFORM_ADDR") {
        cfg.platform_addr = v;
    }
    if let Ok(v) = std::env::var("STATION_INVENTORY_FILE") {
        cfg.inventory_file = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("STATION_HEARTBEAT_TIMEOUT_MS")
        && let Ok(ms) = v.trim().parse::<u64>()
        && ms > 0
    {
        cfg.heartbeat_timeout_ms = ms;
    }
    if let Ok(v) = std::env::var("STATION_SIMULATE")
        && let Some(flag) = parse_flag(&v)
    {
        cfg.simulate = flag;
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Save the config to `path`, creating its directory if necessary.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))
}
