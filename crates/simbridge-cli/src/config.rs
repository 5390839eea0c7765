//! Node configuration – reads/writes `~/.simbridge/config.toml`.
//!
//! ```toml
//! bridge_addr = "127.0.0.1:9090"
//!
//! [node]
//! node_name = "simulation_wrapper_node"
//! rate_hz = 30.0
//!
//! [simulator]
//! map_name = "loop_empty"
//! seed = 123
//! ```
//!
//! Every key is optional; a missing file means all defaults.

use serde::{Deserialize, Serialize};
use simbridge_hal::SimulatorConfig;
use simbridge_runtime::NodeConfig;
use simbridge_types::BridgeError;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Everything the `simbridge` binary needs to start a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Listen address of the WebSocket bridge.
    #[serde(default = "default_bridge_addr")]
    pub bridge_addr: String,

    #[serde(default)]
    pub node: NodeConfig,

    #[serde(default)]
    pub simulator: SimulatorConfig,
}

fn default_bridge_addr() -> String {
    "127.0.0.1:9090".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bridge_addr: default_bridge_addr(),
            node: NodeConfig::default(),
            simulator: SimulatorConfig::default(),
        }
    }
}

impl Config {
    /// Validate every section.
    ///
    /// # Errors
    ///
    /// The first [`BridgeError::Config`] found.
    pub fn validate(&self) -> Result<(), BridgeError> {
        self.bridge_socket_addr()?;
        self.node.validate()?;
        self.simulator.validate()
    }

    /// The parsed bridge listen address.
    pub fn bridge_socket_addr(&self) -> Result<SocketAddr, BridgeError> {
        self.bridge_addr.parse().map_err(|e| {
            BridgeError::Config(format!("bridge_addr {:?}: {e}", self.bridge_addr))
        })
    }
}

/// Return the path to `~/.simbridge/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".simbridge").join("config.toml")
}

/// Load `path`, falling back to defaults when the file does not exist, then
/// apply `SIMBRIDGE_*` overrides from the process environment.
pub fn load_from(path: &Path) -> Result<Config, String> {
    let mut cfg = read_file(path)?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// `None` when `path` does not exist.
pub(crate) fn read_file(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    toml::from_str(&raw)
        .map(Some)
        .map_err(|e| format!("Failed to parse {}: {}", path.display(), e))
}

/// Apply `SIMBRIDGE_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `SIMBRIDGE_NODE_NAME` | `node.node_name` |
/// | `SIMBRIDGE_MAP` | `simulator.map_name` |
/// | `SIMBRIDGE_SEED` | `simulator.seed` |
/// | `SIMBRIDGE_RATE_HZ` | `node.rate_hz` |
/// | `SIMBRIDGE_BRIDGE_ADDR` | `bridge_addr` |
///
/// Numeric values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    apply_overrides(cfg, |key| std::env::var(key).ok());
}

pub(crate) fn apply_overrides(cfg: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("SIMBRIDGE_NODE_NAME") {
        cfg.node.node_name = v;
    }
    if let Some(v) = var("SIMBRIDGE_MAP") {
        cfg.simulator.map_name = v;
    }
    if let Some(v) = var("SIMBRIDGE_SEED")
        && let Ok(seed) = v.trim().parse::<u64>()
    {
        cfg.simulator.seed = seed;
    }
    if let Some(v) = var("SIMBRIDGE_RATE_HZ")
        && let Ok(hz) = v.trim().parse::<f64>()
    {
        cfg.node.rate_hz = hz;
    }
    if let Some(v) = var("SIMBRIDGE_BRIDGE_ADDR") {
        cfg.bridge_addr = v;
    }
}

/// Write `cfg` to `path`, creating the parent directory if necessary.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_validate() {
        let cfg = Config::default();
        cfg.validate().expect("defaults must validate");
        assert_eq!(cfg.bridge_socket_addr().unwrap().port(), 9090);
    }

    #[test]
    fn roundtrip_through_disk() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let mut cfg = Config::default();
        cfg.simulator.map_name = "small_loop".into();
        cfg.node.jpeg_quality = 80;
        save_to(&cfg, &path).expect("save");

        let loaded = read_file(&path).expect("load ok").expect("some");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn missing_file_reads_as_none() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(read_file(&path).expect("no error").is_none());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "[simulator]\nseed = 7\n").unwrap();

        let cfg = read_file(&path).unwrap().unwrap();
        assert_eq!(cfg.simulator.seed, 7);
        assert_eq!(cfg.simulator.map_name, "loop_empty");
        assert_eq!(cfg.node, NodeConfig::default());
        assert_eq!(cfg.bridge_addr, "127.0.0.1:9090");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[node\nrate_hz = ").unwrap();
        assert!(read_file(&path).is_err());
    }

    #[test]
    fn config_path_points_to_simbridge_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".simbridge"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn overrides_apply_to_every_section() {
        let mut cfg = Config::default();
        apply_overrides(
            &mut cfg,
            vars(&[
                ("SIMBRIDGE_NODE_NAME", "duckie"),
                ("SIMBRIDGE_MAP", "straight_road"),
                ("SIMBRIDGE_SEED", "42"),
                ("SIMBRIDGE_RATE_HZ", "15"),
                ("SIMBRIDGE_BRIDGE_ADDR", "0.0.0.0:9191"),
            ]),
        );
        assert_eq!(cfg.node.node_name, "duckie");
        assert_eq!(cfg.simulator.map_name, "straight_road");
        assert_eq!(cfg.simulator.seed, 42);
        assert_eq!(cfg.node.rate_hz, 15.0);
        assert_eq!(cfg.bridge_addr, "0.0.0.0:9191");
        cfg.validate().expect("overridden config is valid");
    }

    #[test]
    fn invalid_numeric_overrides_are_ignored() {
        let mut cfg = Config::default();
        apply_overrides(
            &mut cfg,
            vars(&[("SIMBRIDGE_SEED", "many"), ("SIMBRIDGE_RATE_HZ", "fast")]),
        );
        assert_eq!(cfg.simulator.seed, 123);
        assert_eq!(cfg.node.rate_hz, 30.0);
    }

    #[test]
    fn validation_catches_each_section() {
        let mut cfg = Config::default();
        cfg.bridge_addr = "not an address".into();
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.node.rate_hz = -1.0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.simulator.map_name = "atlantis".into();
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.simulator.camera_width = 0;
        assert!(cfg.validate().is_err());
    }
}
