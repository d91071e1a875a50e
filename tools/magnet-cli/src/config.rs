//! Configuration management (config.toml)
//!
//! Settings live in the platform config directory. A missing or broken file
//! falls back to defaults; command line flags override whatever is loaded.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use magnet_shared::constants::{DEFAULT_DIRECT_PORT, DEFAULT_HANDSHAKER_PORT};
use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "config.toml";

/// CLI configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub net: NetConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Display name sent to the handshaker and the peer (default: player)
    #[serde(default = "default_name")]
    pub name: String,
}

/// Network settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetConfig {
    /// Handshaker address (default: localhost:20219)
    #[serde(default = "default_handshaker")]
    pub handshaker: String,
    /// Port a direct host listens on (default: 20220)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Heartbeat interval once connected (default: 100 ms)
    #[serde(default = "default_sync_rate_ms")]
    pub sync_rate_ms: u64,
    /// Silence after which the peer is flagged disconnected (default: 1000 ms)
    #[serde(default = "default_disconnect_after_ms")]
    pub disconnect_after_ms: u64,
    /// Time spent disconnected before giving up (default: 5000 ms)
    #[serde(default = "default_close_after_ms")]
    pub close_after_ms: u64,
}

fn default_name() -> String {
    "player".to_string()
}
fn default_handshaker() -> String {
    format!("localhost:{}", DEFAULT_HANDSHAKER_PORT)
}
fn default_port() -> u16 {
    DEFAULT_DIRECT_PORT
}
fn default_sync_rate_ms() -> u64 {
    100
}
fn default_disconnect_after_ms() -> u64 {
    1000
}
// 300 frames at 60 Hz
fn default_close_after_ms() -> u64 {
    5000
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
        }
    }
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            handshaker: default_handshaker(),
            port: default_port(),
            sync_rate_ms: default_sync_rate_ms(),
            disconnect_after_ms: default_disconnect_after_ms(),
            close_after_ms: default_close_after_ms(),
        }
    }
}

impl NetConfig {
    pub fn sync_rate(&self) -> Duration {
        Duration::from_millis(self.sync_rate_ms)
    }

    pub fn disconnect_after(&self) -> Duration {
        Duration::from_millis(self.disconnect_after_ms)
    }

    pub fn close_after(&self) -> Duration {
        Duration::from_millis(self.close_after_ms)
    }

    /// Bind address for `magnet host` when none is given
    pub fn host_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

/// Returns the platform-specific configuration directory.
///
/// On Linux: `~/.config/magnet`
///
/// Returns `None` if the home directory cannot be determined.
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("io.magnet", "", "magnet")
        .map(|dirs| dirs.config_dir().to_path_buf())
}

pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join(CONFIG_FILE))
}

/// Loads the configuration from the platform config directory.
pub fn load() -> Config {
    config_path().map(|path| load_from(&path)).unwrap_or_default()
}

/// Loads a config file, using defaults if it is missing or cannot be parsed.
pub fn load_from(path: &Path) -> Config {
    let Ok(content) = std::fs::read_to_string(path) else {
        return Config::default();
    };
    match toml::from_str(&content) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Ignoring unparsable config");
            Config::default()
        }
    }
}

/// Saves the configuration to the platform config directory.
///
/// Returns the path written, or `None` when there is no home directory.
pub fn save(config: &Config) -> io::Result<Option<PathBuf>> {
    let Some(path) = config_path() else {
        return Ok(None);
    };
    save_to(config, &path)?;
    Ok(Some(path))
}

/// Writes a config file, creating its directory if needed.
pub fn save_to(config: &Config, path: &Path) -> io::Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let content = toml::to_string_pretty(config).map_err(io::Error::other)?;
    std::fs::write(path, content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.player.name, "player");
        assert_eq!(config.net.handshaker, "localhost:20219");
        assert_eq!(config.net.port, 20220);
        assert_eq!(config.net.host_addr(), "0.0.0.0:20220");
        assert_eq!(config.net.close_after(), Duration::from_secs(5));
    }

    #[test]
    fn test_config_deserialize_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_config_deserialize_partial_net() {
        let toml_str = r#"
[net]
handshaker = "magnet.example.net:4000"
sync_rate_ms = 50
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.net.handshaker, "magnet.example.net:4000");
        assert_eq!(config.net.sync_rate(), Duration::from_millis(50));
        assert_eq!(config.net.port, 20220); // default
        assert_eq!(config.player.name, "player"); // default
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.player.name = "alice".to_string();
        config.net.disconnect_after_ms = 250;

        save_to(&config, &path).unwrap();
        assert_eq!(load_from(&path), config);
    }

    #[test]
    fn test_load_missing_or_broken_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        assert_eq!(load_from(&path), Config::default());

        std::fs::write(&path, "[net\nport = ").unwrap();
        assert_eq!(load_from(&path), Config::default());
    }
}
