#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::unwrap_used)]

//! Nodebridge Configuration
//!
//! Loads and saves the TOML file that describes:
//! - how the embedded node is started (data directory, network, Tor)
//! - logging
//! - bridge tuning such as the event channel capacity
//!
//! Missing sections and fields fall back to the defaults below, so an empty
//! file is a valid configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when loading or saving configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read or write the configuration file
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    /// Failed to parse the TOML configuration file
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    /// Failed to serialize configuration to TOML format
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    /// Configuration file was not found at the specified path
    #[error("Config file not found at: {0}")]
    NotFound(PathBuf),
    /// Could not locate the user's configuration directory
    #[error("Could not find user config directory")]
    ConfigDirUnavailable,
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Embedded node start settings
    pub node: NodeConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Bridge settings
    pub bridge: BridgeSettings,
}

/// How the embedded node process is started
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Node data directory, passed as `--lnd.lnddir`
    pub lnd_dir: PathBuf,
    /// Bitcoin network (mainnet, testnet, regtest, ...); omitted when unset
    pub network: Option<String>,
    /// Route node traffic over Tor
    pub tor_enabled: bool,
    /// Additional node flags, appended verbatim
    pub extra_args: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive (debug, info, `bridge=trace`, ...)
    pub level: String,
    /// Log file path (optional)
    pub file: Option<PathBuf>,
}

/// Bridge tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    /// Capacity of the stream event channel
    pub event_capacity: usize,
    /// Namespace used when none is given
    pub default_namespace: String,
}

impl Config {
    /// Load configuration from a TOML file at `path`
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let contents = std::fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise the defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        match Self::from_file(path) {
            Err(ConfigError::NotFound(_)) => Ok(Self::default()),
            other => other,
        }
    }

    /// Render this configuration as pretty-printed TOML
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save this configuration as a pretty-printed TOML file at `path`
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        std::fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    /// Returns the default config file path:
    /// `{config_dir()}/nodebridge/config.toml`
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let config_dir =
            dirs::config_dir().ok_or(ConfigError::ConfigDirUnavailable)?.join("nodebridge");
        Ok(config_dir.join("config.toml"))
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            lnd_dir: Self::default_lnd_dir(),
            network: None,
            tor_enabled: false,
            extra_args: Vec::new(),
        }
    }
}

impl NodeConfig {
    /// `{data_dir()}/nodebridge/lnd`, or `./lnd` without a data directory
    pub fn default_lnd_dir() -> PathBuf {
        Self::default_lnd_dir_internal(dirs::data_dir())
    }

    fn default_lnd_dir_internal(data_dir: Option<PathBuf>) -> PathBuf {
        match data_dir {
            Some(dir) => dir.join("nodebridge").join("lnd"),
            None => PathBuf::from("lnd"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self { Self { level: "info".to_string(), file: None } }
}

impl Default for BridgeSettings {
    fn default() -> Self { Self { event_capacity: 256, default_namespace: "default".to_string() } }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn test_from_file() {
        let temp_file = NamedTempFile::new().expect("Failed to create temporary file");
        let toml_content = r#"
            [node]
            lnd_dir = "/data/lnd"
            network = "testnet"
            tor_enabled = true
            extra_args = ["--debuglevel=debug"]

            [logging]
            level = "debug"
            file = "bridge.log"

            [bridge]
            event_capacity = 64
            default_namespace = "wallet-1"
        "#;
        fs::write(&temp_file, toml_content)
            .expect("Failed to write TOML content to temporary file");

        let config = Config::from_file(&temp_file).expect("Failed to load config");
        assert_eq!(config.node.lnd_dir, PathBuf::from("/data/lnd"));
        assert_eq!(config.node.network.as_deref(), Some("testnet"));
        assert!(config.node.tor_enabled);
        assert_eq!(config.node.extra_args, vec!["--debuglevel=debug".to_string()]);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.file, Some(PathBuf::from("bridge.log")));
        assert_eq!(config.bridge.event_capacity, 64);
        assert_eq!(config.bridge.default_namespace, "wallet-1");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_file = NamedTempFile::new().expect("Failed to create temporary file");
        fs::write(&temp_file, "[logging]\nlevel = \"warn\"\n").expect("Failed to write TOML");

        let config = Config::from_file(&temp_file).expect("Failed to load config");
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.bridge, BridgeSettings::default());
        assert!(!config.node.tor_enabled);
    }

    #[test]
    fn test_from_file_errors() {
        match Config::from_file("nonexistent_file.toml").expect_err("missing file") {
            ConfigError::NotFound(path) => assert_eq!(path, PathBuf::from("nonexistent_file.toml")),
            other => panic!("Expected NotFound error, got {:?}", other),
        }

        let temp_file = NamedTempFile::new().expect("Failed to create temporary file");
        fs::write(&temp_file, "invalid toml content").expect("Failed to write invalid TOML");
        match Config::from_file(&temp_file).expect_err("Expected parse error") {
            ConfigError::Parse(_) => {}
            other => panic!("Expected Parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_load_or_default() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temporary directory");
        let config = Config::load_or_default(temp_dir.path().join("absent.toml"))
            .expect("defaults for a missing file");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_round_trips() {
        let mut config = Config::default();
        config.node.network = Some("regtest".to_string());
        config.bridge.event_capacity = 16;
        let temp_file = NamedTempFile::new().expect("Failed to create temporary file");

        config.save(&temp_file).expect("save");
        let contents = fs::read_to_string(&temp_file).expect("Failed to read saved config");
        assert!(contents.contains("regtest"));
        assert_eq!(Config::from_file(&temp_file).expect("reload"), config);

        let temp_dir = tempfile::tempdir().expect("Failed to create temporary directory");
        let result = config.save(temp_dir.path().join("nonexistent").join("config.toml"));
        match result.expect_err("Expected file write error for non-existent directory") {
            ConfigError::FileRead(_) => (),
            other => panic!("Expected FileRead error, got {:?}", other),
        }
    }

    #[test]
    fn test_default_path() {
        let path = Config::default_path().expect("Failed to get default config path");
        let path_str = path.to_str().expect("Path should be valid UTF-8");
        assert!(path_str.contains("nodebridge"));
        assert!(path_str.ends_with("config.toml"));
    }

    #[test]
    fn test_default_lnd_dir_internal() {
        let dir = NodeConfig::default_lnd_dir_internal(Some(PathBuf::from("/tmp/data")));
        assert_eq!(dir, PathBuf::from("/tmp/data/nodebridge/lnd"));
        assert_eq!(NodeConfig::default_lnd_dir_internal(None), PathBuf::from("lnd"));
    }

    #[test]
    fn test_default() {
        let config = Config::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.file, None);
        assert_eq!(config.bridge.event_capacity, 256);
        assert_eq!(config.bridge.default_namespace, "default");
        assert!(config.node.extra_args.is_empty());
    }
}
