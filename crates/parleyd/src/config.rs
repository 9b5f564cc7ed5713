//! Server configuration.
//!
//! Values come from three layers: built-in defaults, an optional TOML file,
//! and command-line overrides (highest precedence).
//!
//! ```toml
//! bind = "0.0.0.0"
//! port = 4000
//! capacity = 25
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::registry::DEFAULT_CAPACITY;

/// Default listening port.
pub const DEFAULT_PORT: u16 = 3456;

/// Default bind address.
pub const DEFAULT_BIND: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "PARLEY_CONFIG";

/// Listening address and registry sizing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind: IpAddr,
    pub port: u16,
    /// Maximum concurrent members
    pub capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND,
            port: DEFAULT_PORT,
            capacity: DEFAULT_CAPACITY,
        }
    }
}

impl ServerConfig {
    /// Loads a config file. Keys missing from the file keep their defaults.
    ///
    /// # Errors
    ///
    /// - `ConfigError::Read` if the file cannot be read
    /// - `ConfigError::Parse` if it is not valid config TOML
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Applies command-line overrides on top of this config.
    ///
    /// A capacity of 0 is allowed; such a server turns every client away.
    pub fn with_overrides(
        mut self,
        bind: Option<IpAddr>,
        port: Option<u16>,
        capacity: Option<usize>,
    ) -> Self {
        if let Some(bind) = bind {
            self.bind = bind;
        }
        if let Some(port) = port {
            self.port = port;
        }
        if let Some(capacity) = capacity {
            self.capacity = capacity;
        }
        self
    }

    /// Returns the socket address to listen on.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {}: {error}", path.display())]
    Read { path: PathBuf, error: String },

    #[error("Failed to parse config {}: {error}", path.display())]
    Parse { path: PathBuf, error: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.socket_addr(), "127.0.0.1:3456".parse().unwrap());
        assert_eq!(config.capacity, 10);
    }

    #[test]
    fn test_load_full_file() {
        let file = write_config("bind = \"0.0.0.0\"\nport = 4000\ncapacity = 25\n");

        let config = ServerConfig::load(file.path()).unwrap();

        assert_eq!(config.socket_addr(), "0.0.0.0:4000".parse().unwrap());
        assert_eq!(config.capacity, 25);
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let file = write_config("port = 5000\n");

        let config = ServerConfig::load(file.path()).unwrap();

        assert_eq!(config.port, 5000);
        assert_eq!(config.bind, DEFAULT_BIND);
        assert_eq!(config.capacity, DEFAULT_CAPACITY);
    }

    #[test]
    fn test_load_rejects_unknown_keys() {
        let file = write_config("prot = 5000\n");

        let err = ServerConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");

        let err = ServerConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert!(err.to_string().contains("missing.toml"));
    }

    #[test]
    fn test_load_zero_capacity() {
        let file = write_config("capacity = 0\n");

        let config = ServerConfig::load(file.path()).unwrap();
        assert_eq!(config.capacity, 0);
    }

    #[test]
    fn test_overrides_take_precedence() {
        let file = write_config("port = 5000\ncapacity = 3\n");

        let config = ServerConfig::load(file.path())
            .unwrap()
            .with_overrides(None, Some(6000), None);

        assert_eq!(config.port, 6000);
        assert_eq!(config.capacity, 3);
    }
}
