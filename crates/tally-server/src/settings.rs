//! Runtime server configuration.
//!
//! Layered with the `config` crate: built-in defaults, then an optional TOML
//! file, then `TALLY_*` environment variables.

use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

/// Deserialised from `config.toml` and the environment.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ServerConfig {
  pub host:       String,
  pub port:       u16,
  pub store_path: PathBuf,
}

impl ServerConfig {
  /// Load from `path` (which need not exist) and the environment.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    Self::builder()?
      .add_source(File::from(path).required(false))
      .add_source(Environment::with_prefix("TALLY"))
      .build()?
      .try_deserialize()
  }

  fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
    Config::builder()
      .set_default("host", "127.0.0.1")?
      .set_default("port", 3000)?
      .set_default("store_path", "tally.sqlite3")
  }

  /// Parse a TOML document layered over the defaults.
  pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
    Self::builder()?
      .add_source(File::from_str(toml, FileFormat::Toml))
      .build()?
      .try_deserialize()
  }

  /// `store_path` with a leading `~/` expanded to the user's home directory.
  pub fn resolved_store_path(&self) -> PathBuf {
    let s = self.store_path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/")
      && let Ok(home) = std::env::var("HOME")
    {
      return PathBuf::from(home).join(rest);
    }
    self.store_path.clone()
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_apply_when_file_is_empty() {
    let cfg = ServerConfig::from_toml("").unwrap();
    assert_eq!(cfg.address(), "127.0.0.1:3000");
    assert_eq!(cfg.store_path, PathBuf::from("tally.sqlite3"));
  }

  #[test]
  fn file_values_override_defaults() {
    let cfg = ServerConfig::from_toml("port = 8080\nstore_path = \"/var/lib/tally.db\"").unwrap();
    assert_eq!(cfg.port, 8080);
    assert_eq!(cfg.host, "127.0.0.1");
    assert_eq!(cfg.resolved_store_path(), PathBuf::from("/var/lib/tally.db"));
  }

  #[test]
  fn invalid_port_is_rejected() {
    assert!(ServerConfig::from_toml("port = \"eighty\"").is_err());
  }
}
