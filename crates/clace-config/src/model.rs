// crates/clace-config/src/model.rs
// ============================================================================
// Module: Config Model
// Description: The `ServerConfig` schema (spec.md §6.4) and its TOML +
//              defaults + env-substitution loading pipeline.
// Purpose: Give every other crate one validated, already-substituted
//          config value instead of raw TOML.
// Dependencies: serde, toml, thiserror, clace-core
// ============================================================================

use std::collections::BTreeMap;
use std::path::Path;

use clace_core::ClaceError;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::substitute::substitute_env;

/// Config loading/validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read from disk.
    #[error("reading config file {path}: {source}")]
    Read {
        /// Path that failed to read.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The config file's TOML failed to parse.
    #[error("parsing config file {path}: {source}")]
    Parse {
        /// Path that failed to parse.
        path: String,
        /// Underlying TOML error.
        source: toml::de::Error,
    },
    /// A loaded value failed a structural check this type can't express.
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl From<ConfigError> for ClaceError {
    fn from(err: ConfigError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

/// Plaintext HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Listener host; `"0.0.0.0"` to bind every interface.
    pub host: String,
    /// Listener port, `0` to disable the plaintext listener.
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 25_222,
        }
    }
}

/// TLS listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpsConfig {
    /// Listener host; empty disables the TLS listener.
    pub host: String,
    /// Listener port.
    pub port: u16,
    /// PEM certificate chain path.
    pub cert_file: String,
    /// PEM private key path.
    pub key_file: String,
}

impl Default for HttpsConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 25_223,
            cert_file: String::new(),
            key_file: String::new(),
        }
    }
}

/// Authentication and admin-credential settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// bcrypt hash of the admin password; empty disables admin auth
    /// (only ever appropriate for local dev, never production).
    pub admin_password_hash: String,
    /// Admin username presented over HTTP Basic Auth.
    pub admin_user: String,
    /// Skip TLS certificate verification on outbound git/webhook calls.
    pub skip_cert_check: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            admin_password_hash: String::new(),
            admin_user: "admin".to_string(),
            skip_cert_check: false,
        }
    }
}

/// Structured logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, e.g. `"info"`.
    pub level: String,
    /// Emit JSON lines instead of human-readable text.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Metadata store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// Path to the `SQLite` database file.
    pub db_file: String,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            db_file: "clace.db".to_string(),
        }
    }
}

/// Miscellaneous system-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Root directory apps are checked out under.
    pub app_store_dir: String,
    /// Days an `http`-kind audit log entry is retained.
    pub http_audit_retention_days: u32,
    /// Days a non-`http`-kind audit log entry is retained.
    pub other_audit_retention_days: u32,
    /// Domain bucket consulted when a request's `Host` matches no
    /// configured app domain and no empty-domain catch-all fits.
    pub default_domain: String,
    /// Default sync schedule frequency, in minutes, for sync entries
    /// created without an explicit `schedule_frequency_min`.
    pub default_schedule_mins: u32,
    /// Consecutive sync-apply failures tolerated before a sync entry is
    /// auto-disabled.
    pub max_sync_failure_count: u32,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            app_store_dir: "run".to_string(),
            http_audit_retention_days: 30,
            other_audit_retention_days: 180,
            default_domain: String::new(),
            default_schedule_mins: 60,
            max_sync_failure_count: 5,
        }
    }
}

/// Per-plugin configuration table keyed by plugin name, e.g.
/// `[plugin."disk.in"]`.
pub type PluginConfig = BTreeMap<String, toml::Value>;

/// Fully assembled, environment-substituted server configuration
/// (spec.md §6.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// `[http]` section.
    pub http: HttpConfig,
    /// `[https]` section.
    pub https: HttpsConfig,
    /// `[security]` section.
    pub security: SecurityConfig,
    /// `[logging]` section.
    pub logging: LoggingConfig,
    /// `[metadata]` section.
    pub metadata: MetadataConfig,
    /// `[system]` section.
    pub system: SystemConfig,
    /// `[plugin."<name>"]` sections, verbatim per-plugin TOML tables.
    pub plugin: BTreeMap<String, PluginConfig>,
    /// `[app_config]`, a flat string-keyed table merged into every new
    /// app's `Metadata.app_config` at creation time.
    pub app_config: BTreeMap<String, String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            https: HttpsConfig::default(),
            security: SecurityConfig::default(),
            logging: LoggingConfig::default(),
            metadata: MetadataConfig::default(),
            system: SystemConfig::default(),
            plugin: BTreeMap::new(),
            app_config: BTreeMap::new(),
        }
    }
}

impl ServerConfig {
    /// Loads config from `path` if given, falling back to built-in
    /// defaults, then substitutes `${VAR}`/`$VAR` references in every
    /// string field against the process environment.
    ///
    /// # Errors
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`] if `path`
    /// is given but cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                })?;
                let substituted = substitute_env(&raw);
                toml::from_str::<Self>(&substituted).map_err(|source| ConfigError::Parse {
                    path: path.display().to_string(),
                    source,
                })?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Structural checks `serde`'s field-level deserialization can't
    /// express.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] if the https section is partially
    /// configured (host without files, or vice versa).
    pub fn validate(&self) -> Result<(), ConfigError> {
        let https_enabled = !self.https.host.is_empty();
        let has_files = !self.https.cert_file.is_empty() && !self.https.key_file.is_empty();
        if https_enabled && !has_files {
            return Err(ConfigError::Invalid(
                "https.host is set but cert_file/key_file are not".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::ServerConfig;

    #[test]
    fn defaults_are_internally_consistent() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.http.port, 25_222);
    }

    #[test]
    fn loads_overrides_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[metadata]\ndb_file = \"/var/lib/clace/clace.db\"").unwrap();
        let config = ServerConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.metadata.db_file, "/var/lib/clace/clace.db");
    }

    #[test]
    fn https_host_without_cert_files_is_rejected() {
        let mut config = ServerConfig::default();
        config.https.host = "0.0.0.0".to_string();
        assert!(config.validate().is_err());
    }
}
