// crates/clace-config/src/lib.rs
// ============================================================================
// Module: Clace Server Config
// Description: TOML configuration loading, defaults layering, and
//              `${VAR}`/`$VAR` environment substitution (spec.md §6.4).
// Purpose: Produce one validated `ServerConfig` from an optional config
//          file, environment overrides, and built-in defaults.
// Dependencies: clace-core, serde, toml, thiserror
// ============================================================================

//! ## Overview
//! Config sources layer in this order, later wins: built-in defaults (see
//! `ServerConfig::default`), then the TOML file given on the CLI or found
//! at the default search path, then environment variable substitution
//! inside string values via [`substitute_env`]. No layer partially
//! applies: a malformed file is a startup error, not a skipped layer.
//!
//! Security posture: `admin_password_hash` is the only credential this
//! crate reads; it never reads a cleartext password from a config file at
//! rest. `clace password` (the CLI) is the only place a cleartext
//! password is typed.

/// Config data model and validation.
pub mod model;
/// Environment-variable substitution for config string values.
pub mod substitute;

pub use model::ConfigError;
pub use model::HttpConfig;
pub use model::HttpsConfig;
pub use model::LoggingConfig;
pub use model::MetadataConfig;
pub use model::SecurityConfig;
pub use model::ServerConfig;
pub use model::SystemConfig;
pub use substitute::substitute_env;
