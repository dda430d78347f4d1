// crates/clace-server/src/logging.rs
// ============================================================================
// Module: Logging Bootstrap
// Description: Initializes `tracing_subscriber` from `LoggingConfig`.
// Purpose: One place to flip between human-readable and JSON log lines.
// Dependencies: tracing-subscriber, clace-config
// ============================================================================

use clace_config::LoggingConfig;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

/// Installs the global tracing subscriber. Safe to call once per process;
/// a second call is a silent no-op (the underlying `try_init` error is
/// swallowed since tests may install a subscriber ahead of this call).
pub fn init(config: &LoggingConfig) {
    let filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter);
    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if let Err(err) = result {
        #[allow(clippy::print_stderr, reason = "no subscriber is installed yet to log this through")]
        {
            eprintln!("logging already initialized: {err}");
        }
    }
}
