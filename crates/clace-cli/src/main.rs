// crates/clace-cli/src/main.rs
// ============================================================================
// Module: Clace CLI
// Description: clap-derive client for the control API, plus a local
//              `server start` that boots the embedded HTTP front in this
//              process (spec.md §6.5).
// Purpose: Give operators one binary for both running a server and
//          driving its control API.
// Dependencies: clap, reqwest, tokio, clace-server, clace-config,
//               clace-registry, clace-store-sqlite, clace-core
// ============================================================================

//! clap-derive client for the control API, plus a local `server start`
//! that boots the embedded HTTP front in this process (spec.md §6.5).

mod client;
mod commands;

use std::process::ExitCode;

use clap::Parser;
use commands::Cli;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(err) => {
            report_error(&format!("starting async runtime: {err}"));
            return ExitCode::FAILURE;
        }
    };
    match runtime.block_on(commands::run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_error(&err.to_string());
            ExitCode::FAILURE
        }
    }
}

fn report_error(message: &str) {
    eprint_line(&format!("error: {message}"));
}

#[allow(clippy::print_stderr, reason = "CLI error reporting is the intended use of stderr here")]
fn eprint_line(line: &str) {
    eprintln!("{line}");
}
