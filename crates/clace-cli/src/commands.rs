// crates/clace-cli/src/commands.rs
// ============================================================================
// Module: CLI Commands
// Description: clap-derive subcommand tree and its dispatch (spec.md §6.5).
// Purpose: Translate a parsed command line into a control-API call or, for
//          `server start`, an in-process server boot.
// Dependencies: clap, serde_json, clace-server, clace-config,
//               clace-registry, clace-store-sqlite, clace-core
// ============================================================================

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use clap::Subcommand;
use clace_config::ServerConfig;
use clace_registry::Registry;
use clace_server::AppState;
use clace_store_sqlite::MetadataStore;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::client::Client;
use crate::client::ClientConfig;
use crate::client::ClientError;

/// Dry-run banner printed on the CLI side whenever a command that
/// accepted `--dry-run` actually ran in that mode.
const DRY_RUN_BANNER: &str = "*** dry-run mode, changes have NOT been committed. ***";

/// Command-line errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// The control API client reported an error.
    #[error(transparent)]
    Client(#[from] ClientError),
    /// Loading the server config failed.
    #[error(transparent)]
    Config(#[from] clace_config::ConfigError),
    /// The embedded store or registry failed to start.
    #[error("server startup failed: {0}")]
    Startup(String),
    /// A filesystem or listener I/O operation failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Clace: a multi-tenant application server.
#[derive(Debug, Parser)]
#[command(name = "clace", version)]
pub struct Cli {
    /// Path to a TOML config file.
    #[arg(short = 'c', long = "config-file", global = true)]
    pub config_file: Option<PathBuf>,
    /// Control API base URI for client commands.
    #[arg(short = 's', long = "server-uri", global = true, default_value = "https://localhost:25223")]
    pub server_uri: String,
    /// Admin Basic Auth username.
    #[arg(short = 'u', long = "admin-user", global = true, default_value = "admin")]
    pub admin_user: String,
    /// Admin Basic Auth password.
    #[arg(short = 'w', long = "admin-password", global = true, default_value = "")]
    pub admin_password: String,
    /// Skip TLS certificate verification.
    #[arg(short = 'k', long = "skip-cert-check", global = true)]
    pub skip_cert_check: bool,
    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Top-level subcommands.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Start or stop the embedded HTTP front.
    Server {
        /// Server lifecycle action.
        #[command(subcommand)]
        action: ServerAction,
    },
    /// App lifecycle operations.
    App {
        /// App lifecycle action.
        #[command(subcommand)]
        action: AppAction,
    },
    /// Version history operations.
    Version {
        /// Version action.
        #[command(subcommand)]
        action: VersionAction,
    },
    /// Preview variant operations.
    Preview {
        /// Preview action.
        #[command(subcommand)]
        action: PreviewAction,
    },
    /// App webhook token operations.
    AppWebhook {
        /// App webhook action.
        #[command(subcommand)]
        action: AppWebhookAction,
    },
    /// Sync entry operations.
    Sync {
        /// Sync action.
        #[command(subcommand)]
        action: SyncAction,
    },
    /// Runs the apply engine against a declared-apps file.
    Apply {
        /// Path to the apply file's TOML text, read from disk.
        file: PathBuf,
        /// Compute decisions without committing them.
        #[arg(long)]
        dry_run: bool,
        /// Overwrite fields that drifted out of band since the last apply.
        #[arg(long)]
        clobber: bool,
        /// Auto-approve any new loads/permissions declared apps introduce.
        #[arg(long)]
        approve: bool,
    },
    /// Prints a bcrypt hash for a password, for `security.admin_password_hash`.
    Password {
        /// Plaintext password to hash.
        password: String,
    },
}

/// `server` subcommands.
#[derive(Debug, Clone, Subcommand)]
pub enum ServerAction {
    /// Boots the HTTP front in this process and blocks until shutdown.
    Start {
        /// Address to bind the HTTP listener on; overrides config.
        #[arg(long)]
        http_addr: Option<SocketAddr>,
    },
    /// Requests a graceful shutdown of a running server.
    Stop,
}

/// `app` subcommands.
#[derive(Debug, Clone, Subcommand)]
pub enum AppAction {
    /// Creates a new app.
    Create {
        /// Domain to serve the app under.
        #[arg(long, default_value = "")]
        domain: String,
        /// Mount path.
        path: String,
        /// Source the app's files come from.
        source_url: String,
        /// Create a dev app instead of a prod+stage pair.
        #[arg(long)]
        dev: bool,
    },
    /// Lists apps matching a path-spec selector.
    List {
        /// Path-spec selector; defaults to `all`.
        #[arg(default_value = "all")]
        app_path_glob: String,
    },
    /// Deletes an app by id.
    Delete {
        /// App id.
        id: String,
    },
    /// Promotes a prod app's stage sibling into prod.
    Promote {
        /// Prod app id.
        id: String,
    },
    /// Approves the pending metadata of apps matched by a selector.
    Approve {
        /// Path-spec selector; defaults to `all`.
        #[arg(long, default_value = "all")]
        app_path_glob: String,
        /// Report what would happen without committing it.
        #[arg(long)]
        dry_run: bool,
        /// Promote a reloaded/approved stage sibling into prod afterward.
        #[arg(long)]
        promote: bool,
    },
    /// Re-fetches source for apps matched by a selector.
    Reload {
        /// Path-spec selector; defaults to `all`.
        #[arg(long, default_value = "all")]
        app_path_glob: String,
        /// Git branch to resolve the source against.
        #[arg(long)]
        branch: Option<String>,
        /// Exact git commit to pin the source to.
        #[arg(long)]
        commit: Option<String>,
        /// Auto-approve any new loads/permissions the reload introduces.
        #[arg(long)]
        approve: bool,
        /// Promote a reloaded stage sibling into prod afterward.
        #[arg(long)]
        promote: bool,
        /// Report what would happen without committing it.
        #[arg(long)]
        dry_run: bool,
    },
    /// Updates unversioned settings on apps matched by a selector.
    UpdateSettings {
        /// Path-spec selector; defaults to `all`.
        #[arg(long, default_value = "all")]
        app_path_glob: String,
        /// New auth mode (`system`, `none`).
        #[arg(long)]
        auth_type: Option<String>,
        /// New stage write-access flag.
        #[arg(long)]
        stage_write_access: Option<bool>,
        /// New preview write-access flag.
        #[arg(long)]
        preview_write_access: Option<bool>,
    },
    /// Replaces an app's declared metadata wholesale.
    UpdateMetadata {
        /// App id.
        id: String,
        /// Path to a JSON file holding the replacement metadata.
        metadata_file: PathBuf,
        /// Auto-approve any new loads/permissions this declares.
        #[arg(long)]
        approve: bool,
    },
    /// Links a plugin account binding.
    AccountLink {
        /// App id.
        id: String,
        /// Plugin account name declared in metadata.
        plugin_account: String,
        /// Concrete account id to bind it to.
        account_id: String,
    },
    /// Updates a single app parameter value.
    ParamUpdate {
        /// App id.
        id: String,
        /// Parameter key.
        key: String,
        /// Parameter value.
        value: String,
    },
}

/// `version` subcommands.
#[derive(Debug, Clone, Subcommand)]
pub enum VersionAction {
    /// Lists an app's version history.
    List {
        /// App id.
        id: String,
    },
    /// Switches the active version.
    Switch {
        /// App id.
        id: String,
        /// Exact version number to activate.
        version: i64,
    },
    /// Lists the file paths recorded against a version.
    Files {
        /// App id.
        id: String,
        /// Version number; defaults to the active version.
        version: Option<i64>,
    },
    /// Shorthand for switching to the version before the current one.
    Revert {
        /// App id.
        id: String,
    },
}

/// `preview` subcommands.
#[derive(Debug, Clone, Subcommand)]
pub enum PreviewAction {
    /// Creates an ephemeral preview variant pinned to a commit.
    Create {
        /// Domain the prod app is served under.
        #[arg(long, default_value = "")]
        domain: String,
        /// Prod app's mount path.
        app_path: String,
        /// Git commit the preview pins its source to.
        commit_id: String,
    },
}

/// `app-webhook` subcommands.
#[derive(Debug, Clone, Subcommand)]
pub enum AppWebhookAction {
    /// Lists the webhook tokens minted for an app.
    List {
        /// App id.
        id: String,
    },
    /// Mints a fresh reload-trigger token for an app.
    Create {
        /// App id.
        id: String,
    },
    /// Revokes a webhook token.
    Delete {
        /// Token to revoke.
        token: String,
    },
}

/// `sync` subcommands.
#[derive(Debug, Clone, Subcommand)]
pub enum SyncAction {
    /// Schedules a sync entry against an apply file.
    Schedule {
        /// Sync entry identifier.
        id: String,
        /// Apply-file location.
        path: String,
        /// Minutes between scheduled runs; `0` disables scheduled ticks.
        #[arg(long, default_value_t = 0)]
        frequency_min: u32,
        /// Auto-approve new loads/permissions declared apps introduce.
        #[arg(long)]
        approve: bool,
        /// Promote a reloaded stage sibling into prod.
        #[arg(long)]
        promote: bool,
    },
    /// Requests an immediate run of a sync entry's scheduler.
    Run {
        /// Sync entry identifier.
        id: String,
    },
    /// Lists every sync entry.
    List,
    /// Deletes a sync entry.
    Delete {
        /// Sync entry identifier.
        id: String,
    },
}

/// Dispatches a parsed [`Cli`] invocation.
///
/// # Errors
/// Returns [`CliError`] on a client-side failure, a server error
/// response, or (for `server start`) a startup failure.
pub async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command.clone() {
        Command::Server { action: ServerAction::Start { http_addr } } => {
            start_server(cli.config_file.as_deref(), http_addr).await
        }
        Command::Server { action: ServerAction::Stop } => {
            let client = client_from(&cli)?;
            client.post::<_, Value>("/_clace/stop", &json!({})).await?;
            print_line("stop requested");
            Ok(())
        }
        Command::App { action } => run_app_action(&cli, action).await,
        Command::Version { action } => run_version_action(&cli, action).await,
        Command::Preview { action: PreviewAction::Create { domain, app_path, commit_id } } => {
            let client = client_from(&cli)?;
            let query = format!(
                "/_clace/preview?domain={}&appPath={}&commitId={}",
                urlencode(&domain),
                urlencode(&app_path),
                urlencode(&commit_id),
            );
            let created: Value = client.post(&query, &json!({})).await?;
            print_json(&created);
            Ok(())
        }
        Command::AppWebhook { action } => run_app_webhook_action(&cli, action).await,
        Command::Sync { action } => run_sync_action(&cli, action).await,
        Command::Apply { file, dry_run, clobber, approve } => {
            run_apply(&cli, &file, dry_run, clobber, approve).await
        }
        Command::Password { password } => print_password_hash(&password),
    }
}

fn client_from(cli: &Cli) -> Result<Client, CliError> {
    Ok(Client::new(ClientConfig {
        server_uri: cli.server_uri.clone(),
        admin_user: cli.admin_user.clone(),
        admin_password: cli.admin_password.clone(),
        skip_cert_check: cli.skip_cert_check,
    })?)
}

async fn run_app_action(cli: &Cli, action: AppAction) -> Result<(), CliError> {
    let client = client_from(cli)?;
    match action {
        AppAction::Create { domain, path, source_url, dev } => {
            let body = json!({
                "domain": domain,
                "path": path,
                "source_url": source_url,
                "is_dev": dev,
            });
            let created: Value = client.post("/_clace/app", &body).await?;
            print_json(&created);
        }
        AppAction::List { app_path_glob } => {
            let query = format!("/_clace/app?appPathGlob={}", urlencode(&app_path_glob));
            let apps: Value = client.get(&query).await?;
            print_json(&apps);
        }
        AppAction::Delete { id } => {
            client.delete(&format!("/_clace/app/{id}")).await?;
            print_line(&format!("deleted {id}"));
        }
        AppAction::Promote { id } => {
            let promoted: Value = client.post(&format!("/_clace/app/{id}/promote"), &json!({})).await?;
            print_json(&promoted);
        }
        AppAction::Approve { app_path_glob, dry_run, promote } => {
            let query = format!(
                "/_clace/approve?appPathGlob={}&dryRun={dry_run}&promote={promote}",
                urlencode(&app_path_glob),
            );
            let result: Value = client.post(&query, &json!({})).await?;
            if dry_run {
                print_line(DRY_RUN_BANNER);
            }
            print_json(&result);
        }
        AppAction::Reload { app_path_glob, branch, commit, approve, promote, dry_run } => {
            let query = format!(
                "/_clace/reload?appPathGlob={}&dryRun={dry_run}&promote={promote}",
                urlencode(&app_path_glob),
            );
            let body = json!({ "branch": branch, "commit": commit, "approve": approve });
            let result: Value = client.post(&query, &body).await?;
            if dry_run {
                print_line(DRY_RUN_BANNER);
            }
            print_json(&result);
        }
        AppAction::UpdateSettings { app_path_glob, auth_type, stage_write_access, preview_write_access } => {
            let body = json!({
                "app_path_glob": app_path_glob,
                "auth_type": auth_type,
                "stage_write_access": stage_write_access,
                "preview_write_access": preview_write_access,
            });
            let result: Value = client.post("/_clace/app_settings", &body).await?;
            print_json(&result);
        }
        AppAction::UpdateMetadata { id, metadata_file, approve } => {
            let metadata_json = std::fs::read_to_string(metadata_file)?;
            let metadata: Value = serde_json::from_str(&metadata_json)
                .map_err(|err| CliError::Startup(err.to_string()))?;
            let body = json!({ "metadata": metadata, "approve": approve });
            let version: Value = client.post(&format!("/_clace/app/{id}/metadata"), &body).await?;
            print_json(&version);
        }
        AppAction::AccountLink { id, plugin_account, account_id } => {
            let body = json!({ "plugin_account": plugin_account, "account_id": account_id });
            let version: Value = client.post(&format!("/_clace/app/{id}/account"), &body).await?;
            print_json(&version);
        }
        AppAction::ParamUpdate { id, key, value } => {
            let body = json!({ "key": key, "value": value });
            let version: Value = client.post(&format!("/_clace/app/{id}/param"), &body).await?;
            print_json(&version);
        }
    }
    Ok(())
}

async fn run_app_webhook_action(cli: &Cli, action: AppWebhookAction) -> Result<(), CliError> {
    let client = client_from(cli)?;
    match action {
        AppWebhookAction::List { id } => {
            let tokens: Value = client.get(&format!("/_clace/app_webhook_token?id={}", urlencode(&id))).await?;
            print_json(&tokens);
        }
        AppWebhookAction::Create { id } => {
            let body = json!({ "id": id });
            let token: Value = client.post("/_clace/app_webhook_token", &body).await?;
            print_json(&token);
        }
        AppWebhookAction::Delete { token } => {
            client.delete(&format!("/_clace/app_webhook_token?token={}", urlencode(&token))).await?;
            print_line(&format!("deleted {token}"));
        }
    }
    Ok(())
}

async fn run_sync_action(cli: &Cli, action: SyncAction) -> Result<(), CliError> {
    let client = client_from(cli)?;
    match action {
        SyncAction::Schedule { id, path, frequency_min, approve, promote } => {
            let body = json!({
                "id": id,
                "path": path,
                "metadata": {
                    "git_branch": null,
                    "git_auth": null,
                    "approve": approve,
                    "reload": "none",
                    "promote": promote,
                    "clobber": false,
                    "force_reload": false,
                    "schedule_frequency_min": frequency_min,
                    "webhook_url": null,
                },
            });
            let created: Value = client.post("/_clace/sync", &body).await?;
            print_json(&created);
        }
        SyncAction::Run { id } => {
            client.post::<_, Value>(&format!("/_clace/sync/run?id={}", urlencode(&id)), &json!({})).await?;
            print_line(&format!("run requested for {id}"));
        }
        SyncAction::List => {
            let entries: Value = client.get("/_clace/sync").await?;
            print_json(&entries);
        }
        SyncAction::Delete { id } => {
            client.delete(&format!("/_clace/sync/{id}")).await?;
            print_line(&format!("deleted {id}"));
        }
    }
    Ok(())
}

async fn run_version_action(cli: &Cli, action: VersionAction) -> Result<(), CliError> {
    let client = client_from(cli)?;
    match action {
        VersionAction::List { id } => {
            let versions: Value = client.get(&format!("/_clace/app/{id}/version")).await?;
            print_json(&versions);
        }
        VersionAction::Switch { id, version } => {
            let body = json!({ "target": "explicit", "version": version });
            let switched: Value = client.post(&format!("/_clace/app/{id}/version/switch"), &body).await?;
            print_json(&switched);
        }
        VersionAction::Files { id, version } => {
            let query = match version {
                Some(version) => format!("/_clace/version/files?id={}&version={version}", urlencode(&id)),
                None => format!("/_clace/version/files?id={}", urlencode(&id)),
            };
            let files: Value = client.get(&query).await?;
            print_json(&files);
        }
        VersionAction::Revert { id } => {
            let body = json!({ "target": "revert" });
            let switched: Value = client.post(&format!("/_clace/app/{id}/version/switch"), &body).await?;
            print_json(&switched);
        }
    }
    Ok(())
}

async fn run_apply(cli: &Cli, file: &PathBuf, dry_run: bool, clobber: bool, approve: bool) -> Result<(), CliError> {
    let client = client_from(cli)?;
    let apply_toml = std::fs::read_to_string(file)?;
    let body = json!({
        "file_path": file.to_string_lossy(),
        "apply_toml": apply_toml,
        "dry_run": dry_run,
        "clobber": clobber,
        "approve": approve,
    });
    let outcomes: Value = client.post("/_clace/apply", &body).await?;
    if dry_run {
        print_line(DRY_RUN_BANNER);
    }
    print_json(&outcomes);
    Ok(())
}

fn print_password_hash(password: &str) -> Result<(), CliError> {
    let hash = bcrypt::hash(password, bcrypt::DEFAULT_COST)
        .map_err(|err| CliError::Startup(err.to_string()))?;
    print_line(&hash);
    Ok(())
}

async fn start_server(config_file: Option<&std::path::Path>, http_addr: Option<SocketAddr>) -> Result<(), CliError> {
    let config = ServerConfig::load(config_file)?;
    let store = MetadataStore::open(&config.metadata.db_file).map_err(|err| CliError::Startup(err.to_string()))?;
    let registry = Arc::new(Registry::new(store));
    clace_server::logging::init(&config.logging);
    let https = clace_server::bootstrap::load_https(&config.https).await?;
    let addr = http_addr.unwrap_or_else(|| {
        SocketAddr::new(
            config.http.host.parse().unwrap_or_else(|_| [127, 0, 0, 1].into()),
            config.http.port,
        )
    });
    let config = Arc::new(config);
    let state = AppState::new(registry, config);
    clace_server::sync_manager::spawn_all(&state);
    let shutdown = state.shutdown.clone();
    let router = clace_server::build_router(state);
    clace_server::bootstrap::serve(router, addr, https, shutdown).await?;
    Ok(())
}

fn urlencode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(byte as char),
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}

#[allow(clippy::print_stdout, reason = "CLI output is the intended use of stdout here")]
fn print_line(line: &str) {
    println!("{line}");
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => print_line(&text),
        Err(_) => print_line(&value.to_string()),
    }
}
