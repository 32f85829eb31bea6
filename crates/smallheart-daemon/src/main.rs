//! `smallheart` Daemon
//!
//! Loads the account list from a TOML config, spawns one orchestrator task
//! per account, and runs until Ctrl+C or SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use smallheart_api::client;
use smallheart_api::signing::{HmacChainSigner, Signer};
use smallheart_core::account::{self, Account};
use smallheart_core::config::{self, Config};
use smallheart_daemon::AccountOrchestrator;

#[derive(Parser, Debug)]
#[command(name = "smallheart-daemon")]
#[command(version, about = "smallheart daemon - daily medal heart farmer")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "smallheart.toml", env = "SMALLHEART_CONFIG")]
    config: PathBuf,

    /// Log level filter for the daemon (e.g. "info", "debug", "warn").
    /// Overrides the config file when set.
    #[arg(long, env = "SMALLHEART_LOG_LEVEL")]
    log_level: Option<String>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "SMALLHEART_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = config::load_config(&args.config)?;

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.daemon.log_level);
    let log_filter = format!(
        "smallheart_core={log_level},smallheart_api={log_level},smallheart_daemon={log_level}"
    );
    smallheart_core::tracing_init::init_tracing(
        &log_filter,
        args.log_json || config.daemon.log_json,
    );

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        accounts = config.accounts.len(),
        "Starting smallheart-daemon"
    );

    let signer: Arc<dyn Signer> = Arc::new(HmacChainSigner);
    let mut orchestrators = JoinSet::new();
    for orchestrator in build_orchestrators(&config, &signer).await {
        orchestrators.spawn(orchestrator.run());
    }
    if orchestrators.is_empty() {
        anyhow::bail!("no account could be initialized");
    }

    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    #[cfg(unix)]
    let sigterm_future = sigterm.recv();
    #[cfg(not(unix))]
    let sigterm_future = std::future::pending::<Option<()>>();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C shutdown signal");
        }
        _ = sigterm_future => {
            info!("Received SIGTERM shutdown signal");
        }
    }

    // Aborting the orchestrators cancels every in-flight session task
    // through their dispatchers.
    orchestrators.shutdown().await;
    info!("Daemon stopped");
    Ok(())
}

/// Build one orchestrator per configured account, skipping accounts whose
/// credentials cannot be resolved. A cookie without a device id gets one
/// issued by the platform's portal.
async fn build_orchestrators(
    config: &Config,
    signer: &Arc<dyn Signer>,
) -> Vec<AccountOrchestrator> {
    let mut orchestrators = Vec::new();
    for (index, entry) in config.accounts.iter().enumerate() {
        let Some(csrf) = account::extract_csrf(&entry.cookie) else {
            error!(
                account = %entry.name,
                "Cookie is missing the bili_jct token; skipping account"
            );
            continue;
        };
        let device_id = match account::extract_device_id(&entry.cookie) {
            Some(id) => id,
            None => {
                warn!(
                    account = %entry.name,
                    "Cookie has no LIVE_BUVID; requesting one from the portal"
                );
                match client::obtain_device_id(&config.api.portal_base, &entry.cookie).await {
                    Ok(id) => id,
                    Err(e) => {
                        error!(
                            account = %entry.name,
                            error = %e,
                            "Could not obtain a device id; skipping account"
                        );
                        continue;
                    }
                }
            }
        };

        let account = Account::new(&entry.name, index + 1, &entry.cookie, csrf, device_id);
        info!(
            account = %account.name,
            index = account.index,
            session = %account.session_id,
            "Account initialized"
        );
        orchestrators.push(AccountOrchestrator::new(
            account,
            config.api.clone(),
            config.round,
            Arc::clone(signer),
        ));
    }
    orchestrators
}
