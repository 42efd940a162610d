//! bitable-sync binary entry point
//!
//! Dispatches one sync task per invocation and exits. Candidates normally
//! come from a console export file captured by a separate automation step
//! (`--input`); the browser-driven path is exposed through the library's
//! `PageActions` seam for embedders that ship a webdriver binding.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use tracing::{error, info};

use bitable_sync::application::{CommissionSyncTask, ProductIdSyncTask, SyncOutcome};
use bitable_sync::application::commission_sync::parse_commission_export;
use bitable_sync::application::product_id_sync::parse_product_export;
use bitable_sync::infrastructure::bitable_client::BitableClient;
use bitable_sync::infrastructure::config::ConfigManager;
use bitable_sync::infrastructure::logging::init_logging;
use bitable_sync::infrastructure::notify::{NotificationSink, Notifier};
use bitable_sync::infrastructure::session::SessionState;

const USAGE: &str = "\
usage: bitable-sync <task> [--input FILE] [--config FILE]

tasks:
  commission-sync    reconcile settlement export rows into the commission table
  product-id-sync    reconcile per-store product listings into the product table

options:
  --input FILE       console export to use as the candidate source
                     (commission: order_id<TAB>amount<TAB>settled_at_ms,
                      product:    store_id<TAB>product_id)
  --config FILE      configuration file path (default: platform config dir,
                     or $BITABLE_SYNC_CONFIG)";

struct CliArgs {
    task: String,
    input: Option<PathBuf>,
    config: Option<PathBuf>,
}

fn parse_args(mut args: std::env::Args) -> Result<CliArgs> {
    let _program = args.next();
    let task = args.next().context("missing task name")?;
    let mut input = None;
    let mut config = None;

    while let Some(flag) = args.next() {
        match flag.as_str() {
            "--input" => input = Some(PathBuf::from(args.next().context("--input needs a path")?)),
            "--config" => {
                config = Some(PathBuf::from(args.next().context("--config needs a path")?));
            }
            other => bail!("unknown argument: {other}"),
        }
    }

    Ok(CliArgs {
        task,
        input,
        config,
    })
}

async fn run(args: CliArgs) -> Result<SyncOutcome> {
    let manager = match args.config {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new()?,
    };
    let mut config = manager.initialize_on_first_run().await?;
    config.apply_env_overrides();

    init_logging(&config.logging)?;
    info!("bitable-sync v{} starting task '{}'", env!("CARGO_PKG_VERSION"), args.task);

    // Fatal before any network or browser activity.
    config.validate()?;

    let input = match args.input {
        Some(path) => tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("could not read export file {path:?}"))?,
        None => {
            // The session artifact is the precondition for the browser-driven
            // path; verify it exists before reporting what is missing.
            SessionState::load(&config.browser.session_state_path).await?;
            bail!(
                "no browser binding is compiled into this binary; capture the \
                 console export separately and pass it with --input"
            );
        }
    };

    let client = BitableClient::connect(&config.store, &config.http)
        .await
        .context("could not authenticate against the tabular store")?;
    let notifier = Notifier::from_config(&config.notify, &config.http);
    let sink = notifier.as_ref().map(|n| n as &dyn NotificationSink);

    match args.task.as_str() {
        "commission-sync" => {
            let candidates = parse_commission_export(&input);
            CommissionSyncTask::new(&client, &config, sink)
                .run_with_candidates(candidates)
                .await
        }
        "product-id-sync" => {
            let mut candidates: HashMap<String, HashSet<String>> = HashMap::new();
            for (store_id, product_id) in parse_product_export(&input) {
                candidates.entry(store_id).or_default().insert(product_id);
            }
            ProductIdSyncTask::new(&client, &config, sink)
                .run_with_candidates(candidates)
                .await
        }
        other => bail!("unknown task '{other}'\n\n{USAGE}"),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = match parse_args(std::env::args()) {
        Ok(args) => args,
        Err(error) => {
            eprintln!("{error}\n\n{USAGE}");
            return ExitCode::FAILURE;
        }
    };

    match run(args).await {
        Ok(outcome) => {
            // Partial batch failures are operator-visible through logs and
            // notification, not through the exit code.
            info!(
                written = outcome.report.written,
                failed_chunks = outcome.report.failed_chunks,
                "task finished"
            );
            ExitCode::SUCCESS
        }
        Err(error) => {
            error!("task aborted: {error:#}");
            eprintln!("error: {error:#}");
            ExitCode::FAILURE
        }
    }
}
