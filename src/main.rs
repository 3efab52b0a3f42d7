mod cli;
mod config;
mod error;
mod model;
mod providers;
mod sync;
mod util;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use cli::Cli;
use error::SyncError;
use providers::azure_devops::AzureDevOpsClient;
use providers::dependency_track::DependencyTrackClient;
use sync::engine::{SyncEngine, SyncOptions};
use util::template::DescriptionTemplate;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            if is_config_error(&e) {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

/// `--log-level` wins over `RUST_LOG`; both fall back to `info`.
fn init_tracing(log_level: Option<&str>) {
    let filter = match log_level {
        Some(level) => EnvFilter::try_new(level).ok(),
        None => EnvFilter::try_from_default_env().ok(),
    }
    .unwrap_or_else(|| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

fn is_config_error(err: &anyhow::Error) -> bool {
    err.chain()
        .any(|cause| cause.downcast_ref::<SyncError>().is_some_and(SyncError::is_config))
}

async fn run(cli: Cli) -> Result<()> {
    if !cli.apply {
        tracing::info!("Running in dry-run mode (add --apply to perform changes)");
    }

    let config = config::load_config(cli.config.as_deref())?;
    let policy = sync::policy::load_policy(cli.mapper.as_deref())?;
    let template = match &cli.template {
        Some(path) => DescriptionTemplate::from_file(path)
            .map_err(|e| SyncError::Config(format!("{e:#}")))?,
        None => DescriptionTemplate::default(),
    };

    let proxy = config.proxy.as_deref();
    let dependency_track = DependencyTrackClient::new(&config.dependency_track, proxy)?;
    let azure = AzureDevOpsClient::new(&config.azure, proxy)?;

    let options = SyncOptions {
        apply: cli.apply,
        fix_references: cli.fix_references,
        filter: cli.finding_filter(),
        default_area_path: config.azure.default_area_path.clone(),
        work_item_type: config.azure.work_item_type.clone(),
        policy,
        template,
    };

    let summary = SyncEngine::new(&options, &dependency_track, &dependency_track, &azure)
        .run()
        .await?;

    tracing::info!(
        "Processed {} findings: {} filtered out, {} work items created, {} work items updated, \
         {} analyses updated, {} unchanged, {} skipped, {} failed",
        summary.loaded,
        summary.filtered_out,
        summary.created,
        summary.work_items_updated,
        summary.analyses_updated,
        summary.unchanged,
        summary.skipped,
        summary.failed,
    );
    Ok(())
}
