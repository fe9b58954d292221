//! Command implementations.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{debug, info, warn};

use reingestor_core::{
    compare_lists, load_config, read_package_list, validate_config, CompletionReport, Config,
    HttpPreservationClient, PreservationApi, ReingestOrchestrator, ReingestStore, RunSession,
    SanitizedConfig, SessionStart, SourceError, SourceMode, SourceSelector, SqliteReingestStore,
};

use crate::cli::{Cli, Command};
use crate::logging;

/// Load configuration, set up logging and dispatch the command.
pub async fn execute(cli: &Cli) -> Result<()> {
    let config = load_config(&cli.config)
        .with_context(|| format!("Failed to load config from {:?}", cli.config))?;
    validate_config(&config).context("Configuration validation failed")?;

    let _log_guard = logging::init(&config.logging, cli.log_level.as_deref())?;
    debug!(
        "Configuration: {}",
        serde_json::to_string(&SanitizedConfig::from(&config)).unwrap_or_default()
    );

    match &cli.command {
        Command::ListCompressed { origin_pipeline } => {
            list_compressed(&config, origin_pipeline.clone()).await
        }
        Command::Compare {
            list_file,
            origin_pipeline,
        } => compare(&config, list_file, origin_pipeline.clone()).await,
        Command::ProcessList { list_file } => {
            process(&config, SourceMode::List(list_file.clone())).await
        }
        Command::ProcessStorage { origin_pipeline } => {
            let mode = SourceMode::Storage {
                pipeline_filter: origin_pipeline.clone(),
            };
            process(&config, mode).await
        }
        Command::Status { json } => status(&config, *json),
    }
}

fn build_client(config: &Config) -> Result<Arc<dyn PreservationApi>> {
    let client = HttpPreservationClient::new(
        config.pipeline.clone(),
        config.storage.clone(),
        &config.http,
    )
    .context("Failed to create API client")?;
    Ok(Arc::new(client))
}

fn open_store(config: &Config) -> Result<Arc<SqliteReingestStore>> {
    let store = SqliteReingestStore::new(&config.database.path).with_context(|| {
        format!(
            "Failed to open reingest database {:?}",
            config.database.path
        )
    })?;
    Ok(Arc::new(store))
}

async fn list_compressed(config: &Config, origin_pipeline: Option<String>) -> Result<()> {
    let api = build_client(config)?;
    let ids = SourceSelector::new(api.as_ref())
        .resolve(&SourceMode::Storage {
            pipeline_filter: origin_pipeline,
        })
        .await
        .context("Failed to list compressed packages")?;

    for id in &ids {
        println!("{}", id);
    }
    info!(count = ids.len(), "Compressed packages listed");
    Ok(())
}

async fn compare(config: &Config, list_file: &Path, origin_pipeline: Option<String>) -> Result<()> {
    let user = read_package_list(list_file).context("Invalid package list")?;
    let api = build_client(config)?;
    let stored = api
        .list_compressed_packages(origin_pipeline.as_deref())
        .await
        .context("Failed to list compressed packages")?;

    let diff = compare_lists(&user, &stored);
    if diff.is_identical() {
        println!("Lists are identical ({} packages)", user.len());
        return Ok(());
    }

    println!("Only in list ({}):", diff.only_in_user.len());
    for id in &diff.only_in_user {
        println!("  {}", id);
    }
    println!("Only in storage ({}):", diff.only_in_storage.len());
    for id in &diff.only_in_storage {
        println!("  {}", id);
    }
    Ok(())
}

async fn process(config: &Config, mode: SourceMode) -> Result<()> {
    let store = open_store(config)?;
    let api = build_client(config)?;

    let session = match RunSession::begin(&config.process.lock_path)
        .context("Failed to take run lock")?
    {
        SessionStart::Started(session) => session,
        SessionStart::Held { pid } => {
            match pid {
                Some(pid) => println!(
                    "Another reingest run (pid {}) is in progress, nothing done",
                    pid
                ),
                None => println!("Another reingest run is in progress, nothing done"),
            }
            return Ok(());
        }
    };

    let orchestrator = ReingestOrchestrator::new(config.reingest.clone(), store, api.clone());
    orchestrator.preflight().await.context("Preflight check failed")?;

    // Existing records still advance when storage cannot be listed
    let candidates = match SourceSelector::new(api.as_ref()).resolve(&mode).await {
        Ok(candidates) => candidates,
        Err(SourceError::Api(e)) => {
            warn!("Storage query failed, advancing known packages only: {}", e);
            Vec::new()
        }
        Err(e) => return Err(e).context("Failed to select packages"),
    };

    let summary = orchestrator
        .run(&session, &candidates)
        .await
        .context("Reingest run failed")?;
    println!("{}", summary);

    if summary.counts.is_drained() {
        if let Some(report) = orchestrator
            .completion_report()
            .context("Failed to read completion statistics")?
        {
            print_report(&report);
        }
    }

    session.finish(&summary).context("Failed to release run lock")?;
    Ok(())
}

fn status(config: &Config, json: bool) -> Result<()> {
    if !config.database.path.exists() {
        bail!(
            "Reingest database {:?} does not exist",
            config.database.path
        );
    }
    let store = open_store(config)?;
    let records = store.dump().context("Failed to read reingest records")?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&records).context("Failed to serialize records")?
        );
        return Ok(());
    }

    for record in &records {
        println!("{}", record);
    }
    let counts = store.status_counts().context("Failed to count records")?;
    println!(
        "total={} new={} in_progress={} complete={} error={}",
        counts.total(),
        counts.new,
        counts.in_progress,
        counts.complete,
        counts.error
    );
    Ok(())
}

fn print_report(report: &CompletionReport) {
    println!(
        "All reingests finished: {} complete, {} errored",
        report.complete.len(),
        report.errored.len()
    );
    for record in report.complete.iter().chain(report.errored.iter()) {
        println!("  {}", record);
    }
    if let Some(average) = report.average_processing_time() {
        println!(
            "Total processing time: {}s, average: {}s",
            report.total_processing_time().num_seconds(),
            average.num_seconds()
        );
    }
}
