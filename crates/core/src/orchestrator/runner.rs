//! Reingest orchestrator implementation.
//!
//! One run reconciles the store with the remote services:
//! - Register: every candidate gets a `NEW` record (existing ones untouched)
//! - Advance: every `IN_PROGRESS` record is polled and moved on if possible
//! - Start: `NEW` records are initiated until the throttle is reached

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn, Instrument};

use crate::client::{ApiError, PreservationApi, UnitStatus, UnitStatusKind};
use crate::coordinator::RunSession;
use crate::state::{ReingestRecord, ReingestStatus, ReingestStore, StoreError};

use super::config::OrchestratorConfig;
use super::types::{CompletionReport, OrchestratorError, RunSummary};

/// SIP id the pipeline reports for units still in backlog.
const BACKLOG_SIP: &str = "BACKLOG";

/// Effect of polling one in-progress record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Progress {
    Unchanged,
    Approved,
    Completed,
    Failed,
}

/// Drives packages through `NEW → IN_PROGRESS → COMPLETE | ERROR`.
pub struct ReingestOrchestrator {
    config: OrchestratorConfig,
    store: Arc<dyn ReingestStore>,
    api: Arc<dyn PreservationApi>,
}

impl ReingestOrchestrator {
    /// Create a new orchestrator.
    pub fn new(
        config: OrchestratorConfig,
        store: Arc<dyn ReingestStore>,
        api: Arc<dyn PreservationApi>,
    ) -> Self {
        Self { config, store, api }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Check the pipeline and processing configuration exist before touching
    /// anything.
    pub async fn preflight(&self) -> Result<(), OrchestratorError> {
        if !self.api.pipeline_exists(&self.config.pipeline_id).await? {
            return Err(OrchestratorError::Preflight(format!(
                "pipeline {} is not registered with the storage service",
                self.config.pipeline_id
            )));
        }
        if !self
            .api
            .processing_config_exists(&self.config.processing_config)
            .await?
        {
            return Err(OrchestratorError::Preflight(format!(
                "processing configuration '{}' does not exist on the pipeline",
                self.config.processing_config
            )));
        }
        debug!(pipeline_id = %self.config.pipeline_id, "Preflight checks passed");
        Ok(())
    }

    /// Run one pass over `candidates` inside the session's span.
    pub async fn run(
        &self,
        session: &RunSession,
        candidates: &[String],
    ) -> Result<RunSummary, OrchestratorError> {
        self.run_pass(candidates)
            .instrument(session.span().clone())
            .await
    }

    async fn run_pass(&self, candidates: &[String]) -> Result<RunSummary, OrchestratorError> {
        let mut summary = RunSummary {
            candidates: candidates.len(),
            ..Default::default()
        };

        summary.registered = self.register(candidates)?;
        self.advance(&mut summary).await?;
        self.start(&mut summary).await?;

        summary.counts = self.store.status_counts()?;
        info!("Run summary: {}", summary);

        if summary.counts.is_drained() {
            if let Some(report) = self.completion_report()? {
                log_completion(&report);
            }
        }

        Ok(summary)
    }

    fn register(&self, candidates: &[String]) -> Result<usize, StoreError> {
        let mut registered = 0;
        for package_id in candidates {
            if self.store.upsert_new(package_id, &self.config.pipeline_id)? {
                registered += 1;
            }
        }
        if registered > 0 {
            info!(
                registered,
                known = candidates.len() - registered,
                "Registered new packages"
            );
        }
        Ok(registered)
    }

    /// Poll every in-progress record of the pipeline.
    async fn advance(&self, summary: &mut RunSummary) -> Result<(), OrchestratorError> {
        let in_progress = self.store.list_in_progress(&self.config.pipeline_id)?;
        debug!(count = in_progress.len(), "Advancing in-progress packages");

        for record in in_progress {
            summary.polled += 1;
            match self.advance_record(&record).await {
                Ok(Progress::Unchanged) => {}
                Ok(Progress::Approved) => summary.approved += 1,
                Ok(Progress::Completed) => summary.completed += 1,
                Ok(Progress::Failed) => summary.errored += 1,
                Err(e) => {
                    summary.skipped += 1;
                    skip_record(&record.package_id, &e)?;
                }
            }
        }
        Ok(())
    }

    async fn advance_record(&self, record: &ReingestRecord) -> Result<Progress, OrchestratorError> {
        let package_id = record.package_id.as_str();
        let Some(transfer_id) = record.transfer_id.as_deref() else {
            // Started records always carry a transfer id; fall back to ingest
            warn!(package_id, "In-progress record has no transfer id");
            return self.settle_ingest(record, package_id).await;
        };

        let transfer = self.api.get_transfer_status(transfer_id).await?;
        debug!(
            package_id,
            transfer_id,
            status = %transfer.kind,
            "Polled transfer"
        );

        match transfer.kind {
            UnitStatusKind::Processing => Ok(Progress::Unchanged),
            UnitStatusKind::UserInput => {
                if self.approve_with_retries(package_id, transfer_id).await {
                    Ok(Progress::Approved)
                } else {
                    Ok(Progress::Unchanged)
                }
            }
            UnitStatusKind::Complete => {
                let sip_id = sip_id_for(&transfer, package_id);
                self.settle_ingest(record, &sip_id).await
            }
            UnitStatusKind::Failed | UnitStatusKind::Rejected => {
                let message = failure_message("Transfer", &transfer);
                self.store.set_error(package_id, &message, Utc::now())?;
                warn!(package_id, transfer_id, "{}", message);
                Ok(Progress::Failed)
            }
            UnitStatusKind::NotFound => self.settle_ingest(record, package_id).await,
        }
    }

    /// Apply the ingest-stage status for a record whose transfer is done.
    async fn settle_ingest(
        &self,
        record: &ReingestRecord,
        sip_id: &str,
    ) -> Result<Progress, OrchestratorError> {
        let package_id = record.package_id.as_str();
        let ingest = self.api.get_ingest_status(sip_id).await?;
        debug!(package_id, sip_id, status = %ingest.kind, "Polled ingest");

        match ingest.kind {
            UnitStatusKind::Processing | UnitStatusKind::UserInput | UnitStatusKind::NotFound => {
                Ok(Progress::Unchanged)
            }
            UnitStatusKind::Complete => {
                if self.config.confirm_stored {
                    let package = self.api.get_package_detail(package_id).await?;
                    if !package.is_stored() {
                        debug!(
                            package_id,
                            storage_status = %package.status,
                            "Ingest complete, waiting for storage"
                        );
                        return Ok(Progress::Unchanged);
                    }
                }
                let updated = self.store.set_complete(package_id, Utc::now())?;
                info!("Reingest complete: {}", updated);
                Ok(Progress::Completed)
            }
            UnitStatusKind::Failed | UnitStatusKind::Rejected => {
                let message = failure_message("Ingest", &ingest);
                self.store.set_error(package_id, &message, Utc::now())?;
                warn!(package_id, sip_id, "{}", message);
                Ok(Progress::Failed)
            }
        }
    }

    /// Try to approve a waiting transfer. Returns whether it was approved.
    async fn approve_with_retries(&self, package_id: &str, transfer_id: &str) -> bool {
        let latency = Duration::from_millis(self.config.approval_latency_ms);
        let attempts = self.config.approval_retries.max(1);

        for attempt in 1..=attempts {
            match self.api.approve_transfer(transfer_id).await {
                Ok(true) => {
                    info!(package_id, transfer_id, attempt, "Transfer approved");
                    return true;
                }
                Ok(false) => debug!(package_id, transfer_id, attempt, "Nothing to approve yet"),
                Err(e) => warn!(package_id, transfer_id, attempt, "Approval failed: {}", e),
            }
            if attempt < attempts {
                tokio::time::sleep(latency).await;
            }
        }

        warn!(
            package_id,
            transfer_id, attempts, "Transfer still awaiting approval, will retry next run"
        );
        false
    }

    /// Initiate reingest for `NEW` records while the throttle allows.
    async fn start(&self, summary: &mut RunSummary) -> Result<(), OrchestratorError> {
        let pipeline_id = self.config.pipeline_id.as_str();
        let running = self.store.count_in_progress(pipeline_id)?;
        let available = self.config.throttle.saturating_sub(running);
        if available == 0 {
            debug!(running, throttle = self.config.throttle, "Throttle reached");
            return Ok(());
        }

        let pending = self.store.list_new(pipeline_id, available)?;
        for record in pending {
            let package_id = record.package_id.as_str();
            let initiated = self
                .api
                .initiate_reingest(
                    pipeline_id,
                    package_id,
                    self.config.reingest_type,
                    &self.config.processing_config,
                )
                .await;

            match initiated {
                Ok(transfer_id) => {
                    let started = self
                        .store
                        .set_in_progress(package_id, &transfer_id, Utc::now());
                    if let Err(e) = started {
                        summary.skipped += 1;
                        skip_record(package_id, &OrchestratorError::from(e))?;
                        continue;
                    }
                    summary.started += 1;
                    info!(package_id, transfer_id = %transfer_id, "Reingest started");

                    if self.config.approve_on_start
                        && self.approve_started(package_id, &transfer_id).await
                    {
                        summary.approved += 1;
                    }
                }
                Err(e) => {
                    let message = e.to_string();
                    let failed = self
                        .store
                        .set_initiation_failed(package_id, &message, Utc::now());
                    match failed {
                        Ok(_) => {
                            summary.errored += 1;
                            warn!(package_id, "Reingest could not be started: {}", message);
                        }
                        Err(store_error) => {
                            summary.skipped += 1;
                            skip_record(package_id, &OrchestratorError::from(store_error))?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// First poll of a freshly started transfer, approving it if it waits.
    async fn approve_started(&self, package_id: &str, transfer_id: &str) -> bool {
        tokio::time::sleep(Duration::from_millis(self.config.approval_latency_ms)).await;
        match self.api.get_transfer_status(transfer_id).await {
            Ok(status) if status.kind == UnitStatusKind::UserInput => {
                self.approve_with_retries(package_id, transfer_id).await
            }
            Ok(_) => false,
            Err(e) => {
                debug!(package_id, transfer_id, "Initial transfer poll failed: {}", e);
                false
            }
        }
    }

    /// Completed and failed records, once nothing is left to do.
    pub fn completion_report(&self) -> Result<Option<CompletionReport>, StoreError> {
        if !self.store.status_counts()?.is_drained() {
            return Ok(None);
        }
        Ok(Some(CompletionReport {
            complete: self.store.list_by_status(ReingestStatus::Complete)?,
            errored: self.store.list_by_status(ReingestStatus::Error)?,
        }))
    }
}

/// The SIP id to query for a completed transfer. Reingest keeps the AIP's
/// id, so the package id stands in when the transfer does not report one.
fn sip_id_for(transfer: &UnitStatus, package_id: &str) -> String {
    match transfer.sip_id.as_deref() {
        Some(sip_id) if !sip_id.is_empty() && sip_id != BACKLOG_SIP => sip_id.to_string(),
        _ => package_id.to_string(),
    }
}

fn failure_message(stage: &str, status: &UnitStatus) -> String {
    match status.message.as_deref() {
        Some(message) => format!("{} {}: {}", stage, status.kind, message),
        None => format!("{} {}", stage, status.kind),
    }
}

/// Log a per-record failure. Store damage still aborts the run.
fn skip_record(package_id: &str, error: &OrchestratorError) -> Result<(), OrchestratorError> {
    match error {
        OrchestratorError::Store(StoreError::Database(msg)) => {
            Err(StoreError::Database(msg.clone()).into())
        }
        OrchestratorError::Store(StoreError::Corrupt(msg)) => {
            Err(StoreError::Corrupt(msg.clone()).into())
        }
        OrchestratorError::Store(inner) => {
            error!(package_id, "Skipping record: {}", inner);
            Ok(())
        }
        OrchestratorError::Api(
            inner @ (ApiError::RemoteUnavailable(_) | ApiError::InvalidResponse(_)),
        ) => {
            warn!(package_id, "Remote unavailable, retrying next run: {}", inner);
            Ok(())
        }
        OrchestratorError::Api(inner) => {
            warn!(package_id, "Skipping record: {}", inner);
            Ok(())
        }
        _ => {
            warn!(package_id, "Skipping record: {}", error);
            Ok(())
        }
    }
}

fn log_completion(report: &CompletionReport) {
    info!(
        complete = report.complete.len(),
        errored = report.errored.len(),
        total_processing_secs = report.total_processing_time().num_seconds(),
        average_processing_secs = report.average_processing_time().map(|d| d.num_seconds()),
        "All reingests finished"
    );
    for record in report.complete.iter().chain(report.errored.iter()) {
        info!("{}", record);
    }
}
