//! Mock preservation API for testing.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::client::{
    ApiError, PackageInfo, PreservationApi, ReingestType, UnitStatus, UnitStatusKind,
};

/// A recorded reingest initiation for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedReingest {
    pub pipeline_id: String,
    pub package_id: String,
    pub reingest_type: ReingestType,
    pub processing_config: String,
    /// Transfer id handed back, if the initiation was accepted.
    pub transfer_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct MockPackage {
    info: PackageInfo,
    compressed: bool,
}

/// Mock implementation of the PreservationApi trait.
///
/// Simulates both remote services:
/// - Stored packages for listing and detail lookups
/// - Transfer and ingest statuses, scripted per unit
/// - Reingest initiation, with per-package rejections
/// - Transfer approval, which moves a `USER_INPUT` transfer to `PROCESSING`
///
/// # Example
///
/// ```rust,ignore
/// let api = MockPreservationApi::new();
/// api.add_stored_package("aip-1", Some("pipe-1"), true).await;
///
/// let transfer_id = api.initiate_reingest("pipe-1", "aip-1", ReingestType::Full, "default").await?;
/// api.set_transfer_status(&transfer_id, UnitStatus::new(UnitStatusKind::Complete)).await;
/// api.set_ingest_status("aip-1", UnitStatus::new(UnitStatusKind::Complete)).await;
/// ```
#[derive(Debug)]
pub struct MockPreservationApi {
    packages: Arc<RwLock<Vec<MockPackage>>>,
    transfers: Arc<RwLock<HashMap<String, UnitStatus>>>,
    ingests: Arc<RwLock<HashMap<String, UnitStatus>>>,
    /// Units whose status queries fail as unavailable.
    unavailable: Arc<RwLock<HashSet<String>>>,
    /// Packages whose initiation is refused, with the refusal message.
    rejections: Arc<RwLock<HashMap<String, String>>>,
    pipelines: Arc<RwLock<HashSet<String>>>,
    processing_configs: Arc<RwLock<HashSet<String>>>,
    /// Whether approval requests succeed.
    approvals_accepted: Arc<RwLock<bool>>,
    initiations: Arc<RwLock<Vec<RecordedReingest>>>,
    approvals: Arc<RwLock<Vec<String>>>,
    /// If set, the next operation will fail with this error.
    next_error: Arc<RwLock<Option<ApiError>>>,
    transfer_counter: Arc<RwLock<u32>>,
}

impl Default for MockPreservationApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPreservationApi {
    pub fn new() -> Self {
        Self {
            packages: Arc::new(RwLock::new(Vec::new())),
            transfers: Arc::new(RwLock::new(HashMap::new())),
            ingests: Arc::new(RwLock::new(HashMap::new())),
            unavailable: Arc::new(RwLock::new(HashSet::new())),
            rejections: Arc::new(RwLock::new(HashMap::new())),
            pipelines: Arc::new(RwLock::new(HashSet::new())),
            processing_configs: Arc::new(RwLock::new(HashSet::new())),
            approvals_accepted: Arc::new(RwLock::new(true)),
            initiations: Arc::new(RwLock::new(Vec::new())),
            approvals: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
            transfer_counter: Arc::new(RwLock::new(0)),
        }
    }

    /// Register a pipeline and a processing configuration so preflight passes.
    pub async fn add_pipeline(&self, pipeline_id: &str, processing_config: &str) {
        self.pipelines.write().await.insert(pipeline_id.to_string());
        self.processing_configs
            .write()
            .await
            .insert(processing_config.to_string());
    }

    /// Add a stored (`UPLOADED`) package.
    pub async fn add_stored_package(
        &self,
        package_id: &str,
        pipeline_id: Option<&str>,
        compressed: bool,
    ) {
        let current_path = if compressed {
            format!("{}.7z", package_id)
        } else {
            package_id.to_string()
        };
        self.packages.write().await.push(MockPackage {
            info: PackageInfo {
                package_id: package_id.to_string(),
                pipeline_id: pipeline_id.map(str::to_string),
                current_location: "/api/v2/location/mock-aip-store/".to_string(),
                current_path,
                size: 1024 * 1024,
                status: "UPLOADED".to_string(),
            },
            compressed,
        });
    }

    /// Change a package's storage status (e.g. while it is being reingested).
    pub async fn set_package_status(&self, package_id: &str, status: &str) {
        let mut packages = self.packages.write().await;
        if let Some(package) = packages
            .iter_mut()
            .find(|p| p.info.package_id == package_id)
        {
            package.info.status = status.to_string();
        }
    }

    pub async fn set_transfer_status(&self, transfer_id: &str, status: UnitStatus) {
        self.transfers
            .write()
            .await
            .insert(transfer_id.to_string(), status);
    }

    pub async fn set_ingest_status(&self, sip_id: &str, status: UnitStatus) {
        self.ingests.write().await.insert(sip_id.to_string(), status);
    }

    /// Make status queries for a unit fail as `RemoteUnavailable`.
    pub async fn set_unavailable(&self, unit_id: &str, unavailable: bool) {
        let mut units = self.unavailable.write().await;
        if unavailable {
            units.insert(unit_id.to_string());
        } else {
            units.remove(unit_id);
        }
    }

    /// Refuse reingest initiation for a package.
    pub async fn reject_reingest(&self, package_id: &str, message: &str) {
        self.rejections
            .write()
            .await
            .insert(package_id.to_string(), message.to_string());
    }

    pub async fn set_approvals_accepted(&self, accepted: bool) {
        *self.approvals_accepted.write().await = accepted;
    }

    /// Make the next operation fail with the given error.
    pub async fn set_next_error(&self, error: ApiError) {
        *self.next_error.write().await = Some(error);
    }

    /// All initiation requests, accepted or not.
    pub async fn initiations(&self) -> Vec<RecordedReingest> {
        self.initiations.read().await.clone()
    }

    /// Transfer ids approval was attempted for.
    pub async fn approvals(&self) -> Vec<String> {
        self.approvals.read().await.clone()
    }

    /// Transfer id of the latest accepted initiation for a package.
    pub async fn transfer_for(&self, package_id: &str) -> Option<String> {
        self.initiations
            .read()
            .await
            .iter()
            .rev()
            .find(|r| r.package_id == package_id)
            .and_then(|r| r.transfer_id.clone())
    }

    async fn check_error(&self) -> Result<(), ApiError> {
        match self.next_error.write().await.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn check_available(&self, unit_id: &str) -> Result<(), ApiError> {
        if self.unavailable.read().await.contains(unit_id) {
            return Err(ApiError::RemoteUnavailable(format!(
                "status {}: connection refused",
                unit_id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl PreservationApi for MockPreservationApi {
    async fn get_package_detail(&self, package_id: &str) -> Result<PackageInfo, ApiError> {
        self.check_error().await?;
        self.packages
            .read()
            .await
            .iter()
            .find(|p| p.info.package_id == package_id)
            .map(|p| p.info.clone())
            .ok_or_else(|| ApiError::NotFound(package_id.to_string()))
    }

    async fn list_compressed_packages(
        &self,
        pipeline_filter: Option<&str>,
    ) -> Result<Vec<String>, ApiError> {
        self.check_error().await?;
        Ok(self
            .packages
            .read()
            .await
            .iter()
            .filter(|p| p.compressed && p.info.is_stored())
            .filter(|p| match pipeline_filter {
                Some(filter) => p.info.pipeline_id.as_deref() == Some(filter),
                None => true,
            })
            .map(|p| p.info.package_id.clone())
            .collect())
    }

    async fn initiate_reingest(
        &self,
        pipeline_id: &str,
        package_id: &str,
        reingest_type: ReingestType,
        processing_config: &str,
    ) -> Result<String, ApiError> {
        let mut record = RecordedReingest {
            pipeline_id: pipeline_id.to_string(),
            package_id: package_id.to_string(),
            reingest_type,
            processing_config: processing_config.to_string(),
            transfer_id: None,
            timestamp: Utc::now(),
        };

        let refusal = match self.check_error().await {
            Err(e) => Some(e),
            Ok(()) => self
                .rejections
                .read()
                .await
                .get(package_id)
                .map(|message| ApiError::RemoteRejected(message.clone())),
        };
        if let Some(error) = refusal {
            self.initiations.write().await.push(record);
            return Err(error);
        }

        let transfer_id = {
            let mut counter = self.transfer_counter.write().await;
            *counter += 1;
            format!("transfer-{:04}", *counter)
        };

        let mut status = UnitStatus::new(UnitStatusKind::Processing);
        status.directory = Some(package_id.to_string());
        self.transfers
            .write()
            .await
            .insert(transfer_id.clone(), status);

        record.transfer_id = Some(transfer_id.clone());
        self.initiations.write().await.push(record);
        Ok(transfer_id)
    }

    async fn get_transfer_status(&self, transfer_id: &str) -> Result<UnitStatus, ApiError> {
        self.check_error().await?;
        self.check_available(transfer_id).await?;
        Ok(self
            .transfers
            .read()
            .await
            .get(transfer_id)
            .cloned()
            .unwrap_or_else(UnitStatus::not_found))
    }

    async fn get_ingest_status(&self, sip_id: &str) -> Result<UnitStatus, ApiError> {
        self.check_error().await?;
        self.check_available(sip_id).await?;
        Ok(self
            .ingests
            .read()
            .await
            .get(sip_id)
            .cloned()
            .unwrap_or_else(UnitStatus::not_found))
    }

    async fn approve_transfer(&self, transfer_id: &str) -> Result<bool, ApiError> {
        self.check_error().await?;
        self.approvals.write().await.push(transfer_id.to_string());

        if !*self.approvals_accepted.read().await {
            return Ok(false);
        }

        let mut transfers = self.transfers.write().await;
        match transfers.get_mut(transfer_id) {
            Some(status) if status.kind == UnitStatusKind::UserInput => {
                status.kind = UnitStatusKind::Processing;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn pipeline_exists(&self, pipeline_id: &str) -> Result<bool, ApiError> {
        self.check_error().await?;
        Ok(self.pipelines.read().await.contains(pipeline_id))
    }

    async fn processing_config_exists(&self, name: &str) -> Result<bool, ApiError> {
        self.check_error().await?;
        Ok(self.processing_configs.read().await.contains(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_initiation_assigns_processing_transfer() {
        let api = MockPreservationApi::new();
        let transfer_id = api
            .initiate_reingest("pipe", "aip-1", ReingestType::Full, "default")
            .await
            .unwrap();

        let status = api.get_transfer_status(&transfer_id).await.unwrap();
        assert_eq!(status.kind, UnitStatusKind::Processing);
        assert_eq!(api.transfer_for("aip-1").await, Some(transfer_id));
    }

    #[tokio::test]
    async fn test_rejection_recorded() {
        let api = MockPreservationApi::new();
        api.reject_reingest("aip-1", "already being reingested").await;

        let result = api
            .initiate_reingest("pipe", "aip-1", ReingestType::Full, "default")
            .await;
        assert!(matches!(result, Err(ApiError::RemoteRejected(_))));

        let initiations = api.initiations().await;
        assert_eq!(initiations.len(), 1);
        assert!(initiations[0].transfer_id.is_none());
    }

    #[tokio::test]
    async fn test_approval_moves_transfer_on() {
        let api = MockPreservationApi::new();
        api.set_transfer_status("t-1", UnitStatus::new(UnitStatusKind::UserInput))
            .await;

        assert!(api.approve_transfer("t-1").await.unwrap());
        assert!(!api.approve_transfer("t-1").await.unwrap());
        assert_eq!(
            api.get_transfer_status("t-1").await.unwrap().kind,
            UnitStatusKind::Processing
        );
        assert_eq!(api.approvals().await.len(), 2);
    }

    #[tokio::test]
    async fn test_next_error_is_one_shot() {
        let api = MockPreservationApi::new();
        api.set_next_error(ApiError::RemoteUnavailable("down".to_string()))
            .await;

        assert!(api.get_transfer_status("t-1").await.is_err());
        assert_eq!(
            api.get_transfer_status("t-1").await.unwrap().kind,
            UnitStatusKind::NotFound
        );
    }
}
