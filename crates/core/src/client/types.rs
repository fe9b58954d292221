//! Types for the preservation platform API.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur talking to the pipeline or the storage backend.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The backend reports no such package.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Transport failure or 5xx, after the retry budget was spent.
    #[error("Remote unavailable: {0}")]
    RemoteUnavailable(String),

    /// Application-level refusal (4xx or an error body).
    #[error("Remote rejected request: {0}")]
    RemoteRejected(String),

    /// The response could not be understood.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Client(String),
}

/// Kind of reingest to request from the storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReingestType {
    /// Re-run the whole workflow (uses the processing configuration).
    Full,
    /// Reprocess metadata only.
    Metadata,
    /// Reprocess objects and metadata.
    Objects,
}

impl ReingestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReingestType::Full => "FULL",
            ReingestType::Metadata => "METADATA_ONLY",
            ReingestType::Objects => "OBJECTS",
        }
    }
}

impl fmt::Display for ReingestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remote status of a transfer or ingest unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitStatusKind {
    Processing,
    /// Waiting on a decision point, e.g. transfer approval.
    UserInput,
    Complete,
    Failed,
    Rejected,
    /// The unit is unknown at this stage. For a transfer this usually means
    /// it has moved on to ingest.
    NotFound,
}

impl UnitStatusKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitStatusKind::Processing => "PROCESSING",
            UnitStatusKind::UserInput => "USER_INPUT",
            UnitStatusKind::Complete => "COMPLETE",
            UnitStatusKind::Failed => "FAILED",
            UnitStatusKind::Rejected => "REJECTED",
            UnitStatusKind::NotFound => "NOT_FOUND",
        }
    }

    /// Parse the status string reported by the pipeline.
    pub fn from_remote(status: &str) -> Option<Self> {
        match status {
            "PROCESSING" => Some(UnitStatusKind::Processing),
            "USER_INPUT" => Some(UnitStatusKind::UserInput),
            "COMPLETE" => Some(UnitStatusKind::Complete),
            "FAILED" => Some(UnitStatusKind::Failed),
            "REJECTED" => Some(UnitStatusKind::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for UnitStatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status report for a transfer or ingest unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitStatus {
    pub kind: UnitStatusKind,
    /// SIP created from a completed transfer, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sip_id: Option<String>,
    /// Directory name of the unit in the pipeline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
    /// Current microservice or failure message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl UnitStatus {
    pub fn new(kind: UnitStatusKind) -> Self {
        Self {
            kind,
            sip_id: None,
            directory: None,
            message: None,
        }
    }

    pub fn not_found() -> Self {
        Self::new(UnitStatusKind::NotFound)
    }

    pub fn with_sip_id(mut self, sip_id: impl Into<String>) -> Self {
        self.sip_id = Some(sip_id.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Storage backend view of an archived package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    pub package_id: String,
    /// Pipeline the package originated from, if known.
    pub pipeline_id: Option<String>,
    /// Storage location URI.
    pub current_location: String,
    /// Path within the location.
    pub current_path: String,
    /// Size in bytes.
    pub size: u64,
    /// Storage status, e.g. `UPLOADED`.
    pub status: String,
}

impl PackageInfo {
    /// Back in storage after processing.
    pub fn is_stored(&self) -> bool {
        self.status == "UPLOADED"
    }
}

/// Typed access to the pipeline and storage backend APIs.
///
/// Each operation maps to one remote call (plus pagination or lookup
/// round-trips where noted).
#[async_trait]
pub trait PreservationApi: Send + Sync {
    /// Describe an archived package.
    async fn get_package_detail(&self, package_id: &str) -> Result<PackageInfo, ApiError>;

    /// Identifiers of stored, compressed AIPs, optionally limited to one
    /// origin pipeline. Follows pagination.
    async fn list_compressed_packages(
        &self,
        pipeline_filter: Option<&str>,
    ) -> Result<Vec<String>, ApiError>;

    /// Ask the storage backend to reingest a package; returns the transfer id.
    async fn initiate_reingest(
        &self,
        pipeline_id: &str,
        package_id: &str,
        reingest_type: ReingestType,
        processing_config: &str,
    ) -> Result<String, ApiError>;

    /// Transfer-stage status. Unknown transfers are `NotFound`, not an error.
    async fn get_transfer_status(&self, transfer_id: &str) -> Result<UnitStatus, ApiError>;

    /// Ingest-stage status. Unknown SIPs are `NotFound`, not an error.
    async fn get_ingest_status(&self, sip_id: &str) -> Result<UnitStatus, ApiError>;

    /// Approve a transfer waiting for approval. `false` when there is nothing
    /// to approve yet.
    async fn approve_transfer(&self, transfer_id: &str) -> Result<bool, ApiError>;

    /// Whether the storage backend knows the pipeline.
    async fn pipeline_exists(&self, pipeline_id: &str) -> Result<bool, ApiError>;

    /// Whether the pipeline has a processing configuration by this name.
    async fn processing_config_exists(&self, name: &str) -> Result<bool, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_status_from_remote() {
        assert_eq!(
            UnitStatusKind::from_remote("USER_INPUT"),
            Some(UnitStatusKind::UserInput)
        );
        assert_eq!(
            UnitStatusKind::from_remote("COMPLETE"),
            Some(UnitStatusKind::Complete)
        );
        assert_eq!(UnitStatusKind::from_remote("complete"), None);
        assert_eq!(UnitStatusKind::from_remote("NOT_FOUND"), None);
    }

    #[test]
    fn test_reingest_type_wire_names() {
        assert_eq!(ReingestType::Full.as_str(), "FULL");
        assert_eq!(ReingestType::Metadata.as_str(), "METADATA_ONLY");
        assert_eq!(ReingestType::Objects.as_str(), "OBJECTS");

        let parsed: ReingestType = serde_json::from_str("\"metadata\"").unwrap();
        assert_eq!(parsed, ReingestType::Metadata);
    }

    #[test]
    fn test_package_is_stored() {
        let mut package = PackageInfo {
            package_id: "aip".to_string(),
            pipeline_id: None,
            current_location: "/api/v2/location/abc/".to_string(),
            current_path: "aip.7z".to_string(),
            size: 10,
            status: "UPLOADED".to_string(),
        };
        assert!(package.is_stored());
        package.status = "DEL_REQ".to_string();
        assert!(!package.is_stored());
    }
}
