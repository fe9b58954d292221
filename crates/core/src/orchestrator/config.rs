//! Orchestrator configuration.

use serde::{Deserialize, Serialize};

use crate::client::ReingestType;

/// Configuration for the reingest orchestrator (`[reingest]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Pipeline packages are reingested into.
    pub pipeline_id: String,

    /// Processing configuration name passed with each initiation.
    #[serde(default = "default_processing_config")]
    pub processing_config: String,

    /// Kind of reingest to request.
    #[serde(default = "default_reingest_type")]
    pub reingest_type: ReingestType,

    /// Maximum packages in progress on the pipeline at once.
    #[serde(default = "default_throttle")]
    pub throttle: usize,

    /// Approval attempts per `USER_INPUT` transfer per run.
    #[serde(default = "default_approval_retries")]
    pub approval_retries: u32,

    /// Pause between approval attempts, and before the first poll of a
    /// freshly started transfer (milliseconds).
    #[serde(default = "default_approval_latency")]
    pub approval_latency_ms: u64,

    /// Poll a transfer right after starting it and approve it if waiting.
    #[serde(default = "default_true")]
    pub approve_on_start: bool,

    /// Only mark a package complete once storage reports it stored again.
    #[serde(default = "default_true")]
    pub confirm_stored: bool,
}

fn default_processing_config() -> String {
    "default".to_string()
}

fn default_reingest_type() -> ReingestType {
    ReingestType::Full
}

fn default_throttle() -> usize {
    1
}

fn default_approval_retries() -> u32 {
    2
}

fn default_approval_latency() -> u64 {
    800
}

fn default_true() -> bool {
    true
}

impl OrchestratorConfig {
    /// Config for a pipeline with every other option at its default.
    pub fn for_pipeline(pipeline_id: impl Into<String>) -> Self {
        Self {
            pipeline_id: pipeline_id.into(),
            processing_config: default_processing_config(),
            reingest_type: default_reingest_type(),
            throttle: default_throttle(),
            approval_retries: default_approval_retries(),
            approval_latency_ms: default_approval_latency(),
            approve_on_start: true,
            confirm_stored: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_pipeline_defaults() {
        let config = OrchestratorConfig::for_pipeline("pipe-1");
        assert_eq!(config.pipeline_id, "pipe-1");
        assert_eq!(config.processing_config, "default");
        assert_eq!(config.reingest_type, ReingestType::Full);
        assert_eq!(config.throttle, 1);
        assert_eq!(config.approval_retries, 2);
        assert_eq!(config.approval_latency_ms, 800);
        assert!(config.approve_on_start);
        assert!(config.confirm_stored);
    }

    #[test]
    fn test_deserialize_minimal() {
        let toml = r#"
            pipeline_id = "pipe-1"
        "#;
        let config: OrchestratorConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.pipeline_id, "pipe-1");
        assert_eq!(config.throttle, 1);
        assert!(config.confirm_stored);
    }

    #[test]
    fn test_deserialize_full() {
        let toml = r#"
            pipeline_id = "pipe-1"
            processing_config = "automated"
            reingest_type = "metadata"
            throttle = 4
            approval_retries = 5
            approval_latency_ms = 0
            approve_on_start = false
            confirm_stored = false
        "#;
        let config: OrchestratorConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.processing_config, "automated");
        assert_eq!(config.reingest_type, ReingestType::Metadata);
        assert_eq!(config.throttle, 4);
        assert_eq!(config.approval_retries, 5);
        assert_eq!(config.approval_latency_ms, 0);
        assert!(!config.approve_on_start);
        assert!(!config.confirm_stored);
    }

    #[test]
    fn test_pipeline_id_required() {
        let result: Result<OrchestratorConfig, _> = toml::from_str("throttle = 2");
        assert!(result.is_err());
    }
}
