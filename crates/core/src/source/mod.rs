//! Candidate selection: which packages a run should consider.

mod list;

use std::path::PathBuf;

use thiserror::Error;
use tracing::info;

use crate::client::{ApiError, PreservationApi};

pub use list::{compare_lists, parse_package_list, read_package_list, ListComparison};

/// Errors that can occur selecting candidates.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The list file could not be read.
    #[error("Cannot read package list {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The list file is not a JSON array of package UUIDs.
    #[error("Malformed package list: {0}")]
    Malformed(String),

    /// The storage query failed.
    #[error("Storage query failed")]
    Api(#[from] ApiError),
}

/// Where a run takes its candidates from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceMode {
    /// A user-supplied JSON list file.
    List(PathBuf),
    /// Compressed packages currently in storage.
    Storage { pipeline_filter: Option<String> },
}

/// Resolves a [`SourceMode`] into package ids.
pub struct SourceSelector<'a> {
    api: &'a dyn PreservationApi,
}

impl<'a> SourceSelector<'a> {
    pub fn new(api: &'a dyn PreservationApi) -> Self {
        Self { api }
    }

    /// Candidate package ids, without duplicates, in source order.
    pub async fn resolve(&self, mode: &SourceMode) -> Result<Vec<String>, SourceError> {
        let candidates = match mode {
            SourceMode::List(path) => read_package_list(path)?,
            SourceMode::Storage { pipeline_filter } => {
                self.api
                    .list_compressed_packages(pipeline_filter.as_deref())
                    .await?
            }
        };
        info!(count = candidates.len(), "Resolved reingest candidates");
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockPreservationApi;
    use tempfile::TempDir;

    const A: &str = "0b6a8b4c-1f3e-4c2d-9a7b-5e6f7a8b9c0d";
    const B: &str = "1c7b9c5d-2a4f-4d3e-8b8c-6f7a8b9c0d1e";

    #[tokio::test]
    async fn test_resolve_list() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("list.json");
        std::fs::write(&path, format!("['{}', '{}', '{}']", A, B, A)).unwrap();

        let api = MockPreservationApi::new();
        let selector = SourceSelector::new(&api);
        let ids = selector.resolve(&SourceMode::List(path)).await.unwrap();
        assert_eq!(ids, vec![A, B]);
    }

    #[tokio::test]
    async fn test_resolve_storage() {
        let api = MockPreservationApi::new();
        api.add_stored_package(A, Some("pipe-1"), true).await;
        api.add_stored_package(B, Some("pipe-2"), true).await;

        let selector = SourceSelector::new(&api);
        let all = selector
            .resolve(&SourceMode::Storage {
                pipeline_filter: None,
            })
            .await
            .unwrap();
        assert_eq!(all, vec![A, B]);

        let filtered = selector
            .resolve(&SourceMode::Storage {
                pipeline_filter: Some("pipe-2".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(filtered, vec![B]);
    }

    #[tokio::test]
    async fn test_resolve_storage_error() {
        let api = MockPreservationApi::new();
        api.set_next_error(ApiError::RemoteUnavailable("down".to_string()))
            .await;

        let selector = SourceSelector::new(&api);
        let result = selector
            .resolve(&SourceMode::Storage {
                pipeline_filter: None,
            })
            .await;
        let err = result.unwrap_err();
        assert!(matches!(err, SourceError::Api(_)));
        // Detail comes from the source, not repeated in the message
        assert_eq!(err.to_string(), "Storage query failed");
    }
}
