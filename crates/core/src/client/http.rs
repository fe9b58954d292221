//! HTTP implementation of the preservation platform API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::{HttpConfig, ServiceConfig};

use super::{ApiError, PackageInfo, PreservationApi, ReingestType, UnitStatus, UnitStatusKind};

/// Extensions of package files the storage backend keeps compressed.
const COMPRESSED_EXTENSIONS: &[&str] = &[".7z", ".tar.gz", ".tgz", ".tar.bz2", ".zip"];

/// Client for the Archivematica dashboard (pipeline) and Storage Service APIs.
pub struct HttpPreservationClient {
    client: Client,
    pipeline: ServiceConfig,
    storage: ServiceConfig,
    retry_delay: Duration,
}

impl HttpPreservationClient {
    /// Create a new client. Both services share the timeout and retry policy.
    pub fn new(
        pipeline: ServiceConfig,
        storage: ServiceConfig,
        http: &HttpConfig,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(http.timeout_secs as u64))
            .build()
            .map_err(|e| ApiError::Client(e.to_string()))?;

        Ok(Self {
            client,
            pipeline,
            storage,
            retry_delay: Duration::from_millis(http.retry_delay_ms),
        })
    }

    fn url(service: &ServiceConfig, path: &str) -> String {
        format!("{}{}", service.url.trim_end_matches('/'), path)
    }

    fn auth_header(service: &ServiceConfig) -> String {
        format!("ApiKey {}:{}", service.user, service.api_key)
    }

    fn get(&self, service: &ServiceConfig, url: &str) -> RequestBuilder {
        self.client
            .get(url)
            .header(header::AUTHORIZATION, Self::auth_header(service))
    }

    fn post(&self, service: &ServiceConfig, url: &str) -> RequestBuilder {
        self.client
            .post(url)
            .header(header::AUTHORIZATION, Self::auth_header(service))
    }

    /// Send a request, retrying once on transport failure or 5xx.
    ///
    /// 4xx responses are returned to the caller untouched.
    async fn send<F>(&self, what: &str, build: F) -> Result<Response, ApiError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut last_error = String::new();

        for attempt in 1..=2 {
            match build().send().await {
                Ok(response) if response.status().is_server_error() => {
                    last_error = format!("HTTP {}", response.status());
                }
                Ok(response) => return Ok(response),
                Err(e) => {
                    last_error = if e.is_timeout() {
                        format!("timeout: {}", e)
                    } else if e.is_connect() {
                        format!("connection failed: {}", e)
                    } else {
                        e.to_string()
                    };
                }
            }

            if attempt == 1 {
                warn!(request = what, error = %last_error, "Transient failure, retrying once");
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        Err(ApiError::RemoteUnavailable(format!(
            "{}: {}",
            what, last_error
        )))
    }

    async fn read_json<T: for<'de> Deserialize<'de>>(
        what: &str,
        response: Response,
    ) -> Result<T, ApiError> {
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::RemoteUnavailable(format!("{}: {}", what, e)))?;
        serde_json::from_str(&body).map_err(|e| {
            ApiError::InvalidResponse(format!(
                "{}: {} (body: {})",
                what,
                e,
                body.chars().take(200).collect::<String>()
            ))
        })
    }

    /// Extract an error message from a rejection body, falling back to the
    /// HTTP status.
    async fn rejection_message(response: Response) -> String {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.message)
            .unwrap_or_else(|| {
                format!(
                    "HTTP {}: {}",
                    status,
                    body.chars().take(200).collect::<String>()
                )
            })
    }

    async fn unit_status(&self, unit_type: &str, unit_id: &str) -> Result<UnitStatus, ApiError> {
        let what = format!("{} status {}", unit_type, unit_id);
        let url = Self::url(
            &self.pipeline,
            &format!(
                "/api/{}/status/{}/",
                unit_type,
                urlencoding::encode(unit_id)
            ),
        );

        let response = self.send(&what, || self.get(&self.pipeline, &url)).await?;

        // The dashboard answers 400 ("Cannot fetch unit...") for unknown units
        if matches!(
            response.status(),
            StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND
        ) {
            debug!(unit_type, unit_id, "Unit not found at this stage");
            return Ok(UnitStatus::not_found());
        }
        if !response.status().is_success() {
            return Err(ApiError::RemoteRejected(
                Self::rejection_message(response).await,
            ));
        }

        let body: PipelineUnitStatus = Self::read_json(&what, response).await?;
        let kind = UnitStatusKind::from_remote(&body.status).ok_or_else(|| {
            ApiError::InvalidResponse(format!("{}: unknown status {}", what, body.status))
        })?;

        Ok(UnitStatus {
            kind,
            sip_id: body.sip_uuid,
            directory: body.directory,
            message: body.message.or(body.microservice),
        })
    }

    /// One page of a Storage Service listing.
    async fn fetch_page<T: for<'de> Deserialize<'de>>(
        &self,
        what: &str,
        url: &str,
    ) -> Result<Page<T>, ApiError> {
        let response = self.send(what, || self.get(&self.storage, url)).await?;
        if !response.status().is_success() {
            return Err(ApiError::RemoteRejected(
                Self::rejection_message(response).await,
            ));
        }
        Self::read_json(what, response).await
    }

    /// URL of the page after `meta`, absolute or relative to the storage base.
    fn next_page(&self, meta: PageMeta) -> Option<String> {
        match meta.next {
            Some(next) if next.starts_with("http") => Some(next),
            Some(next) if !next.is_empty() => Some(Self::url(&self.storage, &next)),
            _ => None,
        }
    }
}

/// Last non-empty path segment of a resource URI such as
/// `/api/v2/pipeline/<uuid>/`.
fn resource_id(uri: &str) -> Option<&str> {
    uri.trim_end_matches('/').rsplit('/').next().filter(|s| !s.is_empty())
}

fn is_compressed(path: &str) -> bool {
    let lower = path.to_lowercase();
    COMPRESSED_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PipelineUnitStatus {
    status: String,
    #[serde(default)]
    sip_uuid: Option<String>,
    #[serde(default)]
    directory: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    microservice: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SsPackage {
    uuid: String,
    #[serde(default)]
    current_path: String,
    #[serde(default)]
    current_location: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    status: String,
    #[serde(default)]
    origin_pipeline: Option<String>,
}

impl SsPackage {
    fn into_package_info(self) -> PackageInfo {
        PackageInfo {
            pipeline_id: self
                .origin_pipeline
                .as_deref()
                .and_then(resource_id)
                .map(str::to_string),
            package_id: self.uuid,
            current_location: self.current_location,
            current_path: self.current_path,
            size: self.size,
            status: self.status,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct PageMeta {
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default)]
    meta: PageMeta,
    objects: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct ReingestResponse {
    reingest_uuid: String,
}

#[derive(Debug, Deserialize)]
struct UnapprovedTransfers {
    #[serde(default)]
    results: Vec<UnapprovedTransfer>,
}

#[derive(Debug, Deserialize)]
struct UnapprovedTransfer {
    uuid: String,
    directory: String,
    #[serde(rename = "type")]
    transfer_type: String,
}

#[derive(Debug, Deserialize)]
struct PipelineEntry {
    uuid: String,
}

#[async_trait]
impl PreservationApi for HttpPreservationClient {
    async fn get_package_detail(&self, package_id: &str) -> Result<PackageInfo, ApiError> {
        let url = Self::url(
            &self.storage,
            &format!("/api/v2/file/{}/", urlencoding::encode(package_id)),
        );
        let response = self
            .send("package detail", || self.get(&self.storage, &url))
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(package_id.to_string()));
        }
        if !response.status().is_success() {
            return Err(ApiError::RemoteRejected(
                Self::rejection_message(response).await,
            ));
        }

        let package: SsPackage = Self::read_json("package detail", response).await?;
        Ok(package.into_package_info())
    }

    async fn list_compressed_packages(
        &self,
        pipeline_filter: Option<&str>,
    ) -> Result<Vec<String>, ApiError> {
        let mut url = Self::url(&self.storage, "/api/v2/file/?package_type=AIP");
        let mut matching = Vec::new();
        let mut pages = 0usize;

        loop {
            let page: Page<SsPackage> = self.fetch_page("list packages", &url).await?;
            pages += 1;

            for package in page.objects {
                if package.status != "UPLOADED" || !is_compressed(&package.current_path) {
                    continue;
                }
                if let Some(pipeline_id) = pipeline_filter {
                    let origin = package.origin_pipeline.as_deref().and_then(resource_id);
                    if origin != Some(pipeline_id) {
                        continue;
                    }
                }
                matching.push(package.uuid);
            }

            match self.next_page(page.meta) {
                Some(next) => url = next,
                None => break,
            }
        }

        debug!(pages, matching = matching.len(), "Listed compressed packages");
        Ok(matching)
    }

    async fn initiate_reingest(
        &self,
        pipeline_id: &str,
        package_id: &str,
        reingest_type: ReingestType,
        processing_config: &str,
    ) -> Result<String, ApiError> {
        let url = Self::url(
            &self.storage,
            &format!("/api/v2/file/{}/reingest/", urlencoding::encode(package_id)),
        );
        let body = serde_json::json!({
            "pipeline": pipeline_id,
            "reingest_type": reingest_type.as_str(),
            "processing_config": processing_config,
        });

        let response = self
            .send("initiate reingest", || {
                self.post(&self.storage, &url).json(&body)
            })
            .await?;

        if response.status() != StatusCode::ACCEPTED {
            return Err(ApiError::RemoteRejected(
                Self::rejection_message(response).await,
            ));
        }

        let accepted: ReingestResponse = Self::read_json("initiate reingest", response).await?;
        Ok(accepted.reingest_uuid)
    }

    async fn get_transfer_status(&self, transfer_id: &str) -> Result<UnitStatus, ApiError> {
        self.unit_status("transfer", transfer_id).await
    }

    async fn get_ingest_status(&self, sip_id: &str) -> Result<UnitStatus, ApiError> {
        self.unit_status("ingest", sip_id).await
    }

    async fn approve_transfer(&self, transfer_id: &str) -> Result<bool, ApiError> {
        let list_url = Self::url(&self.pipeline, "/api/transfer/unapproved");
        let response = self
            .send("unapproved transfers", || self.get(&self.pipeline, &list_url))
            .await?;
        if !response.status().is_success() {
            warn!(
                transfer_id,
                status = %response.status(),
                "Could not list unapproved transfers"
            );
            return Ok(false);
        }

        let waiting: UnapprovedTransfers =
            Self::read_json("unapproved transfers", response).await?;
        let Some(transfer) = waiting.results.into_iter().find(|t| t.uuid == transfer_id) else {
            debug!(transfer_id, "Transfer not waiting for approval");
            return Ok(false);
        };

        let approve_url = Self::url(&self.pipeline, "/api/transfer/approve/");
        let form = [
            ("type", transfer.transfer_type.as_str()),
            ("directory", transfer.directory.as_str()),
        ];
        let response = self
            .send("approve transfer", || {
                self.post(&self.pipeline, &approve_url).form(&form)
            })
            .await?;

        if response.status().is_success() {
            debug!(transfer_id, directory = %transfer.directory, "Transfer approved");
            Ok(true)
        } else {
            warn!(
                transfer_id,
                status = %response.status(),
                "Approval request refused"
            );
            Ok(false)
        }
    }

    async fn pipeline_exists(&self, pipeline_id: &str) -> Result<bool, ApiError> {
        let mut url = Self::url(&self.storage, "/api/v2/pipeline/");
        loop {
            let page: Page<PipelineEntry> = self.fetch_page("list pipelines", &url).await?;
            if page.objects.iter().any(|p| p.uuid == pipeline_id) {
                return Ok(true);
            }
            match self.next_page(page.meta) {
                Some(next) => url = next,
                None => return Ok(false),
            }
        }
    }

    async fn processing_config_exists(&self, name: &str) -> Result<bool, ApiError> {
        let url = Self::url(
            &self.pipeline,
            &format!(
                "/api/processing-configuration/{}/",
                urlencoding::encode(name)
            ),
        );
        let response = self
            .send("processing configuration", || self.get(&self.pipeline, &url))
            .await?;

        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(ApiError::RemoteRejected(
                Self::rejection_message(response).await,
            )),
        }
    }
}
