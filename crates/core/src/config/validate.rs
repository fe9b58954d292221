use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Service URLs parse and use http(s)
/// - Pipeline id is a UUID
/// - Throttle is at least 1
/// - HTTP timeout is not 0
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    for (section, service) in [("pipeline", &config.pipeline), ("storage", &config.storage)] {
        let url = reqwest::Url::parse(&service.url).map_err(|e| {
            ConfigError::ValidationError(format!("{}.url is not a valid URL: {}", section, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::ValidationError(format!(
                "{}.url must use http or https",
                section
            )));
        }
        if service.user.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "{}.user cannot be empty",
                section
            )));
        }
    }

    if uuid::Uuid::parse_str(&config.reingest.pipeline_id).is_err() {
        return Err(ConfigError::ValidationError(format!(
            "reingest.pipeline_id is not a UUID: {}",
            config.reingest.pipeline_id
        )));
    }

    if config.reingest.throttle == 0 {
        return Err(ConfigError::ValidationError(
            "reingest.throttle must be at least 1".to_string(),
        ));
    }

    if config.http.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "http.timeout_secs cannot be 0".to_string(),
        ));
    }

    Ok(())
}
