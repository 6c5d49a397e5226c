use crate::config::types::{
    CacheConfig, Config, FetcherConfig, NoticeSearchConfig, OcdsSearchConfig, OutputConfig,
    SourceConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    match &config.source {
        SourceConfig::OcdsSearch(source) => validate_ocds_source(source)?,
        SourceConfig::NoticeSearch(source) => validate_notice_source(source)?,
    }
    validate_fetcher_config(&config.fetcher)?;
    validate_cache_config(&config.cache)?;
    validate_output_config(&config.output)?;
    Ok(())
}

fn validate_ocds_source(source: &OcdsSearchConfig) -> Result<(), ConfigError> {
    validate_http_url("seed-url", &source.seed_url)?;

    if source.page_count_field.is_empty() {
        return Err(ConfigError::Validation(
            "page-count-field cannot be empty".to_string(),
        ));
    }

    if source.page_param.is_empty() {
        return Err(ConfigError::Validation(
            "page-param cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_notice_source(source: &NoticeSearchConfig) -> Result<(), ConfigError> {
    validate_http_url("search-url", &source.search_url)?;
    validate_http_url("detail-url", &source.detail_url)?;
    validate_http_url("notice-url", &source.notice_url)?;

    if source.page_size < 1 {
        return Err(ConfigError::Validation(format!(
            "page-size must be >= 1, got {}",
            source.page_size
        )));
    }

    Ok(())
}

fn validate_fetcher_config(config: &FetcherConfig) -> Result<(), ConfigError> {
    if config.max_requests < 1 {
        return Err(ConfigError::Validation(format!(
            "max-requests must be >= 1, got {}",
            config.max_requests
        )));
    }

    if config.per_ms < 1 {
        return Err(ConfigError::Validation(format!(
            "per-ms must be >= 1, got {}",
            config.per_ms
        )));
    }

    if config.max_in_flight < 1 || config.max_in_flight > 100 {
        return Err(ConfigError::Validation(format!(
            "max-in-flight must be between 1 and 100, got {}",
            config.max_in_flight
        )));
    }

    if config.timeout_ms < 1 {
        return Err(ConfigError::Validation(format!(
            "timeout-ms must be >= 1, got {}",
            config.timeout_ms
        )));
    }

    for status in &config.throttle_statuses {
        if !(400..=599).contains(status) {
            return Err(ConfigError::Validation(format!(
                "throttle-statuses must be HTTP error statuses (400-599), got {}",
                status
            )));
        }
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_cache_config(config: &CacheConfig) -> Result<(), ConfigError> {
    if config.enabled && config.directory.is_empty() {
        return Err(ConfigError::Validation(
            "cache directory cannot be empty when the cache is enabled".to_string(),
        ));
    }
    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.path.is_empty() {
        return Err(ConfigError::Validation(
            "output path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Validates that `value` is an absolute http(s) URL
fn validate_http_url(name: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", name, value, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' must use http or https",
            name, value
        )));
    }

    Ok(())
}
