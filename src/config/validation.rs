use crate::config::types::{Config, CrawlerConfig, OutputConfig, UserAgentConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_output_config(&config.output)?;
    validate_user_agent_config(&config.user_agent)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    let start_url = config
        .start_url
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .ok_or(ConfigError::Missing("start-url"))?;
    validate_start_url(start_url)?;

    if config.workers < 1 || config.workers > 64 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 64, got {}",
            config.workers
        )));
    }

    if config.http_timeout < 1 || config.http_timeout > 300 {
        return Err(ConfigError::Validation(format!(
            "http-timeout must be between 1 and 300 seconds, got {}",
            config.http_timeout
        )));
    }

    if config.pause_between_jobs < 10 || config.pause_between_jobs > 10_000 {
        return Err(ConfigError::Validation(format!(
            "pause-between-jobs must be between 10 and 10000 ms, got {}ms",
            config.pause_between_jobs
        )));
    }

    if let Some(list) = &config.public_suffix_list {
        if !list.is_file() {
            return Err(ConfigError::Validation(format!(
                "public-suffix-list {} is not a file",
                list.display()
            )));
        }
    }

    Ok(())
}

/// The start URL must be absolute, http(s), and carry a host
fn validate_start_url(raw: &str) -> Result<(), ConfigError> {
    let url = Url::parse(raw)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid start-url '{}': {}", raw, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "start-url '{}' must use the http or https scheme",
            raw
        )));
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(ConfigError::InvalidUrl(format!(
            "start-url '{}' has no host",
            raw
        )));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    let output_dir = config
        .output_dir
        .as_ref()
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or(ConfigError::Missing("output-dir"))?;

    if !output_dir.is_dir() {
        return Err(ConfigError::Validation(format!(
            "output-dir '{}' must be an existing directory",
            output_dir.display()
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler-name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler-name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    if config.crawler_version.trim().is_empty() {
        return Err(ConfigError::Validation(
            "crawler-version cannot be empty".to_string(),
        ));
    }

    if let Some(contact_url) = &config.contact_url {
        Url::parse(contact_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact-url: {}", e)))?;
    }

    Ok(())
}
