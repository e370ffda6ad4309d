use crate::config::types::{
    Config, ConnectionConfig, CrawlerConfig, OutputConfig, UserAgentConfig,
};
use crate::config::CLIENT_TOKEN_ENV;
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_connection_config(&config.connection)?;
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates socket connection configuration
fn validate_connection_config(config: &ConnectionConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid connection url: {}", e)))?;

    if url.scheme() != "ws" && url.scheme() != "wss" {
        return Err(ConfigError::Validation(format!(
            "Connection url '{}' must use the ws or wss scheme",
            config.url
        )));
    }

    if url.query().is_some() {
        return Err(ConfigError::Validation(format!(
            "Connection url '{}' must not carry a query; protocol-version and transport are appended",
            config.url
        )));
    }

    if config.transport.is_empty() {
        return Err(ConfigError::Validation(
            "transport cannot be empty".to_string(),
        ));
    }

    match config.client_token.as_deref() {
        Some(token) if !token.is_empty() => {}
        _ => {
            return Err(ConfigError::Validation(format!(
                "client-token must be set in the config or via {}",
                CLIENT_TOKEN_ENV
            )))
        }
    }

    if let Some(session_url) = &config.session_url {
        let url = Url::parse(session_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid session-url: {}", e)))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Validation(format!(
                "session-url '{}' must use the http or https scheme",
                session_url
            )));
        }
    }

    if config.handshake_timeout < 100 {
        return Err(ConfigError::Validation(format!(
            "handshake-timeout must be >= 100ms, got {}ms",
            config.handshake_timeout
        )));
    }

    if config.reconnect_base_delay == 0 && config.max_reconnect_attempts > 0 {
        return Err(ConfigError::Validation(
            "reconnect-base-delay must be > 0 when reconnects are enabled".to_string(),
        ));
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.shard_count < 1 || config.shard_count > 10_000 {
        return Err(ConfigError::Validation(format!(
            "shard-count must be between 1 and 10000, got {}",
            config.shard_count
        )));
    }

    if config.max_page < 1 || config.max_page > 100_000 {
        return Err(ConfigError::Validation(format!(
            "max-page must be between 1 and 100000, got {}",
            config.max_page
        )));
    }

    // The upstream rate limit is not published; 100ms is the floor we allow
    if config.page_delay < 100 {
        return Err(ConfigError::Validation(format!(
            "page-delay must be >= 100ms, got {}ms",
            config.page_delay
        )));
    }

    if config.fetch_event.is_empty() {
        return Err(ConfigError::Validation(
            "fetch-event cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate client name: non-empty, alphanumeric + hyphens only
    if config.client_name.is_empty() {
        return Err(ConfigError::Validation(
            "client-name cannot be empty".to_string(),
        ));
    }

    if !config
        .client_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "client-name must contain only alphanumeric characters and hyphens, got '{}'",
            config.client_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact-url: {}", e)))?;

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}
