use crate::config::types::{Config, ConnectionConfig};
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;
use url::Url;

/// Environment variable that overrides `connection.client-token`
pub const CLIENT_TOKEN_ENV: &str = "BCONOMY_CLIENT_TOKEN";

/// Loads and parses a configuration file from the given path
///
/// The client token is taken from `BCONOMY_CLIENT_TOKEN` when that variable
/// is set and non-empty, so the secret does not have to live in the file.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    // Read the configuration file
    let content = std::fs::read_to_string(path)?;

    // Parse TOML
    let mut config: Config = toml::from_str(&content)?;

    apply_token_override(&mut config, std::env::var(CLIENT_TOKEN_ENV).ok());

    // Validate the configuration
    validate(&config)?;

    Ok(config)
}

/// Replaces the configured client token with `token` if it is non-empty
fn apply_token_override(config: &mut Config, token: Option<String>) {
    if let Some(token) = token.filter(|t| !t.is_empty()) {
        config.connection.client_token = Some(token);
    }
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Stored with every run so interrupted runs can be matched to the
/// configuration they were started with.
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

/// Builds the socket URL with the protocol query parameters appended
///
/// `wss://host/socket.io/` becomes `wss://host/socket.io/?EIO=4&transport=websocket`.
pub fn endpoint_url(config: &ConnectionConfig) -> Result<Url, ConfigError> {
    let mut url = Url::parse(&config.url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid connection url: {}", e)))?;

    url.query_pairs_mut()
        .append_pair("EIO", &config.protocol_version.to_string())
        .append_pair("transport", &config.transport);

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const VALID_CONFIG: &str = r#"
[connection]
url = "wss://bconomy.net/socket.io/"
client-token = "file-token"
session-url = "https://bconomy.net/"
handshake-timeout = 5000

[crawler]
shard-count = 10
max-page = 20
page-delay = 400

[user-agent]
client-name = "TestSync"
client-version = "1.0"
contact-url = "https://example.com/about"

[output]
database-path = "./test.db"
"#;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    fn parse(content: &str) -> Config {
        toml::from_str(content).unwrap()
    }

    #[test]
    fn test_load_valid_config() {
        let file = create_temp_config(VALID_CONFIG);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.crawler.shard_count, 10);
        assert_eq!(config.crawler.max_page, 20);
        assert_eq!(config.connection.handshake_timeout, 5000);
        assert_eq!(config.connection.protocol_version, 4);
        assert_eq!(config.user_agent.client_name, "TestSync");
    }

    #[test]
    fn test_crawler_section_defaults() {
        let content = VALID_CONFIG.replace(
            "[crawler]\nshard-count = 10\nmax-page = 20\npage-delay = 400\n",
            "",
        );
        let config = parse(&content);

        assert_eq!(config.crawler.shard_count, 165);
        assert_eq!(config.crawler.page_delay, 400);
        assert_eq!(config.crawler.fetch_event, "richLogsByIdType");
        assert!(!config.crawler.stop_on_empty_page);
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let content = VALID_CONFIG.replace("max-page = 20", "max-page = 0");
        let file = create_temp_config(&content);
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_token_override() {
        let mut config = parse(VALID_CONFIG);

        apply_token_override(&mut config, Some(String::new()));
        assert_eq!(config.connection.client_token.as_deref(), Some("file-token"));

        apply_token_override(&mut config, Some("env-token".to_string()));
        assert_eq!(config.connection.client_token.as_deref(), Some("env-token"));
    }

    #[test]
    fn test_endpoint_url_appends_query() {
        let config = parse(VALID_CONFIG);
        let url = endpoint_url(&config.connection).unwrap();
        assert_eq!(
            url.as_str(),
            "wss://bconomy.net/socket.io/?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        // Same content should produce same hash
        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");

        let hash1 = compute_config_hash(file1.path()).unwrap();
        let hash2 = compute_config_hash(file2.path()).unwrap();

        assert_ne!(hash1, hash2);
    }
}
