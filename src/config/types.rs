use serde::Deserialize;

/// Main configuration structure for Bconomy-Sync
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
}

/// Socket endpoint and handshake configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ConnectionConfig {
    /// Socket endpoint (ws:// or wss://), without protocol query parameters
    pub url: String,

    /// Protocol version sent as the `EIO` query parameter
    #[serde(default = "default_protocol_version")]
    pub protocol_version: u32,

    /// Transport name sent as the `transport` query parameter
    #[serde(default = "default_transport")]
    pub transport: String,

    /// Token identifying this client in the handshake frame
    ///
    /// Overridden by the `BCONOMY_CLIENT_TOKEN` environment variable.
    #[serde(default)]
    pub client_token: Option<String>,

    /// Page fetched over HTTP to obtain session cookies before connecting
    #[serde(default)]
    pub session_url: Option<String>,

    /// Origin header sent with the socket upgrade
    #[serde(default)]
    pub origin: Option<String>,

    /// Time allowed for connect + handshake (milliseconds)
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout: u64,

    /// Per-request timeout (milliseconds, 0 disables)
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    /// Reconnect attempts before a page fetch gives up (0 disables)
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// First reconnect backoff delay (milliseconds), doubled on each attempt
    #[serde(default = "default_reconnect_base_delay")]
    pub reconnect_base_delay: u64,
}

/// Pagination crawl configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Number of shards (item ids) crawled, `0..shard-count`
    #[serde(default = "default_shard_count")]
    pub shard_count: u32,

    /// Highest page fetched per shard
    #[serde(default = "default_max_page")]
    pub max_page: u32,

    /// Fixed delay after every page request (milliseconds)
    #[serde(default = "default_page_delay")]
    pub page_delay: u64,

    /// Event name of the page request
    #[serde(default = "default_fetch_event")]
    pub fetch_event: String,

    /// End a shard early when a page comes back empty
    #[serde(default)]
    pub stop_on_empty_page: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            shard_count: default_shard_count(),
            max_page: default_max_page(),
            page_delay: default_page_delay(),
            fetch_event: default_fetch_event(),
            stop_on_empty_page: false,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the client
    #[serde(rename = "client-name")]
    pub client_name: String,

    /// Version of the client
    #[serde(rename = "client-version")]
    pub client_version: String,

    /// URL with information about the client
    #[serde(rename = "contact-url")]
    pub contact_url: String,
}

impl UserAgentConfig {
    /// Formats the User-Agent header: `Name/Version (+ContactURL)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{})",
            self.client_name, self.client_version, self.contact_url
        )
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

fn default_protocol_version() -> u32 {
    4
}

fn default_transport() -> String {
    "websocket".to_string()
}

fn default_handshake_timeout() -> u64 {
    10_000
}

fn default_request_timeout() -> u64 {
    30_000
}

fn default_max_reconnect_attempts() -> u32 {
    3
}

fn default_reconnect_base_delay() -> u64 {
    500
}

fn default_shard_count() -> u32 {
    165
}

fn default_max_page() -> u32 {
    100
}

fn default_page_delay() -> u64 {
    400
}

fn default_fetch_event() -> String {
    "richLogsByIdType".to_string()
}
