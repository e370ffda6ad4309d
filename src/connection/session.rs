//! Session-establishment header suppliers
//!
//! The service expects the socket upgrade to carry the cookies its web page
//! hands out. The connection manager treats the value as an opaque string.

use crate::config::UserAgentConfig;
use crate::ConnectionError;
use async_trait::async_trait;
use reqwest::header::SET_COOKIE;
use reqwest::Client;
use std::time::Duration;

/// Supplies the session header sent when a socket is opened
#[async_trait]
pub trait SessionSupplier: Send + Sync + 'static {
    /// Returns the header value, or `None` to connect without one
    async fn session_header(&self) -> Result<Option<String>, ConnectionError>;
}

/// A fixed session header (or none)
#[derive(Debug, Clone, Default)]
pub struct StaticSession(pub Option<String>);

#[async_trait]
impl SessionSupplier for StaticSession {
    async fn session_header(&self) -> Result<Option<String>, ConnectionError> {
        Ok(self.0.clone())
    }
}

/// Fetches a page over HTTP and turns its `Set-Cookie` headers into a
/// `Cookie` header value
pub struct HttpSessionPrefetch {
    client: Client,
    url: String,
}

impl HttpSessionPrefetch {
    /// Creates a prefetcher for `url`
    ///
    /// # Arguments
    ///
    /// * `url` - Page that sets the session cookies
    /// * `user_agent` - User agent configuration for the HTTP client
    pub fn new(url: impl Into<String>, user_agent: &UserAgentConfig) -> Result<Self, ConnectionError> {
        let client = build_http_client(user_agent)
            .map_err(|e| ConnectionError::Session(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

/// Builds the HTTP client used for session prefetch
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Folds `Set-Cookie` values into one `Cookie` header value
///
/// Only the `name=value` part of each cookie is kept; attributes such as
/// `Path` or `HttpOnly` are dropped.
pub fn fold_cookies<'a>(set_cookies: impl IntoIterator<Item = &'a str>) -> Option<String> {
    let pairs: Vec<&str> = set_cookies
        .into_iter()
        .filter_map(|cookie| cookie.split(';').next())
        .map(str::trim)
        .filter(|pair| pair.contains('='))
        .collect();

    if pairs.is_empty() {
        None
    } else {
        Some(pairs.join("; "))
    }
}

#[async_trait]
impl SessionSupplier for HttpSessionPrefetch {
    async fn session_header(&self) -> Result<Option<String>, ConnectionError> {
        tracing::debug!("Prefetching session from {}", self.url);

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| ConnectionError::Session(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ConnectionError::Session(format!(
                "{} answered HTTP {}",
                self.url, status
            )));
        }

        let cookie = fold_cookies(
            response
                .headers()
                .get_all(SET_COOKIE)
                .iter()
                .filter_map(|v| v.to_str().ok()),
        );

        if cookie.is_none() {
            tracing::warn!("Session prefetch from {} set no cookies", self.url);
        }

        Ok(cookie)
    }
}
