//! Transport abstraction for the socket connection
//!
//! A transport opens one text-message link and hands back a pair of channels.
//! The connection manager never touches the socket directly, so tests can run
//! the full protocol over [`MemoryTransport`](super::MemoryTransport).

use crate::ConnectionError;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderName, HeaderValue, COOKIE, ORIGIN, USER_AGENT};
use tokio_tungstenite::tungstenite::Message;
use url::Url;

/// Something that happened on the inbound side of a link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text message from the server
    Message(String),

    /// The link was closed, with the peer's reason if one was given
    Closed(Option<String>),

    /// The link failed
    Error(String),
}

/// Both directions of an open link
///
/// Dropping `outbound` closes the link from the client side.
pub struct TransportLink {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Opens text-message links to the game service
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Opens a link to `url`
    ///
    /// `session_header` is the opaque session-establishment value obtained
    /// from the session supplier, sent as the `Cookie` header.
    async fn open(
        &self,
        url: &Url,
        session_header: Option<&str>,
    ) -> Result<TransportLink, ConnectionError>;
}

/// WebSocket transport backed by tokio-tungstenite
pub struct WebSocketTransport {
    user_agent: String,
    origin: Option<String>,
}

impl WebSocketTransport {
    /// Creates a transport sending the given User-Agent and optional Origin
    pub fn new(user_agent: impl Into<String>, origin: Option<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            origin,
        }
    }
}

fn header_value(name: &HeaderName, value: &str) -> Result<HeaderValue, ConnectionError> {
    HeaderValue::from_str(value)
        .map_err(|e| ConnectionError::Transport(format!("Invalid {} header: {}", name, e)))
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(
        &self,
        url: &Url,
        session_header: Option<&str>,
    ) -> Result<TransportLink, ConnectionError> {
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| ConnectionError::Transport(e.to_string()))?;

        let headers = request.headers_mut();
        headers.insert(USER_AGENT, header_value(&USER_AGENT, &self.user_agent)?);
        if let Some(origin) = &self.origin {
            headers.insert(ORIGIN, header_value(&ORIGIN, origin)?);
        }
        if let Some(cookie) = session_header {
            headers.insert(COOKIE, header_value(&COOKIE, cookie)?);
        }

        let (socket, response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| ConnectionError::Transport(e.to_string()))?;
        tracing::debug!("Socket upgraded with status {}", response.status());

        let (mut sink, mut stream) = socket.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound) = mpsc::unbounded_channel();

        // Writer: runs until the connection drops its sender
        tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                if let Err(e) = sink.send(Message::Text(text)).await {
                    tracing::debug!("Socket write failed: {}", e);
                    break;
                }
            }
            let _ = sink.close().await;
        });

        // Reader: always ends with exactly one Closed or Error event
        tokio::spawn(async move {
            let last = loop {
                match stream.next().await {
                    Some(Ok(Message::Text(text))) => {
                        if inbound_tx.send(TransportEvent::Message(text)).is_err() {
                            return;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break TransportEvent::Closed(frame.map(|f| f.reason.to_string()));
                    }
                    // Binary frames and websocket-level ping/pong are not part of the protocol
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break TransportEvent::Error(e.to_string()),
                    None => break TransportEvent::Closed(None),
                }
            };
            let _ = inbound_tx.send(last);
        });

        Ok(TransportLink { outbound, inbound })
    }
}
