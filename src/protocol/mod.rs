//! Wire protocol for the game service socket
//!
//! Every message on the socket is a decimal id optionally followed by a
//! payload string. Bare ids are control messages (ping/pong); ids with a
//! payload carry either an unsolicited push or the response to a request.
//!
//! # Message ids
//!
//! | Id | Meaning |
//! |----|---------|
//! | `2` | Ping from the server |
//! | `3` | Pong reply from the client |
//! | `40` | Namespace connect (client handshake) |
//! | `42` | Event envelope, followed by the correlation id |
//! | `43` | Acknowledgement envelope, followed by the correlation id |

mod frame;

pub use frame::{Frame, RawFrame};

use serde::Serialize;

/// Control id sent by the server to check liveness
pub const PING: u64 = 2;

/// Control id the client must answer every ping with
pub const PONG: u64 = 3;

/// Prefix of the handshake frame identifying the client
pub const CONNECT: u64 = 40;

/// Envelope prefix of outbound requests
pub const EVENT: u64 = 42;

/// Sub-prefix marking a frame as the response to a request
pub const ACK: u64 = 43;

/// Builds an outbound request frame: `42{id}["kind", params]`
///
/// # Arguments
///
/// * `correlation_id` - The id the response will be acknowledged with
/// * `kind` - Event name understood by the server
/// * `params` - Event parameters, serialized as the second array element
pub fn encode_request<P: Serialize>(
    correlation_id: u64,
    kind: &str,
    params: &P,
) -> Result<String, serde_json::Error> {
    let body = serde_json::to_string(&(kind, params))?;
    Ok(format!("{}{}{}", EVENT, correlation_id, body))
}

/// Builds the handshake frame: `40{"token": "..."}`
pub fn encode_handshake(token: &str) -> String {
    let body = serde_json::json!({ "token": token });
    format!("{}{}", CONNECT, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_request() {
        let raw = encode_request(7, "richLogsByIdType", &json!({"id": 3, "page": 1})).unwrap();
        assert_eq!(raw, r#"427["richLogsByIdType",{"id":3,"page":1}]"#);
    }

    #[test]
    fn test_encoded_request_parses_back_as_push() {
        let raw = encode_request(12, "ping", &json!({})).unwrap();
        let frame = Frame::from(RawFrame::parse(&raw));
        assert_eq!(
            frame,
            Frame::Push {
                id: 4212,
                payload: r#"["ping",{}]"#.to_string()
            }
        );
    }

    #[test]
    fn test_encode_handshake() {
        assert_eq!(encode_handshake("abc"), r#"40{"token":"abc"}"#);
    }
}
