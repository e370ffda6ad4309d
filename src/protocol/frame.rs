//! Inbound frame parsing
//!
//! Parsing never fails: a message without a leading decimal id degrades to
//! the id-0 control frame, which the dispatcher ignores.

use crate::protocol::ACK;

/// A message split into its numeric id and the untouched remainder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// Leading decimal digits of the message
    pub id: u64,

    /// Everything after the leading digits, verbatim
    pub payload: String,
}

impl RawFrame {
    /// Splits a raw socket message into id and payload
    ///
    /// * `"2"` → id 2, empty payload
    /// * `"431[{...}]"` → id 431, payload `[{...}]`
    /// * `"hello"`, `""`, or an id overflowing `u64` → id 0, empty payload
    pub fn parse(raw: &str) -> Self {
        let digits = raw.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 {
            return Self::fallback();
        }

        match raw[..digits].parse::<u64>() {
            Ok(id) => Self {
                id,
                payload: raw[digits..].to_string(),
            },
            Err(_) => Self::fallback(),
        }
    }

    fn fallback() -> Self {
        Self {
            id: 0,
            payload: String::new(),
        }
    }

    /// Returns true if this frame carries no payload
    pub fn is_control(&self) -> bool {
        self.payload.is_empty()
    }
}

/// A classified inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Bare control id (ping, pong, or the malformed-input fallback)
    Control { id: u64 },

    /// Acknowledgement of an earlier request
    Response {
        /// The id the request was issued with
        correlation_id: u64,
        /// JSON array whose first element is the result
        payload: String,
    },

    /// Anything else carrying a payload: handshake replies and server events
    Push { id: u64, payload: String },
}

impl Frame {
    /// Parses and classifies a raw socket message
    pub fn parse(raw: &str) -> Self {
        Self::from(RawFrame::parse(raw))
    }
}

impl From<RawFrame> for Frame {
    fn from(raw: RawFrame) -> Self {
        if raw.is_control() {
            return Frame::Control { id: raw.id };
        }

        let text = raw.id.to_string();
        let correlation_id = text
            .strip_prefix(&ACK.to_string())
            .filter(|rest| !rest.is_empty())
            .and_then(|rest| rest.parse::<u64>().ok());

        match correlation_id {
            Some(correlation_id) => Frame::Response {
                correlation_id,
                payload: raw.payload,
            },
            None => Frame::Push {
                id: raw.id,
                payload: raw.payload,
            },
        }
    }
}
