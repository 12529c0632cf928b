//! HTTP/1.1 wire codec.
//!
//! Sans-IO: the encoder appends bytes to a `Vec<u8>` and the decoder is fed
//! bytes as they arrive. Neither touches a socket.

use std::fmt;

use http::{HeaderMap, StatusCode, Version};

mod body;
mod chunk;
mod decode;
mod encode;

pub use decode::ResponseDecoder;
pub use encode::{state, OutboundRequest, RequestEncoder};

/// Max number of headers parsed in one response head.
pub const MAX_RESPONSE_HEADERS: usize = 128;

/// Max bytes buffered while waiting for a complete response head.
pub const MAX_RESPONSE_HEAD_SIZE: usize = 64 * 1024;

/// One step of a decoded response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseEvent {
    Head(ResponseHead),
    BodyChunk(Vec<u8>),
    End,
}

/// Status line and headers of a response.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseHead {
    pub version: Version,
    pub status: StatusCode,
    /// Reason phrase as sent by the server. May be empty.
    pub reason: String,
    pub headers: HeaderMap,
}

impl ResponseHead {
    /// The status line without trailing crlf, i.e. `HTTP/1.1 200 OK`.
    pub fn status_line(&self) -> String {
        let mut s = format!("{:?} {}", self.version, self.status.as_u16());
        if !self.reason.is_empty() {
            s.push(' ');
            s.push_str(&self.reason);
        }
        s
    }
}

impl fmt::Display for ResponseHead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.status_line())
    }
}
