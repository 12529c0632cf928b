use std::io;

use thiserror::Error;

/// Terminal failure of an exchange.
///
/// Every variant ends the exchange. Nothing is retried; the error is settled
/// into the completion signal and handed to the caller of [`crate::Driver::run`].
#[derive(Debug, Error)]
pub enum Error {
    #[error("connect to {host}:{port} failed: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("tls handshake failed: {0}")]
    TlsHandshake(String),

    #[error("decode: {0}")]
    Decode(#[from] DecodeError),

    #[error("connection closed before end of response")]
    UnexpectedDisconnect,

    #[error("reader stopped before end of response")]
    ReaderAborted,

    #[error("io: {0}")]
    Io(#[from] io::Error),

    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("bad header: {0}")]
    BadHeader(String),

    #[error("request body without content-length or transfer-encoding")]
    UnframedBody,

    #[error("attempt to write larger body than content-length")]
    BodyLargerThanContentLength,

    #[error("request body ended before content-length was reached")]
    UnfinishedRequest,
}

/// Malformed or unsupported response framing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("http parse fail: {0}")]
    HttpParseFail(String),

    #[error("http parse resulted in too many headers")]
    TooManyHeaders,

    #[error("response head larger than {0} bytes")]
    HeadTooLarge(usize),

    #[error("unsupported http version")]
    UnsupportedVersion,

    #[error("http response missing status")]
    ResponseMissingStatus,

    #[error("content-length header not a number")]
    BadContentLengthHeader,

    #[error("more than one content-length header")]
    TooManyContentLengthHeaders,

    #[error("chunk length is not ascii")]
    ChunkLenNotAscii,

    #[error("chunk length cannot be read as a number")]
    ChunkLenNotANumber,

    #[error("chunk expected crlf as next character")]
    ChunkExpectedCrLf,
}

impl From<httparse::Error> for DecodeError {
    fn from(value: httparse::Error) -> Self {
        match value {
            httparse::Error::TooManyHeaders => DecodeError::TooManyHeaders,
            httparse::Error::Version => DecodeError::UnsupportedVersion,
            e => DecodeError::HttpParseFail(e.to_string()),
        }
    }
}

impl From<rustls::Error> for Error {
    fn from(value: rustls::Error) -> Self {
        Error::TlsHandshake(value.to_string())
    }
}

impl From<http::Error> for Error {
    fn from(value: http::Error) -> Self {
        Error::BadHeader(value.to_string())
    }
}
