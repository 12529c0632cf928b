use std::fmt;
use std::io::Write;
use std::marker::PhantomData;

use http::{HeaderName, HeaderValue, Method, Version};

use super::body::BodyWriter;
use crate::Error;

/// The one request of an exchange.
///
/// Headers are an ordered list where names may repeat. The request is built
/// once and not changed after the encoder starts writing it.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    method: Method,
    uri: String,
    version: Version,
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl OutboundRequest {
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        OutboundRequest {
            method,
            uri: uri.into(),
            version: Version::HTTP_11,
            headers: Vec::new(),
        }
    }

    /// Append a header. Earlier headers of the same name are kept.
    pub fn header<K, V>(mut self, key: K, value: V) -> Result<Self, Error>
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        let name = HeaderName::try_from(key).map_err(|e| -> http::Error { e.into() })?;
        let value = HeaderValue::try_from(value).map_err(|e| -> http::Error { e.into() })?;
        self.headers.push((name, value));
        Ok(self)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &[(HeaderName, HeaderValue)] {
        &self.headers
    }
}

pub mod state {
    pub struct SendHead(());
    pub struct SendBody(());
}
use self::state::*;

/// Writes an [`OutboundRequest`] as HTTP/1.1 bytes.
///
/// The head is written first, then optional body, then the end marker:
///
/// ```
/// # use oneshot_http::codec::{OutboundRequest, RequestEncoder};
/// # use oneshot_http::http::Method;
/// let req = OutboundRequest::new(Method::GET, "/page")
///     .header("host", "foo.test").unwrap();
///
/// let mut out = vec![];
/// let enc = RequestEncoder::new(&req).unwrap().write_head(&mut out);
/// enc.write_end(&mut out).unwrap();
///
/// assert_eq!(out, b"GET /page HTTP/1.1\r\nhost: foo.test\r\n\r\n");
/// ```
pub struct RequestEncoder<'a, S> {
    request: &'a OutboundRequest,
    body: BodyWriter,
    _ph: PhantomData<S>,
}

impl<'a> RequestEncoder<'a, SendHead> {
    pub fn new(request: &'a OutboundRequest) -> Result<Self, Error> {
        let body = BodyWriter::for_request(request.headers())?;

        Ok(RequestEncoder {
            request,
            body,
            _ph: PhantomData,
        })
    }

    pub fn write_head(self, out: &mut Vec<u8>) -> RequestEncoder<'a, SendBody> {
        let r = self.request;

        // Writing to a Vec does not fail.
        let _ = write!(out, "{} {} {:?}\r\n", r.method, r.uri, r.version);

        for (name, value) in &r.headers {
            out.extend_from_slice(name.as_str().as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }

        out.extend_from_slice(b"\r\n");

        trace!("Request head: {} bytes", out.len());

        RequestEncoder {
            request: self.request,
            body: self.body,
            _ph: PhantomData,
        }
    }
}

impl<'a> RequestEncoder<'a, SendBody> {
    pub fn write_body(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<(), Error> {
        self.body.write(input, out)
    }

    /// Finish the request. Consumes the encoder.
    pub fn write_end(mut self, out: &mut Vec<u8>) -> Result<(), Error> {
        self.body.finish(out)
    }
}

impl<'a, S> fmt::Debug for RequestEncoder<'a, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestEncoder")
            .field("method", &self.request.method)
            .field("body", &self.body)
            .finish()
    }
}
