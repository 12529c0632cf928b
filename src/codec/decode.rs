use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Version};

use super::body::BodyReader;
use super::{ResponseEvent, ResponseHead, MAX_RESPONSE_HEADERS, MAX_RESPONSE_HEAD_SIZE};
use crate::DecodeError;

/// Incremental response decoder for one exchange.
///
/// Bytes are pushed as they arrive, in whatever pieces the transport hands
/// out. Events are pulled with [`ResponseDecoder::next_event()`] and come out
/// as exactly one `Head`, zero or more `BodyChunk` and one `End`. Interim 1xx
/// heads (other than 101) are consumed without producing an event.
///
/// ```
/// # use oneshot_http::codec::{ResponseDecoder, ResponseEvent};
/// # use oneshot_http::http::Method;
/// let mut dec = ResponseDecoder::new(&Method::GET);
///
/// dec.push(b"HTTP/1.1 200 OK\r\nContent-Len");
/// assert_eq!(dec.next_event().unwrap(), None);
///
/// dec.push(b"gth: 2\r\n\r\nhi");
/// assert!(matches!(dec.next_event().unwrap(), Some(ResponseEvent::Head(_))));
/// assert_eq!(dec.next_event().unwrap(), Some(ResponseEvent::BodyChunk(b"hi".to_vec())));
/// assert_eq!(dec.next_event().unwrap(), Some(ResponseEvent::End));
/// ```
#[derive(Debug)]
pub struct ResponseDecoder {
    method: Method,
    input: Vec<u8>,
    phase: Phase,
}

#[derive(Debug)]
enum Phase {
    Head,
    Body(BodyReader),
    Ended,
}

impl ResponseDecoder {
    /// The request method decides whether a response can carry a body.
    pub fn new(method: &Method) -> Self {
        ResponseDecoder {
            method: method.clone(),
            input: Vec::new(),
            phase: Phase::Head,
        }
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.input.extend_from_slice(bytes);
    }

    /// Push `bytes` and drain every event that is complete.
    pub fn decode(&mut self, bytes: &[u8]) -> Result<Vec<ResponseEvent>, DecodeError> {
        self.push(bytes);

        let mut events = Vec::new();
        while let Some(ev) = self.next_event()? {
            events.push(ev);
        }

        Ok(events)
    }

    /// Next complete event, or `None` if more input is needed.
    pub fn next_event(&mut self) -> Result<Option<ResponseEvent>, DecodeError> {
        match self.phase {
            Phase::Head => {
                let Some(head) = self.try_head()? else {
                    return Ok(None);
                };

                let reader =
                    BodyReader::for_response(head.version, &self.method, head.status, &head.headers)?;

                debug!("Response {} body: {:?}", head.status, reader);

                self.phase = Phase::Body(reader);

                Ok(Some(ResponseEvent::Head(head)))
            }

            Phase::Body(ref mut reader) => {
                if reader.is_ended() {
                    self.phase = Phase::Ended;
                    return Ok(Some(ResponseEvent::End));
                }

                let mut chunk = Vec::new();
                let used = reader.read(&self.input, &mut chunk)?;
                self.input.drain(..used);

                trace!("Read body: {} in, {} out", used, chunk.len());

                if !chunk.is_empty() {
                    return Ok(Some(ResponseEvent::BodyChunk(chunk)));
                }

                if reader.is_ended() {
                    self.phase = Phase::Ended;
                    return Ok(Some(ResponseEvent::End));
                }

                Ok(None)
            }

            Phase::Ended => {
                if !self.input.is_empty() {
                    debug!("Ignore {} bytes after end of response", self.input.len());
                    self.input.clear();
                }
                Ok(None)
            }
        }
    }

    /// The peer closed the connection.
    ///
    /// For a close delimited body this is the end of the response and `End`
    /// is returned. Otherwise the response is incomplete and `None` is returned.
    pub fn eof(&mut self) -> Option<ResponseEvent> {
        match &self.phase {
            Phase::Body(reader) if reader.is_close_delimited() => {
                self.phase = Phase::Ended;
                Some(ResponseEvent::End)
            }
            _ => None,
        }
    }

    pub fn is_ended(&self) -> bool {
        matches!(self.phase, Phase::Ended)
    }

    fn try_head(&mut self) -> Result<Option<ResponseHead>, DecodeError> {
        loop {
            let mut headers = [httparse::EMPTY_HEADER; MAX_RESPONSE_HEADERS];
            let mut res = httparse::Response::new(&mut headers);

            let input_used = match res.parse(&self.input)? {
                httparse::Status::Complete(v) => v,
                httparse::Status::Partial => {
                    if self.input.len() > MAX_RESPONSE_HEAD_SIZE {
                        return Err(DecodeError::HeadTooLarge(MAX_RESPONSE_HEAD_SIZE));
                    }
                    return Ok(None);
                }
            };

            let version = match res.version {
                Some(0) => Version::HTTP_10,
                Some(1) => Version::HTTP_11,
                _ => return Err(DecodeError::UnsupportedVersion),
            };

            let status = res
                .code
                .and_then(|c| StatusCode::from_u16(c).ok())
                .ok_or(DecodeError::ResponseMissingStatus)?;

            let reason = res.reason.unwrap_or_default().to_string();

            let mut map = HeaderMap::with_capacity(res.headers.len());
            for h in res.headers.iter() {
                let name = HeaderName::from_bytes(h.name.as_bytes())
                    .map_err(|e| DecodeError::HttpParseFail(e.to_string()))?;
                let value = HeaderValue::from_bytes(h.value)
                    .map_err(|e| DecodeError::HttpParseFail(e.to_string()))?;
                map.append(name, value);
            }

            self.input.drain(..input_used);

            if status.is_informational() && status != StatusCode::SWITCHING_PROTOCOLS {
                debug!("Skip interim response: {}", status);
                continue;
            }

            return Ok(Some(ResponseHead {
                version,
                status,
                reason,
                headers: map,
            }));
        }
    }
}
