use std::fmt;

use http::{HeaderMap, Method, StatusCode, Version};

use super::chunk::Dechunker;
use crate::util::compare_lowercase_ascii;
use crate::{DecodeError, Error};

/// How the request body is framed on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) enum BodyWriter {
    #[default]
    None,
    /// Content-length delimited. The value is what's left to send.
    Sized(u64),
    Chunked { ended: bool },
}

impl BodyWriter {
    pub fn for_request(headers: &[(http::HeaderName, http::HeaderValue)]) -> Result<Self, Error> {
        let mut mode = BodyWriter::None;

        for (name, value) in headers {
            if *name == http::header::TRANSFER_ENCODING {
                let v = value.to_str().map_err(|e| Error::BadHeader(e.to_string()))?;
                if v.split(',').any(|v| compare_lowercase_ascii(v.trim(), "chunked")) {
                    return Ok(BodyWriter::Chunked { ended: false });
                }
            } else if *name == http::header::CONTENT_LENGTH {
                let len = value
                    .to_str()
                    .ok()
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .ok_or_else(|| Error::BadHeader("content-length not a number".into()))?;
                mode = BodyWriter::Sized(len);
            }
        }

        Ok(mode)
    }

    /// Append `input` as body to `out`.
    pub fn write(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<(), Error> {
        if input.is_empty() {
            return Ok(());
        }

        match self {
            BodyWriter::None => Err(Error::UnframedBody),
            BodyWriter::Sized(left) => {
                if input.len() as u64 > *left {
                    return Err(Error::BodyLargerThanContentLength);
                }
                out.extend_from_slice(input);
                *left -= input.len() as u64;
                Ok(())
            }
            BodyWriter::Chunked { ended: true } => Err(Error::UnframedBody),
            BodyWriter::Chunked { .. } => {
                out.extend_from_slice(format!("{:x}\r\n", input.len()).as_bytes());
                out.extend_from_slice(input);
                out.extend_from_slice(b"\r\n");
                Ok(())
            }
        }
    }

    /// Append the end-of-body marker, if the framing has one.
    pub fn finish(&mut self, out: &mut Vec<u8>) -> Result<(), Error> {
        match self {
            BodyWriter::None => Ok(()),
            BodyWriter::Sized(0) => Ok(()),
            BodyWriter::Sized(_) => Err(Error::UnfinishedRequest),
            BodyWriter::Chunked { ended } => {
                if !*ended {
                    out.extend_from_slice(b"0\r\n\r\n");
                    *ended = true;
                }
                Ok(())
            }
        }
    }
}

/// How the response body is delimited.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum BodyReader {
    /// No body is expected either due to the status or method.
    NoBody,
    /// Delimited by content-length. The value is what's left to receive.
    LengthDelimited(u64),
    /// Chunked transfer encoding
    Chunked(Dechunker),
    /// Expect remote to close at end of body.
    CloseDelimited,
}

impl BodyReader {
    pub fn for_response(
        version: Version,
        method: &Method,
        status: StatusCode,
        headers: &HeaderMap,
    ) -> Result<Self, DecodeError> {
        let has_no_body =
            // All responses to HEAD MUST NOT include a message-body.
            method == Method::HEAD ||
            // A client MUST ignore Content-Length or Transfer-Encoding in a
            // successful response to CONNECT.
            status.is_success() && method == Method::CONNECT ||
            // 1xx, 204 and 304 MUST NOT include a message-body.
            status.is_informational() ||
            matches!(status.as_u16(), 204 | 304);

        if has_no_body {
            return Ok(Self::NoBody);
        }

        let chunked = headers
            .get_all(http::header::TRANSFER_ENCODING)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .any(|v| compare_lowercase_ascii(v.trim(), "chunked"));

        if chunked && version != Version::HTTP_10 {
            // A non-identity transfer-coding overrides Content-Length.
            return Ok(Self::Chunked(Dechunker::new()));
        }

        let mut content_length: Option<u64> = None;

        for value in headers.get_all(http::header::CONTENT_LENGTH) {
            let v = value
                .to_str()
                .ok()
                .and_then(|v| v.trim().parse::<u64>().ok())
                .ok_or(DecodeError::BadContentLengthHeader)?;

            match content_length {
                Some(prev) if prev != v => return Err(DecodeError::TooManyContentLengthHeaders),
                _ => content_length = Some(v),
            }
        }

        Ok(match content_length {
            Some(len) => Self::LengthDelimited(len),
            None => Self::CloseDelimited,
        })
    }

    /// Move body bytes from `src` to `dst`. Returns how much of `src` was used.
    pub fn read(&mut self, src: &[u8], dst: &mut Vec<u8>) -> Result<usize, DecodeError> {
        match self {
            BodyReader::NoBody => Ok(0),
            BodyReader::LengthDelimited(left) => {
                let left_usize = (*left).min(usize::MAX as u64) as usize;
                let to_read = src.len().min(left_usize);

                dst.extend_from_slice(&src[..to_read]);
                *left -= to_read as u64;

                Ok(to_read)
            }
            BodyReader::Chunked(dechunker) => dechunker.decode(src, dst),
            BodyReader::CloseDelimited => {
                dst.extend_from_slice(src);
                Ok(src.len())
            }
        }
    }

    pub fn is_ended(&self) -> bool {
        match self {
            BodyReader::NoBody => true,
            BodyReader::LengthDelimited(v) => *v == 0,
            BodyReader::Chunked(v) => v.is_ended(),
            BodyReader::CloseDelimited => false,
        }
    }

    pub fn is_close_delimited(&self) -> bool {
        matches!(self, BodyReader::CloseDelimited)
    }
}

impl fmt::Debug for BodyReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoBody => write!(f, "NoBody"),
            Self::LengthDelimited(arg0) => f.debug_tuple("LengthDelimited").field(arg0).finish(),
            Self::Chunked(_) => write!(f, "Chunked"),
            Self::CloseDelimited => write!(f, "CloseDelimited"),
        }
    }
}

#[cfg(test)]
mod test {
    use http::{HeaderName, HeaderValue};

    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.append(*k, HeaderValue::from_static(*v));
        }
        map
    }

    #[test]
    fn head_has_no_body() {
        let h = headers(&[("content-length", "10")]);
        let r = BodyReader::for_response(Version::HTTP_11, &Method::HEAD, StatusCode::OK, &h);
        assert_eq!(r, Ok(BodyReader::NoBody));
    }

    #[test]
    fn no_content_has_no_body() {
        let h = headers(&[]);
        let r = BodyReader::for_response(
            Version::HTTP_11,
            &Method::GET,
            StatusCode::NO_CONTENT,
            &h,
        );
        assert_eq!(r, Ok(BodyReader::NoBody));
    }

    #[test]
    fn chunked_overrides_length() {
        let h = headers(&[("content-length", "10"), ("transfer-encoding", "chunked")]);
        let r = BodyReader::for_response(Version::HTTP_11, &Method::GET, StatusCode::OK, &h);
        assert!(matches!(r, Ok(BodyReader::Chunked(_))));
    }

    #[test]
    fn conflicting_lengths() {
        let h = headers(&[("content-length", "10"), ("content-length", "11")]);
        let r = BodyReader::for_response(Version::HTTP_11, &Method::GET, StatusCode::OK, &h);
        assert_eq!(r, Err(DecodeError::TooManyContentLengthHeaders));
    }

    #[test]
    fn repeated_equal_lengths() {
        let h = headers(&[("content-length", "10"), ("content-length", "10")]);
        let r = BodyReader::for_response(Version::HTTP_11, &Method::GET, StatusCode::OK, &h);
        assert_eq!(r, Ok(BodyReader::LengthDelimited(10)));
    }

    #[test]
    fn no_framing_is_close_delimited() {
        let h = headers(&[]);
        let r = BodyReader::for_response(Version::HTTP_11, &Method::GET, StatusCode::OK, &h);
        assert_eq!(r, Ok(BodyReader::CloseDelimited));
    }

    #[test]
    fn writer_sized() {
        let hs = vec![(
            HeaderName::from_static("content-length"),
            HeaderValue::from_static("5"),
        )];
        let mut w = BodyWriter::for_request(&hs).unwrap();
        let mut out = vec![];

        w.write(b"hel", &mut out).unwrap();
        assert!(matches!(w.finish(&mut out), Err(Error::UnfinishedRequest)));
        w.write(b"lo", &mut out).unwrap();
        assert!(matches!(
            w.write(b"!", &mut out),
            Err(Error::BodyLargerThanContentLength)
        ));
        w.finish(&mut out).unwrap();

        assert_eq!(out, b"hello");
    }

    #[test]
    fn writer_chunked() {
        let hs = vec![(
            HeaderName::from_static("transfer-encoding"),
            HeaderValue::from_static("chunked"),
        )];
        let mut w = BodyWriter::for_request(&hs).unwrap();
        let mut out = vec![];

        w.write(b"hallo", &mut out).unwrap();
        w.finish(&mut out).unwrap();
        w.finish(&mut out).unwrap();

        assert_eq!(out, b"5\r\nhallo\r\n0\r\n\r\n");
    }

    #[test]
    fn writer_without_framing() {
        let mut w = BodyWriter::for_request(&[]).unwrap();
        let mut out = vec![];
        assert!(matches!(w.write(b"x", &mut out), Err(Error::UnframedBody)));
        w.finish(&mut out).unwrap();
        assert!(out.is_empty());
    }
}
