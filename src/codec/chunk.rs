use core::str;

use crate::util::find_crlf;
use crate::DecodeError;

// Longest chunk size line we accept before the crlf, including extensions.
const MAX_SIZE_LINE: usize = 100;

/// Incremental `transfer-encoding: chunked` decoder.
///
/// Input is offered repeatedly. Only complete size lines are consumed, so a
/// caller keeps unconsumed bytes and offers them again with more appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dechunker {
    Size,
    Chunk(usize),
    CrLf,
    Ending,
    Trailer,
    Ended,
}

impl Dechunker {
    pub fn new() -> Self {
        Dechunker::Size
    }

    pub fn is_ended(&self) -> bool {
        matches!(self, Self::Ended)
    }

    /// Decode as much of `src` as possible, appending chunk data to `dst`.
    ///
    /// Returns how many bytes of `src` were consumed.
    pub fn decode(&mut self, src: &[u8], dst: &mut Vec<u8>) -> Result<usize, DecodeError> {
        let mut used = 0;

        loop {
            let rest = &src[used..];

            let step = match self {
                Dechunker::Size => self.read_size(rest)?,
                Dechunker::Chunk(_) => self.read_data(rest, dst),
                Dechunker::CrLf => self.expect_crlf(rest)?,
                Dechunker::Ending => self.trailer_or_ended(rest),
                Dechunker::Trailer => self.trailer(rest),
                Dechunker::Ended => None,
            };

            match step {
                Some(n) => used += n,
                None => break,
            }
        }

        Ok(used)
    }

    fn read_size(&mut self, src: &[u8]) -> Result<Option<usize>, DecodeError> {
        let Some(i) = find_crlf(src) else {
            if src.len() > MAX_SIZE_LINE {
                return Err(DecodeError::ChunkExpectedCrLf);
            }
            return Ok(None);
        };

        if i > MAX_SIZE_LINE {
            return Err(DecodeError::ChunkExpectedCrLf);
        }

        let line = &src[..i];
        let len_end = line.iter().position(|c| *c == b';').unwrap_or(i);
        let len_str = str::from_utf8(&line[..len_end]).map_err(|_| DecodeError::ChunkLenNotAscii)?;

        let len = usize::from_str_radix(len_str.trim(), 16)
            .map_err(|_| DecodeError::ChunkLenNotANumber)?;

        trace!("Chunk size: {}", len);

        *self = if len == 0 {
            Self::Ending
        } else {
            Self::Chunk(len)
        };

        Ok(Some(i + 2))
    }

    fn read_data(&mut self, src: &[u8], dst: &mut Vec<u8>) -> Option<usize> {
        let Self::Chunk(left) = self else {
            unreachable!()
        };

        let to_read = src.len().min(*left);
        if to_read == 0 {
            return None;
        }

        dst.extend_from_slice(&src[..to_read]);
        *left -= to_read;

        if *left == 0 {
            *self = Self::CrLf;
        }

        Some(to_read)
    }

    fn expect_crlf(&mut self, src: &[u8]) -> Result<Option<usize>, DecodeError> {
        if src.len() < 2 {
            if src.first().map(|c| *c != b'\r').unwrap_or(false) {
                return Err(DecodeError::ChunkExpectedCrLf);
            }
            return Ok(None);
        }

        if &src[..2] != b"\r\n" {
            return Err(DecodeError::ChunkExpectedCrLf);
        }

        *self = Self::Size;

        Ok(Some(2))
    }

    fn trailer_or_ended(&mut self, src: &[u8]) -> Option<usize> {
        let i = find_crlf(src)?;

        if i == 0 {
            *self = Self::Ended;
            Some(2)
        } else {
            // A trailer header line precedes the final crlf.
            *self = Self::Trailer;
            Some(0)
        }
    }

    fn trailer(&mut self, src: &[u8]) -> Option<usize> {
        let i = find_crlf(src)?;

        trace!("Skip trailer: {:?}", String::from_utf8_lossy(&src[..i]));

        *self = Self::Ending;

        Some(i + 2)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn size_needs_crlf() -> Result<(), DecodeError> {
        let mut d = Dechunker::new();
        let mut b = vec![];
        assert_eq!(d.decode(b"", &mut b)?, 0);
        assert_eq!(d.decode(b"2", &mut b)?, 0);
        assert_eq!(d.decode(b"2\r", &mut b)?, 0);
        assert_eq!(d, Dechunker::Size);
        assert_eq!(d.decode(b"2\r\n", &mut b)?, 3);
        assert_eq!(d, Dechunker::Chunk(2));
        Ok(())
    }

    #[test]
    fn size_with_extension() -> Result<(), DecodeError> {
        let mut d = Dechunker::new();
        let mut b = vec![];
        assert_eq!(d.decode(b"2;meta\r", &mut b)?, 0);
        assert_eq!(d.decode(b"2;meta\r\n", &mut b)?, 8);
        assert_eq!(d, Dechunker::Chunk(2));
        Ok(())
    }

    #[test]
    fn semicolon_in_data_is_not_extension() -> Result<(), DecodeError> {
        let mut d = Dechunker::new();
        let mut b = vec![];
        assert_eq!(d.decode(b"9\r\nnot meta;\r\n", &mut b)?, 14);
        assert_eq!(b, b"not meta;");
        Ok(())
    }

    #[test]
    fn data_and_end() -> Result<(), DecodeError> {
        let mut d = Dechunker::new();
        let mut b = vec![];
        assert_eq!(d.decode(b"2\r\nOK", &mut b)?, 5);
        assert_eq!(b, b"OK");
        assert_eq!(d.decode(b"\r\n", &mut b)?, 2);
        assert!(!d.is_ended());
        assert_eq!(d.decode(b"0\r\n", &mut b)?, 3);
        assert!(!d.is_ended());
        assert_eq!(d.decode(b"\r\n", &mut b)?, 2);
        assert!(d.is_ended());
        Ok(())
    }

    #[test]
    fn trailers_are_skipped() -> Result<(), DecodeError> {
        let mut d = Dechunker::new();
        let mut b = vec![];
        let input = b"3\r\nabc\r\n0\r\nx-trailer: 1\r\n\r\n";
        assert_eq!(d.decode(input, &mut b)?, input.len());
        assert_eq!(b, b"abc");
        assert!(d.is_ended());
        Ok(())
    }

    #[test]
    fn bad_size() {
        let mut d = Dechunker::new();
        let mut b = vec![];
        assert_eq!(
            d.decode(b"zz\r\n", &mut b),
            Err(DecodeError::ChunkLenNotANumber)
        );
    }

    #[test]
    fn missing_crlf_after_data() {
        let mut d = Dechunker::new();
        let mut b = vec![];
        assert_eq!(
            d.decode(b"2\r\nOKxx", &mut b),
            Err(DecodeError::ChunkExpectedCrLf)
        );
    }
}
