use std::io::{self, Write};

use crate::codec::ResponseHead;
use crate::Error;

/// Receives the decoded response as it arrives.
///
/// `on_head` and `on_body_chunk` are called from the reader worker, in wire
/// order. `on_complete` is called once on the driving thread after the
/// exchange settled.
pub trait ResponseSink {
    fn on_head(&mut self, head: &ResponseHead);

    fn on_body_chunk(&mut self, chunk: &[u8]);

    fn on_complete(&mut self, _result: &Result<(), Error>) {}
}

/// Prints the response: status line, one `name: value` line per header and
/// the body as lossy UTF-8.
#[derive(Debug)]
pub struct ConsoleSink<W> {
    out: W,
}

impl ConsoleSink<io::Stdout> {
    pub fn stdout() -> Self {
        ConsoleSink { out: io::stdout() }
    }
}

impl<W: Write> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        ConsoleSink { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_head(&mut self, head: &ResponseHead) -> io::Result<()> {
        writeln!(self.out, "{}", head.status_line())?;
        for (name, value) in &head.headers {
            writeln!(self.out, "{}: {}", name, String::from_utf8_lossy(value.as_bytes()))?;
        }
        writeln!(self.out)?;
        Ok(())
    }
}

impl<W: Write> ResponseSink for ConsoleSink<W> {
    fn on_head(&mut self, head: &ResponseHead) {
        if let Err(e) = self.write_head(head) {
            warn!("Failed to print response head: {}", e);
        }
    }

    fn on_body_chunk(&mut self, chunk: &[u8]) {
        let text = String::from_utf8_lossy(chunk);
        if let Err(e) = self.out.write_all(text.as_bytes()) {
            warn!("Failed to print body: {}", e);
        }
    }

    fn on_complete(&mut self, result: &Result<(), Error>) {
        if result.is_ok() {
            let _ = writeln!(self.out);
        }
        if let Err(e) = self.out.flush() {
            warn!("Failed to flush output: {}", e);
        }
    }
}
