use std::io::{self, Read, Write};
use std::thread;

use http::Method;

use crate::codec::{OutboundRequest, RequestEncoder, ResponseDecoder, ResponseEvent};
use crate::guard::{CompletionGuard, CompletionWaiter};
use crate::transport::Transport;
use crate::{Config, Error, ResponseSink};

/// Runs one exchange: connect, send the request, stream the response into a
/// sink and wait for the outcome.
#[derive(Debug)]
pub struct Driver {
    config: Config,
}

impl Driver {
    pub fn new(config: Config) -> Self {
        Driver { config }
    }

    /// Perform the exchange.
    ///
    /// Blocks until the response ended or failed. The reader worker and the
    /// connection are gone when this returns.
    pub fn run<S>(&self, sink: &mut S) -> Result<(), Error>
    where
        S: ResponseSink + Send,
    {
        info!("{} {}", self.config.get_method(), self.config.target());

        let (guard, waiter) = CompletionGuard::new();

        let result = self.exchange(&guard, waiter, sink);

        match &result {
            Ok(()) => info!("Exchange done"),
            Err(e) => info!("Exchange failed: {}", e),
        }

        sink.on_complete(&result);

        result
    }

    fn exchange<S>(
        &self,
        guard: &CompletionGuard,
        waiter: CompletionWaiter,
        sink: &mut S,
    ) -> Result<(), Error>
    where
        S: ResponseSink + Send,
    {
        let mut transport = match self.open(guard) {
            Ok(v) => v,
            Err(e) => {
                guard.on_error(e);
                return waiter.wait();
            }
        };

        if let Err(e) = self.send(&mut transport) {
            guard.on_error(e);
            return waiter.wait();
        }

        let method = self.config.get_method();
        let buffer_size = self.config.get_read_buffer_size();

        thread::scope(|s| {
            s.spawn(|| read_response(&mut transport, guard, sink, method, buffer_size));
            waiter.wait()
        })
    }

    fn open(&self, guard: &CompletionGuard) -> Result<Transport, Error> {
        let transport = Transport::connect(self.config.target(), || self.config.tls_config())?;
        guard.attach(Box::new(transport.closer()?));
        Ok(transport)
    }

    fn send(&self, transport: &mut Transport) -> Result<(), Error> {
        let request = self.config.request()?;
        let out = encode(&request, self.config.get_body())?;

        transport.write_all(&out)?;
        transport.flush()?;

        debug!("Request sent: {} bytes", out.len());

        Ok(())
    }
}

fn encode(request: &OutboundRequest, body: Option<&[u8]>) -> Result<Vec<u8>, Error> {
    let mut out = Vec::new();

    let mut enc = RequestEncoder::new(request)?.write_head(&mut out);
    if let Some(body) = body {
        enc.write_body(body, &mut out)?;
    }
    enc.write_end(&mut out)?;

    Ok(out)
}

/// Settles the guard when the reader worker exits without having done so,
/// which only happens when it unwinds.
struct SettleOnExit<'a>(&'a CompletionGuard);

impl Drop for SettleOnExit<'_> {
    fn drop(&mut self) {
        if self.0.on_error(Error::ReaderAborted) {
            warn!("Reader worker stopped before the response settled");
        }
    }
}

/// Reader worker. Feeds the decoder until a trigger fires on the guard.
fn read_response<S: ResponseSink>(
    transport: &mut Transport,
    guard: &CompletionGuard,
    sink: &mut S,
    method: &Method,
    buffer_size: usize,
) {
    let _settle = SettleOnExit(guard);

    let mut decoder = ResponseDecoder::new(method);
    let mut buf = vec![0; buffer_size];

    loop {
        let n = match transport.read(&mut buf) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                guard.on_error(e.into());
                return;
            }
        };

        if n == 0 {
            match decoder.eof() {
                Some(ResponseEvent::End) => guard.on_end(),
                _ => guard.on_inactive(),
            };
            return;
        }

        trace!("Read {} bytes", n);
        decoder.push(&buf[..n]);

        loop {
            match decoder.next_event() {
                Ok(Some(ResponseEvent::Head(head))) => sink.on_head(&head),
                Ok(Some(ResponseEvent::BodyChunk(chunk))) => sink.on_body_chunk(&chunk),
                Ok(Some(ResponseEvent::End)) => {
                    guard.on_end();
                    return;
                }
                Ok(None) => break,
                Err(e) => {
                    guard.on_error(e.into());
                    return;
                }
            }
        }
    }
}
