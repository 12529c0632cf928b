//! Connection setup: TCP connect, then TLS for https targets.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, StreamOwned};
use socket2::{Domain, Protocol, Socket, Type};

use crate::{Error, Target};

/// Closes a connection on behalf of the [`crate::CompletionGuard`].
///
/// Closing more than once must be harmless.
pub trait Closer: Send + Sync {
    fn close(&self) -> io::Result<()>;
}

/// Closer for a TCP socket, holding a clone of the socket handle.
#[derive(Debug)]
pub struct TcpCloser(TcpStream);

impl TcpCloser {
    pub fn new(stream: &TcpStream) -> io::Result<Self> {
        Ok(TcpCloser(stream.try_clone()?))
    }
}

impl Closer for TcpCloser {
    fn close(&self) -> io::Result<()> {
        match self.0.shutdown(Shutdown::Both) {
            // Already shut down.
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            r => r,
        }
    }
}

/// A connected byte stream, plaintext or TLS.
pub enum Transport {
    Plain(TcpStream),
    Tls(Box<StreamOwned<ClientConnection, TcpStream>>),
}

impl Transport {
    /// Connect to the target and, for https, complete the TLS handshake
    /// before returning.
    ///
    /// `tls` is only consulted for https targets.
    pub fn connect<F>(target: &Target, tls: F) -> Result<Self, Error>
    where
        F: FnOnce() -> Result<Arc<ClientConfig>, Error>,
    {
        let tcp = connect_tcp(target.host(), target.effective_port())?;

        if !target.scheme().is_tls() {
            return Ok(Transport::Plain(tcp));
        }

        let stream = handshake(tcp, target.host(), tls()?)?;

        Ok(Transport::Tls(Box::new(stream)))
    }

    fn socket(&self) -> &TcpStream {
        match self {
            Transport::Plain(v) => v,
            Transport::Tls(v) => &v.sock,
        }
    }

    pub fn closer(&self) -> Result<TcpCloser, Error> {
        Ok(TcpCloser::new(self.socket())?)
    }
}

impl Read for Transport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Transport::Plain(v) => v.read(buf),
            Transport::Tls(v) => match v.read(buf) {
                // Peer closed the socket without close_notify. Treat as a
                // close so body framing decides whether that is the end.
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    debug!("TLS peer closed without close_notify");
                    Ok(0)
                }
                r => r,
            },
        }
    }
}

impl Write for Transport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Transport::Plain(v) => v.write(buf),
            Transport::Tls(v) => v.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Transport::Plain(v) => v.flush(),
            Transport::Tls(v) => v.flush(),
        }
    }
}

fn connect_tcp(host: &str, port: u16) -> Result<TcpStream, Error> {
    let connect_err = |source: io::Error| Error::Connect {
        host: host.to_string(),
        port,
        source,
    };

    let addrs = (host, port).to_socket_addrs().map_err(connect_err)?;

    let mut last_err = None;

    for addr in addrs {
        match connect_addr(&addr) {
            Ok(v) => {
                debug!("Connected to {}", addr);
                return Ok(v);
            }
            Err(e) => {
                debug!("Connect to {} failed: {}", addr, e);
                last_err = Some(e);
            }
        }
    }

    let source = last_err
        .unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "host resolved to no address"));

    Err(connect_err(source))
}

fn connect_addr(addr: &SocketAddr) -> io::Result<TcpStream> {
    let socket = Socket::new(Domain::for_address(*addr), Type::STREAM, Some(Protocol::TCP))?;

    socket.set_reuse_address(true)?;
    socket.set_nodelay(true)?;
    socket.connect(&(*addr).into())?;

    Ok(socket.into())
}

fn handshake(
    mut tcp: TcpStream,
    host: &str,
    config: Arc<ClientConfig>,
) -> Result<StreamOwned<ClientConnection, TcpStream>, Error> {
    let name = ServerName::try_from(host.to_string())
        .map_err(|e| Error::TlsHandshake(format!("{}: {}", host, e)))?;

    let mut conn = ClientConnection::new(config, name)?;

    while conn.is_handshaking() {
        conn.complete_io(&mut tcp)
            .map_err(|e| Error::TlsHandshake(e.to_string()))?;
    }

    debug!(
        "TLS handshake done: {:?} {:?}",
        conn.protocol_version(),
        conn.negotiated_cipher_suite().map(|s| s.suite())
    );

    Ok(StreamOwned::new(conn, tcp))
}

#[cfg(test)]
mod test {
    use std::net::TcpListener;

    use super::*;

    #[test]
    fn closer_is_idempotent() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let stream = connect_tcp("127.0.0.1", addr.port()).unwrap();
        let (_server, _) = listener.accept().unwrap();

        let closer = TcpCloser::new(&stream).unwrap();
        closer.close().unwrap();
        closer.close().unwrap();
    }

    #[test]
    fn connected_socket_has_nodelay() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let stream = connect_tcp("127.0.0.1", addr.port()).unwrap();
        assert!(stream.nodelay().unwrap());
    }

    #[test]
    fn refused_is_connect_error() {
        let port = {
            let l = TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };

        let err = connect_tcp("127.0.0.1", port).unwrap_err();
        match err {
            Error::Connect { host, port: p, .. } => {
                assert_eq!(host, "127.0.0.1");
                assert_eq!(p, port);
            }
            e => panic!("unexpected error: {}", e),
        }
    }

    #[test]
    fn plain_target_skips_tls() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let target = Target::http("127.0.0.1").with_port(port);
        let transport = Transport::connect(&target, || panic!("tls not used")).unwrap();
        assert!(matches!(transport, Transport::Plain(_)));
    }
}
