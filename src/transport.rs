//! Byte-level transport: plain TCP or implicit TLS, with a bounded blocking read.

use std::fs;
use std::io::{self, Read, Write};
use std::net::{IpAddr, Shutdown, TcpStream, ToSocketAddrs};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rustls::pki_types::{CertificateDer, ServerName};
use rustls::{ClientConfig, ClientConnection, RootCertStore, StreamOwned};

use crate::config::Config;
use crate::error::{Error, Result};

/// Default per-read timeout (spec.md §4.1).
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Minimum read buffer size (spec.md §4.1: "≥ 4 KiB").
const READ_BUF_SIZE: usize = 8192;

/// The capability set the Response Reader and Session Driver need: write the
/// whole buffer, read up to one buffer's worth within a deadline, close.
/// Implemented by [`Transport`] for real sockets, and by an in-memory mock in
/// the session test suite.
pub trait Io {
    fn write_all(&mut self, bytes: &[u8]) -> Result<()>;
    fn read_some(&mut self, timeout: Duration) -> Result<Vec<u8>>;
    fn close(&mut self);
}

/// A connected session transport: plain TCP or rustls over TCP.
pub enum Transport {
    Plain(TcpStream),
    Tls(Box<StreamOwned<ClientConnection, TcpStream>>),
}

impl Transport {
    /// Resolve `host:port`, connect, and (if configured) perform the TLS handshake.
    pub fn connect(config: &Config) -> Result<Transport> {
        let stream = connect_tcp(&config.server, config.port)?;

        if !config.use_tls {
            return Ok(Transport::Plain(stream));
        }

        let root_store = build_root_store(config.trust_file.as_deref(), &config.trust_dir)?;
        let tls_config = ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        let server_name = ServerName::try_from(config.server.clone())
            .map_err(|_| Error::Transport(format!("invalid server name: {}", config.server)))?;

        let conn = ClientConnection::new(Arc::new(tls_config), server_name)
            .map_err(|e| Error::Transport(format!("TLS handshake failed: {e}")))?;

        let mut tls_stream = StreamOwned::new(conn, stream);
        // Force the handshake now rather than lazily on first read/write, so a
        // bad certificate fails fast during connect rather than mid-session.
        tls_stream
            .conn
            .complete_io(&mut tls_stream.sock)
            .map_err(|e| Error::Transport(format!("TLS handshake failed: {e}")))?;

        Ok(Transport::Tls(Box::new(tls_stream)))
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        let socket = match self {
            Transport::Plain(s) => s,
            Transport::Tls(s) => &s.sock,
        };
        socket
            .set_read_timeout(timeout)
            .map_err(|e| Error::Transport(e.to_string()))
    }
}

impl Io for Transport {
    /// Write the entire buffer, failing with `Transport` on any underlying error.
    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let result = match self {
            Transport::Plain(s) => s.write_all(bytes),
            Transport::Tls(s) => s.write_all(bytes),
        };
        result.map_err(|e| Error::Transport(e.to_string()))
    }

    /// Read up to one buffer's worth of bytes, blocking up to `timeout`.
    ///
    /// Benign conditions (signal interruption, "would block" wakeups) are
    /// retried transparently without resetting the deadline. A clean 0-byte
    /// read is reported as `ClosedByPeer`.
    fn read_some(&mut self, timeout: Duration) -> Result<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        let mut buf = vec![0u8; READ_BUF_SIZE];

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::Timeout);
            }
            self.set_read_timeout(Some(remaining))?;

            let result = match self {
                Transport::Plain(s) => s.read(&mut buf),
                Transport::Tls(s) => s.read(&mut buf),
            };

            match result {
                Ok(0) => return Err(Error::ClosedByPeer),
                Ok(n) => {
                    buf.truncate(n);
                    return Ok(buf);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return Err(Error::Timeout);
                    }
                    continue;
                }
                Err(e) => return Err(Error::from(e)),
            }
        }
    }

    /// Close the underlying socket. Errors are not actionable here and ignored.
    fn close(&mut self) {
        let socket = match self {
            Transport::Plain(s) => s,
            Transport::Tls(s) => &mut s.sock,
        };
        let _ = socket.shutdown(Shutdown::Both);
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.close();
    }
}

/// Connect to `host:port`: a dotted-quad IPv4 literal is used directly, otherwise
/// both address families are resolved and tried in order until one connects.
fn connect_tcp(host: &str, port: u16) -> Result<TcpStream> {
    if let Ok(ip) = host.parse::<std::net::Ipv4Addr>() {
        return TcpStream::connect((IpAddr::V4(ip), port))
            .map_err(|e| Error::Transport(format!("failed to connect to {host}:{port}: {e}")));
    }

    let addrs: Vec<_> = (host, port)
        .to_socket_addrs()
        .map_err(|e| Error::Transport(format!("failed to resolve {host}: {e}")))?
        .collect();

    if addrs.is_empty() {
        return Err(Error::Transport(format!("no addresses found for {host}")));
    }

    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect(addr) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(e),
        }
    }

    Err(Error::Transport(format!(
        "failed to connect to {host}:{port} on any resolved address: {}",
        last_err.map(|e| e.to_string()).unwrap_or_default()
    )))
}

/// Build a root certificate store from the configured trust file and/or trust
/// directory. At least one certificate must load successfully.
fn build_root_store(trust_file: Option<&Path>, trust_dir: &Path) -> Result<RootCertStore> {
    let mut store = RootCertStore::empty();

    if let Some(file) = trust_file {
        load_pem_file(file, &mut store)?;
    }

    if trust_dir.is_dir() {
        let entries = fs::read_dir(trust_dir)
            .map_err(|e| Error::Transport(format!("failed to read {}: {e}", trust_dir.display())))?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() {
                // Individual CApath-style entries are frequently unrelated or
                // duplicate hash-named symlinks; tolerate unparsable ones.
                let _ = load_pem_file(&path, &mut store);
            }
        }
    }

    if store.is_empty() {
        return Err(Error::Transport(format!(
            "no usable trust anchors found in {} or the configured trust file",
            trust_dir.display()
        )));
    }

    Ok(store)
}

fn load_pem_file(path: &Path, store: &mut RootCertStore) -> Result<()> {
    let bytes = fs::read(path)
        .map_err(|e| Error::Transport(format!("failed to read {}: {e}", path.display())))?;
    let mut reader = io::BufReader::new(bytes.as_slice());
    let certs: std::result::Result<Vec<CertificateDer<'static>>, _> =
        rustls_pemfile::certs(&mut reader).collect();
    let certs = certs.map_err(|e| Error::Transport(format!("malformed certificate in {}: {e}", path.display())))?;
    if certs.is_empty() {
        return Err(Error::Transport(format!("no certificates found in {}", path.display())));
    }
    for cert in certs {
        store
            .add(cert)
            .map_err(|e| Error::Transport(format!("invalid certificate in {}: {e}", path.display())))?;
    }
    Ok(())
}
