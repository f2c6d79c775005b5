use std::{
    fs, io,
    net::{TcpStream, ToSocketAddrs},
    path::Path,
    time::Duration,
};

use openssl::ssl::{SslConnector, SslMethod, SslVerifyMode};
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::ports;

/// Errors raised while acquiring raw certificate data.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("certificate file {0} does not exist")]
    NotFound(String),
    #[error("cert-file is not configured for file mode")]
    MissingCertFile,
    #[error("invalid location '{0}': {1}")]
    InvalidUri(String, url::ParseError),
    #[error("location '{0}' has no hostname")]
    NoHost(String),
    #[error("no default port known for scheme '{0}'")]
    UnsupportedScheme(String),
    #[error("connection to {host}:{port} failed: {reason}")]
    Connection {
        host: String,
        port: u16,
        reason: String,
    },
    #[error("peer at {0} presented no certificate")]
    NoPeerCertificate(String),
    #[error("OpenSSL error: {0}")]
    OpenSsl(#[from] openssl::error::ErrorStack),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

type Result<T> = std::result::Result<T, SourceError>;

/// Connect, read and write timeout applied in host mode unless
/// configuration says otherwise.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// How a location string is turned into certificate data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AcquireMode {
    /// The location is a directory containing a certificate file.
    Files,
    /// The location is a host to fetch the presented certificate from.
    Host,
}

/// Knobs for acquisition that come from configuration rather than the
/// location string itself.
#[derive(Debug, Clone)]
pub struct AcquireOptions {
    /// Certificate filename joined onto the location in file mode.
    pub cert_file: Option<String>,
    /// Connect, read and write timeout for host mode.
    pub timeout: Duration,
}

impl Default for AcquireOptions {
    fn default() -> Self {
        Self {
            cert_file: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Resolves a location plus an acquisition mode into PEM text.
///
/// File mode reads the certificate from disk; host mode performs a TLS
/// handshake and converts the peer certificate from DER to PEM.
pub fn acquire(location: &str, mode: AcquireMode, options: &AcquireOptions) -> Result<String> {
    match mode {
        AcquireMode::Files => {
            let cert_file = options
                .cert_file
                .as_deref()
                .ok_or(SourceError::MissingCertFile)?;
            read_cert_file(location, cert_file)
        }
        AcquireMode::Host => {
            let (host, port) = parse_endpoint(location)?;
            fetch_peer_certificate(&host, port, options.timeout)
        }
    }
}

/// Reads the certificate file under the location directory.
fn read_cert_file(location: &str, cert_file: &str) -> Result<String> {
    let path = Path::new(location).join(cert_file);
    if !path.exists() {
        return Err(SourceError::NotFound(path.display().to_string()));
    }
    Ok(fs::read_to_string(&path)?)
}

/// Parses a host location into (hostname, port).
///
/// A location without a scheme delimiter is assumed to be https. The port is
/// taken from the URI when explicit, otherwise from the default port table.
pub fn parse_endpoint(location: &str) -> Result<(String, u16)> {
    let with_scheme = if location.contains("://") {
        location.to_string()
    } else {
        format!("https://{location}")
    };

    let uri = Url::parse(&with_scheme)
        .map_err(|e| SourceError::InvalidUri(location.to_string(), e))?;
    let host = uri
        .host_str()
        .ok_or_else(|| SourceError::NoHost(location.to_string()))?
        .to_string();
    let port = match uri.port() {
        Some(port) => port,
        None => ports::default_port(uri.scheme())
            .ok_or_else(|| SourceError::UnsupportedScheme(uri.scheme().to_string()))?,
    };

    Ok((host, port))
}

/// Fetches the certificate a host presents, as PEM text.
///
/// Hostname and trust-chain verification are both disabled on purpose: the
/// point is to inspect whatever certificate the peer hands out, including
/// self-signed and otherwise untrusted ones.
fn fetch_peer_certificate(host: &str, port: u16, timeout: Duration) -> Result<String> {
    let connection_error = |reason: String| SourceError::Connection {
        host: host.to_string(),
        port,
        reason,
    };

    let addr = (host, port)
        .to_socket_addrs()
        .map_err(|e| connection_error(e.to_string()))?
        .next()
        .ok_or_else(|| connection_error("hostname did not resolve".to_string()))?;

    let stream =
        TcpStream::connect_timeout(&addr, timeout).map_err(|e| connection_error(e.to_string()))?;
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;

    let mut builder = SslConnector::builder(SslMethod::tls())?;
    builder.set_verify(SslVerifyMode::NONE);
    let connector = builder.build();
    let mut config = connector.configure()?;
    config.set_verify_hostname(false);

    let tls_stream = config
        .connect(host, stream)
        .map_err(|e| connection_error(e.to_string()))?;
    let peer = tls_stream
        .ssl()
        .peer_certificate()
        .ok_or_else(|| SourceError::NoPeerCertificate(format!("{host}:{port}")))?;

    let pem = peer.to_pem()?;
    String::from_utf8(pem).map_err(|e| connection_error(e.to_string()))
}
