//! Stream types for IMAP transports.
//!
//! A connection starts as plain TCP (direct path), as TLS over a SOCKS
//! tunnel (proxy path), or as implicit TLS, and may be upgraded in place by
//! STARTTLS. Buffered-but-unprocessed bytes survive an upgrade because the
//! wire parser buffers above the transport.

#![allow(clippy::missing_errors_doc)]

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_socks::tcp::{Socks4Stream, Socks5Stream};

use crate::config::{ProxyConfig, ProxyVersion};
use crate::{Error, Result};

/// Object-safe byte-stream bound for pluggable transports.
pub trait AsyncDuplex: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> AsyncDuplex for T {}

type BoxedDuplex = Box<dyn AsyncDuplex>;

/// A stream that can be plaintext, a caller-supplied transport, or TLS.
pub enum ImapStream {
    /// Plaintext TCP stream.
    Plain(TcpStream),
    /// Caller-supplied transport (tests, pre-connected sockets).
    Boxed(BoxedDuplex),
    /// TLS-encrypted stream (boxed to reduce enum size).
    Tls(Box<TlsStream<BoxedDuplex>>),
}

impl ImapStream {
    /// Wraps a caller-supplied transport.
    pub fn boxed<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        Self::Boxed(Box::new(stream))
    }

    /// Returns true if the stream is TLS-encrypted.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }

    /// Upgrades a non-TLS stream to TLS in place (STARTTLS).
    pub async fn upgrade_to_tls(
        self,
        host: &str,
        tls_config: Option<&Arc<rustls::ClientConfig>>,
    ) -> Result<Self> {
        let inner: BoxedDuplex = match self {
            Self::Plain(tcp) => Box::new(tcp),
            Self::Boxed(stream) => stream,
            Self::Tls(_) => {
                return Err(Error::Protocol("stream is already TLS".to_string()));
            }
        };
        tls_wrap(inner, host, tls_config).await
    }
}

impl AsyncRead for ImapStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Boxed(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for ImapStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Boxed(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Self::Boxed(stream) => Pin::new(stream).poll_flush(cx),
            Self::Tls(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Boxed(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

impl std::fmt::Debug for ImapStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain(_) => f.write_str("ImapStream::Plain"),
            Self::Boxed(_) => f.write_str("ImapStream::Boxed"),
            Self::Tls(_) => f.write_str("ImapStream::Tls"),
        }
    }
}

/// Creates a TLS connector with the webpki root certificates.
#[must_use]
pub fn tls_connector() -> TlsConnector {
    let root_store = rustls::RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    TlsConnector::from(Arc::new(config))
}

async fn tls_wrap(
    stream: BoxedDuplex,
    host: &str,
    tls_config: Option<&Arc<rustls::ClientConfig>>,
) -> Result<ImapStream> {
    let connector =
        tls_config.map_or_else(tls_connector, |config| TlsConnector::from(Arc::clone(config)));
    let server_name = ServerName::try_from(host.to_string())?;
    let tls = connector.connect(server_name, stream).await?;
    Ok(ImapStream::Tls(Box::new(tls)))
}

/// Opens a plaintext connection (direct path; the server may offer STARTTLS).
pub async fn connect_plain(host: &str, port: u16) -> Result<ImapStream> {
    let tcp = TcpStream::connect((host, port)).await?;
    Ok(ImapStream::Plain(tcp))
}

/// Opens a connection with TLS from the start.
pub async fn connect_tls(
    host: &str,
    port: u16,
    tls_config: Option<&Arc<rustls::ClientConfig>>,
) -> Result<ImapStream> {
    let tcp = TcpStream::connect((host, port)).await?;
    tls_wrap(Box::new(tcp), host, tls_config).await
}

/// Dials through a SOCKS proxy to (host, `tls_port`) and wraps the tunnel in
/// TLS immediately.
pub async fn connect_via_proxy(
    proxy: &ProxyConfig,
    host: &str,
    tls_port: u16,
    tls_config: Option<&Arc<rustls::ClientConfig>>,
) -> Result<ImapStream> {
    let proxy_addr = (proxy.host.as_str(), proxy.port);
    let target = (host, tls_port);

    let tunnel: BoxedDuplex = match proxy.version {
        ProxyVersion::V5 => match (&proxy.username, &proxy.password) {
            (Some(user), Some(pass)) => Box::new(
                Socks5Stream::connect_with_password(proxy_addr, target, user, pass).await?,
            ),
            _ => Box::new(Socks5Stream::connect(proxy_addr, target).await?),
        },
        ProxyVersion::V4 => match &proxy.username {
            Some(user) => {
                Box::new(Socks4Stream::connect_with_userid(proxy_addr, target, user).await?)
            }
            None => Box::new(Socks4Stream::connect(proxy_addr, target).await?),
        },
    };

    tls_wrap(tunnel, host, tls_config).await
}
