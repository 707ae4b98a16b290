//! Configuration-driven choice between the two connection variants.

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::broadcast;

use crate::config::{ClientConfig, TransportKind};
use crate::duplex::{DuplexConn, Dialer, PipeConn, SplitConn, SplitConnector};
use crate::error::{Error, Result};
use crate::http::{build_client, H2Transport, ServerConnector};
use crate::net::tls;
use crate::observability::metrics;

/// A ready-to-use tunnel factory built from configuration.
#[derive(Clone)]
pub enum Tunnel {
    Split(SplitConnector<HttpsConnector<ServerConnector<HttpConnector>>>),
    Duplex {
        dialer: Dialer<H2Transport>,
        address: String,
    },
}

impl Tunnel {
    /// Build the tunnel selected by `config.server.transport`.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let server = &config.server;
        if server.address.is_empty() {
            return Err(Error::InvalidUri {
                url: String::new(),
                reason: "server.address is not set".to_string(),
            });
        }

        match server.transport {
            TransportKind::Split => {
                let tls_config = tls::client_config(&server.tls, &[])?;
                let scheme = if server.tls.enabled { "https" } else { "http" };
                let connector = SplitConnector::new(
                    build_client(tls_config, &server.address)?,
                    &config.xhttp,
                    scheme,
                    &server.address,
                )?;
                Ok(Tunnel::Split(connector))
            }
            TransportKind::Duplex => {
                let tls_config = tls::client_config(&server.tls, &[b"h2".as_slice()])?;
                let transport = H2Transport::new(Some(Arc::new(tls_config)))?
                    .with_server_name(server.tls.server_name.clone());
                Ok(Tunnel::Duplex {
                    dialer: Dialer::new(&config.xhttp, transport)?,
                    address: server.address.clone(),
                })
            }
        }
    }

    pub fn kind(&self) -> TransportKind {
        match self {
            Tunnel::Split(_) => TransportKind::Split,
            Tunnel::Duplex { .. } => TransportKind::Duplex,
        }
    }

    /// Open one session. `cancel` is honoured by split mode only.
    pub async fn open(&self, cancel: Option<broadcast::Receiver<()>>) -> Result<TunnelStream> {
        let result = match self {
            Tunnel::Split(connector) => connector.connect(cancel).await.map(TunnelStream::Split),
            Tunnel::Duplex { dialer, address } => {
                dialer.dial("tcp", address).map(TunnelStream::Bridged)
            }
        };

        match &result {
            Ok(_) => metrics::record_session_opened(self.kind().as_str()),
            Err(_) if self.kind() == TransportKind::Duplex => {
                metrics::record_connect_failure(self.kind().as_str())
            }
            // Split mode records its own failures.
            Err(_) => {}
        }
        result
    }
}

/// Either connection variant behind one socket-like type.
pub enum TunnelStream {
    Split(SplitConn),
    Bridged(PipeConn),
}

impl AsyncRead for TunnelStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            TunnelStream::Split(conn) => Pin::new(conn).poll_read(cx, buf),
            TunnelStream::Bridged(conn) => Pin::new(conn).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for TunnelStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            TunnelStream::Split(conn) => Pin::new(conn).poll_write(cx, buf),
            TunnelStream::Bridged(conn) => Pin::new(conn).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            TunnelStream::Split(conn) => Pin::new(conn).poll_flush(cx),
            TunnelStream::Bridged(conn) => Pin::new(conn).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            TunnelStream::Split(conn) => Pin::new(conn).poll_shutdown(cx),
            TunnelStream::Bridged(conn) => Pin::new(conn).poll_shutdown(cx),
        }
    }
}

impl DuplexConn for TunnelStream {
    fn close(&mut self) {
        match self {
            TunnelStream::Split(conn) => conn.close(),
            TunnelStream::Bridged(conn) => conn.close(),
        }
    }

    fn remote_addr(&self) -> SocketAddr {
        match self {
            TunnelStream::Split(conn) => conn.remote_addr(),
            TunnelStream::Bridged(conn) => conn.remote_addr(),
        }
    }
}
