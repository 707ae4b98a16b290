//! Single-exchange HTTP/2 transport for the pipe-bridged dialer.
//!
//! # Responsibilities
//! - Define the [`RoundTrip`] seam between the dialer and the wire
//! - Dial TCP and perform the TLS handshake per call
//! - Run one HTTP/2 exchange whose request and response bodies stream
//!   concurrently
//!
//! # Design Decisions
//! - No pooling: each dial owns its own TCP + TLS + HTTP/2 connection
//! - The supplied TLS config wins; otherwise a web-PKI config with ALPN `h2`

use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use http::{Request, Response};
use http_body_util::BodyExt;
use hyper_util::rt::{TokioExecutor, TokioIo};
use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use crate::error::{Error, Result};
use crate::http::body::{BoxError, RequestBody, ResponseBody};
use crate::net::tls;

/// Performs one HTTP exchange.
///
/// Implementations must be safe to share between concurrent dials.
pub trait RoundTrip: Send + Sync + 'static {
    fn round_trip(&self, req: Request<RequestBody>) -> BoxFuture<'static, Result<Response<ResponseBody>>>;
}

/// HTTP/2-over-TLS transport that dials a fresh connection per exchange.
#[derive(Clone)]
pub struct H2Transport {
    tls: Arc<rustls::ClientConfig>,
    server_name: Option<String>,
}

impl H2Transport {
    /// Create a transport. `tls` is used as-is when supplied.
    pub fn new(tls: Option<Arc<rustls::ClientConfig>>) -> Result<Self> {
        let tls = match tls {
            Some(config) => config,
            None => Arc::new(tls::client_config(&Default::default(), &[b"h2".as_slice()])?),
        };
        Ok(Self {
            tls,
            server_name: None,
        })
    }

    /// Override the SNI name (defaults to the URL host).
    pub fn with_server_name(mut self, name: Option<String>) -> Self {
        self.server_name = name;
        self
    }
}

impl RoundTrip for H2Transport {
    fn round_trip(&self, req: Request<RequestBody>) -> BoxFuture<'static, Result<Response<ResponseBody>>> {
        exchange(self.tls.clone(), self.server_name.clone(), req).boxed()
    }
}

async fn exchange(
    tls: Arc<rustls::ClientConfig>,
    server_name: Option<String>,
    req: Request<RequestBody>,
) -> Result<Response<ResponseBody>> {
    let uri = req.uri().clone();
    let host = uri.host().ok_or_else(|| Error::InvalidUri {
        url: uri.to_string(),
        reason: "missing host".to_string(),
    })?;
    let port = uri.port_u16().unwrap_or(443);
    let host = host.trim_start_matches('[').trim_end_matches(']').to_string();

    let tcp = TcpStream::connect((host.as_str(), port)).await?;
    if let Err(e) = tcp.set_nodelay(true) {
        tracing::debug!(error = %e, "Failed to set TCP_NODELAY");
    }

    let sni = ServerName::try_from(server_name.unwrap_or(host))
        .map_err(|e| Error::Tls(e.to_string()))?;
    let stream = TlsConnector::from(tls).connect(sni, tcp).await?;

    let (mut sender, connection) =
        hyper::client::conn::http2::handshake(TokioExecutor::new(), TokioIo::new(stream)).await?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::debug!(error = %e, "HTTP/2 connection ended with error");
        }
    });

    sender.ready().await?;
    let response = sender.send_request(req).await?;
    tracing::debug!(uri = %uri, status = %response.status(), "HTTP/2 exchange established");

    Ok(response.map(|body| body.map_err(BoxError::from).boxed()))
}
