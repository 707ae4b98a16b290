//! HTTP client used by split-mode connections.
//!
//! One client is built per process and shared by every split connection; the
//! pooled `hyper-util` client is safe for concurrent use. Every connection it
//! opens goes to the configured server address, whatever authority the
//! request URI carries (see [`ServerConnector`]).

use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use crate::error::Result;
use crate::http::body::RequestBody;
use crate::http::connect::ServerConnector;

/// Pooled HTTP/1 + HTTP/2 client speaking `https` or plain `http`.
pub type HttpsClient = Client<HttpsConnector<ServerConnector<HttpConnector>>, RequestBody>;

/// Plain-`http` client pinned to one server address.
pub type PlainClient = Client<ServerConnector<HttpConnector>, RequestBody>;

/// Build the shared split-mode client around a pre-built TLS configuration.
pub fn build_client(tls: rustls::ClientConfig, address: &str) -> Result<HttpsClient> {
    let mut http = HttpConnector::new();
    http.enforce_http(false);

    let connector = HttpsConnectorBuilder::new()
        .with_tls_config(tls)
        .https_or_http()
        .enable_http1()
        .enable_http2()
        .wrap_connector(ServerConnector::new(http, address)?);

    Ok(Client::builder(TokioExecutor::new()).build(connector))
}

/// Build a plain-`http` client, mainly for loopback servers.
pub fn build_plain_client(address: &str) -> Result<PlainClient> {
    let connector = ServerConnector::new(HttpConnector::new(), address)?;
    Ok(Client::builder(TokioExecutor::new()).build(connector))
}
