//! Connector that always dials the configured server.
//!
//! Split-mode request URIs carry the virtual host as their authority so that
//! HTTP/2 sends it as `:authority` and HTTP/1 as `Host`. The TCP connection
//! must still go to the configured server address, so the connector
//! replaces whatever authority the pool asks for.

use std::task::{Context, Poll};

use http::uri::Scheme;
use http::Uri;
use tower::Service;

use crate::error::{Error, Result};

/// Wraps a `Service<Uri>` connector and redirects every dial to one address.
#[derive(Debug, Clone)]
pub struct ServerConnector<C> {
    inner: C,
    http: Uri,
    https: Uri,
}

impl<C> ServerConnector<C> {
    /// `address` is the server's `host:port`.
    pub fn new(inner: C, address: &str) -> Result<Self> {
        Ok(Self {
            inner,
            http: target("http", address)?,
            https: target("https", address)?,
        })
    }

    /// URI handed to the inner connector for a request to `dst`.
    pub fn target_for(&self, dst: &Uri) -> &Uri {
        if dst.scheme() == Some(&Scheme::HTTPS) {
            &self.https
        } else {
            &self.http
        }
    }
}

fn target(scheme: &str, address: &str) -> Result<Uri> {
    let url = format!("{}://{}", scheme, address);
    url.parse().map_err(|e: http::uri::InvalidUri| Error::InvalidUri {
        reason: e.to_string(),
        url,
    })
}

impl<C> Service<Uri> for ServerConnector<C>
where
    C: Service<Uri>,
{
    type Response = C::Response;
    type Error = C::Error;
    type Future = C::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, dst: Uri) -> Self::Future {
        let target = self.target_for(&dst).clone();
        tracing::trace!(requested = %dst, dialing = %target, "Dialing configured server");
        self.inner.call(target)
    }
}
