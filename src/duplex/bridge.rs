//! Single-request duplex mode.
//!
//! # Responsibilities
//! - Turn one HTTP/2 POST into a duplex connection via an in-memory pipe
//! - Stream caller writes as the request body
//! - Forward the response body into the caller's read side in order
//!
//! # Design Decisions
//! - `dial` fails only when the request cannot be built; every exchange
//!   failure shows up later as end-of-stream on the caller's reads
//! - The response body is forwarded whatever its status; a non-2xx status
//!   is only logged and counted
//! - The bridge task exclusively owns its pipe half and the exchange

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use http::{Request, Uri};
use http_body_util::BodyExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf, WriteHalf};

use crate::config::validation::split_port;
use crate::config::XhttpOption;
use crate::duplex::signal::CloseSignal;
use crate::duplex::{addr, closed_stream_error, DuplexConn};
use crate::error::{Error, Result};
use crate::http::body::{PipeBody, RequestBody};
use crate::http::{HeaderDecorator, RoundTrip};
use crate::net::connection::ConnectionId;
use crate::observability::metrics;

/// Pipe capacity and largest chunk written into it by the bridge task.
pub const BRIDGE_BUFFER_SIZE: usize = 32 * 1024;

/// Produces one [`PipeConn`] per dial, each backed by a single exchange.
pub struct Dialer<T> {
    option: Arc<XhttpOption>,
    decorator: Arc<HeaderDecorator>,
    transport: Arc<T>,
}

impl<T> Clone for Dialer<T> {
    fn clone(&self) -> Self {
        Self {
            option: Arc::clone(&self.option),
            decorator: Arc::clone(&self.decorator),
            transport: Arc::clone(&self.transport),
        }
    }
}

impl<T: RoundTrip> Dialer<T> {
    pub fn new(option: &XhttpOption, transport: T) -> Result<Self> {
        Ok(Self {
            option: Arc::new(option.clone()),
            decorator: Arc::new(HeaderDecorator::new(option)?),
            transport: Arc::new(transport),
        })
    }

    /// Request URL for a dial to `address`: the virtual host override, else
    /// the address host, plus the configured path.
    pub fn request_url(&self, address: &str) -> String {
        let host = match self.option.host() {
            Some(host) => host.to_string(),
            None => match host_of(address) {
                ip6 if ip6.contains(':') => format!("[{}]", ip6),
                host => host.to_string(),
            },
        };
        format!("https://{}{}", host, self.option.base_path())
    }

    /// Start a session with `address` and return the caller's end of it.
    ///
    /// `network` is recorded for diagnostics only; the exchange always runs
    /// over the transport's own TCP + TLS connection.
    pub fn dial(&self, network: &str, address: &str) -> Result<PipeConn> {
        let url = self.request_url(address);
        let uri: Uri = url.parse().map_err(|e: http::uri::InvalidUri| Error::InvalidUri {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        let (caller, bridged) = tokio::io::duplex(BRIDGE_BUFFER_SIZE);
        let (upstream, downstream) = tokio::io::split(bridged);

        let mut req = Request::post(uri).body(PipeBody::new(upstream).boxed())?;
        self.decorator.apply(&mut req);

        let id = ConnectionId::new();
        tracing::debug!(connection_id = %id, network = %network, url = %url, "Dialing single-request session");
        tokio::spawn(bridge(Arc::clone(&self.transport), req, downstream, id));

        Ok(PipeConn::new(caller, addr::parse_remote(address)))
    }
}

/// Host part of a dial address. A bracket-less address with several colons
/// is a bare IPv6 literal and has no port.
fn host_of(address: &str) -> &str {
    let bare_ipv6 = !address.starts_with('[') && address.matches(':').count() > 1;
    if !bare_ipv6 {
        if let Some((host, _)) = split_port(address) {
            return host;
        }
    }
    address.trim_start_matches('[').trim_end_matches(']')
}

/// Run the exchange and copy its response into the pipe. The pipe's write
/// side is shut down on every exit path.
async fn bridge<T: RoundTrip>(
    transport: Arc<T>,
    req: Request<RequestBody>,
    mut sink: WriteHalf<DuplexStream>,
    id: ConnectionId,
) {
    match transport.round_trip(req).await {
        Err(e) => {
            tracing::warn!(connection_id = %id, error = %e, "Exchange failed");
            metrics::record_bridge_failure();
        }
        Ok(response) => {
            if !response.status().is_success() {
                tracing::warn!(connection_id = %id, status = %response.status(), "Exchange answered with non-success status");
                metrics::record_bridge_failure();
            }

            let mut body = response.into_body();
            'forward: while let Some(frame) = body.frame().await {
                let frame = match frame {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::debug!(connection_id = %id, error = %e, "Response body ended with error");
                        break;
                    }
                };
                let Ok(data) = frame.into_data() else {
                    continue;
                };
                for chunk in data.chunks(BRIDGE_BUFFER_SIZE) {
                    if let Err(e) = sink.write_all(chunk).await {
                        tracing::debug!(connection_id = %id, error = %e, "Caller side gone");
                        break 'forward;
                    }
                }
            }
        }
    }

    let _ = sink.shutdown().await;
    tracing::debug!(connection_id = %id, "Single-request session finished");
}

/// Caller half of the pipe plus its close signal.
#[derive(Debug)]
struct PipeShared {
    signal: CloseSignal,
    stream: Mutex<Option<DuplexStream>>,
}

impl PipeShared {
    fn close(&self, remote: SocketAddr) {
        if !self.signal.fire() {
            return;
        }
        // Dropping our half ends the bridge task's writes and the request body.
        drop(lock(&self.stream).take());
        tracing::trace!(remote = %remote, "Pipe connection closed");
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Closes a [`PipeConn`] from another task.
#[derive(Debug, Clone)]
pub struct PipeCloseHandle {
    shared: Arc<PipeShared>,
    remote: SocketAddr,
}

impl PipeCloseHandle {
    pub fn close(&self) {
        self.shared.close(self.remote);
    }

    pub fn is_closed(&self) -> bool {
        self.shared.signal.is_fired()
    }
}

/// The caller's half of a single-request session.
#[derive(Debug)]
pub struct PipeConn {
    shared: Arc<PipeShared>,
    remote: SocketAddr,
}

impl PipeConn {
    fn new(inner: DuplexStream, remote: SocketAddr) -> Self {
        Self {
            shared: Arc::new(PipeShared {
                signal: CloseSignal::new(),
                stream: Mutex::new(Some(inner)),
            }),
            remote,
        }
    }

    /// Handle that can close this connection while a read or write is pending.
    pub fn close_handle(&self) -> PipeCloseHandle {
        PipeCloseHandle {
            shared: Arc::clone(&self.shared),
            remote: self.remote,
        }
    }

    /// Close the caller's half. Idempotent.
    pub fn close(&self) {
        self.shared.close(self.remote);
    }

    pub fn is_closed(&self) -> bool {
        self.shared.signal.is_fired()
    }
}

impl Drop for PipeConn {
    fn drop(&mut self) {
        self.shared.close(self.remote);
    }
}

impl AsyncRead for PipeConn {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let shared = &self.shared;
        if shared.signal.is_fired() {
            return Poll::Ready(Ok(()));
        }
        shared.signal.register_reader(cx.waker());
        if shared.signal.is_fired() {
            return Poll::Ready(Ok(()));
        }

        match lock(&shared.stream).as_mut() {
            Some(inner) => Pin::new(inner).poll_read(cx, buf),
            None => Poll::Ready(Ok(())),
        }
    }
}

impl AsyncWrite for PipeConn {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let shared = &self.shared;
        if shared.signal.is_fired() {
            return Poll::Ready(Err(closed_stream_error()));
        }
        shared.signal.register_writer(cx.waker());
        if shared.signal.is_fired() {
            return Poll::Ready(Err(closed_stream_error()));
        }

        match lock(&shared.stream).as_mut() {
            Some(inner) => Pin::new(inner).poll_write(cx, buf),
            None => Poll::Ready(Err(closed_stream_error())),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match lock(&self.shared.stream).as_mut() {
            Some(inner) => Pin::new(inner).poll_flush(cx),
            None => Poll::Ready(Ok(())),
        }
    }

    /// Half-close: ends the request body, reads keep working.
    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match lock(&self.shared.stream).as_mut() {
            Some(inner) => Pin::new(inner).poll_shutdown(cx),
            None => Poll::Ready(Ok(())),
        }
    }
}

impl DuplexConn for PipeConn {
    fn close(&mut self) {
        PipeConn::close(self);
    }

    fn remote_addr(&self) -> SocketAddr {
        self.remote
    }
}
