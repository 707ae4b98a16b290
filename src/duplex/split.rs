//! Split-mode duplex connection.
//!
//! # Responsibilities
//! - Open the downstream GET and keep its body as the read side
//! - Feed writes through an in-memory pipe into a concurrently issued POST
//! - Convert any failure of the background POST into a connection close
//! - Close idempotently from any task, unblocking pending reads and writes
//!
//! # Design Decisions
//! - An unconnected connection is never handed out: [`SplitConn::open`]
//!   either returns an open connection or the setup error
//! - The upload is attempted once; there is no retry at this layer
//! - Upload failures are not reported to the caller, only observed as close

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use bytes::{Buf, Bytes};
use http::header::CONTENT_LENGTH;
use http::{Request, StatusCode, Uri};
use http_body::Body;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper_util::client::legacy::connect::Connect;
use hyper_util::client::legacy::Client;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::config::XhttpOption;
use crate::duplex::signal::CloseSignal;
use crate::duplex::{addr, closed_stream_error, DuplexConn};
use crate::error::{Error, Result};
use crate::http::body::{self, PipeBody, RequestBody};
use crate::http::HeaderDecorator;
use crate::lifecycle::cancelled;
use crate::net::connection::ConnectionId;
use crate::observability::metrics;

/// In-memory buffer between local writes and the upload request body.
const UPLOAD_PIPE_SIZE: usize = 32 * 1024;

/// Download and upload URLs of one split session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub download: String,
    pub upload: String,
}

/// Shared factory for split-mode connections.
///
/// Cloning is cheap; the HTTP client and decorator are shared.
pub struct SplitConnector<C> {
    client: Client<C, RequestBody>,
    decorator: Arc<HeaderDecorator>,
    option: Arc<XhttpOption>,
    base_url: String,
    remote: String,
}

impl<C: Clone> Clone for SplitConnector<C> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            decorator: Arc::clone(&self.decorator),
            option: Arc::clone(&self.option),
            base_url: self.base_url.clone(),
            remote: self.remote.clone(),
        }
    }
}

impl<C> SplitConnector<C>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    /// Create a connector for the server at `address`.
    ///
    /// Request URIs use the virtual host override as their authority when
    /// one is configured, so `client` must dial `address` regardless of the
    /// URI (see [`crate::http::ServerConnector`]).
    pub fn new(
        client: Client<C, RequestBody>,
        option: &XhttpOption,
        scheme: &str,
        address: &str,
    ) -> Result<Self> {
        let authority = option.host().unwrap_or(address);
        let base_url = format!("{}://{}", scheme, authority);
        base_url.parse::<Uri>().map_err(|e| Error::InvalidUri {
            url: base_url.clone(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            client,
            decorator: Arc::new(HeaderDecorator::new(option)?),
            option: Arc::new(option.clone()),
            base_url,
            remote: address.to_string(),
        })
    }

    /// Endpoint URLs for a new session.
    pub fn endpoints(&self) -> Endpoints {
        let session = self.option.session_path.then(Uuid::new_v4);
        Endpoints {
            download: self.url(self.option.download_path(), session),
            upload: self.url(self.option.upload_path(), session),
        }
    }

    fn url(&self, path: &str, session: Option<Uuid>) -> String {
        match session {
            Some(id) => format!("{}{}/{}", self.base_url, path.trim_end_matches('/'), id),
            None => format!("{}{}", self.base_url, path),
        }
    }

    /// Open a new connection. `cancel` aborts setup and later closes the
    /// connection when it fires.
    pub async fn connect(&self, cancel: Option<broadcast::Receiver<()>>) -> Result<SplitConn> {
        SplitConn::open(
            &self.client,
            Arc::clone(&self.decorator),
            self.endpoints(),
            &self.remote,
            cancel,
        )
        .await
    }
}

/// State shared between the connection and its upload task.
struct Shared {
    id: ConnectionId,
    signal: CloseSignal,
    download: Mutex<Option<Incoming>>,
    upload: Mutex<Option<DuplexStream>>,
}

impl Shared {
    /// Release both handles. Only the first call does anything; it returns
    /// `true`.
    fn close(&self) -> bool {
        if !self.signal.fire() {
            return false;
        }

        let download = lock(&self.download).take();
        let upload = lock(&self.upload).take();
        // Dropping the body releases the GET's connection; dropping the
        // write end ends the POST body.
        drop(download);
        drop(upload);

        tracing::debug!(connection_id = %self.id, "Split connection closed");
        true
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Closes a [`SplitConn`] from another task.
#[derive(Clone)]
pub struct CloseHandle {
    shared: Arc<Shared>,
}

impl CloseHandle {
    pub fn close(&self) {
        self.shared.close();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.signal.is_fired()
    }
}

/// A duplex connection built from a GET (reads) and a POST (writes).
pub struct SplitConn {
    shared: Arc<Shared>,
    /// Unread remainder of the last download frame.
    pending: Bytes,
    remote: SocketAddr,
}

impl SplitConn {
    /// Issue the download GET, start the upload POST, and return the open
    /// connection.
    pub async fn open<C>(
        client: &Client<C, RequestBody>,
        decorator: Arc<HeaderDecorator>,
        endpoints: Endpoints,
        remote: &str,
        cancel: Option<broadcast::Receiver<()>>,
    ) -> Result<Self>
    where
        C: Connect + Clone + Send + Sync + 'static,
    {
        let id = ConnectionId::new();
        let setup_cancel = cancel.as_ref().map(|rx| rx.resubscribe());

        // 1. Download stream (GET).
        let download = tokio::select! {
            result = open_download(client, &decorator, &endpoints.download) => result,
            _ = cancelled(setup_cancel) => Err(Error::Cancelled),
        };
        let download = match download {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(
                    connection_id = %id,
                    url = %endpoints.download,
                    error = %e,
                    "Download request failed"
                );
                metrics::record_connect_failure("split");
                return Err(e);
            }
        };

        // 2. Upload stream (POST) fed by an in-memory pipe.
        let (writer, reader) = tokio::io::duplex(UPLOAD_PIPE_SIZE);
        let shared = Arc::new(Shared {
            id,
            signal: CloseSignal::new(),
            download: Mutex::new(Some(download)),
            upload: Mutex::new(Some(writer)),
        });

        tokio::spawn(run_upload(
            Arc::clone(&shared),
            client.clone(),
            decorator,
            endpoints.upload.clone(),
            reader,
            cancel,
        ));

        tracing::debug!(
            connection_id = %id,
            download = %endpoints.download,
            upload = %endpoints.upload,
            "Split connection open"
        );

        Ok(Self {
            shared,
            pending: Bytes::new(),
            remote: addr::parse_remote(remote),
        })
    }

    /// Handle that can close this connection from another task.
    pub fn close_handle(&self) -> CloseHandle {
        CloseHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Close both directions. Idempotent.
    pub fn close(&self) {
        self.shared.close();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.signal.is_fired()
    }

    pub fn id(&self) -> ConnectionId {
        self.shared.id
    }
}

impl Drop for SplitConn {
    fn drop(&mut self) {
        self.shared.close();
    }
}

async fn open_download<C>(
    client: &Client<C, RequestBody>,
    decorator: &HeaderDecorator,
    url: &str,
) -> Result<Incoming>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    let mut req = Request::get(url).body(body::empty())?;
    decorator.apply(&mut req);

    let response = client.request(req).await?;
    if response.status() != StatusCode::OK {
        let status = response.status();
        // Release the body so the underlying connection is not leaked.
        drop(response);
        return Err(Error::Status(status));
    }
    Ok(response.into_body())
}

async fn run_upload<C>(
    shared: Arc<Shared>,
    client: Client<C, RequestBody>,
    decorator: Arc<HeaderDecorator>,
    url: String,
    reader: DuplexStream,
    cancel: Option<broadcast::Receiver<()>>,
) where
    C: Connect + Clone + Send + Sync + 'static,
{
    let cancelled = cancelled(cancel);
    tokio::pin!(cancelled);

    tokio::select! {
        _ = upload(&shared, &client, &decorator, &url, reader) => {}
        _ = &mut cancelled => {
            shared.close();
            return;
        }
    }

    // The upload is over; keep honouring the cancellation context until the
    // connection closes on its own.
    tokio::select! {
        _ = &mut cancelled => {
            shared.close();
        }
        _ = shared.signal.fired() => {}
    }
}

async fn upload<C>(
    shared: &Shared,
    client: &Client<C, RequestBody>,
    decorator: &HeaderDecorator,
    url: &str,
    reader: DuplexStream,
) where
    C: Connect + Clone + Send + Sync + 'static,
{
    let mut req = match Request::post(url).body(PipeBody::new(reader).boxed()) {
        Ok(req) => req,
        Err(e) => {
            tracing::warn!(connection_id = %shared.id, error = %e, "Invalid upload request");
            fail_upload(shared);
            return;
        }
    };
    decorator.apply(&mut req);
    // Unknown length: the body is streamed as it is written.
    req.headers_mut().remove(CONTENT_LENGTH);

    let response = match client.request(req).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(connection_id = %shared.id, url = %url, error = %e, "Upload request failed");
            fail_upload(shared);
            return;
        }
    };

    if response.status() != StatusCode::OK {
        tracing::warn!(
            connection_id = %shared.id,
            url = %url,
            status = %response.status(),
            "Upload rejected"
        );
        fail_upload(shared);
    }

    let mut body = response.into_body();
    while let Some(frame) = body.frame().await {
        if frame.is_err() {
            break;
        }
    }
    tracing::trace!(connection_id = %shared.id, "Upload response drained");
}

fn fail_upload(shared: &Shared) {
    metrics::record_upload_failure();
    shared.close();
}

impl AsyncRead for SplitConn {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            if this.shared.signal.is_fired() {
                return Poll::Ready(Ok(()));
            }

            if !this.pending.is_empty() {
                let n = this.pending.len().min(buf.remaining());
                buf.put_slice(&this.pending[..n]);
                this.pending.advance(n);
                return Poll::Ready(Ok(()));
            }

            this.shared.signal.register_reader(cx.waker());
            if this.shared.signal.is_fired() {
                return Poll::Ready(Ok(()));
            }

            let mut download = lock(&this.shared.download);
            let Some(body) = download.as_mut() else {
                return Poll::Ready(Ok(()));
            };

            match Pin::new(body).poll_frame(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(None) => return Poll::Ready(Ok(())),
                Poll::Ready(Some(Err(e))) => return Poll::Ready(Err(io::Error::other(e))),
                Poll::Ready(Some(Ok(frame))) => {
                    // Trailers carry no stream bytes.
                    if let Ok(data) = frame.into_data() {
                        this.pending = data;
                    }
                }
            }
        }
    }
}

impl AsyncWrite for SplitConn {
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

        let mut upload = lock(&shared.upload);
        match upload.as_mut() {
            Some(pipe) => Pin::new(pipe).poll_write(cx, buf),
            None => Poll::Ready(Err(closed_stream_error())),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    /// Half-close: ends the upload body, reads keep working.
    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let writer = lock(&self.shared.upload).take();
        if writer.is_some() {
            tracing::trace!(connection_id = %self.shared.id, "Upload direction shut down");
        }
        Poll::Ready(Ok(()))
    }
}

impl DuplexConn for SplitConn {
    fn close(&mut self) {
        self.shared.close();
    }

    fn remote_addr(&self) -> SocketAddr {
        self.remote
    }
}
