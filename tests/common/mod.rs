//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use futures_util::StreamExt;
use hyper_util::client::legacy::connect::HttpConnector;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use xhttp_client::http::{build_plain_client, ServerConnector};
use xhttp_client::{SplitConnector, XhttpOption};

/// A request as seen by the mock server.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
}

/// State behind the mock split-mode server.
///
/// Bytes POSTed to `/up` are echoed on the body of `GET /down`.
pub struct MockState {
    downstream: Mutex<Option<mpsc::Receiver<Bytes>>>,
    upstream: mpsc::Sender<Bytes>,
    requests: Mutex<Vec<Recorded>>,
    /// Set once the body of a `/missing` response has been dropped.
    pub rejected_body_released: Arc<AtomicBool>,
}

impl MockState {
    fn record(&self, method: Method, uri: &Uri, headers: &HeaderMap) {
        self.requests.lock().unwrap().push(Recorded {
            method,
            uri: uri.clone(),
            headers: headers.clone(),
        });
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request(&self, method: Method) -> Option<Recorded> {
        self.requests().into_iter().find(|r| r.method == method)
    }
}

pub struct MockServer {
    pub addr: SocketAddr,
    pub state: Arc<MockState>,
}

impl MockServer {
    /// Build a connector for this server with the given download/upload paths.
    pub fn connector(
        &self,
        mut option: XhttpOption,
        download: &str,
        upload: &str,
    ) -> SplitConnector<ServerConnector<HttpConnector>> {
        option.download_path = Some(download.to_string());
        option.upload_path = Some(upload.to_string());
        let address = self.addr.to_string();
        SplitConnector::new(build_plain_client(&address).unwrap(), &option, "http", &address).unwrap()
    }
}

/// Start the mock split-mode server on an ephemeral port.
///
/// Routes:
/// - `GET /down`: echo of everything POSTed to `/up`
/// - `POST /up`: forwards its body to `/down`
/// - `GET /missing`: 404 with a body that streams until dropped
/// - `GET /silent`: 200 with a body that never produces data
/// - `POST /sink`: discards its body, 200
/// - `POST /reject`: 500 without reading the body
pub async fn start_mock_server() -> MockServer {
    let (tx, rx) = mpsc::channel(16);
    let state = Arc::new(MockState {
        downstream: Mutex::new(Some(rx)),
        upstream: tx,
        requests: Mutex::new(Vec::new()),
        rejected_body_released: Arc::new(AtomicBool::new(false)),
    });

    let app = Router::new()
        .route("/down", get(down))
        .route("/up", post(up))
        .route("/missing", get(missing))
        .route("/silent", get(silent))
        .route("/sink", post(sink))
        .route("/reject", post(reject))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    MockServer { addr, state }
}

async fn down(State(state): State<Arc<MockState>>, uri: Uri, headers: HeaderMap) -> Response {
    state.record(Method::GET, &uri, &headers);
    let Some(rx) = state.downstream.lock().unwrap().take() else {
        return StatusCode::CONFLICT.into_response();
    };
    let stream = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (Ok::<_, Infallible>(chunk), rx))
    });
    Body::from_stream(stream).into_response()
}

async fn up(
    State(state): State<Arc<MockState>>,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> StatusCode {
    state.record(Method::POST, &uri, &headers);
    let mut stream = body.into_data_stream();
    while let Some(Ok(chunk)) = stream.next().await {
        if state.upstream.send(chunk).await.is_err() {
            break;
        }
    }
    StatusCode::OK
}

struct ReleaseFlag(Arc<AtomicBool>);

impl Drop for ReleaseFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

async fn missing(State(state): State<Arc<MockState>>, uri: Uri, headers: HeaderMap) -> Response {
    state.record(Method::GET, &uri, &headers);
    let flag = ReleaseFlag(state.rejected_body_released.clone());
    let stream = futures_util::stream::unfold(flag, |flag| async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Some((Ok::<_, Infallible>(Bytes::from_static(b"not found ")), flag))
    });
    (StatusCode::NOT_FOUND, Body::from_stream(stream)).into_response()
}

async fn silent(State(state): State<Arc<MockState>>, uri: Uri, headers: HeaderMap) -> Response {
    state.record(Method::GET, &uri, &headers);
    let stream = futures_util::stream::pending::<Result<Bytes, Infallible>>();
    Body::from_stream(stream).into_response()
}

async fn sink(
    State(state): State<Arc<MockState>>,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> StatusCode {
    state.record(Method::POST, &uri, &headers);
    let mut stream = body.into_data_stream();
    while let Some(Ok(_)) = stream.next().await {}
    StatusCode::OK
}

async fn reject(State(state): State<Arc<MockState>>, uri: Uri, headers: HeaderMap) -> StatusCode {
    state.record(Method::POST, &uri, &headers);
    StatusCode::INTERNAL_SERVER_ERROR
}

/// Poll `check` until it holds or `limit` elapses.
pub async fn eventually(limit: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
