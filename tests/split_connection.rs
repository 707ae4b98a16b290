//! Split-mode connections against a loopback HTTP/1 server.

use std::convert::Infallible;
use std::io::ErrorKind;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::{header, Method};
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioIo};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time::timeout;

use xhttp_client::http::{ServerConnector, DEFAULT_USER_AGENT};
use xhttp_client::{DuplexConn, Shutdown, SplitConnector, XhttpOption};

mod common;

const BOUND: Duration = Duration::from_secs(5);

#[tokio::test]
async fn echoes_through_get_and_post() {
    let server = common::start_mock_server().await;
    let connector = server.connector(XhttpOption::default(), "/down", "/up");

    let mut conn = connector.connect(None).await.expect("connect");
    conn.write_all(b"ping").await.unwrap();

    let mut buf = [0u8; 4];
    timeout(BOUND, conn.read_exact(&mut buf)).await.unwrap().unwrap();
    assert_eq!(&buf, b"ping");

    conn.write_all(b"second message").await.unwrap();
    let mut buf = [0u8; 14];
    timeout(BOUND, conn.read_exact(&mut buf)).await.unwrap().unwrap();
    assert_eq!(&buf, b"second message");

    assert_eq!(conn.remote_addr(), server.addr);
    conn.close();
}

#[tokio::test]
async fn both_requests_carry_the_same_decoration() {
    let server = common::start_mock_server().await;
    let mut option = XhttpOption {
        host: Some("cdn.example.com".into()),
        ..Default::default()
    };
    option.headers.insert("X-Tunnel".into(), "on".into());
    option.query.insert("ed".into(), "2048".into());
    let connector = server.connector(option, "/down", "/up");

    let mut conn = connector.connect(None).await.expect("connect");
    conn.write_all(b"x").await.unwrap();
    let mut buf = [0u8; 1];
    timeout(BOUND, conn.read_exact(&mut buf)).await.unwrap().unwrap();

    let get = server.state.request(Method::GET).expect("GET recorded");
    let post = server.state.request(Method::POST).expect("POST recorded");
    for recorded in [&get, &post] {
        assert_eq!(recorded.headers[header::HOST], "cdn.example.com");
        assert_eq!(recorded.headers[header::USER_AGENT], DEFAULT_USER_AGENT);
        assert_eq!(recorded.headers["x-tunnel"], "on");
        assert_eq!(recorded.uri.query(), Some("ed=2048"));
    }

    // Unknown length: streamed, never sized up front.
    assert!(post.headers.get(header::CONTENT_LENGTH).is_none());
    assert_eq!(post.headers[header::TRANSFER_ENCODING], "chunked");
}

#[tokio::test]
async fn rejects_non_ok_download_and_releases_body() {
    let server = common::start_mock_server().await;
    let connector = server.connector(XhttpOption::default(), "/missing", "/sink");

    let err = match connector.connect(None).await {
        Ok(_) => panic!("connect should fail on 404"),
        Err(e) => e,
    };
    assert_eq!(err.status(), Some(axum::http::StatusCode::NOT_FOUND));
    assert!(err.to_string().contains("404"));

    let released = server.state.rejected_body_released.clone();
    assert!(
        common::eventually(BOUND, || released.load(std::sync::atomic::Ordering::SeqCst)).await,
        "404 response body was never released"
    );
    // The upload is never attempted when the download fails.
    assert!(server.state.request(Method::POST).is_none());
}

#[tokio::test]
async fn upload_failure_closes_the_connection() {
    let server = common::start_mock_server().await;
    let connector = server.connector(XhttpOption::default(), "/silent", "/reject");

    let mut conn = connector.connect(None).await.expect("connect");
    let mut buf = [0u8; 8];
    let n = timeout(BOUND, conn.read(&mut buf))
        .await
        .expect("read should end once the upload is rejected")
        .unwrap();
    assert_eq!(n, 0);
    assert!(conn.is_closed());

    let err = conn.write(b"late").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BrokenPipe);
}

#[tokio::test]
async fn close_is_idempotent_and_final() {
    let server = common::start_mock_server().await;
    let connector = server.connector(XhttpOption::default(), "/silent", "/sink");

    let mut conn = connector.connect(None).await.expect("connect");
    for _ in 0..5 {
        conn.close();
    }
    DuplexConn::close(&mut conn);

    let mut buf = [0u8; 8];
    for _ in 0..3 {
        let n = timeout(Duration::from_millis(200), conn.read(&mut buf))
            .await
            .expect("read after close must not block")
            .unwrap();
        assert_eq!(n, 0);

        let err = timeout(Duration::from_millis(200), conn.write(b"data"))
            .await
            .expect("write after close must not block")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BrokenPipe);
        assert_eq!(err.to_string(), "write on closed stream");
    }
}

#[tokio::test]
async fn concurrent_close_unblocks_pending_read() {
    let server = common::start_mock_server().await;
    let connector = server.connector(XhttpOption::default(), "/silent", "/sink");

    let mut conn = connector.connect(None).await.expect("connect");
    let handle = conn.close_handle();

    let reader = tokio::spawn(async move {
        let mut buf = [0u8; 16];
        conn.read(&mut buf).await
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!reader.is_finished());
    handle.close();
    handle.close();

    let n = timeout(BOUND, reader).await.expect("read unblocks").unwrap().unwrap();
    assert_eq!(n, 0);
    assert!(handle.is_closed());
}

#[tokio::test]
async fn concurrent_close_unblocks_writer() {
    let server = common::start_mock_server().await;
    let connector = server.connector(XhttpOption::default(), "/silent", "/sink");

    let mut conn = connector.connect(None).await.expect("connect");
    let handle = conn.close_handle();

    let writer = tokio::spawn(async move {
        let chunk = vec![7u8; 64 * 1024];
        loop {
            if let Err(e) = conn.write_all(&chunk).await {
                return e;
            }
        }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.close();

    let err = timeout(BOUND, writer).await.expect("writer unblocks").unwrap();
    assert_eq!(err.kind(), ErrorKind::BrokenPipe);
}

#[tokio::test]
async fn cancellation_context_closes_the_connection() {
    let server = common::start_mock_server().await;
    let connector = server.connector(XhttpOption::default(), "/silent", "/sink");
    let shutdown = Shutdown::new();

    let mut conn = connector.connect(Some(shutdown.subscribe())).await.expect("connect");
    shutdown.trigger();

    let mut buf = [0u8; 8];
    let n = timeout(BOUND, conn.read(&mut buf)).await.expect("read unblocks").unwrap();
    assert_eq!(n, 0);
    assert!(conn.is_closed());
}

#[tokio::test]
async fn shutdown_half_closes_upload_only() {
    let server = common::start_mock_server().await;
    let connector = server.connector(XhttpOption::default(), "/down", "/up");

    let mut conn = connector.connect(None).await.expect("connect");
    conn.write_all(b"abc").await.unwrap();
    conn.shutdown().await.unwrap();

    let mut buf = [0u8; 3];
    timeout(BOUND, conn.read_exact(&mut buf)).await.unwrap().unwrap();
    assert_eq!(&buf, b"abc");
    assert!(!conn.is_closed());

    let err = conn.write(b"more").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BrokenPipe);
}

/// Method, `:authority` and `Host` of each request an h2c server saw.
type Seen = Arc<Mutex<Vec<(Method, Option<String>, Option<String>)>>>;

async fn start_h2c_server() -> (std::net::SocketAddr, Seen) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen: Seen = Arc::default();

    let recorded = seen.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let recorded = recorded.clone();
            let service = service_fn(move |req: http::Request<Incoming>| {
                let recorded = recorded.clone();
                async move {
                    let authority = req.uri().authority().map(|a| a.to_string());
                    let host = req
                        .headers()
                        .get(header::HOST)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_owned);
                    recorded.lock().unwrap().push((req.method().clone(), authority, host));
                    Ok::<_, Infallible>(http::Response::new(Full::new(Bytes::from_static(b"ok"))))
                }
            });
            tokio::spawn(async move {
                let _ = hyper::server::conn::http2::Builder::new(TokioExecutor::new())
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    (addr, seen)
}

#[tokio::test]
async fn host_override_is_the_http2_authority() {
    let (addr, seen) = start_h2c_server().await;
    let address = addr.to_string();

    let client = Client::builder(TokioExecutor::new())
        .http2_only(true)
        .build(ServerConnector::new(HttpConnector::new(), &address).unwrap());
    let option = XhttpOption {
        host: Some("cdn.example.com".into()),
        ..Default::default()
    };
    let connector = SplitConnector::new(client, &option, "http", &address).unwrap();

    let mut conn = timeout(BOUND, connector.connect(None))
        .await
        .unwrap()
        .expect("connect over h2c");
    let mut buf = [0u8; 2];
    timeout(BOUND, conn.read_exact(&mut buf)).await.unwrap().unwrap();
    assert_eq!(&buf, b"ok");

    assert!(
        common::eventually(BOUND, || seen.lock().unwrap().len() == 2).await,
        "both requests reach the server"
    );
    for (method, authority, host) in seen.lock().unwrap().iter() {
        assert_eq!(authority.as_deref(), Some("cdn.example.com"), "{method}");
        assert_eq!(host.as_deref(), Some("cdn.example.com"), "{method}");
    }
    assert_eq!(conn.remote_addr(), addr);
}
