//! HTTP plumbing shared by both connection variants.
//!
//! # Data Flow
//! ```text
//! XhttpOption
//!     → decorator.rs (host, headers, user agent, query)
//!     → client.rs (pooled client for split mode)
//!         → connect.rs (dials the configured server whatever the authority)
//!     → transport.rs (one HTTP/2 exchange per dial)
//!     → body.rs (pipe read-end streamed as a request body)
//! ```

pub mod body;
pub mod client;
pub mod connect;
pub mod decorator;
pub mod transport;

pub use body::{BoxError, PipeBody, RequestBody, ResponseBody};
pub use client::{build_client, build_plain_client, HttpsClient, PlainClient};
pub use connect::ServerConnector;
pub use decorator::{HeaderDecorator, DEFAULT_USER_AGENT};
pub use transport::{H2Transport, RoundTrip};
