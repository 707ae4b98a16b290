//! Duplex byte-stream connections over plain HTTP exchanges.
//!
//! Two variants present the same socket-like surface:
//! - [`SplitConn`]: downstream GET body plus a concurrent upstream POST
//! - [`PipeConn`]: one HTTP/2 POST whose request and response bodies are
//!   bridged through an in-memory pipe

pub mod config;
pub mod duplex;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::{ClientConfig, XhttpOption};
pub use duplex::{Dialer, DuplexConn, PipeConn, SplitConn, SplitConnector, Tunnel, TunnelStream};
pub use error::{Error, Result};
pub use http::{HeaderDecorator, RoundTrip};
pub use lifecycle::Shutdown;
