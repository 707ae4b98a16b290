//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Local TCP socket
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (session IDs, active tracking)
//!     → forwarder.rs (open tunnel, copy both ways)
//!
//! Outbound TLS:
//!     tls.rs (rustls client config for both transports)
//! ```

pub mod connection;
pub mod forwarder;
pub mod listener;
pub mod tls;

pub use forwarder::Forwarder;
pub use listener::Listener;
