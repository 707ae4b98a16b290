//! Duplex connections emulated over HTTP exchanges.
//!
//! # Data Flow
//! ```text
//! Split mode (split.rs):
//!     read  ← GET response body
//!     write → in-memory pipe → background POST request body
//!
//! Single-request mode (bridge.rs):
//!     caller pipe half ⇄ bridge task ⇄ one HTTP/2 POST (request body up,
//!                                       response body down)
//! ```
//!
//! # Design Decisions
//! - Failures after setup never surface as errors; they close the connection
//! - After close, reads return end-of-stream and writes fail with
//!   `BrokenPipe`, without touching released handles
//! - Deadlines are accepted and ignored

pub mod addr;
pub mod bridge;
pub(crate) mod signal;
pub mod split;
pub mod tunnel;

use std::io;
use std::net::SocketAddr;
use std::time::Instant;

use tokio::io::{AsyncRead, AsyncWrite};

pub use bridge::{Dialer, PipeCloseHandle, PipeConn, BRIDGE_BUFFER_SIZE};
pub use split::{CloseHandle, Endpoints, SplitConn, SplitConnector};
pub use tunnel::{Tunnel, TunnelStream};

/// Socket-like surface shared by both connection variants.
pub trait DuplexConn: AsyncRead + AsyncWrite + Unpin + Send {
    /// Close both directions. Idempotent; never fails.
    fn close(&mut self);

    fn local_addr(&self) -> SocketAddr {
        addr::unspecified()
    }

    fn remote_addr(&self) -> SocketAddr;

    /// Accepted and ignored.
    fn set_deadline(&self, _deadline: Option<Instant>) -> io::Result<()> {
        Ok(())
    }

    /// Accepted and ignored.
    fn set_read_deadline(&self, _deadline: Option<Instant>) -> io::Result<()> {
        Ok(())
    }

    /// Accepted and ignored.
    fn set_write_deadline(&self, _deadline: Option<Instant>) -> io::Result<()> {
        Ok(())
    }
}

/// Error returned by writes on a closed connection.
pub(crate) fn closed_stream_error() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "write on closed stream")
}
