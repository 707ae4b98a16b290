//! Error taxonomy for tunnel setup.
//!
//! Only connect/dial-time failures are represented here. Failures of the
//! background exchanges after a connection is open never surface as an
//! `Error`; they degrade into a closed connection and callers observe
//! end-of-stream on read and `BrokenPipe` on write.

use http::StatusCode;
use thiserror::Error;

use crate::config::loader::ConfigError;

/// Errors returned from `connect` / `dial`.
#[derive(Debug, Error)]
pub enum Error {
    /// The request URL could not be built or parsed.
    #[error("invalid request URL '{url}': {reason}")]
    InvalidUri { url: String, reason: String },

    /// The request object could not be constructed.
    #[error("failed to build request: {0}")]
    Build(#[from] http::Error),

    /// The pooled client failed to send the request.
    #[error("request failed: {0}")]
    Request(#[from] hyper_util::client::legacy::Error),

    /// HTTP/2 handshake or exchange failure.
    #[error("http exchange failed: {0}")]
    Http(#[from] hyper::Error),

    /// The server answered with something other than 200 OK.
    #[error("unexpected status code: {0}")]
    Status(StatusCode),

    /// The cancellation context fired before the connection was established.
    #[error("connection attempt cancelled")]
    Cancelled,

    /// TLS configuration or handshake failure.
    #[error("tls error: {0}")]
    Tls(String),

    /// Socket-level failure while dialing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration handed to a constructor.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl Error {
    /// Status code carried by a [`Error::Status`] rejection.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Status(code) => Some(*code),
            _ => None,
        }
    }
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_names_code() {
        let err = Error::Status(StatusCode::NOT_FOUND);
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
        assert!(err.to_string().contains("404"));
    }

    #[test]
    fn non_status_errors_have_no_code() {
        let err = Error::Cancelled;
        assert_eq!(err.status(), None);
    }
}
