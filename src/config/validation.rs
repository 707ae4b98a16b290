//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses, paths and header syntax before any dial happens
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ClientConfig → Result<(), Vec<ValidationError>>

use std::fmt;
use std::net::SocketAddr;

use http::header::{HeaderName, HeaderValue};

use crate::config::schema::{ClientConfig, XhttpOption};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be greater than 0"));
    }

    if !config.server.address.is_empty() && split_port(&config.server.address).is_none() {
        errors.push(ValidationError::new(
            "server.address",
            format!("'{}' must be host:port", config.server.address),
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    validate_option(&config.xhttp, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_option(option: &XhttpOption, errors: &mut Vec<ValidationError>) {
    let paths = [
        ("xhttp.path", &option.path),
        ("xhttp.upload_path", &option.upload_path),
        ("xhttp.download_path", &option.download_path),
    ];
    for (field, path) in paths {
        if let Some(path) = path.as_deref().filter(|p| !p.is_empty()) {
            if !path.starts_with('/') {
                errors.push(ValidationError::new(field, format!("'{}' must start with '/'", path)));
            }
        }
    }

    if let Some(host) = option.host() {
        if HeaderValue::from_str(host).is_err() {
            errors.push(ValidationError::new("xhttp.host", "not a valid header value"));
        }
    }

    for (name, value) in &option.headers {
        if HeaderName::from_bytes(name.as_bytes()).is_err() {
            errors.push(ValidationError::new(
                format!("xhttp.headers.{}", name),
                "not a valid header name",
            ));
        }
        if HeaderValue::from_str(value).is_err() {
            errors.push(ValidationError::new(
                format!("xhttp.headers.{}", name),
                "not a valid header value",
            ));
        }
    }
}

/// Split `host:port`, returning `None` when no numeric port is present.
pub(crate) fn split_port(address: &str) -> Option<(&str, u16)> {
    let (host, port) = address.rsplit_once(':')?;
    let port = port.parse().ok()?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return None;
    }
    Some((host, port))
}
