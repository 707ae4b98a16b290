//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ClientConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),

    /// A header name or value that cannot be put on the wire.
    #[error("Invalid header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<ClientConfig, ConfigError> {
    let config: ClientConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ClientConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config = parse_config(&content)?;

    tracing::debug!(path = ?path, "Configuration file parsed");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{Mode, TransportKind};

    const SAMPLE: &str = r#"
[listener]
bind_address = "127.0.0.1:1081"

[server]
address = "edge.example.com:443"
transport = "duplex"

[xhttp]
host = "cdn.example.com"
path = "/tunnel"
mode = "packet"
padding = true

[xhttp.headers]
"X-Forwarded-Proto" = "https"

[xhttp.query]
ed = "2048"
"#;

    #[test]
    fn parses_full_document() {
        let config = parse_config(SAMPLE).unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:1081");
        assert_eq!(config.server.transport, TransportKind::Duplex);
        assert!(config.server.tls.enabled);
        assert_eq!(config.xhttp.host(), Some("cdn.example.com"));
        assert_eq!(config.xhttp.mode, Mode::Packet);
        assert_eq!(config.xhttp.headers["X-Forwarded-Proto"], "https");
        assert_eq!(config.xhttp.query["ed"], "2048");
        assert!(config.xhttp.padding);
    }

    #[test]
    fn rejects_semantic_errors() {
        let err = parse_config("[server]\naddress = \"no-port\"\n").unwrap_err();
        match err {
            ConfigError::Validation(errors) => {
                assert!(errors.iter().any(|e| e.field == "server.address"));
            }
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(matches!(
            parse_config("[server\naddress = 1"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_config(Path::new("/nonexistent/xhttp.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
