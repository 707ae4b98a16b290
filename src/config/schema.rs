//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the client.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root configuration for the tunnel client.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ClientConfig {
    /// Local listener accepting sockets to tunnel.
    pub listener: ListenerConfig,

    /// Remote server and transport selection.
    pub server: ServerConfig,

    /// Request decoration and path layout.
    pub xhttp: XhttpOption,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:1080").
    pub bind_address: String,

    /// Maximum concurrent tunnelled sessions (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:1080".to_string(),
            max_connections: 1024,
        }
    }
}

/// Which duplex emulation carries a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// GET for downstream, concurrent POST for upstream.
    #[default]
    Split,
    /// One HTTP/2 POST carrying both directions.
    Duplex,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Split => "split",
            TransportKind::Duplex => "duplex",
        }
    }
}

/// Remote endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server address as `host:port`.
    pub address: String,

    /// Duplex emulation to use.
    pub transport: TransportKind,

    /// TLS settings for the outbound connection.
    pub tls: TlsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            transport: TransportKind::Split,
            tls: TlsConfig::default(),
        }
    }
}

/// Outbound TLS settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Use `https` when true, plain `http` otherwise.
    pub enabled: bool,

    /// SNI override; defaults to the URL host.
    pub server_name: Option<String>,

    /// Extra trust anchors (PEM). Web PKI roots are used when unset.
    pub ca_file: Option<String>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            server_name: None,
            ca_file: None,
        }
    }
}

/// Framing selector carried by the option. Only `stream` is exercised by
/// the connection variants; `packet` is accepted and passed through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Stream,
    Packet,
}

/// Request decoration and path layout shared by both connection variants.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct XhttpOption {
    /// Virtual host override (sent as `Host`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Base path; `/` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    pub mode: Mode,

    /// Extra request headers. Keys are unique.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    /// Path for the upstream POST in split mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_path: Option<String>,

    /// Path for the downstream GET in split mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_path: Option<String>,

    /// Query parameters appended to every request (e.g. `ed=2048`).
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub query: BTreeMap<String, String>,

    /// Declared for compatibility; does not alter wire bytes.
    pub padding: bool,

    /// Append a per-session UUID segment to split-mode paths so the server
    /// can pair the GET with its POST.
    pub session_path: bool,
}

impl XhttpOption {
    /// Base path, defaulting to the root.
    pub fn base_path(&self) -> &str {
        non_empty(&self.path).unwrap_or("/")
    }

    /// Download path, falling back to the base path.
    pub fn download_path(&self) -> &str {
        non_empty(&self.download_path).unwrap_or_else(|| self.base_path())
    }

    /// Upload path, falling back to the base path.
    pub fn upload_path(&self) -> &str {
        non_empty(&self.upload_path).unwrap_or_else(|| self.base_path())
    }

    /// Host override, if configured and non-empty.
    pub fn host(&self) -> Option<&str> {
        non_empty(&self.host)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
