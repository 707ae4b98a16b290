//! Request decoration from configuration.
//!
//! # Responsibilities
//! - Apply the virtual host override (`Host` header)
//! - Apply configured extra headers, replacing existing values
//! - Add a browser `User-Agent` when the request has none
//! - Append configured query parameters to the request URI
//!
//! # Design Decisions
//! - Header names/values are parsed once at construction; a decorator that
//!   exists can always be applied
//! - Query parameters are appended, never replacing existing ones

use http::header::{HeaderMap, HeaderName, HeaderValue, HOST, USER_AGENT};
use http::{Request, Uri};

use crate::config::{ConfigError, XhttpOption};

/// User agent sent when neither the caller nor the configuration sets one.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Applies an [`XhttpOption`]'s host, headers and query to outgoing requests.
#[derive(Debug, Clone, Default)]
pub struct HeaderDecorator {
    host: Option<HeaderValue>,
    headers: HeaderMap,
    query: Vec<(String, String)>,
}

impl HeaderDecorator {
    /// Build a decorator, rejecting header names or values that cannot be sent.
    pub fn new(option: &XhttpOption) -> Result<Self, ConfigError> {
        let host = option
            .host()
            .map(|host| {
                HeaderValue::from_str(host).map_err(|e| ConfigError::InvalidHeader {
                    name: HOST.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        let mut headers = HeaderMap::with_capacity(option.headers.len());
        for (name, value) in &option.headers {
            let invalid = |reason: String| ConfigError::InvalidHeader {
                name: name.clone(),
                reason,
            };
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(e.to_string()))?;
            let header_value = HeaderValue::from_str(value).map_err(|e| invalid(e.to_string()))?;
            headers.insert(header_name, header_value);
        }

        let query = option
            .query
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(Self {
            host,
            headers,
            query,
        })
    }

    /// Decorate `req` in place.
    pub fn apply<B>(&self, req: &mut Request<B>) {
        // 1. Host override. The request URI already carries it as the
        //    authority; the header is for intermediaries that only inspect
        //    the header.
        if let Some(host) = &self.host {
            req.headers_mut().insert(HOST, host.clone());
        }

        // 2. Extra headers win over anything already set.
        for (name, value) in &self.headers {
            req.headers_mut().insert(name.clone(), value.clone());
        }

        // 3. Default user agent only when absent.
        if !req.headers().contains_key(USER_AGENT) {
            req.headers_mut()
                .insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
        }

        // 4. Query parameters.
        if !self.query.is_empty() {
            match merge_query(req.uri(), &self.query) {
                Some(uri) => *req.uri_mut() = uri,
                None => tracing::warn!(uri = %req.uri(), "Could not merge query parameters"),
            }
        }
    }
}

/// Append `params` to the query of `uri`, keeping every existing parameter.
fn merge_query(uri: &Uri, params: &[(String, String)]) -> Option<Uri> {
    let mut url = url::Url::parse(&uri.to_string()).ok()?;
    url.query_pairs_mut()
        .extend_pairs(params.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    url.as_str().parse().ok()
}
