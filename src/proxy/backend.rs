// src/proxy/backend.rs
use super::ProxyError;
use std::fmt;
use url::Url;

/// A backend host requests can be forwarded to.
///
/// Only absolute `http`/`https` URLs with a host are accepted, which keeps
/// every later rewrite against this URL infallible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backend {
    pub id: String,
    pub url: Url,
}

impl Backend {
    pub fn parse(raw: &str) -> Result<Self, ProxyError> {
        let url = Url::parse(raw).map_err(|e| ProxyError::MalformedBackendUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;
        Self::from_url(url)
    }

    pub fn from_url(url: Url) -> Result<Self, ProxyError> {
        let malformed = |reason: &str| ProxyError::MalformedBackendUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        };

        if !matches!(url.scheme(), "http" | "https") {
            return Err(malformed("scheme must be http or https"));
        }

        let host = url.host_str().ok_or_else(|| malformed("missing host"))?;
        if host.is_empty() {
            return Err(malformed("missing host"));
        }

        let id = format!(
            "{}:{}",
            host,
            url.port_or_known_default().unwrap_or(80)
        );

        Ok(Self { id, url })
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

/// Parse a list of backend URLs, stopping at the first malformed one.
pub fn parse_backends<I, S>(raw: I) -> Result<Vec<Backend>, ProxyError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    raw.into_iter().map(|s| Backend::parse(s.as_ref())).collect()
}
