// src/proxy/transport.rs
// Forwards an already-rewritten request to its backend and streams the
// response back. No selection or retry logic lives here.

use super::ProxyError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hyper::client::HttpConnector;
use hyper::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, HOST};
use hyper::{Body, Client, Request, Response, Uri};
use hyper_tls::HttpsConnector;
use std::net::SocketAddr;
use url::Url;

const X_FORWARDED_FOR: &str = "x-forwarded-for";

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

#[async_trait]
pub trait Forwarder: Send + Sync {
    /// Send `req` to `url` and return the backend's response.
    async fn forward(&self, req: Request<Body>, url: Url) -> Result<Response<Body>, ProxyError>;
}

/// Client peer address, inserted into request extensions by the server.
#[derive(Debug, Clone, Copy)]
pub struct ClientAddr(pub SocketAddr);

#[derive(Clone)]
pub struct HttpForwarder {
    client: Client<HttpsConnector<HttpConnector>, Body>,
}

impl HttpForwarder {
    pub fn new() -> Self {
        let client = Client::builder().build::<_, Body>(HttpsConnector::new());
        Self { client }
    }
}

impl Default for HttpForwarder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Forwarder for HttpForwarder {
    async fn forward(&self, mut req: Request<Body>, url: Url) -> Result<Response<Body>, ProxyError> {
        let uri = outbound_uri(&url)?;
        let client_addr = req.extensions().get::<ClientAddr>().copied();

        let headers = req.headers_mut();
        strip_hop_by_hop(headers);

        if let Some(authority) = uri.authority() {
            let host = HeaderValue::from_str(authority.as_str()).map_err(|_| ProxyError::InvalidUri)?;
            headers.insert(HOST, host);
        }

        if !url.username().is_empty() && !headers.contains_key(AUTHORIZATION) {
            headers.insert(AUTHORIZATION, basic_auth(&url)?);
        }

        if let Some(ClientAddr(peer)) = client_addr {
            append_forwarded_for(headers, peer);
        }

        tracing::debug!(%uri, "forwarding request");
        *req.uri_mut() = uri;

        let mut response = self.client.request(req).await?;
        strip_hop_by_hop(response.headers_mut());
        Ok(response)
    }
}

/// The wire URI for `url`: userinfo and fragment are never sent.
fn outbound_uri(url: &Url) -> Result<Uri, ProxyError> {
    let mut outbound = url.clone();
    let _ = outbound.set_username("");
    let _ = outbound.set_password(None);
    outbound.set_fragment(None);

    outbound.as_str().parse().map_err(|_| ProxyError::InvalidUri)
}

fn basic_auth(url: &Url) -> Result<HeaderValue, ProxyError> {
    let credentials = format!("{}:{}", url.username(), url.password().unwrap_or(""));
    let value = format!("Basic {}", STANDARD.encode(credentials));
    HeaderValue::from_str(&value).map_err(|_| ProxyError::InvalidUri)
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    // Headers named in Connection are hop-by-hop as well.
    let listed: Vec<HeaderName> = headers
        .get_all(hyper::header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

fn append_forwarded_for(headers: &mut HeaderMap, peer: SocketAddr) {
    let ip = peer.ip().to_string();
    let value = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(prior) => format!("{prior}, {ip}"),
        None => ip,
    };

    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbound_uri_drops_userinfo_and_fragment() {
        let url = Url::parse("https://user:pass@b:8443/path?q=1#frag").unwrap();
        let uri = outbound_uri(&url).unwrap();
        assert_eq!(uri.to_string(), "https://b:8443/path?q=1");
    }

    #[test]
    fn test_basic_auth_from_userinfo() {
        let url = Url::parse("http://user:pass@b/").unwrap();
        assert_eq!(basic_auth(&url).unwrap(), "Basic dXNlcjpwYXNz");

        let url = Url::parse("http://user@b/").unwrap();
        assert_eq!(basic_auth(&url).unwrap(), "Basic dXNlcjo=");
    }

    #[test]
    fn test_hop_by_hop_headers_are_removed() {
        let mut headers = HeaderMap::new();
        headers.insert("connection", HeaderValue::from_static("keep-alive, x-custom"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert("x-custom", HeaderValue::from_static("1"));
        headers.insert("upgrade", HeaderValue::from_static("websocket"));
        headers.insert("accept", HeaderValue::from_static("*/*"));

        strip_hop_by_hop(&mut headers);

        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key("accept"));
    }

    #[test]
    fn test_forwarded_for_is_appended() {
        let mut headers = HeaderMap::new();
        append_forwarded_for(&mut headers, "10.0.0.1:1234".parse().unwrap());
        assert_eq!(headers[X_FORWARDED_FOR], "10.0.0.1");

        append_forwarded_for(&mut headers, "10.0.0.2:1234".parse().unwrap());
        assert_eq!(headers[X_FORWARDED_FOR], "10.0.0.1, 10.0.0.2");
    }
}
