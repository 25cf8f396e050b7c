// src/proxy/dispatcher.rs
use super::{Backend, Forwarder, ProxyError};
use crate::load_balancer::{rewrite_url, Scheduler};
use hyper::{Body, Request, Response};
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

/// How a dispatcher picks its target.
enum Route {
    /// Exactly one backend: no scheduler, no background task.
    SingleTarget(Arc<Backend>),
    RoundRobin(Scheduler),
}

/// Result of a dispatched request.
pub struct Dispatched {
    pub backend: Arc<Backend>,
    pub response: Response<Body>,
}

/// Decides the backend for each request, rewrites its URL and hands it to
/// the forwarding transport.
pub struct Dispatcher {
    route: Route,
    backends: Arc<[Arc<Backend>]>,
    transport: Arc<dyn Forwarder>,
}

impl Dispatcher {
    /// Build a dispatcher over `backends` in the given order.
    ///
    /// With more than one backend this spawns the scheduler's producer task,
    /// so it must run inside a tokio runtime.
    pub fn new(backends: Vec<Backend>, transport: Arc<dyn Forwarder>) -> Result<Self, ProxyError> {
        let backends: Arc<[Arc<Backend>]> = backends.into_iter().map(Arc::new).collect();

        let route = match backends.len() {
            0 => return Err(ProxyError::InvalidConfiguration),
            1 => Route::SingleTarget(backends[0].clone()),
            _ => Route::RoundRobin(Scheduler::new(backends.clone())?),
        };

        info!(
            backends = backends.len(),
            single_target = matches!(route, Route::SingleTarget(_)),
            "dispatcher ready"
        );

        Ok(Self {
            route,
            backends,
            transport,
        })
    }

    pub fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    /// Pick the next backend and rewrite `url` to address it.
    ///
    /// After shutdown this returns `SchedulerClosed` and leaves `url` as is;
    /// callers must reject the request rather than forward it.
    pub async fn direct(&self, url: &mut Url) -> Result<Arc<Backend>, ProxyError> {
        let backend = match &self.route {
            Route::SingleTarget(backend) => backend.clone(),
            Route::RoundRobin(scheduler) => scheduler.next().await?,
        };

        rewrite_url(url, &backend.url);
        Ok(backend)
    }

    pub async fn handle(&self, req: Request<Body>) -> Result<Dispatched, ProxyError> {
        let mut url = request_url(&req)?;
        let backend = self.direct(&mut url).await?;

        debug!(backend = %backend.id, "dispatching request");
        let response = self.transport.forward(req, url).await?;

        Ok(Dispatched { backend, response })
    }

    /// Stop handing out targets. Safe to call more than once.
    pub async fn shutdown(&self) {
        match &self.route {
            Route::SingleTarget(_) => {}
            Route::RoundRobin(scheduler) => scheduler.close().await,
        }
    }
}

/// Reconstruct the absolute URL of an inbound request.
///
/// Only the request target is used. The `Host` header is client text and
/// never becomes part of the URL; host and path are replaced by the rewrite.
fn request_url(req: &Request<Body>) -> Result<Url, ProxyError> {
    let uri = req.uri();
    if uri.scheme().is_some() {
        return Url::parse(&uri.to_string())
            .map_err(|e| ProxyError::InvalidRequest(e.to_string()));
    }

    let mut url =
        Url::parse("http://localhost/").map_err(|e| ProxyError::InvalidRequest(e.to_string()))?;
    url.set_path(uri.path());
    url.set_query(uri.query());
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hyper::header::HOST;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingForwarder {
        urls: Mutex<Vec<Url>>,
    }

    #[async_trait]
    impl Forwarder for RecordingForwarder {
        async fn forward(&self, _req: Request<Body>, url: Url) -> Result<Response<Body>, ProxyError> {
            self.urls.lock().unwrap().push(url);
            Ok(Response::new(Body::empty()))
        }
    }

    fn backends(raw: &[&str]) -> Vec<Backend> {
        raw.iter().map(|r| Backend::parse(r).unwrap()).collect()
    }

    fn request(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(HOST, "proxy.local")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_empty_backend_list_is_rejected() {
        let transport = Arc::new(RecordingForwarder::default());
        let result = Dispatcher::new(Vec::new(), transport);
        assert!(matches!(result, Err(ProxyError::InvalidConfiguration)));
    }

    #[tokio::test]
    async fn test_single_target_rewrites_every_request() {
        let transport = Arc::new(RecordingForwarder::default());
        let dispatcher =
            Dispatcher::new(backends(&["http://only:8001/base?k=v"]), transport.clone()).unwrap();

        for _ in 0..3 {
            dispatcher.handle(request("/ignored?a=1")).await.unwrap();
        }

        let urls = transport.urls.lock().unwrap();
        assert_eq!(urls.len(), 3);
        for url in urls.iter() {
            assert_eq!(url.as_str(), "http://only:8001/base?a=1&k=v");
        }
    }

    #[tokio::test]
    async fn test_single_target_shutdown_is_a_noop() {
        let transport = Arc::new(RecordingForwarder::default());
        let dispatcher = Dispatcher::new(backends(&["http://only/"]), transport).unwrap();

        dispatcher.shutdown().await;
        dispatcher.shutdown().await;

        let dispatched = dispatcher.handle(request("/")).await.unwrap();
        assert_eq!(dispatched.backend.id, "only:80");
    }

    #[tokio::test]
    async fn test_round_robin_rewrites_in_order() {
        let transport = Arc::new(RecordingForwarder::default());
        let dispatcher = Dispatcher::new(
            backends(&["http://a/", "https://user:pw@b/x", "http://c:81/"]),
            transport.clone(),
        )
        .unwrap();

        for _ in 0..4 {
            dispatcher.handle(request("/path?q=1")).await.unwrap();
        }

        let urls: Vec<String> = transport
            .urls
            .lock()
            .unwrap()
            .iter()
            .map(|u| u.to_string())
            .collect();
        assert_eq!(
            urls,
            [
                "http://a/?q=1",
                "https://user:pw@b/x?q=1",
                "http://c:81/?q=1",
                "http://a/?q=1",
            ]
        );

        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_requests_after_shutdown_are_rejected() {
        let transport = Arc::new(RecordingForwarder::default());
        let dispatcher =
            Dispatcher::new(backends(&["http://a/", "http://b/"]), transport.clone()).unwrap();

        dispatcher.handle(request("/")).await.unwrap();
        dispatcher.shutdown().await;
        dispatcher.shutdown().await;

        for _ in 0..3 {
            let result = dispatcher.handle(request("/")).await;
            assert!(matches!(result, Err(ProxyError::SchedulerClosed)));
        }

        let mut url = Url::parse("http://original/").unwrap();
        assert!(dispatcher.direct(&mut url).await.is_err());
        assert_eq!(url.as_str(), "http://original/");

        assert_eq!(transport.urls.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_request_url_from_origin_form() {
        let url = request_url(&request("/a/b?x=1")).unwrap();
        assert_eq!(url.as_str(), "http://localhost/a/b?x=1");

        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        assert_eq!(request_url(&req).unwrap().as_str(), "http://localhost/");
    }

    #[tokio::test]
    async fn test_host_header_does_not_affect_rewrite() {
        let transport = Arc::new(RecordingForwarder::default());
        let dispatcher =
            Dispatcher::new(backends(&["http://svc:user@b/x?k=v"]), transport.clone()).unwrap();

        let hosts = ["frontend#frag", "frontend?inj=1", "evil:pw@frontend", "bad host"];
        for host in hosts {
            let req = Request::builder()
                .uri("/p?a=1")
                .header(HOST, host)
                .body(Body::empty())
                .unwrap();
            dispatcher.handle(req).await.unwrap();
        }

        let urls = transport.urls.lock().unwrap();
        assert_eq!(urls.len(), hosts.len());
        for url in urls.iter() {
            assert_eq!(url.as_str(), "http://svc:user@b/x?a=1&k=v");
        }
    }

    #[test]
    fn test_request_url_from_absolute_form() {
        let req = Request::builder()
            .uri("http://elsewhere:8080/p?q=2")
            .body(Body::empty())
            .unwrap();
        assert_eq!(request_url(&req).unwrap().as_str(), "http://elsewhere:8080/p?q=2");
    }
}
