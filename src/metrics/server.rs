// src/metrics/server.rs
use super::MetricsRegistry;
use anyhow::{Context, Result};
use hyper::{Body, Request, Response, Server, StatusCode};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

/// Serve the registry in Prometheus text format at `path` on a background task.
pub fn start_metrics_server(
    addr: SocketAddr,
    registry: Arc<MetricsRegistry>,
    path: String,
) -> Result<()> {
    let metrics_path = Arc::new(path);
    let service_path = metrics_path.clone();

    let make_service = hyper::service::make_service_fn(move |_| {
        let registry = registry.clone();
        let path = service_path.clone();

        async move {
            Ok::<_, Infallible>(hyper::service::service_fn(move |req: Request<Body>| {
                let registry = registry.clone();
                let path = path.clone();

                async move { Ok::<_, Infallible>(metrics_response(&req, &registry, &path)) }
            }))
        }
    });

    let server = Server::try_bind(&addr)
        .with_context(|| format!("Failed to bind metrics server on {addr}"))?
        .serve(make_service);

    info!(
        "Metrics server listening on http://{}{}",
        addr,
        metrics_path.as_str()
    );

    tokio::spawn(async move {
        if let Err(e) = server.await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(())
}

fn metrics_response(req: &Request<Body>, registry: &MetricsRegistry, path: &str) -> Response<Body> {
    if req.uri().path() != path {
        return status_response(StatusCode::NOT_FOUND, "Not Found");
    }

    match registry.gather() {
        Ok(metrics) => {
            let mut response = Response::new(Body::from(metrics));
            if let Ok(content_type) = "text/plain; version=0.0.4".parse() {
                response
                    .headers_mut()
                    .insert(hyper::header::CONTENT_TYPE, content_type);
            }
            response
        }
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            status_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics")
        }
    }
}

fn status_response(status: StatusCode, message: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::from(message));
    *response.status_mut() = status;
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_metrics_path_serves_text_format() {
        let registry = MetricsRegistry::new().unwrap();
        registry.collector().update_backend_count(2);

        let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let response = metrics_response(&req, &registry, "/metrics");
        assert_eq!(response.status(), StatusCode::OK);

        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        assert!(String::from_utf8_lossy(&body).contains("rrproxy_backends 2"));
    }

    #[test]
    fn test_other_paths_are_not_found() {
        let registry = MetricsRegistry::new().unwrap();
        let req = Request::builder().uri("/other").body(Body::empty()).unwrap();
        let response = metrics_response(&req, &registry, "/metrics");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
