// src/main.rs
use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use rrproxy::{
    cli::Args,
    config::{load_config, Config},
    logging,
    metrics::{start_metrics_server, MetricsRegistry},
    proxy::{parse_backends, Dispatcher, HttpForwarder, Proxy},
    server::{shutdown_signal, RequestHandler, ServerBuilder},
};

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = Args::parse();

    // Load configuration first so logging can use the configured level
    let config = match args.config.take() {
        Some(path) => load_config(&path).await?,
        None => Config::default(),
    };
    let (config, backends) = args.merge_into(config);
    config.validate()?;

    logging::init(&config.logging)?;

    let backends = parse_backends(&backends)?;
    let transport = Arc::new(HttpForwarder::new());
    let dispatcher =
        Arc::new(Dispatcher::new(backends, transport).context("unable to create proxy")?);

    for backend in dispatcher.backends() {
        info!(backend = %backend, "proxying to backend");
    }

    let mut proxy = Proxy::new(dispatcher.clone(), config.server.path.clone());

    if config.metrics.enabled {
        let registry = Arc::new(MetricsRegistry::new()?);
        proxy = proxy.with_metrics(registry.collector());

        let metrics_addr: SocketAddr = ([0, 0, 0, 0], config.metrics.port).into();
        start_metrics_server(metrics_addr, registry, config.metrics.path.clone())?;
    }

    let handler = RequestHandler::new(Arc::new(proxy));
    let addr = config.server.listen_addr()?;
    info!(prefix = %config.server.path, "Starting proxy on {}", addr);

    ServerBuilder::new(addr)
        .with_handler(handler)
        .serve_with_shutdown(shutdown_signal())
        .await?;

    dispatcher.shutdown().await;
    info!("Shutdown complete");

    Ok(())
}
