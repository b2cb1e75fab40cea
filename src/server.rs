use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use futures::future::{self, FutureExt};
use hyper::server::conn::AddrStream;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Server};
use path_router::Router;
use structopt::StructOpt;

use crate::proxy::ProxyHandler;
use crate::service;

#[derive(Debug, StructOpt)]
pub struct Options {
    /// Host to listen on
    #[structopt(long, short = "n", value_name = "HOST", default_value = "localhost")]
    host: String,
    /// Port to listen on [default: an OS-assigned port]
    #[structopt(long, short = "p", value_name = "PORT")]
    port: Option<u16>,
}

/// Serves `router` until Ctrl-C is received.
pub async fn run(options: &Options, router: Router<ProxyHandler>) -> Result<()> {
    let router = Arc::new(router);
    let make_service = make_service_fn(move |conn: &AddrStream| {
        let router = router.clone();
        let remote = conn.remote_addr();
        future::ok::<_, Infallible>(service_fn(move |request: http::Request<Body>| {
            log::trace!("{} {} from {}", request.method(), request.uri(), remote);
            service::handle(router.clone(), request).never_error()
        }))
    });

    let addr = options.listen_addr().await?;
    let server = Server::try_bind(&addr)
        .with_context(|| format!("failed to bind to `{}`", addr))?
        .serve(make_service);

    log::info!("Listening on http://{}", server.local_addr());
    server
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server execution failed")
}

/// Logs the route table in matching order.
pub fn log_routes(router: &Router<ProxyHandler>) {
    if router.is_empty() {
        log::warn!("No routes configured, every request will get a 404");
    }
    for (index, (pattern, handler)) in router.entries().enumerate() {
        log::info!("Route {}: `{}` -> `{}`", index, pattern, handler.uri());
    }
}

impl Options {
    async fn listen_addr(&self) -> Result<SocketAddr> {
        let mut addrs = tokio::net::lookup_host((self.host.as_str(), self.port.unwrap_or(0)))
            .await
            .with_context(|| format!("failed to resolve host `{}`", self.host))?;
        addrs
            .next()
            .ok_or_else(|| anyhow!("host `{}` resolved to no addresses", self.host))
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => log::info!("Received Ctrl-C, shutting down"),
        Err(err) => {
            log::warn!("Cannot listen for Ctrl-C, running until killed: {}", err);
            future::pending::<()>().await
        }
    }
}
