//! Contains code pertaining to the HTTP service logship exposes, including prometheus metrics.
use crate::{app, metrics};

use google_logwriter::writer::{AsyncWriter, WriterState};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use slog::*;
use std::convert::Infallible;
use std::{net::SocketAddr, result::Result};

const PATH_HOME: &str = "/";
const PATH_METRICS: &str = "/metrics";
const PATH_HEALTH: &str = "/health";
const PATH_READINESS: &str = "/ready";

// starts an HTTP server and exports Prometheus metrics.
pub async fn start(
    log: &Logger,
    bind_addr: &str,
    writer: AsyncWriter,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
    done: tokio::sync::mpsc::Sender<()>,
) -> Result<(), String> {
    let http_addr: SocketAddr = bind_addr
        .parse()
        .map_err(|e| format!("unable to parse HTTP address {}: {}", bind_addr, e))?;

    let make_svc = make_service_fn(move |_conn| {
        let handler = HttpHandler {
            writer: writer.clone(),
        };
        async move {
            Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                let handler = handler.clone();
                async move { handler.router(req) }
            }))
        }
    });

    let server = Server::try_bind(&http_addr)
        .map_err(|e| format!("unable to bind HTTP address {}: {}", bind_addr, e))?
        .serve(make_svc);

    info!(log, "Starting HTTP service."; "address" => &http_addr);
    info!(log, "Exposing {} service home.", app::NAME; "path" => PATH_HOME);
    info!(log, "Exposing Prometheus {} exporter endpoint.", app::NAME; "path" => PATH_METRICS);
    info!(log, "Exposing readiness endpoint."; "path" => PATH_READINESS);
    info!(log, "Exposing liveness endpoint."; "path" => PATH_HEALTH);

    let graceful = server.with_graceful_shutdown(async move {
        shutdown.recv().await.ok();
    });

    if let Err(e) = graceful.await {
        error!(log, "HTTP Server error: {}", e);
    }

    info!(log, "HTTP shutdown OK");
    drop(done);
    Ok(())
}

#[derive(Clone)]
struct HttpHandler {
    writer: AsyncWriter,
}

impl HttpHandler {
    fn router(&self, req: Request<Body>) -> Result<Response<Body>, http::Error> {
        match (req.method(), req.uri().path()) {
            (&Method::GET, PATH_HOME) | (&Method::GET, "/index.html") => {
                Ok(Response::new(Body::from(self.service_home())))
            }
            (&Method::GET, PATH_METRICS) => Ok(Response::new(Body::from(metrics::gather()))),
            (&Method::GET, PATH_HEALTH) => self.health(),
            (&Method::GET, PATH_READINESS) => Response::builder()
                .status(StatusCode::OK)
                .body(Body::empty()),
            _ => Response::builder()
                .status(StatusCode::NOT_FOUND)
                .body(Body::empty()),
        }
    }

    fn service_home(&self) -> String {
        format!(
            "<html><head><title>{name}</title></head><body><h1>{name} {version}</h1>\
             <a href=\"{metrics}\">Metrics</a></body></html>",
            name = app::NAME,
            version = app::VERSION,
            metrics = PATH_METRICS,
        )
    }

    // Healthy for as long as the writer accepts entries.
    fn health(&self) -> Result<Response<Body>, http::Error> {
        match self.writer.state() {
            WriterState::Running | WriterState::Suspended => Response::builder()
                .status(StatusCode::OK)
                .body(Body::from("<html>OK!</html>")),
            state => Response::builder()
                .status(StatusCode::SERVICE_UNAVAILABLE)
                .body(Body::from(format!("<html>Writer is {}</html>", state))),
        }
    }
}
