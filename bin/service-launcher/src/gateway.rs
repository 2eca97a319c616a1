//! Registry read API served by the gateway service

use anyhow::Result;
use http_body_util::Full;
use hyper::{body::Bytes, server::conn::http1, service::service_fn, Request, Response, StatusCode};
use hyper_util::rt::tokio::TokioIo;
use mesh_core::ServiceRegistry;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

/// Accept connections and serve registry snapshots until the task is dropped
pub async fn serve(addr: SocketAddr, registry: Arc<ServiceRegistry>) -> Result<()> {
    let listener = TcpListener::bind(&addr).await?;
    info!("Gateway read API listening on {}", addr);

    loop {
        let (stream, remote) = listener.accept().await?;
        debug!("Accepted connection from {}", remote);

        let registry = Arc::clone(&registry);
        tokio::task::spawn(async move {
            let io = TokioIo::new(stream);
            let service = service_fn(move |req| {
                let registry = Arc::clone(&registry);
                async move { handle(req, registry).await }
            });
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!("Error serving connection: {}", e);
            }
        });
    }
}

async fn handle(
    req: Request<hyper::body::Incoming>,
    registry: Arc<ServiceRegistry>,
) -> std::result::Result<Response<Full<Bytes>>, hyper::Error> {
    let response = match (req.method().as_str(), req.uri().path()) {
        ("GET", "/services") => {
            let snapshot = registry.get_all().await;
            match serde_json::to_vec(&snapshot) {
                Ok(body) => json_response(StatusCode::OK, body),
                Err(e) => {
                    error!("Failed to serialize registry snapshot: {}", e);
                    text_response(StatusCode::INTERNAL_SERVER_ERROR, "snapshot unavailable\n")
                }
            }
        }
        ("GET", "/health") => text_response(StatusCode::OK, "ok\n"),
        _ => text_response(StatusCode::NOT_FOUND, "not found\n"),
    };
    Ok(response)
}

fn json_response(status: StatusCode, body: Vec<u8>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

fn text_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}
