//! HTTP Endpoints
//!
//! - metrics path (default `/metrics`) - one scrape per request
//! - `/health` - path monitor status, 200 when healthy and 503 otherwise
//! - `/` - landing page

use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::collector::MegaraidCollector;
use crate::error::Result;
use crate::monitoring::PathMonitor;

/// Shared state behind every connection
pub struct AppState {
    pub collector: MegaraidCollector,
    pub monitor: Arc<PathMonitor>,
    /// Path serving the exposition
    pub metrics_path: String,
}

fn respond(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

/// Route one request
pub async fn handle<B>(
    state: Arc<AppState>,
    req: Request<B>,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    let path = req.uri().path().to_string();
    debug!(method = %req.method(), %path, "HTTP request");

    let response = if path == state.metrics_path {
        metrics(&state).await
    } else {
        match path.as_str() {
            "/health" => health(&state),
            "/" => landing(&state),
            _ => respond(StatusCode::NOT_FOUND, "text/plain", "not found"),
        }
    };
    Ok(response)
}

async fn metrics(state: &AppState) -> Response<Full<Bytes>> {
    match state.collector.render().await {
        Ok(body) => respond(StatusCode::OK, prometheus::TEXT_FORMAT, body),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            respond(
                StatusCode::INTERNAL_SERVER_ERROR,
                "text/plain",
                format!("failed to encode metrics: {}", e),
            )
        }
    }
}

fn health(state: &AppState) -> Response<Full<Bytes>> {
    let status = state.monitor.status();
    let code = if status.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    match serde_json::to_vec(&status) {
        Ok(body) => respond(code, "application/json", body),
        Err(e) => respond(
            StatusCode::INTERNAL_SERVER_ERROR,
            "text/plain",
            format!("failed to encode health status: {}", e),
        ),
    }
}

fn landing(state: &AppState) -> Response<Full<Bytes>> {
    let body = format!(
        "<html>\n<head><title>MegaRAID Exporter</title></head>\n<body>\n\
         <h1>MegaRAID Exporter</h1>\n\
         <p>Version: {version}</p>\n\
         <p>Format: {format}</p>\n\
         <p><a href=\"{metrics}\">Metrics</a></p>\n\
         <p><a href=\"/health\">Health</a></p>\n\
         </body>\n</html>\n",
        version = env!("CARGO_PKG_VERSION"),
        format = state.collector.config().format,
        metrics = state.metrics_path,
    );
    respond(StatusCode::OK, "text/html; charset=utf-8", body)
}

/// Accept connections until `shutdown` is cancelled.
///
/// Open connections finish their in-flight request before closing.
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: CancellationToken,
) -> Result<()> {
    info!(addr = ?listener.local_addr().ok(), "HTTP server listening");

    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("HTTP server shutting down");
                return Ok(());
            }
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    error!(error = %e, "HTTP accept error");
                    continue;
                }
            },
        };

        let io = TokioIo::new(stream);
        let state = state.clone();
        let shutdown = shutdown.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| handle(state.clone(), req));
            let conn = http1::Builder::new().serve_connection(io, service);
            tokio::pin!(conn);

            let result = tokio::select! {
                result = conn.as_mut() => result,
                _ = shutdown.cancelled() => {
                    conn.as_mut().graceful_shutdown();
                    conn.await
                }
            };
            if let Err(e) = result {
                debug!(%peer, error = %e, "HTTP connection error");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::CollectorConfig;
    use crate::error::InvokeError;
    use crate::invoker::DiagnosticRunner;
    use async_trait::async_trait;
    use http_body_util::BodyExt;
    use std::time::Duration;

    struct Unavailable;

    #[async_trait]
    impl DiagnosticRunner for Unavailable {
        async fn run(&self, _: &[&str], _: Duration) -> std::result::Result<String, InvokeError> {
            Err(InvokeError::BinaryNotFound {
                path: String::new(),
            })
        }
    }

    fn state() -> Arc<AppState> {
        let collector =
            MegaraidCollector::new(CollectorConfig::default(), Arc::new(Unavailable)).unwrap();
        let monitor = PathMonitor::with_candidates(None, &[], Duration::from_secs(30));
        monitor.probe();
        Arc::new(AppState {
            collector,
            monitor: Arc::new(monitor),
            metrics_path: "/metrics".to_string(),
        })
    }

    async fn get(state: Arc<AppState>, path: &str) -> (StatusCode, String) {
        let req = Request::get(path).body(()).unwrap();
        let resp = handle(state, req).await.unwrap();
        let status = resp.status();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_metrics_served_when_every_class_fails() {
        let (status, body) = get(state(), "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains(r#"megaraid_scrape_collector_success{collector="controller"} 0"#));
    }

    #[tokio::test]
    async fn test_health_unavailable() {
        let (status, body) = get(state(), "/health").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["healthy"], false);
        assert_eq!(json["check_interval"], "30s");
    }

    #[tokio::test]
    async fn test_landing_and_not_found() {
        let (status, body) = get(state(), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("href=\"/metrics\""));

        let (status, _) = get(state(), "/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
