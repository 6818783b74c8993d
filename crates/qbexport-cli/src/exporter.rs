//! HTTP scrape endpoint.
//!
//! One request maps to one timestamp, one snapshot and one response body.
//! Failures of any kind answer 404 with an empty body; the cause only shows
//! up in the logs.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use axum::extract::State;
use axum::http::{header, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use qbexport_core::{capture_timestamp, ClientError, ScrapeMode, SnapshotBuilder, SnapshotOptions, TorrentClient};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

pub const CONTENT_TYPE: &str = "text/plain;charset=utf-8";

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("unknown route {0}")]
    UnknownRoute(String),
}

/// Status code answered for a failed scrape.
///
/// Scrapers only need to know that this cycle has no data.
pub fn status_for(err: &ScrapeError) -> StatusCode {
    match err {
        ScrapeError::UnknownRoute(_) => StatusCode::NOT_FOUND,
        ScrapeError::Client(
            ClientError::RemoteEndpointMissing(_)
            | ClientError::RemoteUnreachable(_)
            | ClientError::RemoteAuthFailed
            | ClientError::MalformedResponse(_),
        ) => StatusCode::NOT_FOUND,
    }
}

pub fn route_mode(method: &Method, path: &str) -> Result<ScrapeMode, ScrapeError> {
    if method != Method::GET {
        return Err(ScrapeError::UnknownRoute(format!("{method} {path}")));
    }
    match path {
        "/" | "/metrics" => Ok(ScrapeMode::Legacy),
        "/active" => Ok(ScrapeMode::Active),
        "/inactive" => Ok(ScrapeMode::Inactive),
        other => Err(ScrapeError::UnknownRoute(other.to_string())),
    }
}

/// Long-lived request handler shared by every connection.
pub struct ScrapeHandler {
    client: Arc<dyn TorrentClient>,
    options: SnapshotOptions,
}

impl ScrapeHandler {
    pub fn new(client: Arc<dyn TorrentClient>, options: SnapshotOptions) -> Self {
        Self { client, options }
    }

    /// Builds the body for one request, or the reason there is none.
    pub async fn scrape(&self, method: &Method, path: &str, timestamp: i64) -> Result<String, ScrapeError> {
        let mode = route_mode(method, path)?;
        let collection = SnapshotBuilder::new(self.client.as_ref(), &self.options, timestamp)
            .build(mode)
            .await?;
        Ok(collection.render())
    }

    pub async fn respond(&self, method: &Method, path: &str) -> Response {
        let timestamp = capture_timestamp();
        let started = Instant::now();

        match self.scrape(method, path, timestamp).await {
            Ok(body) => {
                debug!(%path, bytes = body.len(), elapsed_ms = %started.elapsed().as_millis(), "scrape served");
                (StatusCode::OK, [(header::CONTENT_TYPE, CONTENT_TYPE)], body).into_response()
            }
            Err(err @ ScrapeError::UnknownRoute(_)) => {
                debug!(error = %err, "rejected request");
                status_for(&err).into_response()
            }
            Err(err) => {
                error!(%path, error = %err, "scrape failed");
                status_for(&err).into_response()
            }
        }
    }
}

async fn handle_scrape(State(handler): State<Arc<ScrapeHandler>>, method: Method, uri: Uri) -> Response {
    handler.respond(&method, uri.path()).await
}

pub fn router(handler: Arc<ScrapeHandler>) -> Router {
    Router::new()
        .route("/", any(handle_scrape))
        .route("/metrics", any(handle_scrape))
        .route("/active", any(handle_scrape))
        .route("/inactive", any(handle_scrape))
        .fallback(handle_scrape)
        .with_state(handler)
}

/// Binds the exporter port on all interfaces and serves until `shutdown`.
pub async fn run_exporter<F>(handler: Arc<ScrapeHandler>, port: u16, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port))).await?;
    serve(listener, handler, shutdown).await
}

/// Serves scrapes until `shutdown` resolves, then drains in-flight requests.
pub async fn serve<F>(listener: TcpListener, handler: Arc<ScrapeHandler>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!(address = %listener.local_addr()?, "exporter listening");

    axum::serve(listener, router(handler))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("exporter has shut down");
    Ok(())
}
