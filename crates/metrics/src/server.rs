//! Pull exposition of the gauges over HTTP.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower_http::timeout::TimeoutLayer;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::gauges::GaugeSet;
use crate::registry::{MetricDefinition, MetricRegistry};
use crate::service::{Labels, RecordService};

/// Recorder backing the `/metrics` scrape endpoint.
#[derive(Clone, Debug)]
pub struct PrometheusRecorder {
    gauges: Arc<GaugeSet>,
}

impl PrometheusRecorder {
    /// Registers every definition of `registry`.
    ///
    /// # Errors
    ///
    /// Returns an error if a definition is rejected by prometheus.
    pub fn new(registry: &MetricRegistry) -> Result<Self> {
        Ok(Self {
            gauges: Arc::new(GaugeSet::new(registry)?),
        })
    }

    /// Text exposition of the current gauges.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn encode(&self) -> Result<Vec<u8>> {
        self.gauges.encode()
    }
}

#[async_trait]
impl RecordService for PrometheusRecorder {
    fn record(&self, metric: &'static MetricDefinition, labels: &Labels, value: f64) -> Result<()> {
        self.gauges.set(metric, labels, value)
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

async fn metrics(State(recorder): State<PrometheusRecorder>) -> Response {
    match recorder.encode() {
        Ok(body) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Err(e) => {
            warn!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn health() -> &'static str {
    "OK"
}

/// HTTP server exposing `/metrics` and `/health`.
pub struct MetricsServer {
    listen_addr: SocketAddr,
    read_timeout: Duration,
    recorder: PrometheusRecorder,
    local_addr: Mutex<Option<SocketAddr>>,
    shutdown_token: CancellationToken,
    task_tracker: TaskTracker,
}

impl MetricsServer {
    /// Creates a server for `recorder`. Nothing is bound until [`Self::start`].
    #[must_use]
    pub fn new(listen_addr: SocketAddr, read_timeout: Duration, recorder: PrometheusRecorder) -> Self {
        Self {
            listen_addr,
            read_timeout,
            recorder,
            local_addr: Mutex::new(None),
            shutdown_token: CancellationToken::new(),
            task_tracker: TaskTracker::new(),
        }
    }

    /// Binds the listener and serves until [`Self::shutdown`].
    ///
    /// # Errors
    ///
    /// Returns an error if already started or the address cannot be bound.
    pub async fn start(&self) -> Result<JoinHandle<()>> {
        if self.task_tracker.is_closed() {
            return Err(Error::AlreadyStarted);
        }

        let router = Router::new()
            .route("/metrics", get(metrics))
            .route("/health", get(health))
            .layer(TimeoutLayer::new(self.read_timeout))
            .with_state(self.recorder.clone());

        let listener = tokio::net::TcpListener::bind(self.listen_addr)
            .await
            .map_err(Error::Bind)?;
        let local_addr = listener.local_addr().map_err(Error::Bind)?;
        *self.local_addr.lock() = Some(local_addr);

        info!(%local_addr, "serving metrics");

        let shutdown_token = self.shutdown_token.clone();
        let handle = self.task_tracker.spawn(async move {
            tokio::select! {
                e = axum::serve(listener, router.into_make_service()).into_future() => {
                    info!("metrics server exited {:?}", e);
                }
                () = shutdown_token.cancelled() => {}
            };
        });

        self.task_tracker.close();

        Ok(handle)
    }

    /// Address actually bound, once started.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    /// Stops serving and waits for the server task.
    pub async fn shutdown(&self) {
        info!("metrics server shutting down...");

        self.shutdown_token.cancel();
        self.task_tracker.wait().await;

        info!("metrics server shutdown");
    }
}
