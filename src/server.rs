//! Router construction and the start / stop / drain lifecycle.

use axum::Router;
use axum::routing::{any, get};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::handlers::{MESSAGE_PATH, METRICS_PATH, message_handler, metrics_handler};
use crate::rate_limit::{FixedWindowLimiter, janitor};
use crate::state::AppState;
use crate::upstream::{
    FoaasProvider, InstrumentedClient, LatencySink, MessageProvider, PrometheusLatencySink,
    TracingLatencySink,
};

// How long cut-off requests get to write their response and close
const CUT_OFF_WAIT: Duration = Duration::from_secs(1);

/// Build the gateway router.
///
/// `/message` accepts every verb so the pipeline itself can answer
/// non-GET requests with a JSON 405.
pub fn router(state: Arc<AppState>, expose_metrics: bool) -> Router {
    let mut app = Router::new().route(MESSAGE_PATH, any(message_handler));
    if expose_metrics {
        app = app.route(METRICS_PATH, get(metrics_handler));
    }
    app.with_state(state)
}

pub struct Server {
    config: GatewayConfig,
    limiter: Arc<FixedWindowLimiter>,
    provider: Arc<dyn MessageProvider>,
}

impl Server {
    pub fn new(config: GatewayConfig, provider: Arc<dyn MessageProvider>) -> Self {
        let limiter = Arc::new(FixedWindowLimiter::new(config.rate_limit, config.rate_window));
        Self {
            config,
            limiter,
            provider,
        }
    }

    // Server talking to the configured message API over HTTP
    pub fn from_config(config: GatewayConfig) -> Result<Self> {
        let sink: Arc<dyn LatencySink> = if config.expose_metrics {
            Arc::new(PrometheusLatencySink)
        } else {
            Arc::new(TracingLatencySink)
        };
        let client = InstrumentedClient::with_timeout(config.upstream_timeout, sink)
            .map_err(|e| GatewayError::Config(e.to_string()))?;
        let provider = Arc::new(FoaasProvider::new(config.upstream_url.clone(), client));
        Ok(Self::new(config, provider))
    }

    /// Bind the listener and start serving in the background.
    ///
    /// A bind failure is returned to the caller; it is the one fatal error.
    pub async fn start(self) -> Result<ServerHandle> {
        let listener = TcpListener::bind(&self.config.listen_address).await?;
        let local_addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (hard_stop_tx, hard_stop_rx) = watch::channel(false);

        let state = AppState::new(
            self.limiter.clone(),
            self.provider,
            self.config.upstream_timeout,
        )
        .with_hard_stop(hard_stop_rx);
        let app = router(Arc::new(state), self.config.expose_metrics);

        let janitor_task = tokio::spawn(janitor(self.limiter.clone(), shutdown_rx.clone()));

        let mut serve_rx = shutdown_rx;
        let serve_task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = serve_rx.wait_for(|stop| *stop).await;
                })
                .await
        });

        info!(address = %local_addr, "started listening");
        info!(
            limit = self.config.rate_limit,
            window = ?self.config.rate_window,
            "limiter configured"
        );

        Ok(ServerHandle {
            local_addr,
            shutdown_tx,
            hard_stop_tx,
            serve_task,
            janitor_task,
            grace: self.config.shutdown_grace,
        })
    }
}

/// Control surface of a running server.
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    hard_stop_tx: watch::Sender<bool>,
    serve_task: JoinHandle<std::io::Result<()>>,
    janitor_task: JoinHandle<()>,
    grace: Duration,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting new connections. In-flight requests keep running.
    pub fn stop(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Stop and wait for in-flight requests, at most for the grace period.
    ///
    /// Requests still running after the grace period are cut off and
    /// answered with a 500; their tokens stay consumed.
    pub async fn shutdown(mut self) -> Result<()> {
        self.stop();

        let outcome = match tokio::time::timeout(self.grace, &mut self.serve_task).await {
            Ok(joined) => flatten(joined),
            Err(_) => {
                warn!(grace = ?self.grace, "drain timed out, cutting off remaining requests");
                self.hard_stop_tx.send_replace(true);

                match tokio::time::timeout(CUT_OFF_WAIT, &mut self.serve_task).await {
                    Ok(joined) => flatten(joined),
                    Err(_) => {
                        warn!("connections still open after cut off, abandoning them");
                        self.serve_task.abort();
                        Ok(())
                    }
                }
            }
        };

        if let Err(e) = self.janitor_task.await {
            warn!(error = %e, "limiter janitor ended abnormally");
        }

        info!("server stopped");
        outcome
    }
}

fn flatten(
    joined: std::result::Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<()> {
    joined
        .map_err(|e| GatewayError::Io(std::io::Error::other(e)))?
        .map_err(GatewayError::from)
}
