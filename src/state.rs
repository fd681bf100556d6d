use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::rate_limit::Limiter;
use crate::upstream::MessageProvider;
// app's shared state

#[derive(Clone)]
pub struct AppState {
    pub limiter: Arc<dyn Limiter>,
    pub provider: Arc<dyn MessageProvider>,
    pub upstream_timeout: Duration, // upper bound for one provider call
    hard_stop: watch::Receiver<bool>, // flips to true once the drain period is over
}

impl AppState {
    pub fn new(
        limiter: Arc<dyn Limiter>,
        provider: Arc<dyn MessageProvider>,
        upstream_timeout: Duration,
    ) -> Self {
        // sender dropped right away: this state is never hard stopped
        let (_, hard_stop) = watch::channel(false);
        Self {
            limiter,
            provider,
            upstream_timeout,
            hard_stop,
        }
    }

    pub fn with_hard_stop(mut self, hard_stop: watch::Receiver<bool>) -> Self {
        self.hard_stop = hard_stop;
        self
    }

    /// Resolves once in-flight requests must be cut off. Never resolves when
    /// nobody holds the sending side.
    pub async fn hard_stopped(&self) {
        let mut hard_stop = self.hard_stop.clone();
        let signalled = hard_stop.wait_for(|stop| *stop).await.is_ok();
        if !signalled {
            std::future::pending::<()>().await;
        }
    }
}
