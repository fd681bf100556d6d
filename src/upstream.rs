use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Url;
use reqwest::header::ACCEPT;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::UpstreamError;
use crate::metrics::UPSTREAM_LATENCY;
use crate::models::UpstreamMessage;

pub const DEFAULT_UPSTREAM_URL: &str = "https://www.foaas.com";

// status label used when no response came back
pub const ERROR_LABEL: &str = "error";

const GET_MESSAGE_OPERATION: &str = "get_foaas_message";
const MESSAGE_FROM: &str = "Angry Server";

/// Source of the messages handed out to admitted callers.
#[async_trait]
pub trait MessageProvider: Send + Sync {
    async fn get_message_for(&self, identity: &str) -> Result<UpstreamMessage, UpstreamError>;
}

/// One timed upstream call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatencyObservation {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub operation: String,
    pub status: String,
}

impl LatencyObservation {
    pub fn elapsed(&self) -> chrono::Duration {
        self.end - self.start
    }
}

/// Receives a timing observation for every upstream call.
pub trait LatencySink: Send + Sync {
    fn record(&self, observation: &LatencyObservation);
}

// Default sink - just logs
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLatencySink;

impl LatencySink for TracingLatencySink {
    fn record(&self, observation: &LatencyObservation) {
        debug!(
            operation = %observation.operation,
            elapsed_ms = observation.elapsed().num_milliseconds(),
            status = %observation.status,
            "upstream call completed"
        );
    }
}

// Feeds the upstream latency histogram, then logs
#[derive(Debug, Default, Clone, Copy)]
pub struct PrometheusLatencySink;

impl LatencySink for PrometheusLatencySink {
    fn record(&self, observation: &LatencyObservation) {
        let seconds = observation
            .elapsed()
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        UPSTREAM_LATENCY
            .with_label_values(&[observation.operation.as_str(), observation.status.as_str()])
            .observe(seconds);
        TracingLatencySink.record(observation);
    }
}

/// HTTP client that reports the latency of each call to a [`LatencySink`].
#[derive(Clone)]
pub struct InstrumentedClient {
    client: reqwest::Client,
    sink: Arc<dyn LatencySink>,
}

impl InstrumentedClient {
    pub fn new(client: reqwest::Client, sink: Arc<dyn LatencySink>) -> Self {
        Self { client, sink }
    }

    pub fn with_timeout(
        timeout: Duration,
        sink: Arc<dyn LatencySink>,
    ) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::new(client, sink))
    }

    pub async fn execute(
        &self,
        request: reqwest::Request,
        operation: &str,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let start = Utc::now();
        let result = self.client.execute(request).await;
        let end = Utc::now();

        let status = match &result {
            Ok(res) => res.status().as_u16().to_string(),
            Err(_) => ERROR_LABEL.to_string(),
        };
        self.sink.record(&LatencyObservation {
            start,
            end,
            operation: operation.to_string(),
            status,
        });

        result
    }

    pub fn inner(&self) -> &reqwest::Client {
        &self.client
    }
}

// Join `segments` onto `base` as percent-encoded path segments
pub fn build_url(base: &str, segments: &[&str]) -> Result<Url, UpstreamError> {
    let mut url = Url::parse(base).map_err(|e| UpstreamError::InvalidUrl(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| UpstreamError::InvalidUrl(format!("{base} cannot be a base")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// FOAAS backed message provider.
pub struct FoaasProvider {
    base_url: String,
    client: InstrumentedClient,
}

impl FoaasProvider {
    pub fn new(base_url: impl Into<String>, client: InstrumentedClient) -> Self {
        Self {
            base_url: base_url.into(),
            client,
        }
    }

    pub fn message_url(&self, identity: &str) -> Result<Url, UpstreamError> {
        build_url(&self.base_url, &["outside", identity, MESSAGE_FROM])
    }
}

#[async_trait]
impl MessageProvider for FoaasProvider {
    async fn get_message_for(&self, identity: &str) -> Result<UpstreamMessage, UpstreamError> {
        let url = self.message_url(identity)?;
        let request = self
            .client
            .inner()
            .get(url)
            .header(ACCEPT, "application/json")
            .build()?;

        let response = self.client.execute(request, GET_MESSAGE_OPERATION).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}
