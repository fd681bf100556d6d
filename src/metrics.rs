use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, HistogramVec, register_counter, register_counter_vec,
    register_gauge, register_histogram_vec,
};

lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("gateway_requests_total", "Total number of message requests").unwrap();
    pub static ref RESPONSES: CounterVec = register_counter_vec!(
        "gateway_responses_total",
        "Message responses by status code",
        &["status"]
    )
    .unwrap();
    pub static ref UPSTREAM_LATENCY: HistogramVec = register_histogram_vec!(
        "gateway_upstream_latency_seconds",
        "Upstream call latency in seconds",
        &["operation", "status"]
    )
    .unwrap();
    pub static ref LIMITER_ENTRIES: Gauge =
        register_gauge!("gateway_limiter_entries", "Current number of rate limit entries").unwrap();
}
