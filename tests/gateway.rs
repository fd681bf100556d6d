use axum::Json;
use axum::Router;
use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::get;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

use message_gateway::handlers::{MESSAGE_PATH, USER_ID_HEADER};
use message_gateway::models::{MessageBody, UpstreamMessage};
use message_gateway::upstream::{
    FoaasProvider, InstrumentedClient, LatencyObservation, LatencySink, build_url,
};
use message_gateway::{GatewayConfig, MessageProvider, Server, ServerHandle, UpstreamError};

const LIMIT_COUNT: u32 = 5;
const LIMIT_WINDOW: Duration = Duration::from_millis(100);

// Fake message API: /outside/{name}/{from} answers like FOAAS, the
// "broken" and "garbled" names misbehave
async fn start_fake_upstream() -> SocketAddr {
    async fn outside(
        Path((name, from)): Path<(String, String)>,
    ) -> Result<Json<UpstreamMessage>, (StatusCode, String)> {
        match name.as_str() {
            "broken" => Err((StatusCode::BAD_GATEWAY, "down".to_string())),
            "garbled" => Err((StatusCode::OK, "not json".to_string())),
            _ => Ok(Json(UpstreamMessage {
                message: format!("Go outside, {name}."),
                subtitle: format!("- {from}"),
            })),
        }
    }

    let app = Router::new().route("/outside/{name}/{from}", get(outside));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn start_gateway(upstream: SocketAddr, limit: u32, window: Duration) -> ServerHandle {
    let config = GatewayConfig {
        listen_address: "127.0.0.1:0".to_string(),
        rate_limit: limit,
        rate_window: window,
        upstream_url: format!("http://{upstream}"),
        upstream_timeout: Duration::from_secs(2),
        shutdown_grace: Duration::from_secs(1),
        expose_metrics: true,
    };
    Server::from_config(config).unwrap().start().await.unwrap()
}

async fn get_message(
    client: &reqwest::Client,
    gateway: &ServerHandle,
    user: &str,
) -> (StatusCode, MessageBody) {
    let url = format!("http://{}{}", gateway.local_addr(), MESSAGE_PATH);
    let response = client
        .get(url)
        .header("Accept", "application/json")
        .header(USER_ID_HEADER, user)
        .send()
        .await
        .unwrap();
    let status = StatusCode::from_u16(response.status().as_u16()).unwrap();
    let body = response.json::<MessageBody>().await.unwrap();
    (status, body)
}

#[tokio::test]
async fn forwards_upstream_message() {
    let upstream = start_fake_upstream().await;
    let gateway = start_gateway(upstream, LIMIT_COUNT, LIMIT_WINDOW).await;
    let client = reqwest::Client::new();

    let (status, body) = get_message(&client, &gateway, "test-user-1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, MessageBody::new("Go outside, test-user-1."));

    gateway.shutdown().await.unwrap();
}

#[tokio::test]
async fn limits_each_user_and_recovers_after_window() {
    let upstream = start_fake_upstream().await;
    let gateway = start_gateway(upstream, LIMIT_COUNT, LIMIT_WINDOW).await;
    let client = reqwest::Client::new();

    // one request more than allowed for each user
    for i in 0..=LIMIT_COUNT {
        for user in ["test-user-1", "test-user-2"] {
            let (status, _) = get_message(&client, &gateway, user).await;
            if i < LIMIT_COUNT {
                assert_eq!(status, StatusCode::OK, "request {i} for {user}");
            } else {
                assert_eq!(status, StatusCode::TOO_MANY_REQUESTS, "request {i} for {user}");
            }
        }
    }

    tokio::time::sleep(LIMIT_WINDOW + Duration::from_millis(20)).await;

    let (status, _) = get_message(&client, &gateway, "test-user-1").await;
    assert_eq!(status, StatusCode::OK);

    gateway.shutdown().await.unwrap();
}

#[tokio::test]
async fn upstream_failures_become_generic_500() {
    let upstream = start_fake_upstream().await;
    let gateway = start_gateway(upstream, LIMIT_COUNT, LIMIT_WINDOW).await;
    let client = reqwest::Client::new();

    for user in ["broken", "garbled"] {
        let (status, body) = get_message(&client, &gateway, user).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, MessageBody::new("error fetching message, try again later"));
    }

    gateway.shutdown().await.unwrap();
}

#[tokio::test]
async fn concurrent_requests_admit_exactly_the_quota() {
    let upstream = start_fake_upstream().await;
    let gateway = start_gateway(upstream, LIMIT_COUNT, Duration::from_secs(30)).await;
    let client = reqwest::Client::new();
    let url = format!("http://{}{}", gateway.local_addr(), MESSAGE_PATH);

    let requests: Vec<_> = (0..20)
        .map(|_| {
            let client = client.clone();
            let url = url.clone();
            tokio::spawn(async move {
                client
                    .get(url)
                    .header(USER_ID_HEADER, "same-user")
                    .send()
                    .await
                    .unwrap()
                    .status()
                    .as_u16()
            })
        })
        .collect();

    let mut admitted = 0;
    let mut denied = 0;
    for request in requests {
        match request.await.unwrap() {
            200 => admitted += 1,
            429 => denied += 1,
            other => panic!("unexpected status {other}"),
        }
    }

    assert_eq!(admitted, LIMIT_COUNT);
    assert_eq!(denied, 20 - LIMIT_COUNT);

    gateway.shutdown().await.unwrap();
}

#[tokio::test]
async fn zero_limit_denies_everyone() {
    let upstream = start_fake_upstream().await;
    let gateway = start_gateway(upstream, 0, LIMIT_WINDOW).await;
    let client = reqwest::Client::new();

    for user in ["test-user-1", "test-user-2", "test-user-1"] {
        let (status, _) = get_message(&client, &gateway, user).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    }

    gateway.shutdown().await.unwrap();
}

#[tokio::test]
async fn metrics_are_served_when_enabled() {
    let upstream = start_fake_upstream().await;
    let gateway = start_gateway(upstream, LIMIT_COUNT, LIMIT_WINDOW).await;
    let client = reqwest::Client::new();

    get_message(&client, &gateway, "test-user-1").await;

    let text = client
        .get(format!("http://{}/metrics", gateway.local_addr()))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(text.contains("gateway_requests_total"));
    assert!(text.contains("gateway_upstream_latency_seconds"));

    gateway.shutdown().await.unwrap();
}

#[derive(Default)]
struct RecordingSink {
    observations: Mutex<Vec<LatencyObservation>>,
}

impl LatencySink for RecordingSink {
    fn record(&self, observation: &LatencyObservation) {
        self.observations.lock().unwrap().push(observation.clone());
    }
}

#[tokio::test]
async fn provider_reports_latency_for_every_call() {
    let upstream = start_fake_upstream().await;
    let sink = Arc::new(RecordingSink::default());
    let client = InstrumentedClient::new(reqwest::Client::new(), sink.clone());
    let provider = FoaasProvider::new(format!("http://{upstream}"), client);

    let message = provider.get_message_for("alice").await.unwrap();
    assert_eq!(message.message, "Go outside, alice.");
    assert_eq!(message.subtitle, "- Angry Server");

    let err = provider.get_message_for("broken").await.unwrap_err();
    assert!(matches!(err, UpstreamError::Status(502)));

    let err = provider.get_message_for("garbled").await.unwrap_err();
    assert!(matches!(err, UpstreamError::Decode(_)));

    let observations = sink.observations.lock().unwrap();
    let statuses: Vec<_> = observations.iter().map(|o| o.status.as_str()).collect();
    assert_eq!(statuses, ["200", "502", "200"]);
    assert!(observations.iter().all(|o| o.operation == "get_foaas_message"));
    assert!(observations.iter().all(|o| o.end >= o.start));
}

#[tokio::test]
async fn unreachable_upstream_is_labelled_error() {
    // grab a free port, then close it so nothing is listening there
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let sink = Arc::new(RecordingSink::default());
    let client = InstrumentedClient::new(reqwest::Client::new(), sink.clone());
    let provider = FoaasProvider::new(format!("http://{addr}"), client);

    let err = provider.get_message_for("alice").await.unwrap_err();
    assert!(matches!(err, UpstreamError::Transport(_)));

    let observations = sink.observations.lock().unwrap();
    assert_eq!(observations.len(), 1);
    assert_eq!(observations[0].status, "error");
}

#[test]
fn message_url_shape() {
    let url = build_url("http://127.0.0.1:1", &["outside", "test-user-1", "Angry Server"]).unwrap();
    assert_eq!(url.path(), "/outside/test-user-1/Angry%20Server");
}
