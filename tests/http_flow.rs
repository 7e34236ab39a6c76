//! End-to-end tests against a mock GreyNoise check endpoint.

use greynoise_ip_check::config::ApiConfig;
use greynoise_ip_check::sensor::{
    SensorState, ATTR_IP, ATTR_NOISE, ATTR_TRUST_LEVEL, ICON_ALERT, ICON_CHECK,
};
use greynoise_ip_check::setup::{EntryStore, ABORT_ALREADY_CONFIGURED, ERROR_CANNOT_CONNECT};
use greynoise_ip_check::{
    CheckSource, Coordinator, FetchError, FlowResult, GreyNoiseFetcher, InMemoryEntryStore,
    IpCheckIntegration, RefreshOutcome, SetupFlow,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CHECK_PATH: &str = "/api/v1/check";

fn api_config(base: &str) -> ApiConfig {
    ApiConfig {
        url: format!("{}{}", base, CHECK_PATH),
        refresh_timeout_ms: 2000,
        probe_timeout_ms: 1000,
        ..ApiConfig::default()
    }
}

fn fetcher(server: &MockServer) -> Arc<GreyNoiseFetcher> {
    Arc::new(GreyNoiseFetcher::new(&api_config(&server.uri())).unwrap())
}

async fn respond_json(server: &MockServer, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(CHECK_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn respond_json_once(server: &MockServer, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(CHECK_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .up_to_n_times(1)
        .mount(server)
        .await;
}

async fn respond_status(server: &MockServer, status: u16) {
    Mock::given(method("GET"))
        .and(path(CHECK_PATH))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

fn unreachable_config() -> ApiConfig {
    // Bind then drop to get a port nothing listens on
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    api_config(&format!("http://127.0.0.1:{}", port))
}

#[tokio::test]
async fn sends_client_and_accept_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CHECK_PATH))
        .and(header("user-agent", "curl/8.0"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ip": "1.2.3.4"})))
        .expect(1)
        .mount(&server)
        .await;

    let result = fetcher(&server).fetch().await.unwrap();
    assert_eq!(result.ip.as_deref(), Some("1.2.3.4"));
}

#[tokio::test]
async fn parses_json_regardless_of_content_type() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CHECK_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"ip":"1.2.3.4","status":"clean","noise":false}"#)
                .insert_header("content-type", "text/html"),
        )
        .mount(&server)
        .await;

    let result = fetcher(&server).fetch().await.unwrap();
    assert_eq!(result.status.as_deref(), Some("clean"));
    assert_eq!(result.noise, Some(false));
}

#[tokio::test]
async fn non_200_is_http_status_error() {
    for status in [201u16, 204, 400, 404, 429, 500, 503] {
        let server = MockServer::start().await;
        respond_status(&server, status).await;

        let err = fetcher(&server).fetch().await.unwrap_err();
        assert_eq!(err, FetchError::HttpStatus(status));
    }
}

#[tokio::test]
async fn invalid_json_is_malformed_response() {
    for body in ["not json", "{\"ip\": ", "", "[1, 2, 3]", "\"clean\""] {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(CHECK_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let err = fetcher(&server).fetch().await.unwrap_err();
        assert!(
            matches!(err, FetchError::MalformedResponse(_)),
            "body {:?} gave {:?}",
            body,
            err
        );
    }
}

#[tokio::test]
async fn slow_response_is_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CHECK_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"ip": "1.2.3.4"}))
                .set_delay(Duration::from_millis(1500)),
        )
        .mount(&server)
        .await;

    // The probe budget (1s) is tighter than the refresh budget (2s)
    let fetcher = fetcher(&server);
    assert_eq!(fetcher.probe().await.unwrap_err(), FetchError::Timeout);
    assert!(fetcher.fetch().await.is_ok());
}

#[tokio::test]
async fn connection_refused_is_network_error() {
    let fetcher = GreyNoiseFetcher::new(&unreachable_config()).unwrap();
    let err = fetcher.fetch().await.unwrap_err();
    assert!(matches!(err, FetchError::Network(_)), "got {:?}", err);
}

#[tokio::test]
async fn consecutive_fetches_differ_only_in_capture_time() {
    let server = MockServer::start().await;
    respond_json(
        &server,
        json!({"ip": "1.2.3.4", "status": "noise", "noise": true, "trust_level": "1"}),
    )
    .await;

    let fetcher = fetcher(&server);
    let first = fetcher.fetch().await.unwrap();
    let second = fetcher.fetch().await.unwrap();

    assert!(first.same_check(&second));
    assert!(second.last_checked >= first.last_checked);
}

#[tokio::test]
async fn failed_refresh_keeps_previous_result() {
    for status in [404u16, 500, 503] {
        let server = MockServer::start().await;
        respond_json_once(&server, json!({"ip": "1.2.3.4", "noise": false})).await;
        respond_status(&server, status).await;

        let coordinator = Coordinator::new(fetcher(&server), Duration::from_secs(3600));
        assert_eq!(coordinator.refresh().await, RefreshOutcome::Updated);
        let before = coordinator.current();

        assert!(matches!(
            coordinator.refresh().await,
            RefreshOutcome::Failed(_)
        ));
        assert_eq!(coordinator.current(), before);
    }
}

async fn set_up(server: &MockServer) -> IpCheckIntegration {
    let fetcher = fetcher(server);
    let store = InMemoryEntryStore::new();
    let entry = match SetupFlow::new(&*fetcher, &store).step_user(true).await {
        FlowResult::CreateEntry(entry) => entry,
        other => panic!("expected entry, got {:?}", other),
    };
    IpCheckIntegration::setup(entry, fetcher, Duration::from_secs(3600)).await
}

#[tokio::test]
async fn scenario_clean_ip_is_safe() {
    let server = MockServer::start().await;
    respond_json(&server, json!({"ip": "1.2.3.4", "status": "clean", "noise": false})).await;

    let integration = set_up(&server).await;
    let sensor = integration.sensor();

    assert_eq!(sensor.state(), SensorState::Off);
    assert_eq!(sensor.icon(), ICON_CHECK);
    let attrs = sensor.extra_state_attributes();
    assert_eq!(attrs[ATTR_IP], json!("1.2.3.4"));
    assert_eq!(attrs[ATTR_NOISE], json!(false));

    integration.unload().await;
}

#[tokio::test]
async fn scenario_noisy_ip_is_unsafe() {
    let server = MockServer::start().await;
    respond_json(
        &server,
        json!({
            "ip": "1.2.3.4",
            "status": "noise",
            "classification": "malicious",
            "noise": true,
            "trust_level": "1"
        }),
    )
    .await;

    let integration = set_up(&server).await;
    let sensor = integration.sensor();

    assert_eq!(sensor.state(), SensorState::On);
    assert_eq!(sensor.icon(), ICON_ALERT);
    assert_eq!(sensor.extra_state_attributes()[ATTR_TRUST_LEVEL], json!("1"));

    integration.unload().await;
}

#[tokio::test]
async fn scenario_service_unavailable_keeps_state() {
    let server = MockServer::start().await;
    // Probe and first refresh succeed, everything after is 503
    respond_json_once(&server, json!({"ip": "1.2.3.4", "noise": false})).await;
    respond_json_once(&server, json!({"ip": "1.2.3.4", "noise": false})).await;
    respond_status(&server, 503).await;

    let integration = set_up(&server).await;
    let coordinator = integration.coordinator();
    let before = coordinator.current().expect("first refresh should succeed");

    assert!(matches!(
        coordinator.refresh().await,
        RefreshOutcome::Failed(greynoise_ip_check::FetchErrorKind::HttpStatus)
    ));
    assert_eq!(coordinator.current(), Some(before));
    assert!(coordinator.is_running());
    assert!(!integration.sensor().available());

    integration.unload().await;
}

#[tokio::test]
async fn scenario_unreachable_during_setup() {
    let fetcher = GreyNoiseFetcher::new(&unreachable_config()).unwrap();
    let store = InMemoryEntryStore::new();

    let result = SetupFlow::new(&fetcher, &store).step_user(true).await;

    assert_eq!(result.base_error(), Some(ERROR_CANNOT_CONNECT));
    assert!(store.entries().is_empty());
}

#[tokio::test]
async fn scenario_second_setup_is_rejected() {
    let server = MockServer::start().await;
    respond_json_once(&server, json!({"ip": "1.2.3.4"})).await;
    respond_status(&server, 500).await;

    let fetcher = fetcher(&server);
    let store = InMemoryEntryStore::new();

    let first = SetupFlow::new(&*fetcher, &store).step_user(true).await;
    assert!(matches!(first, FlowResult::CreateEntry(_)));

    let second = SetupFlow::new(&*fetcher, &store).step_user(true).await;
    assert_eq!(
        second,
        FlowResult::Abort {
            reason: ABORT_ALREADY_CONFIGURED
        }
    );
    assert_eq!(store.entries().len(), 1);
}
