//! End-to-end tests: gateway → resolver → mocked ViaCEP / WeatherAPI.
//!
//! Both roles run as real HTTP servers on ephemeral ports and share one
//! in-memory span exporter, so trace parentage across the hop can be checked.

use std::{net::SocketAddr, time::Duration};

use cep_weather_core::{Config, Gateway, Resolver, TracePropagator, provider, server};
use opentelemetry::trace::{SpanId, SpanKind, TracerProvider as _};
use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracerProvider, SpanData};
use reqwest::StatusCode;
use tokio::net::TcpListener;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate, Times};

struct Stack {
    gateway: SocketAddr,
    resolver: SocketAddr,
    exporter: InMemorySpanExporter,
    _provider: SdkTracerProvider,
}

impl Stack {
    async fn start(upstream: &MockServer) -> Self {
        Self::start_with(upstream, |_| {}).await
    }

    async fn start_with(upstream: &MockServer, tweak: impl FnOnce(&mut Config)) -> Self {
        let exporter = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        let tracing = TracePropagator::new(provider.tracer("scenarios"));

        let mut config = Config::default();
        config.location.base_url = format!("{}/ws", upstream.uri());
        config.weather.base_url = format!("{}/v1/current.json", upstream.uri());
        config.weather.api_key = Some("TEST_KEY".into());
        tweak(&mut config);

        let resolver = Resolver::from_config(&config, tracing.clone()).expect("resolver");
        let resolver_addr = spawn(server::resolver_router(resolver, Duration::from_secs(5))).await;

        let gateway = Gateway::new(
            provider::http_client(Duration::from_secs(5)).expect("client"),
            format!("http://{resolver_addr}/cep"),
            tracing,
        );
        let gateway_addr = spawn(server::gateway_router(gateway, Duration::from_secs(5))).await;

        Self {
            gateway: gateway_addr,
            resolver: resolver_addr,
            exporter,
            _provider: provider,
        }
    }

    async fn post(&self, addr: SocketAddr, body: &str) -> (StatusCode, String) {
        let res = reqwest::Client::new()
            .post(format!("http://{addr}/cep"))
            .header("content-type", "application/json")
            .body(body.to_string())
            .send()
            .await
            .expect("response");

        let status = res.status();
        (status, res.text().await.expect("body"))
    }

    fn spans(&self) -> Vec<SpanData> {
        self.exporter.get_finished_spans().expect("spans")
    }
}

async fn spawn(router: axum::Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(server::serve(
        listener,
        router,
        Duration::from_secs(1),
        std::future::pending(),
    ));
    addr
}

async fn mock_location(
    upstream: &MockServer,
    cep: &str,
    response: ResponseTemplate,
    calls: impl Into<Times>,
) {
    Mock::given(method("GET"))
        .and(path(format!("/ws/{cep}/json/")))
        .respond_with(response)
        .expect(calls)
        .mount(upstream)
        .await;
}

async fn mock_weather(upstream: &MockServer, response: ResponseTemplate, calls: impl Into<Times>) {
    Mock::given(method("GET"))
        .and(path("/v1/current.json"))
        .and(query_param("key", "TEST_KEY"))
        .respond_with(response)
        .expect(calls)
        .mount(upstream)
        .await;
}

fn sao_paulo() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "cep": "01001-000",
        "localidade": "São Paulo",
        "uf": "SP"
    }))
}

fn twenty_degrees() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "current": { "temp_c": 20.0, "temp_f": 68.1 }
    }))
}

fn expected_sao_paulo() -> serde_json::Value {
    serde_json::json!({
        "city": "São Paulo",
        "temp_C": 20.0,
        "temp_F": 68.0,
        "temp_K": 293.15
    })
}

#[tokio::test]
async fn scenario_a_happy_path_through_both_roles() {
    let upstream = MockServer::start().await;
    mock_location(&upstream, "01001000", sao_paulo(), 2).await;
    mock_weather(&upstream, twenty_degrees(), 2).await;
    let stack = Stack::start(&upstream).await;

    let (status, body) = stack.post(stack.resolver, r#"{"cep":"01001000"}"#).await;
    assert_eq!(status, StatusCode::OK);
    let resolver_json: serde_json::Value = serde_json::from_str(&body).expect("json");
    assert_eq!(resolver_json, expected_sao_paulo());

    let (status, body) = stack.post(stack.gateway, r#"{"cep":"01001000"}"#).await;
    assert_eq!(status, StatusCode::OK);
    let gateway_json: serde_json::Value = serde_json::from_str(&body).expect("json");
    assert_eq!(gateway_json, resolver_json);
}

#[tokio::test]
async fn scenario_b_invalid_code_makes_no_calls() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(sao_paulo())
        .expect(0)
        .mount(&upstream)
        .await;
    let stack = Stack::start(&upstream).await;

    for body in [r#"{"cep":"123"}"#, r#"{"cep":"123456789"}"#, r#"{"zip":"01001000"}"#, "{"] {
        let (status, text) = stack.post(stack.gateway, body).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{body}");
        assert_eq!(text, "invalid zipcode");
    }

    // Nothing was forwarded: the resolver would have recorded a server span.
    assert!(stack.spans().is_empty());

    let (status, text) = stack.post(stack.resolver, r#"{"cep":"123"}"#).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(text, "invalid zipcode");
}

#[tokio::test]
async fn scenario_c_unknown_code_is_404_then_500() {
    let upstream = MockServer::start().await;
    mock_location(
        &upstream,
        "99999999",
        ResponseTemplate::new(200).set_body_json(serde_json::json!({ "erro": true })),
        2,
    )
    .await;
    mock_weather(&upstream, twenty_degrees(), 0).await;
    let stack = Stack::start(&upstream).await;

    let (status, text) = stack.post(stack.resolver, r#"{"cep":"99999999"}"#).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(text.starts_with("can not find zipcode"), "{text}");

    let (status, text) = stack.post(stack.gateway, r#"{"cep":"99999999"}"#).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(text.contains("can not find zipcode"), "{text}");
}

#[tokio::test]
async fn scenario_d_weather_failure_is_500_at_both_roles() {
    let upstream = MockServer::start().await;
    mock_location(&upstream, "01001000", sao_paulo(), 2).await;
    mock_weather(
        &upstream,
        ResponseTemplate::new(200)
            .set_delay(Duration::from_secs(30))
            .set_body_json(serde_json::json!({ "current": { "temp_c": 1.0 } })),
        0..=2,
    )
    .await;

    // Short outbound timeout so the slow weather call fails quickly.
    let stack = Stack::start_with(&upstream, |cfg| cfg.http.request_timeout_secs = 1).await;

    let (status, text) = stack.post(stack.resolver, r#"{"cep":"01001000"}"#).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(text, "error fetching weather");

    let (status, text) = stack.post(stack.gateway, r#"{"cep":"01001000"}"#).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(text.contains("error fetching weather"), "{text}");
}

#[tokio::test]
async fn resolver_span_is_child_of_gateway_hop() {
    let upstream = MockServer::start().await;
    mock_location(&upstream, "01001000", sao_paulo(), 1).await;
    mock_weather(&upstream, twenty_degrees(), 1).await;
    let stack = Stack::start(&upstream).await;

    let (status, _) = stack.post(stack.gateway, r#"{"cep":"01001000"}"#).await;
    assert_eq!(status, StatusCode::OK);

    let spans = stack.spans();
    let find = |name: &str, kind: SpanKind| {
        spans
            .iter()
            .find(|s| s.name == name && s.span_kind == kind)
            .unwrap_or_else(|| panic!("missing span {name}"))
    };

    let gateway_root = spans
        .iter()
        .find(|s| s.name == "handle_cep" && s.parent_span_id == SpanId::INVALID)
        .expect("gateway root span");
    let forward = find("forward_to_resolver", SpanKind::Client);
    let resolver_root = spans
        .iter()
        .find(|s| s.name == "handle_cep" && s.parent_span_id == forward.span_context.span_id())
        .expect("resolver handling span parented by the gateway hop");
    let location = find("get_location", SpanKind::Internal);
    let weather = find("get_weather", SpanKind::Internal);

    let trace_id = gateway_root.span_context.trace_id();
    for span in [forward, resolver_root, location, weather] {
        assert_eq!(span.span_context.trace_id(), trace_id, "{}", span.name);
    }

    assert_eq!(forward.parent_span_id, gateway_root.span_context.span_id());
    assert_eq!(location.parent_span_id, resolver_root.span_context.span_id());
    assert_eq!(weather.parent_span_id, resolver_root.span_context.span_id());
}

#[tokio::test]
async fn resolver_without_carrier_starts_fresh_trace() {
    let upstream = MockServer::start().await;
    mock_location(&upstream, "01001000", sao_paulo(), 1).await;
    mock_weather(&upstream, twenty_degrees(), 1).await;
    let stack = Stack::start(&upstream).await;

    let (status, body) = stack.post(stack.resolver, r#"{"cep":"01001000"}"#).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&body).expect("json"),
        expected_sao_paulo()
    );

    let spans = stack.spans();
    let root = spans
        .iter()
        .find(|s| s.name == "handle_cep")
        .expect("resolver span");
    assert_eq!(root.parent_span_id, SpanId::INVALID);
}
