//! End-to-end gateway tests against a scripted mock upstream.
//!
//! The mock serves `/chat/completions`, records every request body and
//! Authorization header, and replays a scripted response sequence
//! (repeating the last entry once exhausted).

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};

use tlgate::config::{ConfigStore, GatewayConfig};
use tlgate::events::{EventSink, GatewayEvent};
use tlgate::metrics::MetricsRegistry;
use tlgate::server::GatewayServer;
use tlgate::stop::StopSignal;
use tlgate::translate::glossary::GlossaryProvider;
use tlgate::translate::rules::RegexRules;
use tlgate::translate::TranslationService;

// --- Mock upstream ---

struct MockUpstream {
    requests: Mutex<Vec<Value>>,
    auth_headers: Mutex<Vec<String>>,
    /// Scripted responses, selected by request serial; the last entry
    /// repeats once the script is exhausted.
    responses: Vec<Value>,
    /// Applied to the first request only.
    first_delay: Option<Duration>,
    served: Mutex<usize>,
}

impl MockUpstream {
    fn recorded(&self) -> Vec<Value> {
        self.requests.lock().clone()
    }

    fn auth(&self) -> Vec<String> {
        self.auth_headers.lock().clone()
    }
}

async fn mock_chat(
    State(state): State<Arc<MockUpstream>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.requests.lock().push(body);
    state.auth_headers.lock().push(
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string(),
    );

    let serial = {
        let mut served = state.served.lock();
        let n = *served;
        *served += 1;
        n
    };
    if serial == 0 {
        if let Some(delay) = state.first_delay {
            tokio::time::sleep(delay).await;
        }
    }

    let response = state.responses[serial.min(state.responses.len() - 1)].clone();
    Json(response)
}

async fn spawn_mock(responses: Vec<Value>, first_delay: Option<Duration>) -> (String, Arc<MockUpstream>) {
    let state = Arc::new(MockUpstream {
        requests: Mutex::new(Vec::new()),
        auth_headers: Mutex::new(Vec::new()),
        responses,
        first_delay,
        served: Mutex::new(0),
    });
    let app = Router::new()
        .route("/chat/completions", post(mock_chat))
        .with_state(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), state)
}

fn chat(content: &str) -> Value {
    json!({"choices": [{"message": {"content": content}}]})
}

// --- Recording doubles ---

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<GatewayEvent>>,
}

impl EventSink for RecordingSink {
    fn emit(&self, event: GatewayEvent) {
        self.events.lock().push(event);
    }
}

impl RecordingSink {
    fn all(&self) -> Vec<GatewayEvent> {
        self.events.lock().clone()
    }

    fn logs(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                GatewayEvent::Log(msg) => Some(msg.clone()),
                _ => None,
            })
            .collect()
    }
}

#[derive(Default)]
struct RecordingGlossary {
    terms: Mutex<Vec<(String, String)>>,
}

impl GlossaryProvider for RecordingGlossary {
    fn set_path(&self, _path: &Path) {}

    fn context_prompt(&self, _processed_text: &str) -> String {
        String::new()
    }

    fn add_new_term(&self, source: &str, target: &str) {
        self.terms.lock().push((source.to_string(), target.to_string()));
    }
}

// --- Harness ---

struct Harness {
    service: Arc<TranslationService>,
    sink: Arc<RecordingSink>,
    glossary: Arc<RecordingGlossary>,
}

fn gateway_config(base: &str, enable_glossary: bool) -> GatewayConfig {
    GatewayConfig {
        api_address: base.to_string(),
        api_key: "key-a".to_string(),
        model_name: "model-a".to_string(),
        port: 0,
        context_num: 5,
        temperature: 0.3,
        max_threads: 2,
        language: 0,
        enable_glossary,
        ..GatewayConfig::default()
    }
}

fn build(config: GatewayConfig) -> Harness {
    let sink = Arc::new(RecordingSink::default());
    let glossary = Arc::new(RecordingGlossary::default());
    let service = TranslationService::new(
        Arc::new(ConfigStore::new(config)),
        Arc::clone(&glossary) as Arc<dyn GlossaryProvider>,
        Arc::new(RegexRules::empty()),
        Arc::clone(&sink) as Arc<dyn EventSink>,
        Arc::new(MetricsRegistry::new()),
        Arc::new(StopSignal::new()),
    )
    .unwrap();
    Harness {
        service: Arc::new(service),
        sink,
        glossary,
    }
}

// --- Scenarios ---

#[tokio::test]
async fn plain_request_through_the_http_front() {
    let (base, mock) = spawn_mock(vec![chat("<tl>你好</tl>")], None).await;
    let harness = build(gateway_config(&base, false));
    let server = GatewayServer::new(Arc::clone(&harness.service));
    let addr = server.start().await.unwrap();
    let url = format!("http://127.0.0.1:{}", addr.port());
    let client = reqwest::Client::new();

    // Missing text parameter: 200 with empty body, no upstream call.
    let resp = client.get(&url).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(resp.text().await.unwrap(), "");

    // Blank text: 200 with empty body.
    let resp = client.get(&url).query(&[("text", "   ")]).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(resp.text().await.unwrap(), "");
    assert!(mock.recorded().is_empty());

    // Real request.
    let resp = client.get(&url).query(&[("text", "Hello")]).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert!(resp
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .contains("charset=utf-8"));
    assert_eq!(resp.text().await.unwrap(), "你好");

    let events = harness.sink.all();
    assert!(events.contains(&GatewayEvent::WorkStarted));
    assert!(events.contains(&GatewayEvent::WorkFinished { success: true }));
    assert!(harness
        .sink
        .logs()
        .iter()
        .any(|l| l.starts_with("Request received: Hello")));

    // Start is idempotent while running.
    assert_eq!(server.start().await.unwrap(), addr);
    server.stop().await;
    server.stop().await;
}

#[tokio::test]
async fn placeholders_survive_the_round_trip() {
    let (base, mock) = spawn_mock(vec![chat("<tl>你好 [T_0] 世界 [T_1] </tl>")], None).await;
    let harness = build(gateway_config(&base, false));

    let out = harness.service.translate("Hello<br>World\n", "10.1.1.1").await;
    assert_eq!(out, "你好<br>世界\n");

    // The model saw sentinels, not markup.
    let sent = mock.recorded();
    let user = sent[0]["messages"].as_array().unwrap().last().unwrap()["content"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(user.contains("[T_0]"));
    assert!(!user.contains("<br>"));
}

#[tokio::test]
async fn discovered_terms_are_announced_to_the_glossary() {
    let (base, _mock) = spawn_mock(vec![chat("<tl>你好，<tm>Li=李</tm></tl>")], None).await;
    let harness = build(gateway_config(&base, true));

    let out = harness.service.translate("Hello Li", "10.1.1.2").await;
    assert_eq!(out, "你好，李");
    assert_eq!(
        harness.glossary.terms.lock().clone(),
        vec![("Li".to_string(), "李".to_string())]
    );
    assert!(harness
        .sink
        .logs()
        .iter()
        .any(|l| l.contains("New Term Discovered") && l.contains("Li = 李")));
}

#[tokio::test]
async fn invalid_terms_are_dropped_but_translation_survives() {
    let (base, _mock) = spawn_mock(vec![chat("<tl>X</tl><tm>[T_0]=foo</tm>")], None).await;
    let harness = build(gateway_config(&base, true));

    let out = harness.service.translate("Hello<br>World", "10.1.1.3").await;
    assert_eq!(out, "X");
    assert!(harness.glossary.terms.lock().is_empty());
}

#[tokio::test]
async fn failed_attempt_retries_after_backoff() {
    let (base, _mock) = spawn_mock(
        vec![chat("Error: upstream hiccup"), chat("<tl>ok</tl>")],
        None,
    )
    .await;
    let harness = build(gateway_config(&base, false));

    let started = Instant::now();
    let out = harness.service.translate("Hello", "10.1.1.4").await;
    assert_eq!(out, "ok");
    assert!(started.elapsed() >= Duration::from_millis(1000));

    let logs = harness.sink.logs();
    assert!(logs.iter().any(|l| l.contains("Retry translation (2/5)")));
    assert!(logs.iter().any(|l| l.contains("Retry successful")));
}

#[tokio::test]
async fn exhausted_retries_give_up_with_an_event() {
    let (base, mock) = spawn_mock(vec![chat("Error: permanently broken")], None).await;
    let harness = build(gateway_config(&base, false));

    let started = Instant::now();
    let out = harness.service.translate("Hello", "10.1.1.5").await;
    assert_eq!(out, "");
    // Four backoff sleeps between five attempts.
    assert!(started.elapsed() >= Duration::from_millis(4000));
    assert_eq!(mock.recorded().len(), 5);
    assert!(harness
        .sink
        .logs()
        .iter()
        .any(|l| l.contains("Retry failed, skipping text")));
}

#[tokio::test]
async fn empty_key_pool_returns_500_through_the_front() {
    let mut cfg = gateway_config("http://127.0.0.1:9", false);
    cfg.api_key = String::new();
    let harness = build(cfg);
    let server = GatewayServer::new(Arc::clone(&harness.service));
    let addr = server.start().await.unwrap();

    let resp = reqwest::Client::new()
        .get(format!("http://127.0.0.1:{}", addr.port()))
        .query(&[("text", "Hello")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 500);
    assert_eq!(resp.text().await.unwrap(), "Translation Failed");

    let events = harness.sink.all();
    assert!(events.contains(&GatewayEvent::WorkFinished { success: false }));
    assert!(harness
        .sink
        .logs()
        .iter()
        .any(|l| l.contains("Invalid API Key")));
    server.stop().await;
}

#[tokio::test]
async fn hot_reload_between_attempts_switches_model_and_keys() {
    let (base, mock) = spawn_mock(vec![chat("Error: flaky"), chat("<tl>ok</tl>")], None).await;
    let mut cfg = gateway_config(&base, false);
    cfg.api_key = "k1,k2".to_string();
    let harness = build(cfg);

    let service = Arc::clone(&harness.service);
    let handle = tokio::spawn(async move { service.translate("Hello", "10.1.1.6").await });

    // Reload while the first attempt's backoff is pending.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let mut new_cfg = harness.service.config().get();
    new_cfg.model_name = "model-b".to_string();
    harness.service.update_config(new_cfg);

    assert_eq!(handle.await.unwrap(), "ok");

    let requests = mock.recorded();
    assert_eq!(requests[0]["model"], "model-a");
    assert_eq!(requests[1]["model"], "model-b");
    // The rebuilt pool restarts at its first key.
    assert_eq!(mock.auth(), vec!["Bearer k1", "Bearer k1"]);
}

#[tokio::test]
async fn context_history_accumulates_per_client() {
    let (base, mock) = spawn_mock(
        vec![chat("<tl>第一</tl>"), chat("<tl>第二</tl>")],
        None,
    )
    .await;
    let harness = build(gateway_config(&base, false));

    assert_eq!(harness.service.translate("first", "10.1.1.7").await, "第一");
    assert_eq!(harness.service.translate("second", "10.1.1.7").await, "第二");

    let requests = mock.recorded();
    let first = requests[0]["messages"].as_array().unwrap();
    let second = requests[1]["messages"].as_array().unwrap();
    assert_eq!(first.len(), 2); // system + current turn
    assert_eq!(second.len(), 4); // system + prior pair + current turn
    assert_eq!(second[1]["role"], "user");
    assert_eq!(second[2]["role"], "assistant");
    assert_eq!(second[2]["content"], "第一");

    // A different client starts fresh.
    assert_eq!(harness.service.translate("third", "10.9.9.9").await, "第二");
    let third = mock.recorded()[2]["messages"].as_array().unwrap().len();
    assert_eq!(third, 2);
}

#[tokio::test]
async fn stop_aborts_in_flight_work_without_context_append() {
    let (base, mock) = spawn_mock(
        vec![chat("<tl>slow</tl>"), chat("<tl>ok</tl>")],
        Some(Duration::from_secs(10)),
    )
    .await;
    let harness = build(gateway_config(&base, false));

    let service = Arc::clone(&harness.service);
    let handle = tokio::spawn(async move { service.translate("Hello", "10.1.1.8").await });
    tokio::time::sleep(Duration::from_millis(200)).await;

    let stopped_at = Instant::now();
    harness.service.stop_signal().stop();
    assert_eq!(handle.await.unwrap(), "");
    assert!(stopped_at.elapsed() < Duration::from_secs(2));

    // The aborted attempt left no history behind.
    harness.service.stop_signal().reset();
    assert_eq!(harness.service.translate("again", "10.1.1.8").await, "ok");
    let messages = mock.recorded().last().unwrap()["messages"]
        .as_array()
        .unwrap()
        .len();
    assert_eq!(messages, 2);
}

#[tokio::test]
async fn token_usage_is_forwarded_when_reported() {
    let (base, _mock) = spawn_mock(
        vec![json!({
            "choices": [{"message": {"content": "<tl>你好</tl>"}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3}
        })],
        None,
    )
    .await;
    let harness = build(gateway_config(&base, false));

    assert_eq!(harness.service.translate("Hello", "10.1.1.9").await, "你好");
    assert!(harness.sink.all().contains(&GatewayEvent::TokenUsage {
        prompt: 12,
        completion: 3,
    }));
}
