//! Integration tests: start the gateway on a free port against fake upstreams (property store,
//! completion API, delivery webhook) and drive the webhook over HTTP.
//! The server tasks are left running when each test ends.

use concierge::config::{Config, Settings};
use concierge::gateway;
use mockito::{Matcher, Mock, ServerGuard};
use serde_json::{json, Value};
use std::time::Duration;

const EXAMPLE_BODY: &str = r#"{"message":"What time is check-in?","sender":"+15551234567","timestamp":"2024-01-01T12:00:00Z"}"#;
const REPLY: &str = "Hi! Check-in at Seaside Cottage is from 3:00 PM.";

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

struct Upstreams {
    store: ServerGuard,
    model: ServerGuard,
    hook: ServerGuard,
}

impl Upstreams {
    async fn new() -> Self {
        Self {
            store: mockito::Server::new_async().await,
            model: mockito::Server::new_async().await,
            hook: mockito::Server::new_async().await,
        }
    }

    fn config(&self, port: u16) -> Config {
        let mut config = Config::default();
        config.gateway.port = port;
        config.gateway.bind = "127.0.0.1".to_string();
        config.openai.api_key = Some("sk-test".to_string());
        config.openai.base_url = Some(format!("{}/v1", self.model.url()));
        config.airtable.api_key = Some("pat-test".to_string());
        config.airtable.base_id = Some("app123".to_string());
        config.airtable.base_url = Some(self.store.url());
        config.delivery.webhook_url = Some(format!("{}/hook", self.hook.url()));
        config
    }

    async fn store_returns(&mut self, records: Value) -> Mock {
        self.store
            .mock("GET", "/v0/app123/Properties")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({ "records": records }).to_string())
            .create_async()
            .await
    }

    async fn model_replies(&mut self, text: &str, times: usize) -> Mock {
        self.model
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({ "choices": [{ "index": 0, "message": { "role": "assistant", "content": text } }] })
                    .to_string(),
            )
            .expect(times)
            .create_async()
            .await
    }

    async fn hook_answers(&mut self, status: usize, times: usize) -> Mock {
        self.hook
            .mock("POST", "/hook")
            .with_status(status)
            .with_body("Accepted")
            .expect(times)
            .create_async()
            .await
    }
}

fn seaside() -> Value {
    json!([{
        "id": "recSeaside",
        "fields": {
            "Name": "Seaside Cottage",
            "Address": "1 Shore Rd",
            "Check-in Time": "3:00 PM",
            "Check-out Time": "11:00 AM",
            "Max Guests": 4
        }
    }])
}

/// Spawn the gateway and wait until GET / answers. Returns the webhook URL.
async fn start(settings: Settings) -> String {
    let port = settings.gateway.port;
    let path = settings.gateway.path.clone();
    tokio::spawn(async move {
        let _ = gateway::run_gateway(settings).await;
    });

    let health = format!("http://127.0.0.1:{}/", port);
    let client = reqwest::Client::new();
    let mut last_err = None;
    for _ in 0..100 {
        match client.get(&health).send().await {
            Ok(resp) if resp.status().is_success() => {
                let json: Value = resp.json().await.expect("parse JSON");
                assert_eq!(json.get("runtime").and_then(|v| v.as_str()), Some("running"));
                assert_eq!(json.get("port").and_then(|v| v.as_u64()), Some(port as u64));
                return format!("http://127.0.0.1:{}{}", port, path);
            }
            Ok(_) => {}
            Err(e) => last_err = Some(e),
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!(
        "GET {} did not return 200 within 5s; last error: {:?}",
        health, last_err
    );
}

async fn post(url: &str, body: &str) -> (u16, Option<String>, Value) {
    let resp = reqwest::Client::new()
        .post(url)
        .header("content-type", "application/json")
        .body(body.to_string())
        .send()
        .await
        .expect("POST webhook");
    let status = resp.status().as_u16();
    let cors = resp
        .headers()
        .get("access-control-allow-origin")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let json = resp.json().await.expect("JSON body");
    (status, cors, json)
}

#[tokio::test]
async fn example_message_is_answered_and_forwarded_once() {
    let mut up = Upstreams::new().await;
    let store = up.store_returns(seaside()).await;
    let model = up
        .model
        .mock("POST", "/v1/chat/completions")
        .match_header("authorization", "Bearer sk-test")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex("Seaside Cottage".to_string()),
            Matcher::Regex("Check-in time: 3:00 PM".to_string()),
            Matcher::Regex("What time is check-in\\?".to_string()),
            Matcher::PartialJson(json!({ "model": "gpt-4-0125-preview", "max_tokens": 150 })),
        ]))
        .with_status(200)
        .with_body(json!({ "choices": [{ "message": { "content": REPLY } }] }).to_string())
        .expect(1)
        .create_async()
        .await;
    let hook = up
        .hook
        .mock("POST", "/hook")
        .match_body(Matcher::Json(json!({ "Body": REPLY })))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let url = start(up.config(free_port()).validate().unwrap()).await;
    let (status, cors, body) = post(&url, EXAMPLE_BODY).await;

    assert_eq!(status, 200);
    assert_eq!(cors.as_deref(), Some("*"));
    assert_eq!(
        body,
        json!({ "success": true, "message": "Message processed successfully" })
    );
    store.assert_async().await;
    model.assert_async().await;
    hook.assert_async().await;
}

#[tokio::test]
async fn empty_store_answers_404_without_generating() {
    let mut up = Upstreams::new().await;
    let _store = up.store_returns(json!([])).await;
    let model = up.model_replies(REPLY, 0).await;
    let hook = up.hook_answers(200, 0).await;

    let url = start(up.config(free_port()).validate().unwrap()).await;
    let (status, cors, body) = post(&url, EXAMPLE_BODY).await;

    assert_eq!(status, 404);
    assert_eq!(cors.as_deref(), Some("*"));
    assert_eq!(
        body,
        json!({ "success": false, "error": "No property found for this sender" })
    );
    model.assert_async().await;
    hook.assert_async().await;
}

#[tokio::test]
async fn missing_fields_answer_500_naming_the_field() {
    let mut up = Upstreams::new().await;
    let store = up
        .store
        .mock("GET", "/v0/app123/Properties")
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;
    let url = start(up.config(free_port()).validate().unwrap()).await;

    let cases = [
        (r#"{"sender":"+1","timestamp":"t"}"#, "message is required"),
        (r#"{"message":"hi","timestamp":"t"}"#, "sender is required"),
        (r#"{"message":"hi","sender":"+1"}"#, "timestamp is required"),
        (r#"{"message":"hi","sender":"+1","timestamp":""}"#, "timestamp is required"),
    ];
    for (body, expected) in cases {
        let (status, cors, json) = post(&url, body).await;
        assert_eq!(status, 500, "body {}", body);
        assert_eq!(cors.as_deref(), Some("*"));
        assert_eq!(json["success"], json!(false));
        assert_eq!(json["error"], json!(expected));
    }
    store.assert_async().await;
}

#[tokio::test]
async fn malformed_json_answers_500() {
    let up = Upstreams::new().await;
    let url = start(up.config(free_port()).validate().unwrap()).await;
    let (status, cors, json) = post(&url, "{not json").await;
    assert_eq!(status, 500);
    assert_eq!(cors.as_deref(), Some("*"));
    assert_eq!(json["success"], json!(false));
    assert!(json["error"].as_str().unwrap().starts_with("invalid JSON body"));
}

#[tokio::test]
async fn messages_larger_than_two_megabytes_are_relayed() {
    let mut up = Upstreams::new().await;
    let _store = up.store_returns(seaside()).await;
    let model = up.model_replies(REPLY, 1).await;
    let hook = up.hook_answers(200, 1).await;

    let url = start(up.config(free_port()).validate().unwrap()).await;
    let body = json!({
        "message": "a".repeat(3 * 1024 * 1024),
        "sender": "+15551234567",
        "timestamp": "2024-01-01T12:00:00Z"
    })
    .to_string();
    let (status, cors, json) = post(&url, &body).await;

    assert_eq!(status, 200);
    assert_eq!(cors.as_deref(), Some("*"));
    assert_eq!(json["success"], json!(true));
    model.assert_async().await;
    hook.assert_async().await;
}

#[tokio::test]
async fn oversized_invalid_body_still_gets_json_envelope() {
    let up = Upstreams::new().await;
    let url = start(up.config(free_port()).validate().unwrap()).await;
    let body = json!({ "message": "a".repeat(3 * 1024 * 1024) }).to_string();
    let (status, cors, json) = post(&url, &body).await;

    assert_eq!(status, 500);
    assert_eq!(cors.as_deref(), Some("*"));
    assert_eq!(json, json!({ "success": false, "error": "sender is required" }));
}

#[tokio::test]
async fn options_is_a_bare_cors_ack() {
    let up = Upstreams::new().await;
    let url = start(up.config(free_port()).validate().unwrap()).await;
    let resp = reqwest::Client::new()
        .request(reqwest::Method::OPTIONS, &url)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let h = resp.headers();
    assert_eq!(h["access-control-allow-origin"], "*");
    assert_eq!(h["access-control-allow-methods"], "POST, OPTIONS");
    assert_eq!(h["access-control-allow-headers"], "Content-Type");
    assert!(resp.text().await.unwrap().is_empty());
}

#[tokio::test]
async fn other_methods_are_405() {
    let up = Upstreams::new().await;
    let url = start(up.config(free_port()).validate().unwrap()).await;
    for method in [reqwest::Method::GET, reqwest::Method::PUT, reqwest::Method::DELETE] {
        let resp = reqwest::Client::new()
            .request(method.clone(), &url)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 405, "method {}", method);
        assert_eq!(resp.headers()["access-control-allow-origin"], "*");
        let json: Value = resp.json().await.unwrap();
        assert_eq!(json, json!({ "error": "Method not allowed" }));
    }
}

#[tokio::test]
async fn delivery_failure_after_generation_is_500() {
    let mut up = Upstreams::new().await;
    let _store = up.store_returns(seaside()).await;
    let model = up.model_replies(REPLY, 1).await;
    let hook = up.hook_answers(502, 1).await;

    let url = start(up.config(free_port()).validate().unwrap()).await;
    let (status, cors, json) = post(&url, EXAMPLE_BODY).await;

    assert_eq!(status, 500);
    assert_eq!(cors.as_deref(), Some("*"));
    assert_eq!(json["success"], json!(false));
    assert!(json["error"].as_str().unwrap().contains("reply delivery failed"));
    assert!(json.get("message").is_none());
    model.assert_async().await;
    hook.assert_async().await;
}

#[tokio::test]
async fn generation_failure_is_500_and_nothing_is_sent() {
    let mut up = Upstreams::new().await;
    let _store = up.store_returns(seaside()).await;
    let _model = up
        .model
        .mock("POST", "/v1/chat/completions")
        .with_status(500)
        .with_body(r#"{"error":{"message":"The server had an error"}}"#)
        .create_async()
        .await;
    let hook = up.hook_answers(200, 0).await;

    let url = start(up.config(free_port()).validate().unwrap()).await;
    let (status, cors, json) = post(&url, EXAMPLE_BODY).await;

    assert_eq!(status, 500);
    assert_eq!(cors.as_deref(), Some("*"));
    assert!(json["error"].as_str().unwrap().contains("reply generation failed"));
    hook.assert_async().await;
}

#[tokio::test]
async fn empty_completion_sends_fallback_reply() {
    let mut up = Upstreams::new().await;
    let _store = up.store_returns(seaside()).await;
    let _model = up
        .model
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_body(r#"{"choices":[{"message":{"content":""}}]}"#)
        .create_async()
        .await;
    let hook = up
        .hook
        .mock("POST", "/hook")
        .match_body(Matcher::Json(json!({ "Body": concierge::reply::FALLBACK_REPLY })))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let url = start(up.config(free_port()).validate().unwrap()).await;
    let (status, _, _) = post(&url, EXAMPLE_BODY).await;
    assert_eq!(status, 200);
    hook.assert_async().await;
}

#[tokio::test]
async fn identical_posts_are_not_deduplicated() {
    let mut up = Upstreams::new().await;
    let store = up
        .store
        .mock("GET", "/v0/app123/Properties")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(json!({ "records": seaside() }).to_string())
        .expect(2)
        .create_async()
        .await;
    let model = up.model_replies(REPLY, 2).await;
    let hook = up.hook_answers(200, 2).await;

    let url = start(up.config(free_port()).validate().unwrap()).await;
    for _ in 0..2 {
        let (status, _, _) = post(&url, EXAMPLE_BODY).await;
        assert_eq!(status, 200);
    }
    store.assert_async().await;
    model.assert_async().await;
    hook.assert_async().await;
}

#[tokio::test]
async fn inbound_secret_is_enforced_when_configured() {
    let mut up = Upstreams::new().await;
    let _store = up.store_returns(seaside()).await;
    let model = up.model_replies(REPLY, 1).await;
    let hook = up.hook_answers(200, 1).await;

    let mut config = up.config(free_port());
    config.gateway.inbound_secret = Some("s3cret".to_string());
    let url = start(config.validate().unwrap()).await;

    let (status, cors, json) = post(&url, EXAMPLE_BODY).await;
    assert_eq!(status, 403);
    assert_eq!(cors.as_deref(), Some("*"));
    assert_eq!(json, json!({ "success": false, "error": "Forbidden" }));

    let resp = reqwest::Client::new()
        .post(&url)
        .header(gateway::SECRET_HEADER, "s3cret")
        .header("content-type", "application/json")
        .body(EXAMPLE_BODY)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    model.assert_async().await;
    hook.assert_async().await;
}

#[tokio::test]
async fn autopilot_off_acknowledges_without_replying() {
    let mut up = Upstreams::new().await;
    let _store = up.store_returns(seaside()).await;
    let model = up.model_replies(REPLY, 0).await;
    let hook = up.hook_answers(200, 0).await;

    let mut config = up.config(free_port());
    config.relay.autopilot = false;
    let url = start(config.validate().unwrap()).await;

    let (status, _, json) = post(&url, EXAMPLE_BODY).await;
    assert_eq!(status, 200);
    assert_eq!(json["success"], json!(true));
    model.assert_async().await;
    hook.assert_async().await;
}
