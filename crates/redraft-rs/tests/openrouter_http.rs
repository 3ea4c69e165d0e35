//! OpenRouter client against a local HTTP stub: retry, classification, and
//! request shape.

use futures::future::BoxFuture;
use redraft_rs::api::{
    ClientConfig, CompletionClient, CompletionFailure, CompletionRequest, OpenRouterClient,
    Sleeper,
};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

struct NoSleep;

impl Sleeper for NoSleep {
    fn sleep(&self, _delay: Duration) -> BoxFuture<'_, ()> {
        Box::pin(async {})
    }
}

type Seen = Arc<Mutex<Vec<Value>>>;

/// Serve one canned `(status, body)` per connection, recording request bodies.
async fn stub(responses: Vec<(u16, String)>) -> (String, Seen) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let record = Arc::clone(&seen);

    tokio::spawn(async move {
        for (status, body) in responses {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let request = read_body(&mut stream).await;
            record
                .lock()
                .unwrap()
                .push(serde_json::from_str(&request).unwrap_or(Value::Null));
            let reply = format!(
                "HTTP/1.1 {status} Stub\r\ncontent-type: application/json\r\n\
                 content-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(reply.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });

    (format!("http://{addr}/api/v1/chat/completions"), seen)
}

async fn read_body(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = stream.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            return String::new();
        }
        buf.extend_from_slice(&chunk[..n]);
        let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let headers = String::from_utf8_lossy(&buf[..end]).to_lowercase();
        let len = headers
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        let start = end + 4;
        if buf.len() >= start + len {
            return String::from_utf8_lossy(&buf[start..start + len]).into_owned();
        }
    }
}

fn client(url: String, retries: u32) -> OpenRouterClient {
    let config = ClientConfig {
        api_url: url,
        ..ClientConfig::default()
    }
    .with_retries(retries);
    OpenRouterClient::new("test-key", config)
        .unwrap()
        .with_sleeper(NoSleep)
}

fn chat(content: Value) -> String {
    serde_json::json!({
        "choices": [{
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }]
    })
    .to_string()
}

#[tokio::test]
async fn retries_transient_status_then_joins_parts() {
    let (url, seen) = stub(vec![
        (503, r#"{"error": {"message": "overloaded"}}"#.into()),
        (
            200,
            chat(serde_json::json!([{"type": "text", "text": "## Title\n"}, {"type": "text", "text": "Widgets"}])),
        ),
    ])
    .await;

    let request = CompletionRequest::free_form("You are an expert.", "Draft it.");
    let text = client(url, 3).send(&request).await.unwrap();
    assert_eq!(text, "## Title\nWidgets");

    let bodies = seen.lock().unwrap();
    assert_eq!(bodies.len(), 2);
    assert_eq!(bodies[0], bodies[1]);
    assert!(bodies[0].get("response_format").is_none());
    assert_eq!(bodies[0]["messages"][0]["role"], "system");
}

#[tokio::test]
async fn structured_request_carries_plan_schema() {
    let (url, seen) = stub(vec![(200, chat(Value::String("{}".into())))]).await;

    let request = CompletionRequest::structured("sys", "Review it.");
    client(url, 0).send(&request).await.unwrap();

    let bodies = seen.lock().unwrap();
    let format = &bodies[0]["response_format"];
    assert_eq!(format["type"], "json_schema");
    let required = format["json_schema"]["schema"]["required"]
        .as_array()
        .unwrap();
    assert!(required.contains(&"final_verdict".into()));
    assert_eq!(bodies[0]["temperature"], serde_json::json!(0.2));
}

#[tokio::test]
async fn auth_failure_is_blocked_without_retry() {
    let (url, seen) = stub(vec![
        (401, r#"{"error": {"message": "bad key"}}"#.into()),
        (200, chat(Value::String("unreachable".into()))),
    ])
    .await;

    let request = CompletionRequest::free_form("", "Draft it.");
    let err = client(url, 3).send(&request).await.unwrap_err();
    assert!(matches!(err, CompletionFailure::Blocked { .. }));
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn exhausted_retries_report_attempts() {
    let (url, seen) = stub(vec![(429, "{}".into()), (429, "{}".into()), (429, "{}".into())]).await;

    let request = CompletionRequest::free_form("", "Draft it.");
    let err = client(url, 2).send(&request).await.unwrap_err();
    assert!(matches!(
        err,
        CompletionFailure::Transient { attempts: 3, .. }
    ));
    assert_eq!(seen.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn content_filter_is_blocked() {
    let body = serde_json::json!({
        "choices": [{"message": {"content": ""}, "finish_reason": "content_filter"}]
    })
    .to_string();
    let (url, _) = stub(vec![(200, body)]).await;

    let request = CompletionRequest::free_form("", "Draft it.");
    let err = client(url, 3).send(&request).await.unwrap_err();
    assert!(matches!(err, CompletionFailure::Blocked { .. }));
}
