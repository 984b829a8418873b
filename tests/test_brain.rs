// Integration tests for Brain against a local one-shot HTTP listener
// Run with cargo test --test test_brain

use codeloop::agent::ModelClient;
use codeloop::brain::{Brain, BrainConfig, BrainError, Message, RequestBuilder};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing_subscriber::fmt;

/// Initialize tracing subscriber for tests
fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_target(true)
            .with_thread_ids(true)
            .with_test_writer()
            .init();
    });
}

fn config(endpoint: String) -> BrainConfig {
    BrainConfig {
        endpoint,
        api_key: "test-key".into(),
        default_model: "test-model".into(),
        max_retries: 0,
        base_retry_delay_ms: 10,
        request_timeout_secs: 5,
        max_output_tokens: 256,
        temperature: Some(0.0),
        top_p: None,
        top_k: None,
    }
}

fn header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Read one full HTTP request; returns its body
async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            return String::new();
        }
        buf.extend_from_slice(&chunk[..n]);

        if let Some(end) = header_end(&buf) {
            let headers = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
            let length = headers
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            let body_start = end + 4;
            if buf.len() >= body_start + length {
                return String::from_utf8_lossy(&buf[body_start..body_start + length]).into_owned();
            }
        }
    }
}

/// Serve a single canned response; the handle yields the request body
async fn serve_once(
    status: &'static str,
    body: &'static str,
) -> (String, tokio::task::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
        request
    });

    (format!("http://{}", addr), handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder_validation() {
        assert!(RequestBuilder::new("m").build().is_err());
        assert!(RequestBuilder::new("m").assistant_text("hi").build().is_err());

        let request = RequestBuilder::new("m")
            .system("")
            .user_text("hello")
            .max_tokens(64)
            .build()
            .unwrap();
        assert_eq!(request.system, None);
        assert_eq!(request.max_tokens, 64);
    }

    /// A successful reply is reduced to its text blocks
    #[tokio::test]
    async fn test_complete_returns_text() {
        init_tracing();
        let (endpoint, server) = serve_once(
            "200 OK",
            r#"{"id":"msg_1","model":"test-model","role":"assistant",
                "content":[{"type":"text","text":"```rhai\nprint(1);\n```"}],
                "stop_reason":"end_turn","usage":{"input_tokens":5,"output_tokens":7}}"#,
        )
        .await;

        let brain = Brain::new(config(endpoint)).unwrap();
        let reply = brain
            .complete("system text", &[Message::user_text("task")])
            .await
            .unwrap();
        assert_eq!(reply, "```rhai\nprint(1);\n```");

        let request: serde_json::Value = serde_json::from_str(&server.await.unwrap()).unwrap();
        assert_eq!(request["model"], "test-model");
        assert_eq!(request["system"], "system text");
        assert_eq!(request["max_tokens"], 256);
        assert_eq!(request["messages"][0]["role"], "user");
    }

    /// Authentication failures are not retried
    #[tokio::test]
    async fn test_auth_failure_not_retried() {
        init_tracing();
        let (endpoint, _server) = serve_once("401 Unauthorized", r#"{"error":"bad key"}"#).await;

        let mut cfg = config(endpoint);
        cfg.max_retries = 3;
        let brain = Brain::new(cfg).unwrap();

        let err = brain
            .complete("", &[Message::user_text("task")])
            .await
            .unwrap_err();
        assert!(matches!(err, BrainError::AuthenticationFailed(_)), "{err}");
    }

    /// Server errors are retried until the budget is spent
    #[tokio::test]
    async fn test_server_error_exhausts_retries() {
        init_tracing();
        let (endpoint, _server) = serve_once("500 Internal Server Error", r#"{"error":"down"}"#).await;

        let brain = Brain::new(config(endpoint)).unwrap();
        let err = brain
            .complete("", &[Message::user_text("task")])
            .await
            .unwrap_err();
        match err {
            BrainError::Exhausted { retries, last_error } => {
                assert_eq!(retries, 1);
                assert!(last_error.contains("down"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
