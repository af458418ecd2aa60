use std::net::SocketAddr;

use openwork::server::client::{ApiClient, ApiError, SessionClient};
use openwork::settings::BasicAuth;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// Minimal one-shot HTTP responder: answers every connection with the given
/// status and body, and forwards the raw request text for inspection.
async fn spawn_stub(
    status: u16,
    body: &'static str,
) -> (SocketAddr, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut raw = Vec::new();
                let mut buf = [0u8; 4096];
                loop {
                    let n = stream.read(&mut buf).await.unwrap_or(0);
                    if n == 0 {
                        break;
                    }
                    raw.extend_from_slice(&buf[..n]);
                    let text = String::from_utf8_lossy(&raw);
                    if let Some(header_end) = text.find("\r\n\r\n") {
                        let content_length = text
                            .lines()
                            .find_map(|line| {
                                let (name, value) = line.split_once(':')?;
                                name.eq_ignore_ascii_case("content-length")
                                    .then(|| value.trim().parse::<usize>().ok())?
                            })
                            .unwrap_or(0);
                        if raw.len() >= header_end + 4 + content_length {
                            break;
                        }
                    }
                }
                let _ = tx.send(String::from_utf8_lossy(&raw).into_owned());
                let response = format!(
                    "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    (addr, rx)
}

#[tokio::test]
async fn prompt_no_reply_posts_structured_body() {
    let (addr, mut requests) = spawn_stub(200, "{}").await;
    let client = ApiClient::new(format!("http://{addr}/cHJvamVjdA=="), None);

    client.prompt_no_reply("s1", "hello there").await.unwrap();

    let request = requests.recv().await.unwrap();
    assert!(request.starts_with("POST /cHJvamVjdA==/session/s1/message"));
    let body_start = request.find("\r\n\r\n").unwrap() + 4;
    let body: serde_json::Value = serde_json::from_str(&request[body_start..]).unwrap();
    assert_eq!(body["parts"][0]["type"], "text");
    assert_eq!(body["parts"][0]["text"], "hello there");
    assert_eq!(body["noReply"], true);
    assert!(body.get("system").is_none());
}

#[tokio::test]
async fn prompt_with_system_carries_the_system_prompt() {
    let (addr, mut requests) = spawn_stub(200, "{}").await;
    let client = ApiClient::new(format!("http://{addr}/p"), None);

    client
        .prompt_no_reply_with_system("s1", "text", "be terse")
        .await
        .unwrap();

    let request = requests.recv().await.unwrap();
    let body_start = request.find("\r\n\r\n").unwrap() + 4;
    let body: serde_json::Value = serde_json::from_str(&request[body_start..]).unwrap();
    assert_eq!(body["system"], "be terse");
}

#[tokio::test]
async fn non_success_status_surfaces_status_and_body() {
    let (addr, _requests) = spawn_stub(500, "server exploded").await;
    let client = ApiClient::new(format!("http://{addr}/p"), None);

    let err = client.prompt_no_reply("s1", "x").await.unwrap_err();
    match err {
        ApiError::Status { status, body, .. } => {
            assert_eq!(status, 500);
            assert_eq!(body, "server exploded");
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn list_sessions_parses_wrapped_shape() {
    let (addr, _requests) =
        spawn_stub(200, r#"{"sessions":[{"id":"s1","title":"First"},{"id":"s2"}]}"#).await;
    let client = ApiClient::new(format!("http://{addr}/p"), None);

    let sessions = client.list_sessions().await.unwrap();
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[0].id, "s1");
    assert_eq!(sessions[0].title.as_deref(), Some("First"));
}

#[tokio::test]
async fn list_sessions_tolerates_unexpected_ok_shape() {
    let (addr, _requests) = spawn_stub(200, r#"{"something":"else"}"#).await;
    let client = ApiClient::new(format!("http://{addr}/p"), None);
    assert!(client.list_sessions().await.unwrap().is_empty());
}

#[tokio::test]
async fn health_check_never_errors() {
    let (addr, _requests) = spawn_stub(200, "ok").await;
    let healthy = ApiClient::new(format!("http://{addr}/p"), None);
    assert!(healthy.health_check().await);

    // Grab a port with no listener behind it.
    let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = probe.local_addr().unwrap();
    drop(probe);
    let unhealthy = ApiClient::new(format!("http://{dead_addr}/p"), None);
    assert!(!unhealthy.health_check().await);
}

#[tokio::test]
async fn encoded_path_ending_in_slash_survives_in_request_paths() {
    let (addr, mut requests) = spawn_stub(200, "{}").await;
    // btoa("/a?") is "L2E/": the trailing slash is part of the base64
    // project-path segment and must not be stripped.
    let client = ApiClient::new(format!("http://{addr}/L2E/"), None);

    client.prompt_no_reply("s1", "x").await.unwrap();

    let request = requests.recv().await.unwrap();
    assert!(
        request.starts_with("POST /L2E//session/s1/message"),
        "{request}"
    );
}

#[tokio::test]
async fn basic_auth_header_is_attached_when_configured() {
    let (addr, mut requests) = spawn_stub(200, "{}").await;
    let client = ApiClient::new(
        format!("http://{addr}/p"),
        Some(BasicAuth {
            username: "user".to_string(),
            password: "pass".to_string(),
        }),
    );

    client.prompt_no_reply("s1", "x").await.unwrap();

    let request = requests.recv().await.unwrap();
    // base64("user:pass")
    assert!(
        request
            .lines()
            .any(|line| line.to_ascii_lowercase().starts_with("authorization: basic dxnlcjpwyxnz")),
        "{request}"
    );
}
