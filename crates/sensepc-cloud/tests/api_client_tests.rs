use secrecy::SecretString;
use sensepc_cloud::*;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Request line and bearer header of each request the stub saw.
type Seen = Arc<Mutex<Vec<(String, Option<String>)>>>;

/// Minimal HTTP/1.1 responder. `route` maps a request line such as
/// `GET /v1/instances` to a status code and JSON body.
async fn stub_server<F>(route: F) -> (String, Seen)
where
    F: Fn(&str) -> (u16, String) + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let route = Arc::new(route);
    let log = seen.clone();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else { break };
            let route = route.clone();
            let log = log.clone();
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    }
                }
                let head = String::from_utf8_lossy(&buf).to_string();
                let mut lines = head.lines();
                let request_line = lines.next().unwrap_or_default();
                let target = request_line.rsplitn(2, ' ').nth(1).unwrap_or_default().to_string();
                let auth = lines
                    .find(|l| l.to_ascii_lowercase().starts_with("authorization:"))
                    .map(|l| l["authorization:".len()..].trim().to_string());
                log.lock().unwrap().push((target.clone(), auth));

                let (status, body) = route(&target);
                let response = format!(
                    "HTTP/1.1 {} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (format!("http://{}/v1", addr), seen)
}

fn signed_in() -> Arc<dyn TokenStore> {
    let store = MemoryTokenStore::new();
    store
        .set(ACCESS_TOKEN_KEY, SecretString::new("access-123".to_string()))
        .unwrap();
    Arc::new(store)
}

fn api(base: &str, tokens: Arc<dyn TokenStore>) -> SensePcApiClient {
    SensePcApiClient::new(base, tokens, Duration::from_secs(5), Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn lists_instances_with_bearer_token() {
    let (base, seen) = stub_server(|target| match target {
        "GET /v1/instances" => (
            200,
            r#"[{"id":"i-1","name":"Dev","state":"running"},{"id":"i-2","state":"stopped"}]"#.to_string(),
        ),
        _ => (404, "{}".to_string()),
    })
    .await;

    let instances = api(&base, signed_in()).list_instances().await.unwrap();
    assert_eq!(instances.len(), 2);
    assert_eq!(instances[0].state, InstanceState::Running);
    assert_eq!(instances[1].state, InstanceState::Stopped);

    let seen = seen.lock().unwrap();
    assert_eq!(seen[0].0, "GET /v1/instances");
    assert_eq!(seen[0].1.as_deref(), Some("Bearer access-123"));
}

#[tokio::test]
async fn power_actions_post_to_instance_paths() {
    let (base, seen) = stub_server(|_| (204, String::new())).await;
    let client = api(&base, signed_in());

    client.start_instance("i-1").await.unwrap();
    client.stop_instance("i-1").await.unwrap();
    client.restart_instance("i-1").await.unwrap();

    let targets: Vec<_> = seen.lock().unwrap().iter().map(|(t, _)| t.clone()).collect();
    assert_eq!(
        targets,
        vec![
            "POST /v1/instances/i-1/start",
            "POST /v1/instances/i-1/stop",
            "POST /v1/instances/i-1/restart",
        ]
    );
}

#[tokio::test]
async fn launch_session_maps_to_connection_params() {
    let (base, _) = stub_server(|target| match target {
        "POST /v1/instances/i-9/session" => (
            200,
            r#"{"authToken":"at-1","gatewayUrl":"https://gw.example.com:8443/"}"#.to_string(),
        ),
        _ => (404, "{}".to_string()),
    })
    .await;

    let client = api(&base, signed_in());
    let params = prepare_connection(&client, "i-9", "Render Node").await.unwrap();
    assert_eq!(params.host_name, "gw.example.com");
    assert_eq!(params.session_token, "at-1");
    assert_eq!(params.session_id, "console");
}

#[tokio::test]
async fn status_401_is_unauthorized() {
    let (base, _) = stub_server(|_| (401, r#"{"error":"expired"}"#.to_string())).await;
    let err = api(&base, signed_in()).list_instances().await.unwrap_err();
    assert!(err.is_unauthorized());
}

#[tokio::test]
async fn other_failures_carry_status_and_body() {
    let (base, _) = stub_server(|_| (503, "maintenance".to_string())).await;
    match api(&base, signed_in()).start_instance("i-1").await {
        Err(CloudError::Status { status, body }) => {
            assert_eq!(status, 503);
            assert_eq!(body, "maintenance");
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn malformed_json_is_a_decode_error() {
    let (base, _) = stub_server(|_| (200, "[{oops".to_string())).await;
    assert!(matches!(
        api(&base, signed_in()).list_instances().await,
        Err(CloudError::Decode(_))
    ));
}

#[tokio::test]
async fn signing_out_takes_effect_immediately() {
    let (base, seen) = stub_server(|_| (200, "[]".to_string())).await;
    let tokens = signed_in();
    let client = api(&base, tokens.clone());

    client.list_instances().await.unwrap();
    tokens.clear().unwrap();
    assert!(client.list_instances().await.unwrap_err().is_unauthorized());
    assert_eq!(seen.lock().unwrap().len(), 1);
}
