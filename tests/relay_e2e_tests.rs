//! End-to-End Relay Tests
//!
//! Drives complete call sessions over a real WebSocket connection, with the
//! chat completions backend replaced by a mock server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use callrelay_gateway::{
    ServerConfig,
    config::{AgentSettings, VoiceSettings},
    routes,
    state::AppState,
};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const GREETING: &str = "Olá! Aqui é a Laura da Voxemy. Como posso ajudar você hoje?";
const FALLBACK: &str = "Desculpe, não entendi bem. Pode repetir?";
const DEGRADED: &str = "Desculpe, estou com problemas técnicos no momento.";

/// Helper function to create a test configuration
fn create_test_config(openai_base_url: &str) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        keepalive_interval_seconds: 25,
        openai_api_key: Some("test_openai_key".to_string()),
        openai_base_url: openai_base_url.to_string(),
        openai_model: "gpt-4o-mini".to_string(),
        generation_timeout_seconds: 5,
        elevenlabs_api_key: None,
        voice: VoiceSettings::default(),
        agent: AgentSettings::default(),
        cors_allowed_origins: Some("*".to_string()),
    }
}

/// Serve the full router on an ephemeral port
async fn spawn_relay(config: ServerConfig) -> (SocketAddr, Arc<AppState>) {
    let app_state = AppState::new(config);
    let app = Router::new()
        .merge(routes::api::create_api_router())
        .merge(routes::relay::create_relay_router())
        .with_state(app_state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, app_state)
}

async fn connect(addr: SocketAddr, path_and_query: &str) -> Client {
    let (client, _) = connect_async(format!("ws://{addr}{path_and_query}"))
        .await
        .expect("WebSocket connect failed");
    client
}

async fn send_event(client: &mut Client, event: Value) {
    client
        .send(Message::Text(event.to_string().into()))
        .await
        .unwrap();
}

/// Next JSON text frame, skipping control frames
async fn next_event(client: &mut Client) -> Value {
    loop {
        let message = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("Timed out waiting for an event")
            .expect("Stream ended")
            .expect("WebSocket error");
        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn wait_for_active(state: &AppState, expected: usize) {
    let reached = timeout(Duration::from_secs(3), async {
        while state.registry.active_count() != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(
        reached.is_ok(),
        "active connections stuck at {}, expected {expected}",
        state.registry.active_count()
    );
}

async fn mock_completion(server: &MockServer, template: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(template)
        .mount(server)
        .await;
}

fn completion(content: &str) -> Value {
    json!({"choices": [{"message": {"role": "assistant", "content": content}}]})
}

#[tokio::test]
async fn test_call_scenario_end_to_end() {
    let backend = MockServer::start().await;
    mock_completion(
        &backend,
        ResponseTemplate::new(200).set_body_json(completion("Claro! Para quando?")),
    )
    .await;

    let (addr, state) = spawn_relay(create_test_config(&backend.uri())).await;
    let mut client = connect(addr, "/ws").await;

    send_event(&mut client, json!({"event": "connected"})).await;
    assert_eq!(next_event(&mut client).await, json!({"event": "connected"}));

    send_event(
        &mut client,
        json!({"event": "start", "start": {"callSid": "CA-e2e", "streamSid": "MZ1"}}),
    )
    .await;
    let greeting = next_event(&mut client).await;
    assert_eq!(greeting["event"], "speak");
    assert_eq!(greeting["text"], GREETING);
    assert!(greeting.get("config").is_none());

    // Too short to answer; the next speak event must belong to the following transcript
    send_event(&mut client, json!({"event": "transcript", "transcript": {"speech": "oi"}})).await;
    send_event(
        &mut client,
        json!({"event": "transcript", "transcript": {"speech": "quero agendar uma consulta"}}),
    )
    .await;
    let reply = next_event(&mut client).await;
    assert_eq!(reply["text"], "Claro! Para quando?");

    let requests = backend.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "system");
    assert_eq!(messages[1]["content"], "quero agendar uma consulta");

    // The snapshot is published right after the reply is queued
    let published = timeout(Duration::from_secs(3), async {
        loop {
            let snapshots = state.registry.snapshots();
            if snapshots.first().is_some_and(|s| s.turns == 2) {
                return snapshots[0].session_id.clone();
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Snapshot never reached two turns");
    assert_eq!(published, "CA-e2e");

    send_event(&mut client, json!({"event": "stop", "reason": "completed"})).await;
    // The relay may already have closed its side
    let _ = client
        .send(Message::Text(json!({"event": "connected"}).to_string().into()))
        .await;

    // Only a close frame may follow the stop
    let remaining = timeout(Duration::from_secs(5), async {
        let mut texts = 0;
        while let Some(Ok(message)) = client.next().await {
            if message.is_text() {
                texts += 1;
            }
        }
        texts
    })
    .await
    .expect("Connection was not closed after stop");
    assert_eq!(remaining, 0);

    wait_for_active(&state, 0).await;
}

#[tokio::test]
async fn test_upstream_failure_speaks_fallback() {
    let backend = MockServer::start().await;
    mock_completion(&backend, ResponseTemplate::new(500).set_body_string("overloaded")).await;

    let (addr, _state) = spawn_relay(create_test_config(&backend.uri())).await;
    let mut client = connect(addr, "/").await;

    send_event(&mut client, json!({"event": "start", "start": {}})).await;
    assert_eq!(next_event(&mut client).await["text"], GREETING);

    send_event(
        &mut client,
        json!({"event": "transcript", "transcript": {"speech": "qual o horário de atendimento?"}}),
    )
    .await;
    assert_eq!(next_event(&mut client).await["text"], FALLBACK);

    // The session keeps going after a failed generation
    send_event(&mut client, json!({"event": "connected"})).await;
    assert_eq!(next_event(&mut client).await, json!({"event": "connected"}));
}

#[tokio::test]
async fn test_voice_config_follows_credential() {
    let mut config = create_test_config("http://127.0.0.1:9");
    config.openai_api_key = None;
    config.elevenlabs_api_key = Some("test_elevenlabs_key".to_string());

    let (addr, _state) = spawn_relay(config).await;
    let mut client = connect(addr, "/ws").await;

    send_event(&mut client, json!({"event": "start", "start": {"callSid": "CA1"}})).await;
    let greeting = next_event(&mut client).await;
    let voice = greeting["config"].as_object().expect("voice config present");
    assert_eq!(voice["provider"], "elevenlabs");
    assert_eq!(voice["voice_id"], "FGY2WhTYpPnrIDTdsKH5");
    assert_eq!(voice["audio_format"], "ulaw_8000");
    assert_eq!(voice.len(), 7);

    // No generation credential: degraded reply without contacting the backend
    send_event(
        &mut client,
        json!({"event": "transcript", "transcript": {"speech": "quero falar com alguém"}}),
    )
    .await;
    let reply = next_event(&mut client).await;
    assert_eq!(reply["text"], DEGRADED);
    assert!(reply["config"].is_object());
}

#[tokio::test]
async fn test_malformed_frames_keep_connection_open() {
    let (addr, _state) = spawn_relay(create_test_config("http://127.0.0.1:9")).await;
    let mut client = connect(addr, "/ws").await;

    client.send(Message::Text("not json at all".into())).await.unwrap();
    client.send(Message::Text("[1,2,3]".into())).await.unwrap();
    send_event(&mut client, json!({"kind": "connected"})).await;
    send_event(&mut client, json!({"event": "mystery", "payload": 1})).await;
    client
        .send(Message::Binary(vec![0u8, 1, 2].into()))
        .await
        .unwrap();

    send_event(&mut client, json!({"event": "connected"})).await;
    assert_eq!(next_event(&mut client).await, json!({"event": "connected"}));
}

#[tokio::test]
async fn test_keepalive_pings_client() {
    let mut config = create_test_config("http://127.0.0.1:9");
    config.keepalive_interval_seconds = 1;

    let (addr, _state) = spawn_relay(config).await;
    let mut client = connect(addr, "/ws").await;

    let pinged = timeout(Duration::from_secs(5), async {
        while let Some(Ok(message)) = client.next().await {
            if matches!(message, Message::Ping(_)) {
                return true;
            }
        }
        false
    })
    .await
    .expect("No keep-alive ping received");
    assert!(pinged);
}

#[tokio::test]
async fn test_connection_count_and_query_identity() {
    let (addr, state) = spawn_relay(create_test_config("http://127.0.0.1:9")).await;

    let mut first = connect(addr, "/ws?callSid=CA-query").await;
    let mut second = connect(addr, "/").await;

    // Round trips guarantee both sessions are registered
    send_event(&mut first, json!({"event": "connected"})).await;
    next_event(&mut first).await;
    send_event(&mut second, json!({"event": "connected"})).await;
    next_event(&mut second).await;
    wait_for_active(&state, 2).await;

    let session_ids: Vec<String> = state
        .registry
        .snapshots()
        .into_iter()
        .map(|snapshot| snapshot.session_id)
        .collect();
    assert!(session_ids.contains(&"CA-query".to_string()));
    assert!(session_ids.iter().any(|id| id.starts_with("TEMP_")));

    // A start event cannot override the query identity
    send_event(
        &mut first,
        json!({"event": "start", "start": {"callSid": "CA-other"}}),
    )
    .await;
    next_event(&mut first).await;
    assert!(
        state
            .registry
            .snapshots()
            .iter()
            .any(|snapshot| snapshot.session_id == "CA-query")
    );

    second.close(None).await.unwrap();
    wait_for_active(&state, 1).await;

    drop(first);
    wait_for_active(&state, 0).await;
}
