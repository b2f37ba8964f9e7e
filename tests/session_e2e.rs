use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::net::TcpListener;

use navplane::agent_engine::ToolExecutor;
use navplane::config::{AppConfig, PeerConfig};
use navplane::engine::ActionEngine;
use navplane::llm::registry::ProviderRegistry;
use navplane::peer::PeerSession;
use navplane::registry::{verb_fn, ElementDescriptor, ElementRegistry, ElementType};
use navplane::server::{self, AppState};

async fn start_server() -> (SocketAddr, AppState) {
    start_server_with(AppConfig::default()).await
}

async fn start_server_with(mut config: AppConfig) -> (SocketAddr, AppState) {
    config.server.action_timeout_ms = 2_000;
    let state = AppState::new(&config, ProviderRegistry::new(String::new())).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server::serve(listener, state.clone()));
    (addr, state)
}

fn slider_registry() -> Arc<ElementRegistry> {
    let registry = ElementRegistry::shared();
    let weak = Arc::downgrade(&registry);
    registry
        .register(
            ElementDescriptor::new("slider-1", ElementType::Input, "Exposure")
                .metadata(json!({ "value": 10, "min": 0, "max": 100 }))
                .verb(
                    "increase",
                    verb_fn(move |v| {
                        let Some(reg) = weak.upgrade() else {
                            return Ok(());
                        };
                        let by = v.and_then(|v| v.as_i64()).unwrap_or(1);
                        let current = reg
                            .get("slider-1")
                            .and_then(|n| n.metadata.get("value").and_then(Value::as_i64))
                            .unwrap_or(0);
                        let mut updates = serde_json::Map::new();
                        updates.insert("value".into(), json!((current + by).clamp(0, 100)));
                        reg.update_metadata("slider-1", updates);
                        Ok(())
                    }),
                ),
        )
        .unwrap();
    registry
}

fn peer_config(addr: SocketAddr) -> PeerConfig {
    PeerConfig {
        url: format!("ws://{addr}/ws"),
        sync_interval_ms: 20,
        reconnect_delay_ms: 100,
        ..PeerConfig::default()
    }
}

fn spawn_peer(registry: Arc<ElementRegistry>, config: PeerConfig) -> PeerSession {
    let engine = Arc::new(ActionEngine::new(registry).with_default_settle(Duration::from_millis(10)));
    PeerSession::spawn(engine, config)
}

fn connect_peer(addr: SocketAddr, registry: Arc<ElementRegistry>) -> PeerSession {
    spawn_peer(registry, peer_config(addr))
}

/// Polls `check` until it holds or five seconds pass.
async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

fn slider_value(state: &AppState) -> Option<i64> {
    state
        .hub
        .current_ui_state()?
        .component("slider-1")?
        .metadata
        .get("value")?
        .as_i64()
}

#[tokio::test]
async fn custom_verb_round_trip_updates_snapshot() {
    let (addr, state) = start_server().await;
    let peer = connect_peer(addr, slider_registry());
    assert!(eventually(|| slider_value(&state) == Some(10)).await);

    let result = state
        .tools
        .execute(
            "execute_custom_action",
            json!({ "componentId": "slider-1", "actionName": "increase", "actionValue": 5 }),
        )
        .await;
    assert!(result.success, "{:?}", result.error);
    assert!(eventually(|| slider_value(&state) == Some(15)).await);

    peer.disconnect();
    peer.closed().await;
    assert!(eventually(|| !state.hub.status().connected).await);
}

#[tokio::test]
async fn unknown_component_fails_and_channel_survives() {
    let (addr, state) = start_server().await;
    let peer = connect_peer(addr, slider_registry());
    assert!(eventually(|| state.hub.current_ui_state().is_some()).await);

    let started = tokio::time::Instant::now();
    let result = state
        .tools
        .execute("click_component", json!({ "componentId": "ghost-button", "waitAfter": 0 }))
        .await;
    assert!(!result.success);
    assert!(result.error.unwrap_or_default().contains("ghost-button"));
    assert!(started.elapsed() < Duration::from_secs(2));

    assert!(peer.is_connected());
    assert!(state.hub.status().connected);
    let again = state
        .tools
        .execute(
            "execute_custom_action",
            json!({ "componentId": "slider-1", "actionName": "increase", "actionValue": 1 }),
        )
        .await;
    assert!(again.success);
}

#[tokio::test]
async fn http_surface_reports_health_and_rejects_empty_chat() {
    let (addr, _state) = start_server().await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["websocket"]["connected"], false);
    assert_eq!(health["websocket"]["clientCount"], 0);

    let empty = client
        .post(format!("http://{addr}/api/chat"))
        .json(&json!({ "messages": [] }))
        .send()
        .await
        .unwrap();
    assert_eq!(empty.status(), reqwest::StatusCode::BAD_REQUEST);

    let no_provider: Value = client
        .post(format!("http://{addr}/api/chat"))
        .json(&json!({ "messages": [{ "role": "user", "content": "brighten the photo" }] }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(no_provider["message"].as_str().unwrap().starts_with("⚠️"));

    let missing = client.get(format!("http://{addr}/nope")).send().await.unwrap();
    assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn navigation_path_stops_at_failing_step() {
    let (addr, state) = start_server().await;
    let _peer = connect_peer(addr, slider_registry());
    assert!(eventually(|| slider_value(&state) == Some(10)).await);

    let result = state
        .tools
        .execute(
            "execute_navigation_path",
            json!({
                "description": "brighten then explode",
                "steps": [
                    { "componentId": "slider-1", "action": "increase", "value": 5, "wait": 0 },
                    { "componentId": "slider-1", "action": "explode" },
                    { "componentId": "slider-1", "action": "increase", "value": 5, "wait": 0 }
                ]
            }),
        )
        .await;

    assert!(!result.success);
    assert!(result.message.starts_with("Failed during navigation:"), "{}", result.message);
    assert!(result.error.unwrap_or_default().contains("explode"));
    let executed = result.data.unwrap()["executedSteps"].as_array().cloned().unwrap();
    assert_eq!(executed.len(), 1);
    assert_eq!(executed[0]["action"], "increase");

    assert!(eventually(|| slider_value(&state) == Some(15)).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(slider_value(&state), Some(15));
}

#[tokio::test]
async fn peer_reconnects_after_server_drops_it() {
    let mut config = AppConfig::default();
    config.server.heartbeat_timeout_ms = 50;
    let (addr, state) = start_server_with(config).await;
    let peer = connect_peer(addr, slider_registry());
    assert!(eventually(|| state.hub.status().connected && peer.is_connected()).await);

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(state.hub.reap_stale().len(), 1);
    assert_eq!(state.hub.status().client_count, 0);

    assert!(eventually(|| state.hub.status().client_count == 1 && peer.is_connected()).await);
    let again = state
        .tools
        .execute(
            "execute_custom_action",
            json!({ "componentId": "slider-1", "actionName": "increase", "actionValue": 2 }),
        )
        .await;
    assert!(again.success, "{:?}", again.error);
    assert!(eventually(|| slider_value(&state) == Some(12)).await);
}

#[tokio::test]
async fn heartbeats_keep_a_peer_past_the_reaper() {
    let mut config = AppConfig::default();
    config.server.heartbeat_timeout_ms = 300;
    let (addr, state) = start_server_with(config).await;
    let _reaper = state.hub.spawn_reaper(Duration::from_millis(50));

    let lively = spawn_peer(
        slider_registry(),
        PeerConfig {
            heartbeat_interval_ms: 100,
            reconnect: false,
            ..peer_config(addr)
        },
    );
    let silent = spawn_peer(
        slider_registry(),
        PeerConfig {
            heartbeat_interval_ms: 60_000,
            reconnect: false,
            ..peer_config(addr)
        },
    );
    assert!(eventually(|| lively.is_connected() && silent.is_connected()).await);

    tokio::time::timeout(Duration::from_secs(3), silent.closed())
        .await
        .expect("silent peer is reaped");
    assert!(!silent.is_connected());

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(lively.is_connected());
    assert_eq!(state.hub.status().client_count, 1);
}
