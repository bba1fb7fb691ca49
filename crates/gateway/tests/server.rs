#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Control surface and dashboard feed over real HTTP and WebSocket clients.

mod common;

use std::{net::SocketAddr, time::Duration};

use {
    chatrelay_bridge::BridgeAdapter,
    chatrelay_bus::EventBus,
    chatrelay_channels::AdapterRegistry,
    chatrelay_gateway::{AppState, ServiceSnapshot, ServiceState, build_gateway_app},
    chatrelay_protocol::{
        ChatEvent, ConnectionStatus, ControlCommand, Platform, StatusEvent,
    },
    common::{Harness, Script, TIMEOUT, eventually, fast_settings, register},
    futures::{SinkExt, Stream, StreamExt},
    serde_json::{Value, json},
    tokio::{net::TcpListener, sync::watch},
    tokio_tungstenite::{connect_async, tungstenite::Message},
};

async fn serve(state: AppState) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = build_gateway_app(state);
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    addr
}

async fn start_gateway(h: &Harness) -> SocketAddr {
    serve(AppState::from_orchestrator(&h.orchestrator)).await
}

async fn post(url: String, body: Value) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .post(url)
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

async fn next_json<S>(ws: &mut S) -> Value
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let msg = tokio::time::timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

#[tokio::test]
async fn health_and_services_report_snapshot() {
    let mut registry = AdapterRegistry::new();
    register(&mut registry, Platform::Twitch, Script::Cooperative);
    let h = Harness::new(fast_settings(), registry);
    let addr = start_gateway(&h).await;

    let health: Value = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["services"], json!({ "twitch": "stopped" }));
    assert!(health["version"].is_string());

    h.orchestrator
        .control(ControlCommand::start(Platform::Twitch))
        .unwrap();
    h.wait_state(Platform::Twitch, ServiceState::Running).await;

    let snapshot: ServiceSnapshot = reqwest::get(format!("http://{addr}/api/services"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(snapshot.state(Platform::Twitch), ServiceState::Running);
    assert_eq!(snapshot.services[&Platform::Twitch].generation, Some(1));
}

#[tokio::test]
async fn control_endpoint_enqueues_or_rejects() {
    let mut registry = AdapterRegistry::new();
    let observed = register(&mut registry, Platform::Twitch, Script::Cooperative);
    let h = Harness::new(fast_settings(), registry);
    let addr = start_gateway(&h).await;
    let url = format!("http://{addr}/api/control");

    let (status, body) = post(url.clone(), json!({ "service": "twitch", "command": "start" })).await;
    assert_eq!(status, 202);
    assert_eq!(body, json!({ "ok": true }));
    h.wait_state(Platform::Twitch, ServiceState::Running).await;
    eventually(|| observed.live() == 1).await;

    for (req, needle) in [
        (json!({ "service": "myspace", "command": "start" }), "unknown service"),
        (json!({ "service": "twitch", "command": "explode" }), "unknown command"),
        (json!({ "service": "youtube", "command": "start" }), "not registered"),
        (json!({ "service": "twitch" }), "command"),
    ] {
        let (status, body) = post(url.clone(), req).await;
        assert_eq!(status, 400);
        assert_eq!(body["ok"], false);
        assert!(
            body["error"].as_str().unwrap().contains(needle),
            "{body} should mention {needle}"
        );
    }

    let (status, _) = post(url, json!({ "service": "TWITCH", "command": "Stop" })).await;
    assert_eq!(status, 202);
    h.wait_state(Platform::Twitch, ServiceState::Stopped).await;
}

#[tokio::test]
async fn send_endpoint_forwards_to_running_adapter() {
    let mut registry = AdapterRegistry::new();
    let observed = register(&mut registry, Platform::Twitch, Script::Cooperative);
    let h = Harness::new(fast_settings(), registry);
    let addr = start_gateway(&h).await;

    h.orchestrator
        .control(ControlCommand::start(Platform::Twitch))
        .unwrap();
    h.wait_state(Platform::Twitch, ServiceState::Running).await;

    let (status, _) = post(
        format!("http://{addr}/api/services/twitch/send"),
        json!({ "text": "hi chat" }),
    )
    .await;
    assert_eq!(status, 202);
    eventually(|| observed.sent() == vec!["hi chat".to_string()]).await;

    let (status, _) = post(
        format!("http://{addr}/api/services/friendster/send"),
        json!({ "text": "nope" }),
    )
    .await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn closed_bus_yields_service_unavailable() {
    let (bus, dispatcher) = EventBus::spawn();
    let (_tx, services) = watch::channel(ServiceSnapshot::stopped([Platform::Twitch]));
    let addr = serve(AppState::new(bus, services)).await;
    dispatcher.shutdown(Duration::from_secs(1)).await.unwrap();

    let (status, body) = post(
        format!("http://{addr}/api/control"),
        json!({ "service": "twitch", "command": "start" }),
    )
    .await;
    assert_eq!(status, 503);
    assert_eq!(body["ok"], false);
}

#[tokio::test]
async fn dashboard_receives_status_and_chat_in_publish_order() {
    let h = Harness::new(fast_settings(), AdapterRegistry::new());
    let addr = start_gateway(&h).await;
    let (mut ws, _) = connect_async(format!("ws://{addr}/ws/dashboard"))
        .await
        .unwrap();

    let bus = h.orchestrator.bus();
    bus.publish(StatusEvent::new(Platform::Twitch, ConnectionStatus::Connecting))
        .unwrap();
    bus.publish(ChatEvent::new(Platform::Twitch, "chan", "ana", "one"))
        .unwrap();
    bus.publish(ControlCommand::start(Platform::Youtube)).unwrap();
    bus.publish(ChatEvent::new(Platform::Youtube, "live", "bob", "two"))
        .unwrap();
    bus.publish(
        StatusEvent::new(Platform::Bridge, ConnectionStatus::Waiting).with_message("listening"),
    )
    .unwrap();

    let mut frames = Vec::new();
    for _ in 0..4 {
        frames.push(next_json(&mut ws).await);
    }
    let kinds: Vec<(&str, &str)> = frames
        .iter()
        .map(|f| {
            (
                f["event"].as_str().unwrap(),
                f["payload"]["platform"].as_str().unwrap(),
            )
        })
        .collect();
    assert_eq!(kinds, vec![
        ("status", "twitch"),
        ("chat", "twitch"),
        ("chat", "youtube"),
        ("status", "bridge"),
    ]);
    assert_eq!(frames[1]["payload"]["text"], "one");
    assert_eq!(frames[2]["payload"]["user"], "bob");
    assert_eq!(frames[3]["payload"]["message"], "listening");

    // Inbound frames are ignored and the feed keeps going.
    ws.send(Message::Text(r#"{"type":"hello"}"#.into()))
        .await
        .unwrap();
    bus.publish(ChatEvent::new(Platform::Twitch, "chan", "cy", "three"))
        .unwrap();
    assert_eq!(next_json(&mut ws).await["payload"]["text"], "three");
    ws.close(None).await.unwrap();
}

#[tokio::test]
async fn debug_socket_accepts_frames() {
    let h = Harness::new(fast_settings(), AdapterRegistry::new());
    let addr = start_gateway(&h).await;
    let (mut ws, _) = connect_async(format!("ws://{addr}/ws/debug")).await.unwrap();

    for frame in [
        r#"{"type":"debug","message":"popup opened"}"#,
        r#"{"type":"debug","message":{"tabs":3}}"#,
        r#"{"type":"debug"}"#,
        "not json",
        r#"{"type":"other"}"#,
    ] {
        ws.send(Message::Text(frame.into())).await.unwrap();
    }
    ws.send(Message::Close(None)).await.unwrap();

    let closed = tokio::time::timeout(TIMEOUT, async {
        while let Some(msg) = ws.next().await {
            if matches!(msg, Ok(Message::Close(_)) | Err(_)) {
                break;
            }
        }
    })
    .await;
    assert!(closed.is_ok());
}

#[tokio::test]
async fn bridge_restart_drops_peer_and_accepts_reconnect() {
    // Reserve a port so the restarted listener comes back on the same address.
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let mut settings = fast_settings();
    settings.runtime.stop_timeout_ms = 2_000;
    settings.bridge = json!({ "host": "127.0.0.1", "port": port });
    let registry = AdapterRegistry::new().with(Platform::Bridge, BridgeAdapter::build);
    let mut h = Harness::new(settings, registry);

    h.orchestrator
        .control(ControlCommand::start(Platform::Bridge))
        .unwrap();
    let waiting = h
        .wait_status(Platform::Bridge, ConnectionStatus::Waiting)
        .await;
    let bridge_url = format!("ws://127.0.0.1:{port}/ws");
    assert_eq!(
        waiting.message.as_deref(),
        Some(format!("listening on 127.0.0.1:{port}").as_str())
    );

    let (mut peer, _) = connect_async(&bridge_url).await.unwrap();
    h.wait_status(Platform::Bridge, ConnectionStatus::Connected)
        .await;

    h.orchestrator
        .control(ControlCommand::restart(Platform::Bridge))
        .unwrap();

    // The old peer is dropped by the server.
    let dropped = tokio::time::timeout(TIMEOUT, async {
        loop {
            match peer.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {},
            }
        }
    })
    .await;
    assert!(dropped.is_ok());

    // stopped, then a fresh listener.
    let mut seen = Vec::new();
    loop {
        if let chatrelay_bus::Event::Status(s) = h.next_event().await
            && s.platform == Platform::Bridge
        {
            seen.push(s.status);
            if s.status == ConnectionStatus::Waiting {
                break;
            }
        }
    }
    assert_eq!(seen, vec![
        ConnectionStatus::Stopped,
        ConnectionStatus::Connecting,
        ConnectionStatus::Waiting
    ]);
    h.wait_for(Platform::Bridge, |i| {
        i.state == ServiceState::Running && i.generation == Some(2)
    })
    .await;

    let (mut peer, _) = connect_async(&bridge_url).await.unwrap();
    h.wait_status(Platform::Bridge, ConnectionStatus::Connected)
        .await;
    peer.send(Message::Text(r#"{"type":"queryStatus"}"#.into()))
        .await
        .unwrap();
    assert_eq!(next_json(&mut peer).await, json!({ "type": "pong" }));

    h.orchestrator.shutdown().await.unwrap();
}
