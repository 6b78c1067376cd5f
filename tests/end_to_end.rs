use std::time::Duration;

use odds_ws::testing::MockTransport;
use odds_ws::{
    ConnectOptions, ConnectionEvent, ConnectionManager, ConnectionState, OutboundMessage,
    RealtimeConfig, SendOutcome,
};
use sonic_rs::{JsonValueTrait, json};
use tokio::sync::broadcast;

const ADDR: &str = "wss://feed.example.com/live";

async fn next_event(events: &mut broadcast::Receiver<ConnectionEvent>) -> ConnectionEvent {
    tokio::time::timeout(Duration::from_secs(60), events.recv())
        .await
        .expect("event before timeout")
        .expect("event channel open")
}

#[tokio::test(start_paused = true)]
async fn queued_sends_survive_open_then_reconnects_exhaust_into_terminal_failure() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let (transport, mut server) = MockTransport::gated();
    let config = RealtimeConfig::default()
        .with_base_delay(Duration::from_millis(1_000))
        .with_max_retries(3);
    let mut manager = ConnectionManager::with_transport(config, transport.clone()).unwrap();
    let mut events = manager.events();

    manager
        .connect(ADDR, ConnectOptions::labelled("live").without_heartbeat())
        .await
        .unwrap();
    assert_eq!(manager.state(ADDR), Some(ConnectionState::Connecting));

    for n in 1..=3 {
        let message = OutboundMessage::new("subscribe", json!({ "n": n }));
        assert_eq!(manager.send(ADDR, &message).await.unwrap(), SendOutcome::Queued);
    }

    server.release_connect();
    let mut session = server.accept().await.expect("handshake released");
    for n in 1..=3u64 {
        let value = session.recv_json().await.expect("queued frame");
        assert_eq!(value.get("type").and_then(|v| v.as_str()), Some("subscribe"));
        assert_eq!(
            value.get("data").and_then(|d| d.get("n")).and_then(|v| v.as_u64()),
            Some(n)
        );
    }
    assert!(matches!(
        next_event(&mut events).await,
        ConnectionEvent::Connected { .. }
    ));

    // From here on every handshake is refused immediately.
    transport.fail_all(true);
    server.open_gate();
    session.drop_socket();

    let mut seen = Vec::new();
    loop {
        let event = next_event(&mut events).await;
        let terminal = matches!(event, ConnectionEvent::ReconnectFailed { .. });
        seen.push(event);
        if terminal {
            break;
        }
    }

    assert!(matches!(seen[0], ConnectionEvent::Disconnected { .. }));
    assert_eq!(
        seen[1],
        ConnectionEvent::Reconnecting {
            address: ADDR.to_string(),
            attempt: 1,
            delay: Duration::from_millis(1_000),
        }
    );
    let names: Vec<&str> = seen.iter().map(|e| e.name()).collect();
    assert_eq!(
        names,
        vec![
            "disconnected",
            "reconnecting",
            "error",
            "disconnected",
            "reconnecting",
            "error",
            "disconnected",
            "reconnecting",
            "error",
            "disconnected",
            "reconnect_failed",
        ]
    );
    assert_eq!(manager.state(ADDR), Some(ConnectionState::Failed));

    // Terminal: no more timers and no second notification.
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert!(events.try_recv().is_err());
    assert_eq!(transport.connect_attempts(), 4);

    manager.shutdown().await;
    assert!(manager.addresses().is_empty());
}
