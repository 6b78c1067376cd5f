//! Loopback tests over a real TCP websocket.

use std::time::Duration;

use odds_ws::client::{self, FeedSocket};
use odds_ws::core::WsFrame;
use odds_ws::{
    ConnectOptions, ConnectionManager, InboundMessage, OutboundMessage, RealtimeConfig,
    SendOutcome, Topic,
};
use sonic_rs::{JsonValueTrait, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

async fn listen() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("ws://{}/feed", listener.local_addr().unwrap());
    (listener, address)
}

async fn accept(listener: &TcpListener) -> FeedSocket {
    let (stream, _) = tokio::time::timeout(Duration::from_secs(5), listener.accept())
        .await
        .expect("client dialled")
        .unwrap();
    client::accept(stream).await.unwrap()
}

async fn next_text(socket: &mut FeedSocket) -> sonic_rs::Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("frame before timeout")
            .expect("socket open")
            .unwrap();
        if let WsFrame::Text(bytes) = frame {
            return sonic_rs::from_slice(&bytes).unwrap();
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn odds_flow_in_and_subscriptions_flow_out() {
    let (listener, address) = listen().await;
    let mut manager = ConnectionManager::new(
        RealtimeConfig::default().with_heartbeat_interval(Duration::from_millis(100)),
    )
    .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    manager.subscribe_fn(Topic::Odds, move |message| {
        if let InboundMessage::OddsUpdate(update) = message {
            let _ = tx.send((update.sportsbook.clone(), update.odds));
        }
    });

    manager
        .connect(&address, ConnectOptions::labelled("loopback"))
        .await
        .unwrap();
    let mut server = accept(&listener).await;

    server
        .send_json(&json!({
            "type": "odds_update",
            "data": {
                "eventId": "nfl-kc-buf",
                "sportsbook": "fanduel",
                "market": "spread",
                "odds": -108.0
            }
        }))
        .await
        .unwrap();
    let received = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, ("fanduel".to_string(), -108.0));

    let subscribe = OutboundMessage::new("subscribe", json!({ "topics": ["odds"] }));
    assert_eq!(
        manager.send(&address, &subscribe).await.unwrap(),
        SendOutcome::Written
    );

    let mut saw_subscribe = false;
    let mut saw_ping = false;
    while !(saw_subscribe && saw_ping) {
        let value = next_text(&mut server).await;
        match value.get("type").and_then(|t| t.as_str()) {
            Some("subscribe") => saw_subscribe = true,
            Some("ping") => {
                saw_ping = true;
                server.send_json(&json!({ "type": "pong" })).await.unwrap();
            }
            other => panic!("unexpected frame type {other:?}"),
        }
    }

    manager.shutdown().await;
    // The client says goodbye with a normal close.
    let closing = loop {
        match tokio::time::timeout(Duration::from_secs(5), server.next()).await {
            Ok(Some(Ok(WsFrame::Close(frame)))) => break frame,
            Ok(Some(Ok(_))) => continue,
            other => panic!("expected close frame, got {other:?}"),
        }
    };
    assert_eq!(closing.map(|f| f.code), Some(1000));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn server_restart_is_followed_by_a_reconnect() {
    let (listener, address) = listen().await;
    let mut manager = ConnectionManager::new(
        RealtimeConfig::default().with_base_delay(Duration::from_millis(50)),
    )
    .unwrap();
    let mut events = manager.events();

    manager
        .connect(&address, ConnectOptions::default().without_heartbeat())
        .await
        .unwrap();
    let first = accept(&listener).await;
    first.close().await.unwrap();

    let second = accept(&listener).await;
    let names: Vec<&str> = {
        let mut names = Vec::new();
        while names.len() < 4 {
            let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
                .await
                .unwrap()
                .unwrap();
            names.push(event.name());
        }
        names
    };
    assert_eq!(
        names,
        vec!["connected", "disconnected", "reconnecting", "connected"]
    );
    drop(second);
    manager.shutdown().await;
}
