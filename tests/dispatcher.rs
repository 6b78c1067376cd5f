use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use odds_ws::testing::{MockServer, MockSession, MockTransport};
use odds_ws::{
    ConnectOptions, ConnectionManager, InboundMessage, RealtimeConfig, Topic, WsTransport,
};
use tokio::sync::mpsc;

const ODDS: &str = r#"{"type":"odds_update","data":{"eventId":"nba-2024-bos-nyk","sportsbook":"draftkings","market":"moneyline","selection":"BOS","odds":-145,"previousOdds":-130}}"#;
const NEWS: &str = r#"{"type":"breaking_news","payload":{"id":"n-1","headline":"Starting lineup change","relatedEvents":["nba-2024-bos-nyk"]}}"#;

async fn open<T: WsTransport>(
    manager: &mut ConnectionManager<T>,
    server: &mut MockServer,
    address: &str,
) -> MockSession {
    manager
        .connect(address, ConnectOptions::default().without_heartbeat())
        .await
        .unwrap();
    let session = server.accept().await.unwrap();
    for _ in 0..400 {
        if manager.is_connected(address) {
            return session;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("{address} never opened");
}

/// News frames act as a barrier: once one is delivered, everything before it on the same
/// socket has been processed.
fn news_barrier(manager: &ConnectionManager<MockTransport>) -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    manager.subscribe_fn(Topic::News, move |message| {
        if let InboundMessage::BreakingNews(news) = message {
            let _ = tx.send(news.id.clone());
        }
    });
    rx
}

async fn wait_barrier(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("barrier delivered")
        .expect("barrier channel open")
}

#[tokio::test]
async fn panicking_subscriber_is_isolated_and_malformed_frames_are_dropped() {
    let (transport, mut server) = MockTransport::new();
    let mut manager =
        ConnectionManager::with_transport(RealtimeConfig::default(), transport).unwrap();

    let seen = Arc::new(AtomicUsize::new(0));
    manager.subscribe_fn(Topic::Odds, |_| panic!("bad subscriber"));
    let s = seen.clone();
    let healthy = manager.subscribe_fn(Topic::Odds, move |message| {
        if let InboundMessage::OddsUpdate(update) = message {
            assert_eq!(update.event_id, "nba-2024-bos-nyk");
            assert_eq!(update.previous_odds, Some(-130.0));
            s.fetch_add(1, Ordering::SeqCst);
        }
    });
    let injuries = Arc::new(AtomicUsize::new(0));
    let i = injuries.clone();
    manager.subscribe_fn(Topic::Injury, move |_| {
        i.fetch_add(1, Ordering::SeqCst);
    });
    let mut barrier = news_barrier(&manager);

    let address = "wss://feed.example.com/live";
    let session = open(&mut manager, &mut server, address).await;

    assert!(session.send_text(ODDS));
    assert!(session.send_text("not json"));
    assert!(session.send_text(r#"{"type":"odds_update","data":{}}"#));
    assert!(session.send_text(r#"{"type":"score_update","data":{"eventId":"x"}}"#));
    assert!(session.send_text(r#"{"type":"pong"}"#));
    assert!(session.send_text(NEWS));
    assert_eq!(wait_barrier(&mut barrier).await, "n-1");

    assert_eq!(seen.load(Ordering::SeqCst), 1);
    assert_eq!(injuries.load(Ordering::SeqCst), 0);
    let stats = manager.stats(address).await.unwrap();
    assert_eq!(stats.dropped_frames, 3);
    assert_eq!(stats.messages_in, 2);
    // Subscriber panics never touch the connection.
    assert!(manager.is_connected(address));

    assert!(healthy.unsubscribe());
    assert!(session.send_text(ODDS));
    assert!(session.send_text(NEWS));
    wait_barrier(&mut barrier).await;
    assert_eq!(seen.load(Ordering::SeqCst), 1);
    manager.shutdown().await;
}

#[tokio::test]
async fn every_connection_feeds_the_same_subscribers() {
    let (transport, mut server) = MockTransport::new();
    let mut manager =
        ConnectionManager::with_transport(RealtimeConfig::default(), transport).unwrap();

    let odds = Arc::new(AtomicUsize::new(0));
    let o = odds.clone();
    manager.subscribe_fn(Topic::Odds, move |_| {
        o.fetch_add(1, Ordering::SeqCst);
    });
    let mut barrier = news_barrier(&manager);

    let live = open(&mut manager, &mut server, "wss://feed.example.com/live").await;
    let props = open(&mut manager, &mut server, "wss://props.example.com/ws").await;
    assert_eq!(
        manager.addresses(),
        vec![
            "wss://feed.example.com/live".to_string(),
            "wss://props.example.com/ws".to_string(),
        ]
    );

    for session in [&live, &props] {
        assert!(session.send_text(ODDS));
        assert!(session.send_text(NEWS));
        wait_barrier(&mut barrier).await;
    }
    assert_eq!(odds.load(Ordering::SeqCst), 2);

    // Dropping one connection leaves the other delivering.
    manager.disconnect("wss://feed.example.com/live").await;
    assert!(props.send_text(ODDS));
    assert!(props.send_text(NEWS));
    wait_barrier(&mut barrier).await;
    assert_eq!(odds.load(Ordering::SeqCst), 3);
    manager.shutdown().await;
}
