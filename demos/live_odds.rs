use std::time::Duration;

use sonic_rs::json;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use odds_ws::client;
use odds_ws::{
    ConnectOptions, ConnectionManager, InboundMessage, OutboundMessage, RealtimeConfig, Topic,
};

fn usage() -> &'static str {
    "live_odds\n\
  Connects to an odds feed, subscribes to odds and line movement, and logs every update.\n\
  Without --url a local feed is started that replays a few scripted updates.\n\
\n\
USAGE:\n\
  cargo run --example live_odds -- [--url <ws-url>] [--secs <N>]\n\
\n\
DEFAULTS:\n\
  --secs  5\n\
"
}

struct Args {
    url: Option<String>,
    secs: u64,
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args { url: None, secs: 5 };
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--url" => args.url = Some(it.next().ok_or("--url needs a value")?),
            "--secs" => {
                let raw = it.next().ok_or("--secs needs a value")?;
                args.secs = raw.parse().map_err(|_| format!("bad --secs {raw}"))?;
            }
            "-h" | "--help" => return Err(usage().to_string()),
            other => return Err(format!("unknown argument {other}\n\n{}", usage())),
        }
    }
    Ok(args)
}

/// Serves one client: a handful of scripted updates, answering pings as they come.
async fn local_feed() -> std::io::Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let url = format!("ws://{}/live", listener.local_addr()?);

    tokio::spawn(async move {
        let Ok((stream, peer)) = listener.accept().await else {
            return;
        };
        let mut socket = match client::accept(stream).await {
            Ok(socket) => socket,
            Err(err) => {
                warn!(%peer, error = %err, "feed handshake failed");
                return;
            }
        };
        info!(%peer, "feed client connected");

        let script = [
            json!({"type": "odds_update", "data": {"eventId": "nba-bos-nyk", "sportsbook": "draftkings", "market": "moneyline", "selection": "BOS", "odds": -145, "previousOdds": -130}}),
            json!({"type": "line_movement", "data": {"eventId": "nfl-kc-buf", "sportsbook": "fanduel", "market": "spread", "previousLine": -2.5, "currentLine": -3.5}}),
            json!({"type": "odds_update", "data": {"eventId": "nba-bos-nyk", "sportsbook": "caesars", "market": "moneyline", "odds": -150}}),
            json!({"type": "breaking_news", "data": {"id": "n-7", "headline": "Guard ruled out"}}),
        ];
        for update in &script {
            tokio::time::sleep(Duration::from_millis(300)).await;
            if socket.send_json(update).await.is_err() {
                return;
            }
        }

        while let Some(Ok(frame)) = socket.next().await {
            let Some(payload) = frame.payload() else {
                continue;
            };
            info!(bytes = payload.len(), "feed received {}", String::from_utf8_lossy(payload));
            if payload.starts_with(br#"{"type":"ping""#)
                && socket.send_json(&json!({"type": "pong"})).await.is_err()
            {
                return;
            }
        }
    });

    Ok(url)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("{msg}");
            std::process::exit(2);
        }
    };
    let url = match args.url {
        Some(url) => url,
        None => local_feed().await?,
    };

    let config = RealtimeConfig::default().with_heartbeat_interval(Duration::from_secs(1));
    let mut manager = ConnectionManager::new(config)?;

    let odds = manager.subscribe_fn(Topic::Odds, |message| {
        if let InboundMessage::OddsUpdate(update) = message {
            info!(
                event = %update.event_id,
                book = %update.sportsbook,
                odds = update.odds,
                previous = ?update.previous_odds,
                "odds"
            );
        }
    });
    let _lines = manager.subscribe_fn(Topic::LineMovement, |message| {
        if let InboundMessage::LineMovement(movement) = message {
            info!(
                event = %movement.event_id,
                market = %movement.market,
                delta = movement.delta(),
                "line moved"
            );
        }
    });

    let mut events = manager.events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            info!(event = event.name(), address = event.address(), "connection event");
        }
    });

    manager.connect(&url, ConnectOptions::labelled("live-odds")).await?;
    manager
        .send(
            &url,
            &OutboundMessage::new("subscribe", json!({"topics": ["odds", "line_movement"]})),
        )
        .await?;

    tokio::time::sleep(Duration::from_secs(args.secs)).await;

    let stats = manager.stats(&url).await?;
    info!(
        state = %stats.state,
        messages_in = stats.messages_in,
        messages_out = stats.messages_out,
        dropped = stats.dropped_frames,
        p50_rtt_us = stats.p50_rtt_us,
        "final stats"
    );
    odds.unsubscribe();
    manager.shutdown().await;
    Ok(())
}
