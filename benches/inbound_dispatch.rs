use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use criterion::{Criterion, black_box, criterion_group, criterion_main};

use odds_ws::core::{Inbound, decode_inbound};
use odds_ws::{Dispatcher, InboundMessage, Topic};

fn odds_frame() -> Bytes {
    Bytes::from_static(
        br#"{"type":"odds_update","data":{"eventId":"nba-2024-bos-nyk","sportsbook":"draftkings","market":"moneyline","selection":"BOS","odds":-145,"previousOdds":-130,"timestamp":1718040000123}}"#,
    )
}

fn line_frame() -> Bytes {
    Bytes::from_static(
        br#"{"type":"line_movement","data":{"eventId":"nfl-kc-buf","sportsbook":"fanduel","market":"spread","previousLine":-2.5,"currentLine":-3.5}}"#,
    )
}

fn bench_decode_1000_frames(c: &mut Criterion) {
    let payload = odds_frame();

    c.bench_function("decode_1000_odds_frames", |b| {
        b.iter(|| {
            for _ in 0..1000 {
                let decoded = decode_inbound(black_box(payload.as_ref()));
                black_box(decoded.is_ok());
            }
        })
    });
}

fn bench_decode_and_dispatch(c: &mut Criterion) {
    let dispatcher = Dispatcher::new();
    let total = Arc::new(AtomicU64::new(0));
    for _ in 0..4 {
        let total = total.clone();
        dispatcher.subscribe_fn(Topic::Odds, move |message| {
            if let InboundMessage::OddsUpdate(update) = message {
                total.fetch_add(update.odds.abs() as u64, Ordering::Relaxed);
            }
        });
    }
    dispatcher.subscribe_fn(Topic::LineMovement, |message| {
        if let InboundMessage::LineMovement(movement) = message {
            black_box(movement.delta());
        }
    });

    let frames = [odds_frame(), line_frame()];
    c.bench_function("decode_dispatch_1000_mixed_frames_5_subscribers", |b| {
        b.iter(|| {
            for i in 0..1000 {
                let frame = &frames[i % frames.len()];
                if let Ok(Inbound::Message(message)) = decode_inbound(black_box(frame.as_ref())) {
                    black_box(dispatcher.dispatch(&message));
                }
            }
        })
    });
    black_box(total.load(Ordering::Relaxed));
}

fn bench_reject_malformed(c: &mut Criterion) {
    let frames = [
        Bytes::from_static(b"not json"),
        Bytes::from_static(br#"{"type":"odds_update","data":{}}"#),
        Bytes::from_static(br#"{"type":"score_update","data":{"eventId":"x"}}"#),
    ];

    c.bench_function("reject_1000_malformed_frames", |b| {
        b.iter(|| {
            for i in 0..1000 {
                let frame = &frames[i % frames.len()];
                black_box(decode_inbound(black_box(frame.as_ref())).is_err());
            }
        })
    });
}

criterion_group!(
    benches,
    bench_decode_1000_frames,
    bench_decode_and_dispatch,
    bench_reject_malformed
);
criterion_main!(benches);
