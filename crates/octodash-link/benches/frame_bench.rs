// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for push-event frame parsing, outbound encoding, and
// status payload decoding in the octodash-link crate.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use serde_json::json;

use octodash_core::events::{JobControls, StatusUpdate};
use octodash_link::frame::{Frame, encode_outbound};

// ---------------------------------------------------------------------------
// Helper: a realistic `current` message as the server pushes it every second
// ---------------------------------------------------------------------------

fn current_payload() -> serde_json::Value {
    json!({
        "state": {
            "text": "Printing",
            "flags": {
                "operational": true, "printing": true, "paused": false,
                "ready": false, "pausing": false, "cancelling": false,
                "closedOrError": false
            }
        },
        "job": {
            "file": {"name": "benchy.gcode", "display": "benchy.gcode",
                     "path": "models/benchy.gcode", "origin": "local"}
        },
        "progress": {"completion": 42.5, "printTime": 1800, "printTimeLeft": 2400},
        "temps": [{"tool0": {"actual": 214.8, "target": 215.0},
                   "bed": {"actual": 59.9, "target": 60.0}, "time": 1700000000}],
        "logs": ["Recv: ok T:214.8 /215.0 B:59.9 /60.0"],
        "messages": []
    })
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

/// Benchmark classifying and decoding inbound frames.
fn bench_parse_frame(c: &mut Criterion) {
    c.bench_function("frame_parse (heartbeat)", |b| {
        b.iter(|| {
            let frame = Frame::parse(black_box("h"));
            assert!(matches!(frame, Ok(Frame::Heartbeat)));
        });
    });

    // The server double-encodes every envelope, so the array holds strings.
    let envelope = json!({"current": current_payload()}).to_string();
    let text = format!("a{}", serde_json::to_string(&[envelope]).unwrap_or_default());

    c.bench_function("frame_parse (current message)", |b| {
        b.iter(|| {
            let frame = Frame::parse(black_box(&text));
            assert!(matches!(frame, Ok(Frame::Messages(_))));
        });
    });
}

/// Benchmark encoding the auth frame sent after every connect.
fn bench_encode_outbound(c: &mut Criterion) {
    let auth = json!({"auth": "_api:0123456789abcdef"});

    c.bench_function("encode_outbound (auth)", |b| {
        b.iter(|| {
            let encoded = encode_outbound(black_box(&auth));
            black_box(encoded)
        });
    });
}

/// Benchmark turning a `current` payload into job controls.
fn bench_status_decode(c: &mut Criterion) {
    let payload = current_payload();

    c.bench_function("status_update + job_controls", |b| {
        b.iter(|| {
            let status = StatusUpdate::from_payload(black_box(&payload));
            black_box(status.as_ref().map(JobControls::from_status))
        });
    });
}

criterion_group!(
    benches,
    bench_parse_frame,
    bench_encode_outbound,
    bench_status_decode,
);
criterion_main!(benches);
