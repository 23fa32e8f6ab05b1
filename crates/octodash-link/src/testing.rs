// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory transport for exercising the event stream without sockets.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use octodash_core::error::{OctodashError, Result};

use crate::transport::{Connection, Connector};

/// What one fake connection saw on the wire.
#[derive(Default)]
struct Wire {
    sent: Mutex<Vec<String>>,
    closes: AtomicUsize,
}

/// Test-side handle of a scripted connection.
///
/// Dropping it looks like the server hanging up.
pub(crate) struct Peer {
    inbound: mpsc::UnboundedSender<String>,
    wire: Arc<Wire>,
}

impl Peer {
    /// Deliver a text frame to the client.
    pub(crate) fn push(&self, frame: &str) {
        let _ = self.inbound.send(frame.to_string());
    }

    /// Frames the client transmitted, in order.
    pub(crate) fn sent(&self) -> Vec<String> {
        self.wire.sent.lock().unwrap().clone()
    }

    pub(crate) fn closes(&self) -> usize {
        self.wire.closes.load(Ordering::SeqCst)
    }
}

/// Hands out scripted connections in order; refuses once they run out.
#[derive(Default)]
pub(crate) struct FakeConnector {
    pending: Mutex<VecDeque<FakeConnection>>,
    attempts: AtomicUsize,
}

impl FakeConnector {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue one more connection and return its peer handle.
    pub(crate) fn script(&self) -> Peer {
        let (tx, rx) = mpsc::unbounded_channel();
        let wire = Arc::new(Wire::default());
        self.pending.lock().unwrap().push_back(FakeConnection {
            inbound: rx,
            wire: Arc::clone(&wire),
            closed: AtomicBool::new(false),
        });
        Peer { inbound: tx, wire }
    }

    /// Connect attempts made so far, successful or not.
    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, _url: &str) -> Result<Box<dyn Connection>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let next = self.pending.lock().unwrap().pop_front();
        match next {
            Some(conn) => Ok(Box::new(conn)),
            None => Err(OctodashError::Stream("connection refused".into())),
        }
    }
}

struct FakeConnection {
    inbound: mpsc::UnboundedReceiver<String>,
    wire: Arc<Wire>,
    closed: AtomicBool,
}

#[async_trait]
impl Connection for FakeConnection {
    async fn send_text(&mut self, text: String) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(OctodashError::Stream("closed".into()));
        }
        self.wire.sent.lock().unwrap().push(text);
        Ok(())
    }

    async fn recv_text(&mut self) -> Option<Result<String>> {
        if self.closed.load(Ordering::SeqCst) {
            return None;
        }
        self.inbound.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.wire.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Poll `cond` every 10ms until it holds; panic after two minutes.
pub(crate) async fn eventually(cond: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(120);
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
