// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Self-healing push-event stream.
//
// One background task per stream owns the socket.  Each loop iteration sends
// at most one queued outbound frame, then waits a short receive timeout for
// an inbound frame.  Array frames are decoded and fanned out to subscribers
// inline; heartbeats feed the watchdog; a receive timeout with a stale
// heartbeat forces the socket closed so the outer loop reconnects.  Only an
// explicit `close()` ends the task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Notify, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{Instrument, Span, debug, info, info_span, trace, warn};

use octodash_core::config::StreamTimings;
use octodash_core::error::{OctodashError, Result};
use octodash_core::types::{StreamState, StreamStatus};

use crate::backoff::ReconnectPolicy;
use crate::frame::{self, Frame};
use crate::subscribers::{EventHandler, SubscriberTable};
use crate::transport::{Connection, Connector, WsConnector};

/// One-way close request shared with the background task.
#[derive(Default)]
struct CloseSignal {
    flag: AtomicBool,
    notify: Notify,
}

impl CloseSignal {
    fn set(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Sleep for `delay`, waking early if close is requested.
    async fn sleep(&self, delay: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = self.notify.notified() => {}
        }
    }
}

/// Producer side of a stream's outbound queue.  Safe to use from any task
/// or thread.
#[derive(Debug, Clone)]
pub struct Outbound {
    tx: mpsc::UnboundedSender<String>,
}

impl Outbound {
    /// Encode and enqueue one payload.
    pub fn send<T: Serialize + ?Sized>(&self, data: &T) -> Result<()> {
        let encoded = frame::encode_outbound(data)?;
        self.tx
            .send(encoded)
            .map_err(|_| OctodashError::Stream("stream is closed".into()))
    }
}

/// Persistent, auto-reconnecting client for a controller's push-event
/// endpoint.
pub struct EventStream {
    url: String,
    connector: Arc<dyn Connector>,
    timings: StreamTimings,
    reconnect: ReconnectPolicy,
    subscribers: Arc<RwLock<Arc<SubscriberTable>>>,
    outbound: Outbound,
    outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    close: Arc<CloseSignal>,
    status: Arc<watch::Sender<StreamStatus>>,
    task: Mutex<Option<JoinHandle<()>>>,
    span: Span,
}

impl EventStream {
    /// Create a stream for the given `ws://` / `wss://` base URL using the
    /// WebSocket transport.
    pub fn new(ws_base: &str, timings: StreamTimings) -> Self {
        Self::with_connector(ws_base, timings, Arc::new(WsConnector))
    }

    /// Create a stream over a caller-supplied transport.
    ///
    /// The session URL's random components are drawn here, once per stream,
    /// and reused on every reconnect.
    pub fn with_connector(
        ws_base: &str,
        timings: StreamTimings,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let url = frame::session_url(ws_base);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (status, _) = watch::channel(StreamStatus::IDLE);
        let span = info_span!("event_stream", endpoint = %ws_base);

        Self {
            url,
            connector,
            reconnect: ReconnectPolicy::from_timings(&timings),
            timings,
            subscribers: Arc::new(RwLock::new(Arc::new(SubscriberTable::new()))),
            outbound: Outbound { tx: outbound_tx },
            outbound_rx: Mutex::new(Some(outbound_rx)),
            close: Arc::new(CloseSignal::default()),
            status: Arc::new(status),
            task: Mutex::new(None),
            span,
        }
    }

    /// The full session URL this stream connects to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Register `handler` for `category`.
    ///
    /// Handlers for the same category run in registration order.  A handler
    /// added while a frame is being dispatched sees the next frame.
    pub fn add_callback(&self, category: impl Into<String>, handler: Arc<dyn EventHandler>) {
        let mut table = self
            .subscribers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::make_mut(&mut *table).add(category, handler);
    }

    /// Queue `data` for transmission.
    ///
    /// The payload is double-encoded onto the wire.  Never blocks on the
    /// network; fails only if the payload cannot be serialized or the stream
    /// has already shut down.
    pub fn send<T: Serialize + ?Sized>(&self, data: &T) -> Result<()> {
        self.outbound.send(data)
    }

    /// A cloneable handle onto the outbound queue.
    pub fn outbound(&self) -> Outbound {
        self.outbound.clone()
    }

    /// Spawn the background connection task.  Returns immediately.
    ///
    /// Must be called from within a Tokio runtime.  A second call while the
    /// task exists is ignored.
    pub fn connect(&self) {
        let Some(outbound) = self
            .outbound_rx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        else {
            warn!(parent: &self.span, "connect called twice, ignoring");
            return;
        };

        let ctx = LoopContext {
            url: self.url.clone(),
            connector: Arc::clone(&self.connector),
            receive_timeout: self.timings.receive_timeout(),
            watchdog_timeout: self.timings.watchdog_timeout(),
            reconnect: self.reconnect.clone(),
            subscribers: Arc::clone(&self.subscribers),
            close: Arc::clone(&self.close),
            status: Arc::clone(&self.status),
        };

        info!(parent: &self.span, url = %self.url, "starting event stream");
        let handle = tokio::spawn(run(ctx, outbound).instrument(self.span.clone()));
        *self
            .task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(handle);
    }

    /// Request shutdown.  Does not wait for the socket to close.
    pub fn close(&self) {
        info!(parent: &self.span, "signalling stream close");
        self.close.set();
    }

    /// Current lifecycle state.
    pub fn state(&self) -> StreamState {
        self.status.borrow().state
    }

    /// Current state with its connection count.
    pub fn status(&self) -> StreamStatus {
        *self.status.borrow()
    }

    /// Watch lifecycle changes.
    pub fn subscribe_status(&self) -> watch::Receiver<StreamStatus> {
        self.status.subscribe()
    }

    /// Wait until the background task has terminated after `close()`.
    ///
    /// Returns immediately if `connect` was never called.
    pub async fn wait_closed(&self) {
        let handle = self
            .task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(parent: &self.span, error = %e, "event stream task failed");
            }
        }
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.close.set();
    }
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("url", &self.url)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Everything the background task needs, detached from the `EventStream`.
struct LoopContext {
    url: String,
    connector: Arc<dyn Connector>,
    receive_timeout: Duration,
    watchdog_timeout: Duration,
    reconnect: ReconnectPolicy,
    subscribers: Arc<RwLock<Arc<SubscriberTable>>>,
    close: Arc<CloseSignal>,
    status: Arc<watch::Sender<StreamStatus>>,
}

impl LoopContext {
    fn set_state(&self, state: StreamState) {
        self.status.send_modify(|status| {
            status.state = state;
            if state == StreamState::Connected {
                status.connection += 1;
            }
        });
    }

    fn subscribers(&self) -> Arc<SubscriberTable> {
        let table = self
            .subscribers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&*table)
    }
}

/// Why the serve loop returned.
#[derive(Debug, PartialEq, Eq)]
enum ServeOutcome {
    CloseRequested,
    /// The peer closed or the socket failed.
    Dropped,
    /// No heartbeat within the watchdog window; socket already closed.
    WatchdogTripped,
}

/// Outer loop: connect, serve, reconnect, until close is requested.
async fn run(ctx: LoopContext, mut outbound: mpsc::UnboundedReceiver<String>) {
    let mut failures: u32 = 0;

    while !ctx.close.is_set() {
        let delay = ctx.reconnect.delay_for(failures);
        if !delay.is_zero() {
            ctx.close.sleep(delay).await;
            if ctx.close.is_set() {
                break;
            }
        }

        ctx.set_state(StreamState::Connecting);
        let connected = tokio::select! {
            result = ctx.connector.connect(&ctx.url) => Some(result),
            _ = ctx.close.notify.notified() => None,
        };
        let mut conn = match connected {
            Some(Ok(conn)) => conn,
            Some(Err(e)) => {
                failures = failures.saturating_add(1);
                warn!(error = %e, failures, "connect failed");
                continue;
            }
            None => break,
        };
        failures = 0;
        ctx.set_state(StreamState::Connected);
        info!("event stream connected");

        match serve(&ctx, conn.as_mut(), &mut outbound).await {
            ServeOutcome::CloseRequested => {
                info!("waiting for socket to close");
                if let Err(e) = conn.close().await {
                    debug!(error = %e, "close on shutdown");
                }
                info!("socket closed");
                break;
            }
            ServeOutcome::Dropped => info!("connection lost, reconnecting"),
            ServeOutcome::WatchdogTripped => {}
        }
    }

    ctx.set_state(StreamState::Closed);
    info!("event stream task finished");
}

/// Inner loop over one live connection.
async fn serve(
    ctx: &LoopContext,
    conn: &mut dyn Connection,
    outbound: &mut mpsc::UnboundedReceiver<String>,
) -> ServeOutcome {
    let mut last_heartbeat: Option<Instant> = None;

    while !ctx.close.is_set() {
        if let Ok(msg) = outbound.try_recv() {
            trace!(frame = %msg, "sending");
            if let Err(e) = conn.send_text(msg).await {
                warn!(error = %e, "send failed, frame dropped");
                return ServeOutcome::Dropped;
            }
        }

        match tokio::time::timeout(ctx.receive_timeout, conn.recv_text()).await {
            Ok(Some(Ok(text))) => match Frame::parse(&text) {
                Ok(Frame::Messages(envelopes)) => {
                    let table = ctx.subscribers();
                    for envelope in &envelopes {
                        table.dispatch(envelope).await;
                    }
                }
                Ok(Frame::Heartbeat) => {
                    debug!("heartbeat");
                    last_heartbeat = Some(Instant::now());
                }
                Ok(Frame::Open) => debug!("session open"),
                Ok(Frame::Close) => debug!("server sent close frame"),
                Ok(Frame::Unknown) => trace!(frame = %text, "ignoring unknown frame"),
                Err(e) => warn!(error = %e, "dropping malformed frame"),
            },
            Ok(Some(Err(e))) => {
                info!(error = %e, "connection error");
                return ServeOutcome::Dropped;
            }
            Ok(None) => {
                info!("connection closed by peer");
                return ServeOutcome::Dropped;
            }
            Err(_) => {
                let stale = last_heartbeat
                    .map(|hb| hb.elapsed() > ctx.watchdog_timeout)
                    .unwrap_or(false);
                if stale {
                    warn!("watchdog triggered, reconnecting");
                    if let Err(e) = conn.close().await {
                        debug!(error = %e, "close after watchdog");
                    }
                    return ServeOutcome::WatchdogTripped;
                }
            }
        }
    }

    ServeOutcome::CloseRequested
}
