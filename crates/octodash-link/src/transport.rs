// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Transport seam for the event stream.
//
// The stream only needs text frames in and out plus an explicit close, so the
// socket is hidden behind two small traits.  `WsConnector` is the production
// implementation over `tokio-tungstenite`.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace};

use octodash_core::error::{OctodashError, Result};

/// Opens connections to a push-event endpoint.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>>;
}

/// One live connection.
#[async_trait]
pub trait Connection: Send {
    /// Transmit one text frame verbatim.
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Wait for the next text frame.
    ///
    /// `None` means the peer closed the connection.  Must be cancel-safe:
    /// the stream wraps it in a timeout.
    async fn recv_text(&mut self) -> Option<Result<String>>;

    async fn close(&mut self) -> Result<()>;
}

/// WebSocket connector backed by `tokio-tungstenite`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>> {
        let (ws, _) = connect_async(url)
            .await
            .map_err(|e| OctodashError::Stream(format!("connect {url}: {e}")))?;
        debug!(url, "websocket connected");
        Ok(Box::new(WsConnection { ws }))
    }
}

struct WsConnection {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Connection for WsConnection {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.ws
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| OctodashError::Stream(format!("send: {e}")))
    }

    async fn recv_text(&mut self) -> Option<Result<String>> {
        loop {
            match self.ws.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "peer sent close");
                    return None;
                }
                // Pings are answered by tungstenite on the next read.
                Ok(other) => trace!(kind = ?other, "ignoring non-text frame"),
                Err(e) => return Some(Err(OctodashError::Stream(format!("receive: {e}")))),
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.ws
            .close(None)
            .await
            .map_err(|e| OctodashError::Stream(format!("close: {e}")))
    }
}
