// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// SockJS framing used by the controller's push-event endpoint.
//
// Inbound text frames carry a one-letter type prefix:
//   o          session open
//   h          heartbeat
//   a[...]     array of message envelopes
//   c[code,..] server-side close
//
// Outbound frames are a JSON array holding one JSON-encoded string, so the
// payload is encoded twice.

use rand::Rng;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;
use url::Url;

use octodash_core::error::{OctodashError, Result};

/// One decoded envelope: its top-level keys are event categories.
pub type Envelope = Map<String, Value>;

/// A parsed inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Open,
    Heartbeat,
    Messages(Vec<Envelope>),
    Close,
    /// Anything else.  Logged and ignored by the stream.
    Unknown,
}

impl Frame {
    /// Parse one text frame.
    ///
    /// Array envelopes may arrive either as objects or as JSON-encoded
    /// strings of objects; both are accepted.  Elements that are neither are
    /// dropped.
    pub fn parse(text: &str) -> Result<Self> {
        let Some(kind) = text.chars().next() else {
            return Ok(Self::Unknown);
        };
        match kind {
            'o' => Ok(Self::Open),
            'h' => Ok(Self::Heartbeat),
            'c' => Ok(Self::Close),
            'a' => {
                let items: Vec<Value> = serde_json::from_str(&text[1..]).map_err(|e| {
                    OctodashError::Protocol(format!("undecodable array frame: {e}"))
                })?;
                Ok(Self::Messages(
                    items.into_iter().filter_map(into_envelope).collect(),
                ))
            }
            _ => Ok(Self::Unknown),
        }
    }
}

fn into_envelope(item: Value) -> Option<Envelope> {
    match item {
        Value::Object(map) => Some(map),
        Value::String(s) => match serde_json::from_str::<Value>(&s) {
            Ok(Value::Object(map)) => Some(map),
            _ => {
                debug!("dropping non-object envelope string");
                None
            }
        },
        _ => {
            debug!("dropping non-object envelope");
            None
        }
    }
}

/// Encode an outbound payload: JSON-encode it, wrap the string as the only
/// element of an array, and encode again.
pub fn encode_outbound<T: Serialize + ?Sized>(data: &T) -> Result<String> {
    let inner = serde_json::to_string(data)?;
    Ok(serde_json::to_string(&[inner])?)
}

/// Convert an `http(s)` base URL into the matching `ws(s)` base, without a
/// trailing slash.
pub fn websocket_base(base_url: &str) -> Result<String> {
    let mut url =
        Url::parse(base_url).map_err(|_| OctodashError::InvalidUrl(base_url.to_string()))?;
    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        "ws" | "wss" => return Ok(url.as_str().trim_end_matches('/').to_string()),
        _ => return Err(OctodashError::InvalidUrl(base_url.to_string())),
    };
    url.set_scheme(scheme)
        .map_err(|_| OctodashError::InvalidUrl(base_url.to_string()))?;
    Ok(url.as_str().trim_end_matches('/').to_string())
}

/// Build the SockJS session URL with a random 3-digit server tag and a
/// 16-letter lowercase session tag.
pub fn session_url(ws_base: &str) -> String {
    let mut rng = rand::rng();
    let server: u16 = rng.random_range(100..=999);
    let session: String = (0..16)
        .map(|_| char::from(rng.random_range(b'a'..=b'z')))
        .collect();
    format!(
        "{}/sockjs/{server}/{session}/websocket",
        ws_base.trim_end_matches('/')
    )
}
