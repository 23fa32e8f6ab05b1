// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the OctoDash connection layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::OctodashError;

/// Where a remote printer lives and how to authenticate against it.
///
/// Immutable for the lifetime of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointIdentity {
    /// Base HTTP URL of the controller, e.g. `http://octopi.local`.
    pub base_url: String,
    /// Value sent in the `X-Api-Key` header.
    pub api_key: String,
}

impl EndpointIdentity {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

/// Token pair returned by a passive login.
///
/// Held only long enough to build the event-stream auth frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionToken {
    pub name: String,
    pub session: String,
}

impl SessionToken {
    /// Value of the `auth` member sent over the event stream.
    pub fn auth_value(&self) -> String {
        format!("{}:{}", self.name, self.session)
    }
}

/// Controller version information (`GET /api/version`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub api: String,
    pub server: String,
    #[serde(default)]
    pub text: Option<String>,
}

/// Storage location of a file on the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileLocation {
    Local,
    SdCard,
}

impl FileLocation {
    /// Path segment used by the files API.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::SdCard => "sdcard",
        }
    }
}

impl std::fmt::Display for FileLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FileLocation {
    type Err = OctodashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "sdcard" => Ok(Self::SdCard),
            other => Err(OctodashError::Config(format!("unknown file location '{other}'"))),
        }
    }
}

/// Lifecycle of an event stream's background task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamState {
    /// `connect` has not been called yet.
    Idle,
    /// Opening (or re-opening) the underlying socket.
    Connecting,
    /// Socket is up and the serve loop is running.
    Connected,
    /// Close was requested and the task has terminated.
    Closed,
}

/// Stream state plus a count of connections established so far.
///
/// The count tells a drop-and-reconnect apart from no change at all, even
/// when an observer never saw the `Connecting` in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamStatus {
    pub state: StreamState,
    pub connection: u64,
}

impl StreamStatus {
    pub const IDLE: Self = Self {
        state: StreamState::Idle,
        connection: 0,
    };

    /// Whether the connection live at `earlier` has been lost since.
    pub fn lost_since(&self, earlier: &StreamStatus) -> bool {
        earlier.state == StreamState::Connected
            && (self.state != StreamState::Connected || self.connection != earlier.connection)
    }
}

/// Authentication state of a printer session's event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    /// Passive login in flight.
    Authenticating,
    /// Auth frame queued on the stream.
    Authenticated { since: DateTime<Utc> },
    /// Login failed; no auth frame was sent.
    Failed(String),
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }
}

/// Event categories pushed by the controller.
pub mod category {
    pub const CONNECTED: &str = "connected";
    pub const REAUTH_REQUIRED: &str = "reauthRequired";
    pub const CURRENT: &str = "current";
    pub const HISTORY: &str = "history";
    pub const EVENT: &str = "event";
    pub const PLUGIN: &str = "plugin";
    pub const SLICING_PROGRESS: &str = "slicingProgress";
}
