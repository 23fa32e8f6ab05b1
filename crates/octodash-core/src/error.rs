// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for OctoDash.

use thiserror::Error;

/// Top-level error type for all OctoDash operations.
#[derive(Debug, Error)]
pub enum OctodashError {
    // -- Control API --
    /// The request never produced an HTTP response (DNS, connect, timeout).
    #[error("request could not be completed: {0}")]
    Transport(String),

    /// The server answered with a non-2xx status.
    #[error("server returned HTTP {0}")]
    Status(u16),

    #[error("passive login failed: {0}")]
    Login(String),

    // -- Event stream --
    #[error("event stream error: {0}")]
    Stream(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    // -- Setup --
    #[error("invalid URL '{0}'")]
    InvalidUrl(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl OctodashError {
    /// HTTP status code carried by an application failure, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status(code) => Some(*code),
            _ => None,
        }
    }

    /// Whether the failure happened before any HTTP response arrived.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, OctodashError>;
