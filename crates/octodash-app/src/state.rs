// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-printer view state derived from push events.
//
// The server repeats the full status roughly every second, so the view keeps
// the last rendered values and reports only what actually changed.

use octodash_core::events::{JobControls, PsuState, StatusUpdate};
use octodash_core::types::{StreamState, StreamStatus};

/// What a status update changed in the view.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusChange {
    /// New status text, when it differs from the last one shown.
    pub text: Option<String>,
    /// New control availability, when it differs.
    pub controls: Option<JobControls>,
}

impl StatusChange {
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.controls.is_none()
    }
}

/// Last-rendered state of one printer.
#[derive(Debug, Clone)]
pub struct PrinterView {
    pub name: String,
    pub status_text: Option<String>,
    pub completion: Option<f64>,
    pub controls: JobControls,
    pub psu_on: Option<bool>,
    pub stream: StreamState,
    /// Connection count last seen on the stream.
    pub connection: u64,
}

impl PrinterView {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status_text: None,
            completion: None,
            controls: JobControls::default(),
            psu_on: None,
            stream: StreamState::Idle,
            connection: 0,
        }
    }

    /// Fold one `current` / `history` update into the view.
    pub fn apply_status(&mut self, status: &StatusUpdate) -> StatusChange {
        let mut change = StatusChange::default();

        let text = status.state.text.trim();
        if !text.is_empty() && self.status_text.as_deref() != Some(text) {
            self.status_text = Some(text.to_string());
            change.text = Some(text.to_string());
        }

        let controls = JobControls::from_status(status);
        if controls != self.controls {
            self.controls = controls;
            change.controls = Some(controls);
        }

        self.completion = status.progress.as_ref().and_then(|p| p.completion);
        change
    }

    /// Record a PSU report; true when the power state changed.
    pub fn apply_psu(&mut self, psu: PsuState) -> bool {
        let changed = self.psu_on != Some(psu.is_on);
        self.psu_on = Some(psu.is_on);
        changed
    }

    /// Record a stream status change; true when the connection the view
    /// was showing has been lost, including a drop-and-reconnect observed
    /// only as a new connection count.
    ///
    /// A lost or absent connection makes the last status stale, so the
    /// cached text is dropped and the next update is reported again.
    pub fn apply_stream(&mut self, status: StreamStatus) -> bool {
        let previous = StreamStatus {
            state: self.stream,
            connection: self.connection,
        };
        let lost = status.lost_since(&previous);
        self.stream = status.state;
        self.connection = status.connection;
        if lost || status.state != StreamState::Connected {
            self.status_text = None;
            self.completion = None;
        }
        lost
    }

    /// Text to show for the printer right now.
    pub fn display_text(&self) -> &str {
        match (self.stream, self.status_text.as_deref()) {
            (StreamState::Connected, Some(text)) => text,
            (StreamState::Connected, None) => "Waiting for status",
            _ => "Status unknown",
        }
    }
}
