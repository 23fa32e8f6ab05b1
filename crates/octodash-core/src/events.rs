// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Typed views over push-event payloads.
//
// The event stream hands subscribers raw JSON; these types let collaborators
// decode the categories they care about. Every field the controller may omit
// is defaulted so a partial `current` update still decodes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Printer state flags carried in `state.flags`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StateFlags {
    pub operational: bool,
    pub ready: bool,
    pub printing: bool,
    pub paused: bool,
    pub pausing: bool,
    pub cancelling: bool,
    pub closed_or_error: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrinterState {
    pub text: String,
    pub flags: StateFlags,
}

/// The file attached to the current job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobFile {
    pub name: Option<String>,
    pub display: Option<String>,
    pub path: Option<String>,
    pub origin: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobInfo {
    pub file: JobFile,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct JobProgress {
    pub completion: Option<f64>,
    pub print_time: Option<u64>,
    pub print_time_left: Option<u64>,
}

/// Decoded `current` / `history` payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusUpdate {
    pub state: PrinterState,
    pub job: Option<JobInfo>,
    pub progress: Option<JobProgress>,
}

impl StatusUpdate {
    pub fn from_payload(payload: &Value) -> Result<Self> {
        Ok(Self::deserialize(payload)?)
    }

    /// Path of the selected job file, when one is loaded.
    pub fn job_path(&self) -> Option<&str> {
        self.job.as_ref().and_then(|j| j.file.path.as_deref())
    }

    /// Origin (`local` / `sdcard`) of the selected job file.
    pub fn job_origin(&self) -> Option<&str> {
        self.job.as_ref().and_then(|j| j.file.origin.as_deref())
    }
}

/// Decoded `plugin` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginMessage {
    pub plugin: String,
    #[serde(default)]
    pub data: Value,
}

impl PluginMessage {
    pub fn from_payload(payload: &Value) -> Result<Self> {
        Ok(Self::deserialize(payload)?)
    }
}

/// PSU state reported by the `psucontrol` plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PsuState {
    pub is_on: bool,
}

impl PsuState {
    pub const PLUGIN: &'static str = "psucontrol";

    /// Extract the PSU state from a plugin message, if it is one.
    pub fn from_plugin(msg: &PluginMessage) -> Option<Self> {
        if msg.plugin != Self::PLUGIN {
            return None;
        }
        msg.data
            .get("isPSUOn")
            .and_then(Value::as_bool)
            .map(|is_on| Self { is_on })
    }
}

/// Which job controls make sense for a given printer state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobControls {
    /// A selected file can be started.
    pub can_print: bool,
    /// The pause button is live.
    pub can_pause: bool,
    /// The pause button acts as resume.
    pub pause_resumes: bool,
    pub can_cancel: bool,
}

impl JobControls {
    pub fn from_status(status: &StatusUpdate) -> Self {
        let f = &status.state.flags;
        let can_print = f.operational
            && f.ready
            && !f.paused
            && !f.printing
            && status.job_path().is_some();
        let active = f.operational && (f.printing || f.paused) && !f.pausing && !f.cancelling;
        Self {
            can_print,
            can_pause: active,
            pause_resumes: active && f.paused,
            can_cancel: active,
        }
    }
}
