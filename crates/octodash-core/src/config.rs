// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Dashboard configuration.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{OctodashError, Result};
use crate::types::EndpointIdentity;

/// One printer controller the dashboard talks to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterConfig {
    /// Display name, also used as the span label in logs.
    pub name: String,
    /// Base HTTP URL of the controller.
    pub base_url: String,
    /// API key sent with every control request.
    pub api_key: String,
}

impl PrinterConfig {
    pub fn endpoint(&self) -> EndpointIdentity {
        EndpointIdentity::new(&self.base_url, &self.api_key)
    }
}

/// Timing contracts of the event stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamTimings {
    /// How long one receive attempt waits before the liveness check runs.
    pub receive_timeout_ms: u64,
    /// Silence after the last heartbeat that forces a reconnect.
    pub watchdog_timeout_secs: u64,
    /// First delay after a failed connect attempt.
    pub reconnect_base_delay_ms: u64,
    /// Upper bound for the reconnect delay.
    pub reconnect_max_delay_secs: u64,
}

impl Default for StreamTimings {
    fn default() -> Self {
        Self {
            receive_timeout_ms: 200,
            watchdog_timeout_secs: 60,
            reconnect_base_delay_ms: 500,
            reconnect_max_delay_secs: 30,
        }
    }
}

impl StreamTimings {
    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }

    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_secs(self.watchdog_timeout_secs)
    }

    pub fn reconnect_base_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_delay_ms)
    }

    pub fn reconnect_max_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_max_delay_secs)
    }
}

/// Persistent dashboard settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Printers shown on the dashboard, in display order.
    pub printers: Vec<PrinterConfig>,
    /// Event stream timing.
    pub stream: StreamTimings,
    /// Timeout applied to every control API call.
    pub request_timeout_secs: u64,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            printers: Vec::new(),
            stream: StreamTimings::default(),
            request_timeout_secs: 30,
        }
    }
}

impl DashboardConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Read a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the config as pretty JSON, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Look up a printer by name (case-insensitive).
    pub fn printer(&self, name: &str) -> Option<&PrinterConfig> {
        self.printers
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Reject configs the connection layer cannot work with.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for p in &self.printers {
            if p.name.trim().is_empty() {
                return Err(OctodashError::Config("printer name must not be empty".into()));
            }
            if !seen.insert(p.name.to_ascii_lowercase()) {
                return Err(OctodashError::Config(format!(
                    "duplicate printer name '{}'",
                    p.name
                )));
            }
            if !(p.base_url.starts_with("http://") || p.base_url.starts_with("https://")) {
                return Err(OctodashError::Config(format!(
                    "printer '{}': base_url must be http:// or https://",
                    p.name
                )));
            }
            if p.api_key.is_empty() {
                return Err(OctodashError::Config(format!(
                    "printer '{}': api_key must not be empty",
                    p.name
                )));
            }
        }
        if self.stream.receive_timeout_ms == 0 {
            return Err(OctodashError::Config("receive_timeout_ms must be positive".into()));
        }
        if self.stream.watchdog_timeout_secs == 0 {
            return Err(OctodashError::Config(
                "watchdog_timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }
}
