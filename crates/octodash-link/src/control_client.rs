// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// HTTP client for the controller's control API.
//
// Every call carries the `X-Api-Key` header and a fixed timeout.  Results are
// normalized the same way for every endpoint:
//   - 2xx with a JSON body      -> Ok(Some(body))
//   - 2xx with no / other body  -> Ok(None)
//   - non-2xx                   -> Err(Status(code))
//   - no response at all        -> Err(Transport(..))
// No retries happen here; callers decide what a failure means.

use std::time::Duration;

use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::{Value, json};
use tracing::{Span, debug, error, info, info_span, instrument, warn};
use url::Url;

use octodash_core::error::{OctodashError, Result};
use octodash_core::types::{EndpointIdentity, FileLocation, SessionToken, VersionInfo};

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "X-Api-Key";

/// Plugin id of the PSU Control plugin.
pub const PSU_CONTROL_PLUGIN: &str = "psucontrol";

/// Request/response client for one controller.
#[derive(Debug, Clone)]
pub struct ControlClient {
    base_url: String,
    http: reqwest::Client,
    span: Span,
}

impl ControlClient {
    /// Build a client for `endpoint` with the given per-request timeout.
    pub fn new(endpoint: &EndpointIdentity, timeout: Duration) -> Result<Self> {
        let mut key = HeaderValue::from_str(&endpoint.api_key).map_err(|_| {
            OctodashError::Config("API key contains characters not allowed in a header".into())
        })?;
        key.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, key);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| OctodashError::Transport(format!("HTTP client setup: {e}")))?;

        let base_url = endpoint.base_url.trim_end_matches('/').to_string();
        let span = info_span!("control_client", base_url = %base_url);
        debug!(parent: &span, timeout_ms = timeout.as_millis() as u64, "control client ready");

        Ok(Self {
            base_url,
            http,
            span,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Join the base URL and `path`, inserting a `/` when `path` lacks one.
    pub fn full_url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }

    /// Issue one request and normalize the outcome.
    #[instrument(parent = &self.span, skip_all, fields(method = %method, path = %path))]
    pub async fn request(
        &self,
        path: &str,
        method: Method,
        body: Option<&Value>,
    ) -> Result<Option<Value>> {
        let mut req = self.http.request(method, self.full_url(path));
        if let Some(body) = body {
            req = req.json(body);
        }

        let response = match req.send().await {
            Ok(r) => r,
            Err(e) => {
                error!(error = %e, "couldn't make request");
                return Err(OctodashError::Transport(e.to_string()));
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "request failed");
            return Err(OctodashError::Status(status.as_u16()));
        }

        info!(status = status.as_u16(), "request ok");
        let bytes = response.bytes().await.map_err(|e| {
            error!(error = %e, "reading response body failed");
            OctodashError::Transport(e.to_string())
        })?;
        Ok(serde_json::from_slice(&bytes).ok())
    }

    /// Run a plugin's simple API command.  `data` must include `command`.
    pub async fn plugin_command(&self, plugin: &str, data: &Value) -> Result<Option<Value>> {
        if data.get("command").is_none() {
            return Err(OctodashError::Protocol(
                "plugin command body must include 'command'".into(),
            ));
        }
        self.request(&format!("/api/plugin/{plugin}"), Method::POST, Some(data))
            .await
    }

    pub async fn psu_on(&self) -> Result<Option<Value>> {
        self.plugin_command(PSU_CONTROL_PLUGIN, &json!({"command": "turnPSUOn"}))
            .await
    }

    pub async fn psu_off(&self) -> Result<Option<Value>> {
        self.plugin_command(PSU_CONTROL_PLUGIN, &json!({"command": "turnPSUOff"}))
            .await
    }

    /// Controller version information.
    pub async fn version(&self) -> Result<VersionInfo> {
        let body = self
            .request("/api/version", Method::GET, None)
            .await?
            .ok_or_else(|| OctodashError::Protocol("empty version response".into()))?;
        Ok(serde_json::from_value(body)?)
    }

    /// Passive login with the API key; yields the token pair used to
    /// authenticate the event stream.
    pub async fn login(&self) -> Result<SessionToken> {
        let body = self
            .request("/api/login", Method::POST, Some(&json!({"passive": true})))
            .await?
            .ok_or_else(|| OctodashError::Login("empty response".into()))?;
        serde_json::from_value(body)
            .map_err(|e| OctodashError::Login(format!("missing name/session: {e}")))
    }

    /// File or folder metadata.  `None` or an empty path means the root.
    pub async fn file(&self, location: FileLocation, path: Option<&str>) -> Result<Option<Value>> {
        let url = files_path(location, path.unwrap_or_default())?;
        self.request(&url, Method::GET, None).await
    }

    /// Select a file for printing.
    pub async fn select_file(&self, location: FileLocation, path: &str) -> Result<Option<Value>> {
        self.request(
            &files_path(location, path)?,
            Method::POST,
            Some(&json!({"command": "select"})),
        )
        .await
    }

    pub async fn delete_file(&self, location: FileLocation, path: &str) -> Result<Option<Value>> {
        self.request(&files_path(location, path)?, Method::DELETE, None)
            .await
    }

    /// Start the selected file.
    pub async fn start_job(&self) -> Result<Option<Value>> {
        self.job_command(json!({"command": "start"})).await
    }

    pub async fn pause_job(&self) -> Result<Option<Value>> {
        self.job_command(json!({"command": "pause", "action": "pause"}))
            .await
    }

    pub async fn resume_job(&self) -> Result<Option<Value>> {
        self.job_command(json!({"command": "pause", "action": "resume"}))
            .await
    }

    pub async fn cancel_job(&self) -> Result<Option<Value>> {
        self.job_command(json!({"command": "cancel"})).await
    }

    async fn job_command(&self, body: Value) -> Result<Option<Value>> {
        self.request("/api/job", Method::POST, Some(&body)).await
    }
}

/// `/api/files/<location>/<path>` with every segment of `path`
/// percent-encoded, so `#`, `?` and spaces stay part of the file name.
fn files_path(location: FileLocation, path: &str) -> Result<String> {
    let mut url = Url::parse("http://controller.invalid/api/files")
        .map_err(|e| OctodashError::InvalidUrl(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|()| OctodashError::InvalidUrl(format!("files path '{path}'")))?
        .push(location.as_str())
        .extend(path.split('/').filter(|s| !s.is_empty()));
    Ok(url.path().to_string())
}
