// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Central service layer: owns one printer session per configured printer,
// wires their push events into view state, and runs one-shot control
// commands.
//
// Status lines are rendered to the log.  Every line carries the printer's
// span, so nothing here has to repeat the printer name.

use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio::sync::watch;
use tracing::{Instrument, debug, error, info, warn};

use octodash_core::error::{OctodashError, Result};
use octodash_core::events::{PluginMessage, PsuState, StatusUpdate};
use octodash_core::types::{AuthState, FileLocation, StreamState, StreamStatus, category};
use octodash_core::DashboardConfig;
use octodash_link::PrinterSession;

use crate::state::PrinterView;

/// Job actions exposed on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobAction {
    Start,
    Pause,
    Resume,
    Cancel,
}

/// A single request against one printer's control API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Version,
    Psu { on: bool },
    Job(JobAction),
    Files {
        location: FileLocation,
        path: Option<String>,
    },
    Select {
        location: FileLocation,
        path: String,
    },
    Delete {
        location: FileLocation,
        path: String,
    },
}

struct Printer {
    session: PrinterSession,
    view: Arc<Mutex<PrinterView>>,
}

/// Every configured printer, ready to watch or command.
pub struct Dashboard {
    printers: Vec<Printer>,
}

impl Dashboard {
    /// Load the config file and create a session per printer.
    pub fn init(config_path: &Path) -> Result<Self> {
        info!(path = %config_path.display(), "loading dashboard config");
        let config = DashboardConfig::load(config_path)?;
        Self::from_config(&config)
    }

    pub fn from_config(config: &DashboardConfig) -> Result<Self> {
        if config.printers.is_empty() {
            return Err(OctodashError::Config("no printers configured".into()));
        }
        let printers = config
            .printers
            .iter()
            .map(|p| {
                Ok(Printer {
                    session: PrinterSession::from_config(p, config)?,
                    view: Arc::new(Mutex::new(PrinterView::new(&p.name))),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        info!(count = printers.len(), "dashboard services initialised");
        Ok(Self { printers })
    }

    /// Look up a session by name (case-insensitive).  Without a name the
    /// single configured printer is used.
    pub fn session(&self, name: Option<&str>) -> Result<&PrinterSession> {
        match name {
            Some(name) => self
                .printers
                .iter()
                .map(|p| &p.session)
                .find(|s| s.name().eq_ignore_ascii_case(name))
                .ok_or_else(|| OctodashError::Config(format!("unknown printer '{name}'"))),
            None => match self.printers.as_slice() {
                [only] => Ok(&only.session),
                _ => Err(OctodashError::Config(
                    "several printers configured, pick one with --printer".into(),
                )),
            },
        }
    }

    /// Snapshot of one printer's view.
    pub fn view(&self, name: &str) -> Option<PrinterView> {
        self.printers
            .iter()
            .find(|p| p.session.name().eq_ignore_ascii_case(name))
            .map(|p| lock(&p.view).clone())
    }

    // -- Watching -------------------------------------------------------------

    /// Connect every printer and log status changes until `shutdown`
    /// resolves, then close every stream.
    pub async fn watch(&self, shutdown: impl Future<Output = ()>) {
        let mut watchers = Vec::with_capacity(self.printers.len());
        for printer in &self.printers {
            printer.subscribe();
            let session = &printer.session;
            watchers.push(tokio::spawn(
                watch_connection(
                    Arc::clone(&printer.view),
                    session.stream().subscribe_status(),
                    session.subscribe_auth(),
                )
                .instrument(session.span().clone()),
            ));
            session.stream().connect();
        }

        shutdown.await;
        info!("shutting down, closing event streams");

        for printer in &self.printers {
            printer.session.stream().close();
        }
        for printer in &self.printers {
            printer.session.stream().wait_closed().await;
        }
        for watcher in watchers {
            watcher.abort();
        }
        info!("all event streams closed");
    }

    // -- One-shot commands ----------------------------------------------------

    /// Run one control command against the named printer.
    pub async fn run(&self, printer: Option<&str>, command: ControlCommand) -> Result<Option<Value>> {
        let session = self.session(printer)?;
        let client = session.client();
        session.span().in_scope(|| debug!(?command, "running command"));

        match command {
            ControlCommand::Version => Ok(Some(serde_json::to_value(client.version().await?)?)),
            ControlCommand::Psu { on: true } => client.psu_on().await,
            ControlCommand::Psu { on: false } => client.psu_off().await,
            ControlCommand::Job(JobAction::Start) => client.start_job().await,
            ControlCommand::Job(JobAction::Pause) => client.pause_job().await,
            ControlCommand::Job(JobAction::Resume) => client.resume_job().await,
            ControlCommand::Job(JobAction::Cancel) => client.cancel_job().await,
            ControlCommand::Files { location, path } => client.file(location, path.as_deref()).await,
            ControlCommand::Select { location, path } => client.select_file(location, &path).await,
            ControlCommand::Delete { location, path } => client.delete_file(location, &path).await,
        }
    }
}

impl Printer {
    /// Register the view's push-event handlers.
    fn subscribe(&self) {
        let stream = self.session.stream();

        for cat in [category::CURRENT, category::HISTORY] {
            let view = Arc::clone(&self.view);
            stream.add_callback(
                cat,
                Arc::new(move |payload: &Value| {
                    let status = match StatusUpdate::from_payload(payload) {
                        Ok(status) => status,
                        Err(e) => {
                            warn!(error = %e, "undecodable status update");
                            return;
                        }
                    };
                    let change = lock(&view).apply_status(&status);
                    if let Some(text) = change.text {
                        info!(status = %text, "printer status");
                    }
                    if let Some(c) = change.controls {
                        info!(
                            print = c.can_print,
                            pause = c.can_pause && !c.pause_resumes,
                            resume = c.pause_resumes,
                            cancel = c.can_cancel,
                            "job controls"
                        );
                    }
                }),
            );
        }

        let view = Arc::clone(&self.view);
        stream.add_callback(
            category::PLUGIN,
            Arc::new(move |payload: &Value| {
                let Ok(msg) = PluginMessage::from_payload(payload) else {
                    debug!("ignoring malformed plugin message");
                    return;
                };
                if let Some(psu) = PsuState::from_plugin(&msg) {
                    if lock(&view).apply_psu(psu) {
                        info!(on = psu.is_on, "PSU state");
                    }
                }
            }),
        );
    }
}

/// Log connection and auth changes for one printer.  Ends once the stream
/// reports `Closed`.
async fn watch_connection(
    view: Arc<Mutex<PrinterView>>,
    mut stream: watch::Receiver<StreamStatus>,
    mut auth: watch::Receiver<AuthState>,
) {
    loop {
        tokio::select! {
            changed = stream.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = *stream.borrow_and_update();
                if lock(&view).apply_stream(status) {
                    warn!("event stream lost, printer status unknown");
                }
                match status.state {
                    StreamState::Connected => {
                        info!(connection = status.connection, "event stream connected");
                    }
                    StreamState::Closed => {
                        info!("event stream closed");
                        break;
                    }
                    _ => {}
                }
            }
            changed = auth.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = auth.borrow_and_update().clone();
                match state {
                    AuthState::Authenticated { since } => info!(%since, "event stream authenticated"),
                    AuthState::Failed(reason) => error!(%reason, "event stream not authenticated"),
                    other => debug!(state = ?other, "auth state"),
                }
            }
        }
    }
}

fn lock(view: &Mutex<PrinterView>) -> MutexGuard<'_, PrinterView> {
    view.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use octodash_core::config::PrinterConfig;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(printers: &[(&str, &str)]) -> DashboardConfig {
        DashboardConfig {
            printers: printers
                .iter()
                .map(|(name, url)| PrinterConfig {
                    name: (*name).into(),
                    base_url: (*url).into(),
                    api_key: "KEY".into(),
                })
                .collect(),
            ..DashboardConfig::default()
        }
    }

    #[test]
    fn empty_config_is_rejected() {
        let err = Dashboard::from_config(&DashboardConfig::default()).err();
        assert!(matches!(err, Some(OctodashError::Config(_))));
    }

    #[tokio::test]
    async fn session_lookup() {
        let single = Dashboard::from_config(&config(&[("Voron", "http://voron.local")])).unwrap();
        assert_eq!(single.session(None).unwrap().name(), "Voron");
        assert_eq!(single.session(Some("voron")).unwrap().name(), "Voron");
        assert!(single.session(Some("prusa")).is_err());

        let pair = Dashboard::from_config(&config(&[
            ("Voron", "http://voron.local"),
            ("Prusa", "http://prusa.local"),
        ]))
        .unwrap();
        assert!(pair.session(None).is_err());
        assert_eq!(pair.session(Some("PRUSA")).unwrap().name(), "Prusa");
        assert_eq!(pair.view("prusa").unwrap().display_text(), "Status unknown");
    }

    #[tokio::test]
    async fn init_reads_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        config(&[("Voron", "http://voron.local")]).save(&path).unwrap();

        let dashboard = Dashboard::init(&path).unwrap();
        assert_eq!(dashboard.session(None).unwrap().name(), "Voron");
    }

    #[tokio::test]
    async fn version_command() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/version"))
            .and(header("X-Api-Key", "KEY"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"api": "0.1", "server": "1.10.2", "text": "OctoPrint 1.10.2"})),
            )
            .mount(&server)
            .await;
        let dashboard = Dashboard::from_config(&config(&[("Voron", server.uri().as_str())])).unwrap();

        let out = dashboard.run(None, ControlCommand::Version).await.unwrap();

        assert_eq!(out.unwrap()["server"], "1.10.2");
    }

    #[tokio::test]
    async fn psu_and_job_commands() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/plugin/psucontrol"))
            .and(body_json(json!({"command": "turnPSUOff"})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/job"))
            .and(body_json(json!({"command": "pause", "action": "resume"})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        let dashboard = Dashboard::from_config(&config(&[("Voron", server.uri().as_str())])).unwrap();

        let psu = dashboard
            .run(Some("voron"), ControlCommand::Psu { on: false })
            .await
            .unwrap();
        let job = dashboard
            .run(None, ControlCommand::Job(JobAction::Resume))
            .await
            .unwrap();

        assert!(psu.is_none());
        assert!(job.is_none());
    }

    #[tokio::test]
    async fn failing_command_reports_status() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/files/sdcard/benchy.gcode"))
            .respond_with(ResponseTemplate::new(409))
            .mount(&server)
            .await;
        let dashboard = Dashboard::from_config(&config(&[("Voron", server.uri().as_str())])).unwrap();

        let err = dashboard
            .run(
                None,
                ControlCommand::Delete {
                    location: FileLocation::SdCard,
                    path: "benchy.gcode".into(),
                },
            )
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), Some(409));
    }

    #[tokio::test]
    async fn watch_closes_streams_on_shutdown() {
        // Nothing listens on port 9, so every connect attempt fails and the
        // stream sits in backoff until shutdown.
        let dashboard = Dashboard::from_config(&config(&[("Voron", "http://127.0.0.1:9")])).unwrap();

        dashboard
            .watch(tokio::time::sleep(std::time::Duration::from_millis(200)))
            .await;

        let session = dashboard.session(None).unwrap();
        assert_eq!(session.stream().state(), StreamState::Closed);
        assert_eq!(dashboard.view("Voron").unwrap().display_text(), "Status unknown");
    }
}
