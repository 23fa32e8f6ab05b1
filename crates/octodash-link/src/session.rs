// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-printer session: one control client plus one event stream, glued
// together by the authentication handshake.
//
// When the stream reports `connected`, the session performs a passive login
// over HTTP and pushes `{auth: "<name>:<session>"}` back onto the stream.
// The handshake is registered before any collaborator can subscribe, so it
// runs first for every `connected` event.  The same handshake answers
// `reauthRequired`.
//
// The owner starts and stops the stream; the session has no teardown of its
// own.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use tokio::sync::watch;
use tracing::{Span, error, info, info_span};

use octodash_core::DashboardConfig;
use octodash_core::config::PrinterConfig;
use octodash_core::error::Result;
use octodash_core::types::{AuthState, EndpointIdentity, category};

use crate::control_client::ControlClient;
use crate::event_stream::{EventStream, Outbound};
use crate::frame;
use crate::subscribers::EventHandler;
use crate::transport::{Connector, WsConnector};

/// A remote printer: control client, event stream, and auth state.
pub struct PrinterSession {
    name: String,
    client: ControlClient,
    stream: EventStream,
    auth: Arc<watch::Sender<AuthState>>,
    span: Span,
}

impl PrinterSession {
    /// Build a session from one configured printer.
    pub fn from_config(printer: &PrinterConfig, config: &DashboardConfig) -> Result<Self> {
        Self::new(&printer.name, &printer.endpoint(), config)
    }

    /// Build a session over the WebSocket transport.
    pub fn new(name: &str, endpoint: &EndpointIdentity, config: &DashboardConfig) -> Result<Self> {
        Self::with_connector(name, endpoint, config, Arc::new(WsConnector))
    }

    /// Build a session over a caller-supplied event transport.
    pub fn with_connector(
        name: &str,
        endpoint: &EndpointIdentity,
        config: &DashboardConfig,
        connector: Arc<dyn Connector>,
    ) -> Result<Self> {
        let span = info_span!("printer", name = %name);
        // Spans created while building are children of the printer span.
        let (client, stream, auth) = span.in_scope(|| -> Result<_> {
            let client = ControlClient::new(endpoint, config.request_timeout())?;
            let ws_base = frame::websocket_base(&endpoint.base_url)?;
            let stream = EventStream::with_connector(&ws_base, config.stream.clone(), connector);
            let (auth, _) = watch::channel(AuthState::Unauthenticated);
            let auth = Arc::new(auth);

            let handshake: Arc<dyn EventHandler> = Arc::new(AuthHandshake {
                client: client.clone(),
                outbound: stream.outbound(),
                auth: Arc::clone(&auth),
            });
            stream.add_callback(category::CONNECTED, Arc::clone(&handshake));
            stream.add_callback(category::REAUTH_REQUIRED, handshake);

            info!(base_url = %endpoint.base_url, "printer session created");
            Ok((client, stream, auth))
        })?;

        Ok(Self {
            name: name.to_string(),
            client,
            stream,
            auth,
            span,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// HTTP control client for commands and queries.
    pub fn client(&self) -> &ControlClient {
        &self.client
    }

    /// Event stream for subscriptions and lifecycle control.
    pub fn stream(&self) -> &EventStream {
        &self.stream
    }

    /// Tracing span carrying this printer's name.
    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn auth_state(&self) -> AuthState {
        self.auth.borrow().clone()
    }

    /// Watch authentication changes.
    pub fn subscribe_auth(&self) -> watch::Receiver<AuthState> {
        self.auth.subscribe()
    }
}

impl std::fmt::Debug for PrinterSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrinterSession")
            .field("name", &self.name)
            .field("base_url", &self.client.base_url())
            .field("stream", &self.stream)
            .field("auth", &self.auth_state())
            .finish()
    }
}

/// Subscriber that logs in and queues the auth frame.
struct AuthHandshake {
    client: ControlClient,
    outbound: Outbound,
    auth: Arc<watch::Sender<AuthState>>,
}

#[async_trait]
impl EventHandler for AuthHandshake {
    async fn handle(&self, _payload: &Value) {
        info!("socket connected, logging in");
        self.auth.send_replace(AuthState::Authenticating);

        let token = match self.client.login().await {
            Ok(token) => token,
            Err(e) => {
                error!(error = %e, "passive login failed, stream stays unauthenticated");
                self.auth.send_replace(AuthState::Failed(e.to_string()));
                return;
            }
        };

        match self.outbound.send(&json!({ "auth": token.auth_value() })) {
            Ok(()) => {
                info!(user = %token.name, "auth frame queued");
                self.auth
                    .send_replace(AuthState::Authenticated { since: Utc::now() });
            }
            Err(e) => {
                error!(error = %e, "could not queue auth frame");
                self.auth.send_replace(AuthState::Failed(e.to_string()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::testing::{FakeConnector, eventually};

    const CONNECTED: &str = r#"a[{"connected":{"version":"1.10.2","display_version":"1.10.2"}}]"#;

    async fn login_server(status: u16) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/login"))
            .and(header("X-Api-Key", "KEY"))
            .and(body_json(json!({"passive": true})))
            .respond_with(
                ResponseTemplate::new(status)
                    .set_body_json(json!({"name": "_api", "session": "c0ffee"})),
            )
            .mount(&server)
            .await;
        server
    }

    fn session(server: &MockServer, connector: &Arc<FakeConnector>) -> PrinterSession {
        PrinterSession::with_connector(
            "Voron",
            &EndpointIdentity::new(server.uri(), "KEY"),
            &DashboardConfig::default(),
            Arc::clone(connector) as Arc<dyn Connector>,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn stream_url_uses_websocket_scheme() {
        let server = MockServer::start().await;
        let connector = FakeConnector::new();
        let session = session(&server, &connector);

        let expected = format!("{}/sockjs/", server.uri().replacen("http:", "ws:", 1));
        assert!(session.stream().url().starts_with(&expected));
        assert!(session.stream().url().ends_with("/websocket"));
        assert_eq!(session.auth_state(), AuthState::Unauthenticated);
    }

    #[test]
    fn unsupported_scheme_fails_construction() {
        let err = PrinterSession::with_connector(
            "Voron",
            &EndpointIdentity::new("ftp://voron.local", "KEY"),
            &DashboardConfig::default(),
            FakeConnector::new() as Arc<dyn Connector>,
        )
        .err();
        assert!(matches!(
            err,
            Some(octodash_core::OctodashError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn connected_event_sends_auth_frame() {
        let server = login_server(200).await;
        let connector = FakeConnector::new();
        let peer = connector.script();
        let session = session(&server, &connector);

        session.stream().connect();
        peer.push(CONNECTED);
        eventually(|| peer.sent().len() == 1).await;

        assert_eq!(
            peer.sent()[0],
            frame::encode_outbound(&json!({"auth": "_api:c0ffee"})).unwrap()
        );
        assert!(session.auth_state().is_authenticated());

        session.stream().close();
        session.stream().wait_closed().await;
    }

    #[tokio::test]
    async fn failed_login_sends_nothing() {
        let server = login_server(403).await;
        let connector = FakeConnector::new();
        let peer = connector.script();
        let session = session(&server, &connector);

        session.stream().connect();
        peer.push(CONNECTED);
        eventually(|| matches!(session.auth_state(), AuthState::Failed(_))).await;
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert!(peer.sent().is_empty());
        assert_eq!(connector.attempts(), 1);

        session.stream().close();
        session.stream().wait_closed().await;
    }

    #[tokio::test]
    async fn reauth_required_repeats_handshake() {
        let server = login_server(200).await;
        let connector = FakeConnector::new();
        let peer = connector.script();
        let session = session(&server, &connector);

        session.stream().connect();
        peer.push(CONNECTED);
        peer.push(r#"a[{"reauthRequired":{"reason":"logout"}}]"#);
        eventually(|| peer.sent().len() == 2).await;

        assert_eq!(peer.sent()[0], peer.sent()[1]);

        session.stream().close();
        session.stream().wait_closed().await;
    }

    #[tokio::test]
    async fn later_subscribers_see_completed_handshake() {
        let server = login_server(200).await;
        let connector = FakeConnector::new();
        let peer = connector.script();
        let session = session(&server, &connector);

        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = Arc::clone(&seen);
            let auth = session.subscribe_auth();
            session.stream().add_callback(
                category::CONNECTED,
                Arc::new(move |_: &Value| {
                    seen.lock().unwrap().push(auth.borrow().is_authenticated());
                }),
            );
        }

        session.stream().connect();
        peer.push(CONNECTED);
        eventually(|| !seen.lock().unwrap().is_empty()).await;

        assert_eq!(*seen.lock().unwrap(), vec![true]);

        session.stream().close();
        session.stream().wait_closed().await;
    }
}
