// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// OctoDash Link: the printer connection layer.  An HTTP control client, a
// persistent auto-reconnecting push-event stream that fans typed events out
// to subscribers, and the per-printer session that ties the two together
// with the authentication handshake.

pub mod backoff;
pub mod control_client;
pub mod event_stream;
pub mod frame;
pub mod session;
pub mod subscribers;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use control_client::ControlClient;
pub use event_stream::{EventStream, Outbound};
pub use session::PrinterSession;
pub use subscribers::{EventHandler, SubscriberTable};
pub use transport::{Connection, Connector, WsConnector};
