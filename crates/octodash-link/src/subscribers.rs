// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Subscriber table: event category -> ordered handlers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::trace;

use crate::frame::Envelope;

/// Something that consumes push-event payloads of one category.
///
/// Handlers run inline on the stream's background task, so a slow handler
/// delays the next receive.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, payload: &Value);
}

#[async_trait]
impl<F> EventHandler for F
where
    F: Fn(&Value) + Send + Sync,
{
    async fn handle(&self, payload: &Value) {
        (self)(payload)
    }
}

/// Handlers keyed by category, invoked in registration order.
#[derive(Default, Clone)]
pub struct SubscriberTable {
    handlers: HashMap<String, Vec<Arc<dyn EventHandler>>>,
}

impl SubscriberTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler for `category`.
    pub fn add(&mut self, category: impl Into<String>, handler: Arc<dyn EventHandler>) {
        self.handlers.entry(category.into()).or_default().push(handler);
    }

    /// Number of handlers registered for `category`.
    pub fn count(&self, category: &str) -> usize {
        self.handlers.get(category).map_or(0, Vec::len)
    }

    /// Handlers for `category`, in registration order.
    pub fn handlers(&self, category: &str) -> &[Arc<dyn EventHandler>] {
        self.handlers.get(category).map_or(&[], Vec::as_slice)
    }

    /// Deliver every category of one envelope to its handlers.
    ///
    /// Categories nobody subscribed to are dropped.
    pub async fn dispatch(&self, envelope: &Envelope) {
        for (category, payload) in envelope {
            let handlers = self.handlers(category);
            if handlers.is_empty() {
                trace!(category = %category, "no subscribers");
                continue;
            }
            for handler in handlers {
                handler.handle(payload).await;
            }
        }
    }
}

impl std::fmt::Debug for SubscriberTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<&str, usize> = self
            .handlers
            .iter()
            .map(|(k, v)| (k.as_str(), v.len()))
            .collect();
        f.debug_struct("SubscriberTable")
            .field("handlers", &counts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use serde_json::json;

    fn recorder(log: &Arc<Mutex<Vec<String>>>, tag: &'static str) -> Arc<dyn EventHandler> {
        let log = Arc::clone(log);
        Arc::new(move |payload: &Value| {
            log.lock().unwrap().push(format!("{tag}:{payload}"));
        })
    }

    fn envelope(value: Value) -> Envelope {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn handlers_run_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut table = SubscriberTable::new();
        table.add("current", recorder(&log, "first"));
        table.add("current", recorder(&log, "second"));

        table.dispatch(&envelope(json!({"current": 1}))).await;

        assert_eq!(*log.lock().unwrap(), vec!["first:1", "second:1"]);
        assert_eq!(table.count("current"), 2);
    }

    #[tokio::test]
    async fn unknown_categories_are_dropped() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut table = SubscriberTable::new();
        table.add("plugin", recorder(&log, "plugin"));

        table
            .dispatch(&envelope(json!({"slicingProgress": {}, "plugin": "p"})))
            .await;

        assert_eq!(*log.lock().unwrap(), vec![r#"plugin:"p""#]);
        assert_eq!(table.count("slicingProgress"), 0);
    }
}
