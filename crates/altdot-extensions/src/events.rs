//! Change notifications for UI-layer consumers
//!
//! After any committed change to extension/command/config state the core
//! emits one batched event naming which logical query results are now stale,
//! so consumers can re-fetch. Delivery is best-effort: an event with no
//! subscribers is simply dropped.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Which rows of a query kind went stale
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selector {
    /// A single row, by extension id
    Id(String),
    /// Wildcard sentinel: all rows of this query kind
    All,
}

impl Selector {
    pub fn id(value: impl Into<String>) -> Self {
        Self::Id(value.into())
    }
}

/// A logical query result that is now stale
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "query", content = "selector", rename_all = "snake_case")]
pub enum StaleQuery {
    /// The extension list itself changed (rows added/removed/patched)
    ExtensionList,
    /// A single extension (or all of them) changed
    Extension(Selector),
    /// Command rows for an extension changed
    Commands(Selector),
    /// Config rows for an extension changed
    Configs(Selector),
}

/// Broadcast bus carrying batched stale-query notifications
#[derive(Debug, Clone)]
pub struct ChangeBus {
    sender: broadcast::Sender<Vec<StaleQuery>>,
}

impl ChangeBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Vec<StaleQuery>> {
        self.sender.subscribe()
    }

    /// Emit one batched notification; dropped if nobody is listening
    pub fn emit(&self, queries: Vec<StaleQuery>) {
        if queries.is_empty() {
            return;
        }
        let _ = self.sender.send(queries);
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new(64)
    }
}
