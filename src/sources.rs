//! In-memory "connected source" markers.
//!
//! Connecting a source opts it into `GET /get-data`. Markers live only for
//! the process lifetime and are not recovered after a restart.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize)]
pub struct ConnectedSource {
    pub name: String,
    pub connected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected,
    AlreadyConnected,
}

/// Connected sources in connection order.
#[derive(Debug, Default)]
pub struct ConnectedSources {
    sources: Vec<ConnectedSource>,
}

impl ConnectedSources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `name` as connected. Idempotent.
    pub fn connect(&mut self, name: &str) -> ConnectOutcome {
        if self.is_connected(name) {
            return ConnectOutcome::AlreadyConnected;
        }
        self.sources.push(ConnectedSource {
            name: name.to_string(),
            connected_at: Utc::now(),
        });
        ConnectOutcome::Connected
    }

    /// Remove the marker for `name`; not-found when it was never connected.
    pub fn disconnect(&mut self, name: &str) -> Result<ConnectedSource> {
        let pos = self
            .sources
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| Error::NotFound(format!("source is not connected: {}", name)))?;
        Ok(self.sources.remove(pos))
    }

    pub fn is_connected(&self, name: &str) -> bool {
        self.sources.iter().any(|s| s.name == name)
    }

    pub fn list(&self) -> &[ConnectedSource] {
        &self.sources
    }

    pub fn names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name.clone()).collect()
    }
}
