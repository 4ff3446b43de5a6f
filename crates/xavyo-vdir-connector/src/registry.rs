//! Connector registry
//!
//! Resolves source names to connector instances. Owned by the engine and
//! passed explicitly; there is no process-wide registry.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{ConnectorError, ConnectorResult};
use crate::traits::Connector;

/// Shared connector instance.
pub type BoxedConnector = Arc<dyn Connector>;

/// Map from source name to connector.
#[derive(Clone, Default)]
pub struct ConnectorRegistry {
    connectors: HashMap<String, BoxedConnector>,
}

impl ConnectorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the connector serving `source`, replacing any previous one.
    pub fn register(&mut self, source: impl Into<String>, connector: BoxedConnector) {
        let source = source.into();
        debug!(source = %source, connector = connector.display_name(), "Registering connector");
        self.connectors.insert(source, connector);
    }

    /// Register a connector using the builder pattern.
    pub fn with(mut self, source: impl Into<String>, connector: BoxedConnector) -> Self {
        self.register(source, connector);
        self
    }

    /// Resolve the connector serving `source`.
    pub fn resolve(&self, source: &str) -> ConnectorResult<BoxedConnector> {
        self.connectors
            .get(source)
            .cloned()
            .ok_or_else(|| ConnectorError::UnknownSource {
                source_name: source.to_string(),
            })
    }

    /// Check if a connector is registered for `source`.
    pub fn contains(&self, source: &str) -> bool {
        self.connectors.contains_key(source)
    }

    /// Registered source names.
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.connectors.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for ConnectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut sources: Vec<&str> = self.sources().collect();
        sources.sort_unstable();
        f.debug_struct("ConnectorRegistry")
            .field("sources", &sources)
            .finish()
    }
}
