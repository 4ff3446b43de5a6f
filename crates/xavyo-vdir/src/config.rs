//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Tunables of the virtualization engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Size limit applied when the request carries none (0 = unlimited).
    #[serde(default)]
    pub default_size_limit: usize,

    /// Attribute compared against the credential when a backend cannot bind.
    #[serde(default = "default_password_attribute")]
    pub password_attribute: String,

    /// Whether to fall back to comparing the synthesized password attribute.
    #[serde(default = "default_true")]
    pub bind_fallback: bool,

    /// Maximum number of source groups in one join.
    #[serde(default = "default_max_join_depth")]
    pub max_join_depth: usize,
}

fn default_password_attribute() -> String {
    "userPassword".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_join_depth() -> usize {
    16
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_size_limit: 0,
            password_attribute: default_password_attribute(),
            bind_fallback: true,
            max_join_depth: default_max_join_depth(),
        }
    }
}

impl EngineConfig {
    /// Set the default size limit.
    pub fn with_default_size_limit(mut self, limit: usize) -> Self {
        self.default_size_limit = limit;
        self
    }

    /// Set the password attribute used by the bind fallback.
    pub fn with_password_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.password_attribute = attribute.into();
        self
    }

    /// Enable or disable the bind fallback.
    pub fn with_bind_fallback(mut self, enabled: bool) -> Self {
        self.bind_fallback = enabled;
        self
    }

    /// Set the maximum join depth.
    pub fn with_max_join_depth(mut self, depth: usize) -> Self {
        self.max_join_depth = depth;
        self
    }

    /// Effective size limit for a request: the smaller non-zero limit.
    pub fn effective_size_limit(&self, requested: usize) -> usize {
        match (requested, self.default_size_limit) {
            (0, configured) => configured,
            (requested, 0) => requested,
            (requested, configured) => requested.min(configured),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> EngineResult<()> {
        if self.password_attribute.trim().is_empty() {
            return Err(EngineError::configuration(
                "password_attribute must not be empty",
            ));
        }
        if self.max_join_depth == 0 {
            return Err(EngineError::configuration(
                "max_join_depth must be at least 1",
            ));
        }
        Ok(())
    }
}
