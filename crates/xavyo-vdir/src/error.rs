//! Engine error types.

use thiserror::Error;
use xavyo_vdir_connector::dn::DnError;
use xavyo_vdir_connector::error::ConnectorError;
use xavyo_vdir_connector::types::ResultCode;

/// Error surfaced by engine operations.
///
/// Expression evaluation failures never appear here: they are logged and
/// the affected value is treated as absent.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Mapping or registry configuration is unusable. Raised before any
    /// backend call.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// A DN could not be parsed.
    #[error(transparent)]
    InvalidDn(#[from] DnError),

    /// No entry mapping matches the DN.
    #[error("no such entry: {dn}")]
    NoSuchEntry { dn: String },

    /// The entry cannot perform the operation (static entry, disabled
    /// capability).
    #[error("unwilling to perform {operation} on {dn}: {reason}")]
    UnwillingToPerform {
        operation: String,
        dn: String,
        reason: String,
    },

    /// Error raised by a connector, passed through unchanged.
    #[error(transparent)]
    Backend(ConnectorError),

    /// The search delivered as many entries as allowed.
    #[error("size limit of {limit} entries exceeded")]
    SizeLimitExceeded { limit: usize },

    /// Bind credentials were rejected.
    #[error("invalid credentials for {dn}")]
    InvalidCredentials { dn: String },
}

impl EngineError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        EngineError::Configuration {
            message: message.into(),
        }
    }

    /// Create an unwilling-to-perform error.
    pub fn unwilling(
        operation: impl Into<String>,
        dn: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        EngineError::UnwillingToPerform {
            operation: operation.into(),
            dn: dn.to_string(),
            reason: reason.into(),
        }
    }

    /// LDAP result code reported to the client.
    pub fn result_code(&self) -> ResultCode {
        match self {
            EngineError::Configuration { .. } => ResultCode::OperationsError,
            EngineError::InvalidDn(_) => ResultCode::InvalidDnSyntax,
            EngineError::NoSuchEntry { .. } => ResultCode::NoSuchObject,
            EngineError::UnwillingToPerform { .. } => ResultCode::UnwillingToPerform,
            EngineError::Backend(e) => e.result_code(),
            EngineError::SizeLimitExceeded { .. } => ResultCode::SizeLimitExceeded,
            EngineError::InvalidCredentials { .. } => ResultCode::InvalidCredentials,
        }
    }

    /// Check if a backend failed in a way a client retry could get past.
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Backend(e) if e.is_transient())
    }

    /// Check if the error ends a search because of a client limit.
    pub fn is_limit(&self) -> bool {
        match self {
            EngineError::SizeLimitExceeded { .. } => true,
            EngineError::Backend(e) => e.is_limit(),
            _ => false,
        }
    }
}

impl From<ConnectorError> for EngineError {
    fn from(error: ConnectorError) -> Self {
        match error {
            ConnectorError::SizeLimitExceeded { limit } => EngineError::SizeLimitExceeded { limit },
            ConnectorError::UnknownSource { source_name } => EngineError::Configuration {
                message: format!("no connector registered for source '{source_name}'"),
            },
            other => EngineError::Backend(other),
        }
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_limit_maps_to_limit_error() {
        let err: EngineError = ConnectorError::SizeLimitExceeded { limit: 3 }.into();
        assert!(matches!(err, EngineError::SizeLimitExceeded { limit: 3 }));
        assert!(err.is_limit());
        assert_eq!(err.result_code(), ResultCode::SizeLimitExceeded);
    }

    #[test]
    fn test_unknown_source_is_configuration_error() {
        let err: EngineError = ConnectorError::UnknownSource {
            source_name: "groups".to_string(),
        }
        .into();
        assert!(matches!(err, EngineError::Configuration { .. }));
        assert!(err.to_string().contains("groups"));
    }

    #[test]
    fn test_only_backend_outages_are_transient() {
        let down: EngineError = ConnectorError::BackendUnavailable {
            message: "down".to_string(),
        }
        .into();
        assert!(down.is_transient());
        assert!(!EngineError::SizeLimitExceeded { limit: 1 }.is_transient());
        assert!(!EngineError::from(ConnectorError::not_found("cn=acme")).is_transient());
    }

    #[test]
    fn test_backend_errors_pass_through() {
        let err: EngineError = ConnectorError::not_found("cn=acme").into();
        assert_eq!(err.result_code(), ResultCode::NoSuchObject);
        assert!(matches!(
            err,
            EngineError::Backend(ConnectorError::ObjectNotFound { .. })
        ));
    }
}
