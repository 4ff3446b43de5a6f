//! Connector Framework error types
//!
//! Backend error taxonomy shared by every connector, with LDAP result-code
//! classification and transient/permanent separation.

use thiserror::Error;

use crate::types::ResultCode;

/// Error that can occur during connector operations.
#[derive(Debug, Error)]
pub enum ConnectorError {
    // Connection errors (usually transient)
    /// Failed to reach the backend.
    #[error("connection failed: {message}")]
    ConnectionFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Backend is temporarily unavailable.
    #[error("backend unavailable: {message}")]
    BackendUnavailable { message: String },

    // Authentication errors
    /// Invalid credentials provided.
    #[error("authentication failed: invalid credentials")]
    AuthenticationFailed,

    // Configuration errors (permanent)
    /// Connector configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// No connector is registered for a source name.
    #[error("no connector registered for source '{source_name}'")]
    UnknownSource { source_name: String },

    /// The connector does not implement the operation.
    #[error("operation '{operation}' is not supported by {connector}")]
    UnsupportedOperation {
        operation: String,
        connector: String,
    },

    /// The source mapping is read-only.
    #[error("source '{alias}' is read-only")]
    ReadOnlySource { alias: String },

    // Data errors
    /// Object already exists in the backend.
    #[error("object already exists: {identifier}")]
    ObjectAlreadyExists { identifier: String },

    /// Object not found in the backend.
    #[error("object not found: {identifier}")]
    ObjectNotFound { identifier: String },

    /// Constraint violation in the backend.
    #[error("constraint violation: {message}")]
    ConstraintViolation { message: String },

    /// Invalid data format.
    #[error("invalid data: {message}")]
    InvalidData { message: String },

    // Limits
    /// The response already delivered as many entries as the client allowed.
    #[error("size limit of {limit} entries exceeded")]
    SizeLimitExceeded { limit: usize },

    /// The backend gave up after its time limit.
    #[error("time limit of {timeout_secs} seconds exceeded")]
    TimeLimitExceeded { timeout_secs: u64 },

    // Generic failures
    /// Operation failed.
    #[error("operation failed: {message}")]
    OperationFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Internal error.
    #[error("internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ConnectorError {
    /// Check if this error is transient and the operation could be retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ConnectorError::ConnectionFailed { .. }
                | ConnectorError::BackendUnavailable { .. }
                | ConnectorError::TimeLimitExceeded { .. }
        )
    }

    /// Check if this error ends a search because of a client limit.
    pub fn is_limit(&self) -> bool {
        matches!(
            self,
            ConnectorError::SizeLimitExceeded { .. } | ConnectorError::TimeLimitExceeded { .. }
        )
    }

    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            ConnectorError::ConnectionFailed { .. } => "CONNECTION_FAILED",
            ConnectorError::BackendUnavailable { .. } => "BACKEND_UNAVAILABLE",
            ConnectorError::AuthenticationFailed => "AUTH_FAILED",
            ConnectorError::InvalidConfiguration { .. } => "INVALID_CONFIG",
            ConnectorError::UnknownSource { .. } => "UNKNOWN_SOURCE",
            ConnectorError::UnsupportedOperation { .. } => "UNSUPPORTED_OPERATION",
            ConnectorError::ReadOnlySource { .. } => "READ_ONLY_SOURCE",
            ConnectorError::ObjectAlreadyExists { .. } => "OBJECT_EXISTS",
            ConnectorError::ObjectNotFound { .. } => "OBJECT_NOT_FOUND",
            ConnectorError::ConstraintViolation { .. } => "CONSTRAINT_VIOLATION",
            ConnectorError::InvalidData { .. } => "INVALID_DATA",
            ConnectorError::SizeLimitExceeded { .. } => "SIZE_LIMIT_EXCEEDED",
            ConnectorError::TimeLimitExceeded { .. } => "TIME_LIMIT_EXCEEDED",
            ConnectorError::OperationFailed { .. } => "OPERATION_FAILED",
            ConnectorError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// LDAP result code reported to the client for this error.
    pub fn result_code(&self) -> ResultCode {
        match self {
            ConnectorError::ConnectionFailed { .. } | ConnectorError::BackendUnavailable { .. } => {
                ResultCode::Unavailable
            }
            ConnectorError::AuthenticationFailed => ResultCode::InvalidCredentials,
            ConnectorError::InvalidConfiguration { .. }
            | ConnectorError::UnknownSource { .. }
            | ConnectorError::Internal { .. }
            | ConnectorError::OperationFailed { .. } => ResultCode::Other,
            ConnectorError::UnsupportedOperation { .. } | ConnectorError::ReadOnlySource { .. } => {
                ResultCode::UnwillingToPerform
            }
            ConnectorError::ObjectAlreadyExists { .. } => ResultCode::EntryAlreadyExists,
            ConnectorError::ObjectNotFound { .. } => ResultCode::NoSuchObject,
            ConnectorError::ConstraintViolation { .. } => ResultCode::ConstraintViolation,
            ConnectorError::InvalidData { .. } => ResultCode::InvalidAttributeSyntax,
            ConnectorError::SizeLimitExceeded { .. } => ResultCode::SizeLimitExceeded,
            ConnectorError::TimeLimitExceeded { .. } => ResultCode::TimeLimitExceeded,
        }
    }

    // Convenience constructors

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        ConnectorError::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Create an unsupported operation error.
    pub fn unsupported(operation: impl Into<String>, connector: impl Into<String>) -> Self {
        ConnectorError::UnsupportedOperation {
            operation: operation.into(),
            connector: connector.into(),
        }
    }

    /// Create an object-not-found error.
    pub fn not_found(identifier: impl Into<String>) -> Self {
        ConnectorError::ObjectNotFound {
            identifier: identifier.into(),
        }
    }

    /// Create an invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        ConnectorError::InvalidData {
            message: message.into(),
        }
    }
}

/// Result type for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;

/// Failure to evaluate a single field or attribute expression.
///
/// Never fatal to an operation: callers log it and treat the value as absent.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EvaluationError {
    /// A template operand has no value in the evaluation context.
    #[error("unresolved operand '{name}'")]
    Unresolved { name: String },

    /// A regex transform carries an invalid pattern.
    #[error("invalid regex '{pattern}': {message}")]
    InvalidRegex { pattern: String, message: String },
}
