//! Connector Framework type definitions
//!
//! Enums shared by the engine and connectors: operations, scopes, result
//! codes and per-source capabilities.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Directory operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Add,
    Bind,
    Delete,
    Modify,
    ModRdn,
    Search,
}

impl OperationKind {
    /// Get all operation kinds.
    #[must_use]
    pub fn all() -> &'static [OperationKind] {
        &[
            OperationKind::Add,
            OperationKind::Bind,
            OperationKind::Delete,
            OperationKind::Modify,
            OperationKind::ModRdn,
            OperationKind::Search,
        ]
    }

    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Add => "add",
            OperationKind::Bind => "bind",
            OperationKind::Delete => "delete",
            OperationKind::Modify => "modify",
            OperationKind::ModRdn => "modrdn",
            OperationKind::Search => "search",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = ParseOperationKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "add" => Ok(OperationKind::Add),
            "bind" => Ok(OperationKind::Bind),
            "delete" => Ok(OperationKind::Delete),
            "modify" => Ok(OperationKind::Modify),
            "modrdn" => Ok(OperationKind::ModRdn),
            "search" => Ok(OperationKind::Search),
            _ => Err(ParseOperationKindError(s.to_string())),
        }
    }
}

/// Error parsing operation kind from string.
#[derive(Debug, Clone)]
pub struct ParseOperationKindError(String);

impl fmt::Display for ParseOperationKindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid operation '{}', expected one of: add, bind, delete, modify, modrdn, search",
            self.0
        )
    }
}

impl std::error::Error for ParseOperationKindError {}

/// Search scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Only the base entry.
    Base,
    /// Immediate children of the base entry.
    One,
    /// The base entry and all of its descendants.
    #[default]
    Sub,
}

impl Scope {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Base => "base",
            Scope::One => "one",
            Scope::Sub => "sub",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Scope {
    type Err = ParseScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "base" => Ok(Scope::Base),
            "one" | "onelevel" => Ok(Scope::One),
            "sub" | "subtree" => Ok(Scope::Sub),
            _ => Err(ParseScopeError(s.to_string())),
        }
    }
}

/// Error parsing scope from string.
#[derive(Debug, Clone)]
pub struct ParseScopeError(String);

impl fmt::Display for ParseScopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid scope '{}', expected one of: base, one, sub",
            self.0
        )
    }
}

impl std::error::Error for ParseScopeError {}

/// LDAP result code (RFC 4511 §4.1.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultCode {
    Success,
    OperationsError,
    TimeLimitExceeded,
    SizeLimitExceeded,
    NoSuchObject,
    InvalidDnSyntax,
    InvalidAttributeSyntax,
    InvalidCredentials,
    Unavailable,
    UnwillingToPerform,
    ConstraintViolation,
    EntryAlreadyExists,
    Other,
}

impl ResultCode {
    /// Numeric code as sent on the wire.
    #[must_use]
    pub fn code(&self) -> u16 {
        match self {
            ResultCode::Success => 0,
            ResultCode::OperationsError => 1,
            ResultCode::TimeLimitExceeded => 3,
            ResultCode::SizeLimitExceeded => 4,
            ResultCode::ConstraintViolation => 19,
            ResultCode::InvalidAttributeSyntax => 21,
            ResultCode::NoSuchObject => 32,
            ResultCode::InvalidDnSyntax => 34,
            ResultCode::InvalidCredentials => 49,
            ResultCode::Unavailable => 52,
            ResultCode::UnwillingToPerform => 53,
            ResultCode::EntryAlreadyExists => 68,
            ResultCode::Other => 80,
        }
    }

    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultCode::Success => "success",
            ResultCode::OperationsError => "operations_error",
            ResultCode::TimeLimitExceeded => "time_limit_exceeded",
            ResultCode::SizeLimitExceeded => "size_limit_exceeded",
            ResultCode::NoSuchObject => "no_such_object",
            ResultCode::InvalidDnSyntax => "invalid_dn_syntax",
            ResultCode::InvalidAttributeSyntax => "invalid_attribute_syntax",
            ResultCode::InvalidCredentials => "invalid_credentials",
            ResultCode::Unavailable => "unavailable",
            ResultCode::UnwillingToPerform => "unwilling_to_perform",
            ResultCode::ConstraintViolation => "constraint_violation",
            ResultCode::EntryAlreadyExists => "entry_already_exists",
            ResultCode::Other => "other",
        }
    }

    /// Check if the code reports success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, ResultCode::Success)
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_str(), self.code())
    }
}

/// How a source participates in one kind of operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    /// The source must take part; its failure fails the operation.
    #[default]
    Required,
    /// The source takes part; its failure is logged and ignored.
    Optional,
    /// The source is skipped.
    Disabled,
}

impl Capability {
    /// Check if the source takes part in the operation at all.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Capability::Disabled)
    }
}

/// Outcome of a native bind attempt against a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindOutcome {
    /// The backend verified the credential.
    Authenticated,
    /// The backend rejected the credential.
    InvalidCredentials,
    /// The backend cannot verify credentials for this source.
    Unsupported,
}

/// Kind of change carried by one modification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModificationKind {
    Add,
    Delete,
    Replace,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_kind_roundtrip() {
        for kind in OperationKind::all() {
            let parsed: OperationKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, *kind);
        }
        assert!("rename".parse::<OperationKind>().is_err());
    }

    #[test]
    fn test_scope_aliases() {
        assert_eq!("subtree".parse::<Scope>().unwrap(), Scope::Sub);
        assert_eq!("ONE".parse::<Scope>().unwrap(), Scope::One);
        assert_eq!("base".parse::<Scope>().unwrap(), Scope::Base);
        assert!("children".parse::<Scope>().is_err());
    }

    #[test]
    fn test_result_code_numbers() {
        assert_eq!(ResultCode::Success.code(), 0);
        assert_eq!(ResultCode::SizeLimitExceeded.code(), 4);
        assert_eq!(ResultCode::NoSuchObject.code(), 32);
        assert_eq!(ResultCode::InvalidCredentials.code(), 49);
        assert_eq!(
            ResultCode::InvalidCredentials.to_string(),
            "invalid_credentials (49)"
        );
    }

    #[test]
    fn test_capability_default() {
        assert_eq!(Capability::default(), Capability::Required);
        assert!(Capability::Optional.is_enabled());
        assert!(!Capability::Disabled.is_enabled());

        let json = serde_json::to_string(&Capability::Optional).unwrap();
        assert_eq!(json, "\"optional\"");
    }
}
