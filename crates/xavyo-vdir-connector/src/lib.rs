//! # Virtual Directory Connector Framework
//!
//! Core abstractions shared by the xavyo virtual directory engine and the
//! connectors that serve its backend sources (LDAP directories, relational
//! tables, NIS maps).
//!
//! ## Architecture
//!
//! - [`Connector`] - Adapter executing one operation against one backend
//! - [`SearchResponse`] - Push-style sink for streamed search results
//! - [`ConnectorRegistry`] - Resolves source names to connectors
//! - [`Interpreter`] - Pure evaluator of field and attribute expressions
//!
//! ## Example
//!
//! ```ignore
//! use xavyo_vdir_connector::prelude::*;
//!
//! let registry = ConnectorRegistry::new()
//!     .with("groups", Arc::new(my_connector));
//!
//! let connector = registry.resolve("groups")?;
//! let sources = [&source_mapping];
//! let ctx = SourceContext::new("example", &entry_mapping, &sources, &values);
//!
//! let mut response = BufferedResponse::new();
//! connector.search(&ctx, &request, &mut response).await?;
//! ```
//!
//! ## Crate Organization
//!
//! - [`ids`] - Session and operation identifiers
//! - [`types`] - Operation kinds, scopes, result codes, capabilities
//! - [`error`] - Error types with LDAP result-code classification
//! - [`values`] - `SourceValues` and `Attributes` containers
//! - [`dn`] - Distinguished names
//! - [`mapping`] - Entry, source, field and attribute mappings
//! - [`interpreter`] - Expression evaluation
//! - [`operation`] - Requests, results and filters
//! - [`response`] - Search response sinks
//! - [`traits`] - The `Connector` trait
//! - [`registry`] - Connector lookup by source name

pub mod dn;
pub mod error;
pub mod ids;
pub mod interpreter;
pub mod mapping;
pub mod operation;
pub mod registry;
pub mod response;
pub mod traits;
pub mod types;
pub mod values;

pub use interpreter::Interpreter;
pub use registry::ConnectorRegistry;
pub use response::SearchResponse;
pub use traits::Connector;

/// Prelude module for convenient imports.
///
/// ```
/// use xavyo_vdir_connector::prelude::*;
/// ```
pub mod prelude {
    // IDs
    pub use crate::ids::{OperationId, SessionId};

    // Types and enums
    pub use crate::types::{
        BindOutcome, Capability, ModificationKind, OperationKind, ResultCode, Scope,
    };

    // Error handling
    pub use crate::error::{ConnectorError, ConnectorResult, EvaluationError};

    // Values
    pub use crate::values::{Attribute, Attributes, Lookup, SourceValues};

    // DNs
    pub use crate::dn::{Dn, DnError, Rdn};

    // Mapping
    pub use crate::mapping::{
        AttributeMapping, Capabilities, EntryMapping, Expression, FieldMapping, FieldRef,
        SourceMapping, Transform,
    };

    // Interpreter
    pub use crate::interpreter::{Interpreter, ValueContext};

    // Operations
    pub use crate::operation::{
        AddRequest, BindRequest, DeleteRequest, Filter, ModRdnRequest, Modification,
        ModifyRequest, SearchRequest, SearchResult,
    };

    // Responses
    pub use crate::response::{BufferedResponse, LimitedResponse, SearchResponse};

    // Traits
    pub use crate::traits::{Connector, FieldValues, SourceContext};

    // Registry
    pub use crate::registry::{BoxedConnector, ConnectorRegistry};
}

// Re-export async_trait for connector implementors
pub use async_trait::async_trait;
