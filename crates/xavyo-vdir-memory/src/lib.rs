//! # Memory Connector
//!
//! In-memory table connector for the xavyo virtual directory.
//!
//! Each source name maps to a table of rows; a row maps field names to
//! ordered values. The connector honours per-source capability flags,
//! read-only sources, key matching on the values the engine extracted from
//! the DN, intra-group joins and native password binds.
//!
//! ## Example
//!
//! ```ignore
//! use xavyo_vdir_memory::{row, MemoryConnector};
//!
//! let connector = MemoryConnector::new("memory");
//! connector.insert("groups", row([("groupname", "acme")])).await;
//!
//! let registry = ConnectorRegistry::new()
//!     .with("groups", Arc::new(connector.clone()));
//! ```

pub mod connector;

// Re-exports
pub use connector::{row, MemoryConnector, Row};
