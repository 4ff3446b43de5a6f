//! # Virtual Directory Engine
//!
//! Exposes one hierarchical namespace over heterogeneous backend sources.
//! Operations on virtual entries are translated into connector calls; an
//! entry composed from several sources is produced by joining their rows
//! group by group and synthesizing DNs and attributes from declarative
//! mappings.
//!
//! ## Architecture
//!
//! - [`Directory`] - Routes requests to entry mappings by DN and scope
//! - [`Engine`] - DN key extraction, writes, bind with fallback
//! - [`SearchEngine`] - Streaming multi-source join pipeline
//! - [`Partition`] - Validated entry-mapping tree under a suffix
//!
//! ## Example
//!
//! ```ignore
//! use xavyo_vdir::{Directory, Engine, EngineConfig, Partition, Session};
//!
//! let engine = Engine::new(registry, EngineConfig::default())?;
//! let directory = Directory::new(Partition::from_config(config)?, engine)?;
//!
//! let mut response = BufferedResponse::new();
//! directory
//!     .search(&Session::new(), &SearchRequest::new(base, Scope::One), &mut response)
//!     .await?;
//! ```

pub mod config;
pub mod directory;
pub mod engine;
pub mod error;
pub mod partition;
pub mod propagate;
pub mod search;
pub mod session;
pub mod synthesis;

pub use config::EngineConfig;
pub use directory::Directory;
pub use engine::Engine;
pub use error::{EngineError, EngineResult};
pub use partition::{Partition, PartitionConfig, SourceGroups};
pub use search::SearchEngine;
pub use session::Session;
