//! Partition-level request routing.
//!
//! A [`Directory`] owns one partition and the engine serving it. Writes
//! and binds go to the entry mapping matching the target DN; searches fan
//! out over the mappings the scope reaches and share one size limit.

use tracing::{debug, info, instrument, warn};

use xavyo_vdir_connector::dn::Dn;
use xavyo_vdir_connector::mapping::EntryMapping;
use xavyo_vdir_connector::operation::{
    AddRequest, BindRequest, DeleteRequest, ModRdnRequest, ModifyRequest, SearchRequest,
};
use xavyo_vdir_connector::response::{LimitedResponse, SearchResponse};
use xavyo_vdir_connector::types::{OperationKind, ResultCode, Scope};

use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};
use crate::partition::Partition;
use crate::session::Session;

/// A partition and the engine executing operations against it.
#[derive(Debug, Clone)]
pub struct Directory {
    partition: Partition,
    engine: Engine,
}

impl Directory {
    /// Create a directory, checking every entry mapping against the
    /// engine's join depth.
    pub fn new(partition: Partition, engine: Engine) -> EngineResult<Self> {
        let max_depth = engine.config().max_join_depth;
        for entry in partition.mappings() {
            let groups = partition.groups_for(entry)?;
            if groups.len() > max_depth {
                return Err(EngineError::configuration(format!(
                    "entry '{}' joins {} groups, more than the maximum of {max_depth}",
                    entry.id,
                    groups.len()
                )));
            }
        }

        info!(
            partition = partition.name(),
            suffix = %partition.suffix(),
            mappings = partition.mappings().count(),
            "Directory initialized"
        );
        Ok(Self { partition, engine })
    }

    /// The partition served.
    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    /// The engine executing operations.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Entry mapping whose DN pattern matches `dn`.
    pub fn resolve(&self, dn: &Dn) -> EngineResult<&EntryMapping> {
        self.partition
            .find_mapping(dn)
            .ok_or_else(|| EngineError::NoSuchEntry { dn: dn.to_string() })
    }

    /// Add an entry.
    pub async fn add(&self, session: &Session, request: &AddRequest) -> EngineResult<()> {
        let entry = self.resolve(&request.dn)?;
        self.engine.add(session, &self.partition, entry, request).await
    }

    /// Delete an entry.
    pub async fn delete(&self, session: &Session, request: &DeleteRequest) -> EngineResult<()> {
        let entry = self.resolve(&request.dn)?;
        self.engine.delete(session, &self.partition, entry, request).await
    }

    /// Modify an entry.
    pub async fn modify(&self, session: &Session, request: &ModifyRequest) -> EngineResult<()> {
        let entry = self.resolve(&request.dn)?;
        self.engine.modify(session, &self.partition, entry, request).await
    }

    /// Rename an entry.
    pub async fn modrdn(&self, session: &Session, request: &ModRdnRequest) -> EngineResult<()> {
        let entry = self.resolve(&request.dn)?;
        self.engine.modrdn(session, &self.partition, entry, request).await
    }

    /// Bind the session as an entry.
    pub async fn bind(&self, session: &mut Session, request: &BindRequest) -> EngineResult<()> {
        let entry = self.resolve(&request.dn)?;
        self.engine.bind(session, &self.partition, entry, request).await
    }

    /// Search the partition.
    ///
    /// `response` is closed exactly once, with the code of the returned
    /// result.
    #[instrument(skip_all, fields(session = %session.id(), base = %request.base, scope = %request.scope))]
    pub async fn search(
        &self,
        session: &Session,
        request: &SearchRequest,
        response: &mut dyn SearchResponse,
    ) -> EngineResult<()> {
        let limit = self.engine.config().effective_size_limit(request.size_limit);
        let (result, sent) = {
            let mut limited = LimitedResponse::new(&mut *response, limit);
            let result = self.search_targets(session, request, &mut limited).await;
            (result, limited.sent())
        };

        let code = match &result {
            Ok(()) => ResultCode::Success,
            Err(e) if e.is_transient() => {
                warn!(error = %e, "Search interrupted by an unavailable backend");
                e.result_code()
            }
            Err(e) => e.result_code(),
        };
        response.close(code);
        info!(entries = sent, code = %code, "Search completed");
        result
    }

    async fn search_targets(
        &self,
        session: &Session,
        request: &SearchRequest,
        response: &mut dyn SearchResponse,
    ) -> EngineResult<()> {
        let base = self.resolve(&request.base)?;
        let values = self
            .engine
            .extract_source_values(&self.partition, base, &request.base)?;

        let targets = match request.scope {
            Scope::Base => vec![base],
            Scope::One => self.partition.children(base),
            Scope::Sub => self.partition.subtree(base),
        };
        debug!(base_entry = %base.id, targets = targets.len(), "Resolved search targets");

        // Unknown sources fail the search before any backend is called.
        for entry in &targets {
            for source in &entry.sources {
                if source.capability(OperationKind::Search).is_enabled() {
                    self.engine.registry().resolve(&source.source)?;
                }
            }
        }

        for entry in targets {
            self.engine
                .search_entries(session, &self.partition, entry, &values, request, response)
                .await?;
        }
        Ok(())
    }
}
