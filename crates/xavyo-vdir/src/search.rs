//! Multi-source search.
//!
//! A search over one entry mapping replays its ordered groups of sources.
//! Group 0's connector is searched with the inherited values; every row it
//! returns is merged into a private copy of the accumulated values and
//! drives a nested search of the next group, until the last group's rows
//! are synthesized into entries.
//!
//! Each nesting level is a [`JoinStage`]: a continuation holding the stage
//! index, the values accumulated so far and the downstream response. Rows
//! never share values, so a stage can be re-entered for every row of the
//! stage above it.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use xavyo_vdir_connector::dn::Dn;
use xavyo_vdir_connector::error::ConnectorResult;
use xavyo_vdir_connector::interpreter::Interpreter;
use xavyo_vdir_connector::mapping::{EntryMapping, SourceMapping};
use xavyo_vdir_connector::operation::{SearchRequest, SearchResult};
use xavyo_vdir_connector::registry::{BoxedConnector, ConnectorRegistry};
use xavyo_vdir_connector::response::SearchResponse;
use xavyo_vdir_connector::traits::SourceContext;
use xavyo_vdir_connector::types::{OperationKind, Scope};
use xavyo_vdir_connector::values::{Attributes, SourceValues};

use crate::error::{EngineError, EngineResult};
use crate::partition::Partition;
use crate::propagate::{propagate_down, propagate_up};
use crate::synthesis::{compute_attributes, compute_dns};

/// Check if `dn` lies within `scope` of `base`.
pub fn in_scope(dn: &Dn, base: &Dn, scope: Scope) -> bool {
    match scope {
        Scope::Base => dn == base,
        Scope::One => dn.len() == base.len() + 1 && dn.ends_with(base),
        Scope::Sub => dn.ends_with(base),
    }
}

/// Executes searches over one entry mapping at a time.
#[derive(Debug, Clone)]
pub struct SearchEngine {
    interpreter: Interpreter,
    max_join_depth: usize,
}

impl SearchEngine {
    /// Create a search engine joining at most `max_join_depth` groups.
    pub fn new(interpreter: Interpreter, max_join_depth: usize) -> Self {
        Self {
            interpreter,
            max_join_depth,
        }
    }

    /// Stream the entries of `entry` that match `request` into `response`.
    ///
    /// Every connector is resolved before the first backend call. The
    /// response is not closed.
    #[instrument(skip_all, fields(partition = partition.name(), entry = %entry.id))]
    pub async fn search(
        &self,
        registry: &ConnectorRegistry,
        partition: &Partition,
        entry: &EntryMapping,
        values: &SourceValues,
        request: &SearchRequest,
        response: &mut dyn SearchResponse,
    ) -> EngineResult<()> {
        let groups: Vec<Vec<&SourceMapping>> = partition
            .groups_for(entry)?
            .into_iter()
            .map(|group| {
                group
                    .into_iter()
                    .filter(|s| s.capability(OperationKind::Search).is_enabled())
                    .collect::<Vec<_>>()
            })
            .filter(|group| !group.is_empty())
            .collect();

        if groups.len() > self.max_join_depth {
            return Err(EngineError::configuration(format!(
                "entry '{}' joins {} groups, more than the maximum of {}",
                entry.id,
                groups.len(),
                self.max_join_depth
            )));
        }

        let mut stages = Vec::with_capacity(groups.len());
        for sources in groups {
            stages.push(Stage::resolve(registry, sources)?);
        }

        let pipeline = Pipeline {
            interpreter: &self.interpreter,
            partition,
            entry,
            lineage: partition.lineage(entry),
            stages,
            request,
        };

        if pipeline.stages.is_empty() {
            debug!("Static entry");
            return Ok(pipeline.emit_static(values, response).await?);
        }

        let mut seeded = values.clone();
        // Nothing is joined yet, so ancestor references are optional here.
        if let Err(missing) = propagate_down(
            &self.interpreter,
            &pipeline.stages[0].sources,
            &[],
            &mut seeded,
        ) {
            debug!(missing = %missing, "Missing key for first group");
            return Ok(());
        }

        pipeline.search_stage(0, &seeded, response).await?;
        Ok(())
    }
}

/// One group of co-located sources and the connector serving them.
struct Stage<'a> {
    sources: Vec<&'a SourceMapping>,
    connector: BoxedConnector,
}

impl<'a> Stage<'a> {
    fn resolve(registry: &ConnectorRegistry, sources: Vec<&'a SourceMapping>) -> EngineResult<Self> {
        let mut connector: Option<BoxedConnector> = None;
        for source in &sources {
            let resolved = registry.resolve(&source.source)?;
            match &connector {
                None => connector = Some(resolved),
                Some(first) if Arc::ptr_eq(first, &resolved) => {}
                Some(_) => {
                    return Err(EngineError::configuration(format!(
                        "source '{}' is not served by the connector of its group",
                        source.alias
                    )))
                }
            }
        }

        let connector = connector.ok_or_else(|| EngineError::configuration("empty source group"))?;
        Ok(Self { sources, connector })
    }
}

/// Immutable state shared by every stage of one search.
struct Pipeline<'a> {
    interpreter: &'a Interpreter,
    partition: &'a Partition,
    entry: &'a EntryMapping,
    lineage: Vec<&'a EntryMapping>,
    stages: Vec<Stage<'a>>,
    request: &'a SearchRequest,
}

impl Pipeline<'_> {
    /// Search the connector of stage `index` with `accumulated` as key values.
    async fn search_stage(
        &self,
        index: usize,
        accumulated: &SourceValues,
        downstream: &mut dyn SearchResponse,
    ) -> ConnectorResult<()> {
        let stage = &self.stages[index];
        let ctx = SourceContext::new(self.partition.name(), self.entry, &stage.sources, accumulated);
        let mut join = JoinStage {
            pipeline: self,
            index,
            accumulated,
            downstream,
        };

        debug!(stage = index, connector = stage.connector.display_name(), "Searching group");
        stage.connector.search(&ctx, self.request, &mut join).await
    }

    /// Emit the single entry of a mapping without sources.
    async fn emit_static(
        &self,
        values: &SourceValues,
        downstream: &mut dyn SearchResponse,
    ) -> ConnectorResult<()> {
        let attributes = compute_attributes(self.interpreter, self.entry, values);
        let dns = compute_dns(self.interpreter, self.partition, self.entry, values);
        self.deliver(dns, attributes, downstream).await
    }

    /// Synthesize, filter and emit the entries of one fully joined row.
    async fn emit(
        &self,
        values: &SourceValues,
        downstream: &mut dyn SearchResponse,
    ) -> ConnectorResult<()> {
        let attributes = compute_attributes(self.interpreter, self.entry, values);
        if !self.request.filter.matches(&attributes) {
            debug!(filter = %self.request.filter, "Row filtered out");
            return Ok(());
        }

        let dns = compute_dns(self.interpreter, self.partition, self.entry, values);
        if dns.is_empty() {
            debug!("Row has no DN, skipping");
            return Ok(());
        }
        self.deliver(dns, attributes, downstream).await
    }

    async fn deliver(
        &self,
        dns: Vec<Dn>,
        mut attributes: Attributes,
        downstream: &mut dyn SearchResponse,
    ) -> ConnectorResult<()> {
        if !self.request.wants_all_attributes() {
            attributes.retain_named(&self.request.attributes);
        }

        for dn in dns {
            if !in_scope(&dn, &self.request.base, self.request.scope) {
                continue;
            }
            debug!(dn = %dn, "Emitting entry");
            downstream
                .add(SearchResult::new(dn, attributes.clone()))
                .await?;
        }
        Ok(())
    }
}

/// Continuation receiving the rows of one stage.
struct JoinStage<'p, 'a> {
    pipeline: &'p Pipeline<'a>,
    index: usize,
    accumulated: &'p SourceValues,
    downstream: &'p mut dyn SearchResponse,
}

#[async_trait]
impl<'p, 'a> SearchResponse for JoinStage<'p, 'a> {
    async fn add(&mut self, result: SearchResult) -> ConnectorResult<()> {
        let pipeline = self.pipeline;
        let mut merged = self.accumulated.clone();
        merged.merge_row(&result.attributes);

        let next = self.index + 1;
        if next == pipeline.stages.len() {
            propagate_up(&pipeline.lineage, &mut merged);
            return pipeline.emit(&merged, &mut *self.downstream).await;
        }

        let joined: Vec<&str> = pipeline.stages[..next]
            .iter()
            .flat_map(|stage| stage.sources.iter().map(|s| s.alias.as_str()))
            .collect();
        if let Err(missing) = propagate_down(
            pipeline.interpreter,
            &pipeline.stages[next].sources,
            &joined,
            &mut merged,
        ) {
            debug!(stage = self.index, missing = %missing, "Missing join key, skipping row");
            return Ok(());
        }

        pipeline
            .search_stage(next, &merged, &mut *self.downstream)
            .await
    }
}
