//! Connector Framework traits
//!
//! A [`Connector`] executes one physical operation against exactly one
//! backend. The engine hands it a [`SourceContext`] describing which source
//! mappings of the virtual entry it serves and the key values already known.

use async_trait::async_trait;
use indexmap::IndexMap;
use tracing::debug;

use crate::error::{ConnectorError, ConnectorResult};
use crate::interpreter::{Interpreter, ValueContext};
use crate::mapping::{EntryMapping, SourceMapping};
use crate::operation::{
    AddRequest, BindRequest, DeleteRequest, ModRdnRequest, ModifyRequest, SearchRequest,
};
use crate::response::SearchResponse;
use crate::types::BindOutcome;
use crate::values::{Attributes, SourceValues};

/// Field values of one backend row, keyed by field name.
pub type FieldValues = IndexMap<String, Vec<String>>;

/// Everything a connector needs to know about the virtual entry it serves.
#[derive(Debug, Clone, Copy)]
pub struct SourceContext<'a> {
    /// Partition name, for logging.
    pub partition: &'a str,
    /// The entry mapping being operated on.
    pub entry: &'a EntryMapping,
    /// Source mappings this call covers, in join order.
    pub sources: &'a [&'a SourceMapping],
    /// Key values known before the call, keyed by `alias.field`.
    pub values: &'a SourceValues,
}

impl<'a> SourceContext<'a> {
    pub fn new(
        partition: &'a str,
        entry: &'a EntryMapping,
        sources: &'a [&'a SourceMapping],
        values: &'a SourceValues,
    ) -> Self {
        Self {
            partition,
            entry,
            sources,
            values,
        }
    }

    /// The first source of this call.
    pub fn primary(&self) -> Option<&'a SourceMapping> {
        self.sources.first().copied()
    }

    /// Look up a source of this call by alias.
    pub fn source(&self, alias: &str) -> Option<&'a SourceMapping> {
        self.sources.iter().copied().find(|s| s.alias == alias)
    }

    /// Known values of the fields of `source`, keyed by field name.
    pub fn keys_for(&self, source: &SourceMapping) -> FieldValues {
        self.values
            .for_alias(&source.alias)
            .map(|(field, values)| (field.to_string(), values.to_vec()))
            .collect()
    }

    /// Field values for writing `attributes` through `source`.
    ///
    /// Values already known for `alias.field` win; other fields are
    /// evaluated against the entry attributes, then the known values.
    pub fn row_for(&self, source: &SourceMapping, attributes: &Attributes) -> FieldValues {
        let context = ValueContext::new().with(attributes).with(self.values);
        let mut row = FieldValues::new();

        for field in &source.fields {
            if let Some(values) = self.values.get_field(&source.alias, &field.name) {
                row.insert(field.name.clone(), values.to_vec());
                continue;
            }
            match Interpreter::new().eval_field(field, &context) {
                Ok(values) if !values.is_empty() => {
                    row.insert(field.name.clone(), values);
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(alias = %source.alias, field = %field.name, error = %e, "Field not evaluated");
                }
            }
        }
        row
    }

    /// Field values of `source` evaluated against `attributes` only.
    pub fn evaluate_fields(&self, source: &SourceMapping, attributes: &Attributes) -> FieldValues {
        let context = ValueContext::new().with(attributes);
        source
            .fields
            .iter()
            .filter_map(|field| match Interpreter::new().eval_field(field, &context) {
                Ok(values) if !values.is_empty() => Some((field.name.clone(), values)),
                _ => None,
            })
            .collect()
    }
}

/// Adapter executing directory operations against one backend.
///
/// Only `search` is mandatory. Write operations default to
/// [`ConnectorError::UnsupportedOperation`]; `bind` defaults to
/// [`BindOutcome::Unsupported`] so the engine can fall back to comparing
/// the credential against the synthesized entry.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Get the display name for this connector instance.
    fn display_name(&self) -> &str;

    /// Insert a row for each source of the context.
    async fn add(&self, _ctx: &SourceContext<'_>, _request: &AddRequest) -> ConnectorResult<()> {
        Err(ConnectorError::unsupported("add", self.display_name()))
    }

    /// Delete the rows matching the known key values.
    async fn delete(
        &self,
        _ctx: &SourceContext<'_>,
        _request: &DeleteRequest,
    ) -> ConnectorResult<()> {
        Err(ConnectorError::unsupported("delete", self.display_name()))
    }

    /// Apply modifications to the rows matching the known key values.
    async fn modify(
        &self,
        _ctx: &SourceContext<'_>,
        _request: &ModifyRequest,
    ) -> ConnectorResult<()> {
        Err(ConnectorError::unsupported("modify", self.display_name()))
    }

    /// Rewrite the key fields of the matching rows after a rename.
    async fn modrdn(
        &self,
        _ctx: &SourceContext<'_>,
        _request: &ModRdnRequest,
    ) -> ConnectorResult<()> {
        Err(ConnectorError::unsupported("modrdn", self.display_name()))
    }

    /// Verify a credential natively.
    async fn bind(
        &self,
        _ctx: &SourceContext<'_>,
        _request: &BindRequest,
    ) -> ConnectorResult<BindOutcome> {
        Ok(BindOutcome::Unsupported)
    }

    /// Stream every row matching the known key values into `response`.
    ///
    /// Rows carry `alias.field` attribute names for each source of the
    /// context. The connector must not close `response`.
    async fn search(
        &self,
        ctx: &SourceContext<'_>,
        request: &SearchRequest,
        response: &mut dyn SearchResponse,
    ) -> ConnectorResult<()>;
}
