//! Per-partition operation engine.
//!
//! Non-search operations recover the backend key values from the target
//! DN and delegate to the connector of the entry's primary source. Search
//! delegates to the [`SearchEngine`] and owns closing the response.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use xavyo_vdir_connector::dn::{Dn, Rdn};
use xavyo_vdir_connector::error::ConnectorError;
use xavyo_vdir_connector::ids::OperationId;
use xavyo_vdir_connector::interpreter::{Interpreter, ValueContext};
use xavyo_vdir_connector::mapping::{EntryMapping, SourceMapping};
use xavyo_vdir_connector::operation::{
    AddRequest, BindRequest, DeleteRequest, ModRdnRequest, ModifyRequest, SearchRequest,
};
use xavyo_vdir_connector::registry::{BoxedConnector, ConnectorRegistry};
use xavyo_vdir_connector::response::{BufferedResponse, LimitedResponse, SearchResponse};
use xavyo_vdir_connector::traits::SourceContext;
use xavyo_vdir_connector::types::{BindOutcome, OperationKind, ResultCode, Scope};
use xavyo_vdir_connector::values::SourceValues;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::partition::Partition;
use crate::propagate::{propagate_down, propagate_up};
use crate::search::SearchEngine;
use crate::session::Session;

/// Orchestrates directory operations over the entries of a partition.
#[derive(Debug, Clone)]
pub struct Engine {
    registry: ConnectorRegistry,
    config: EngineConfig,
    interpreter: Interpreter,
    search_engine: SearchEngine,
}

impl Engine {
    /// Create an engine resolving sources through `registry`.
    pub fn new(registry: ConnectorRegistry, config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let interpreter = Interpreter::new();
        Ok(Self {
            search_engine: SearchEngine::new(interpreter, config.max_join_depth),
            registry,
            config,
            interpreter,
        })
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Connector registry.
    pub fn registry(&self) -> &ConnectorRegistry {
        &self.registry
    }

    /// Recover backend key values from `dn`.
    ///
    /// Each RDN of `dn` is paired with `entry` or one of its ancestors,
    /// innermost first; the root mapping is paired with the suffix RDN. The
    /// field mappings of every source at that level are evaluated against
    /// the RDN, then values are propagated between sources.
    pub fn extract_source_values(
        &self,
        partition: &Partition,
        entry: &EntryMapping,
        dn: &Dn,
    ) -> EngineResult<SourceValues> {
        let relative = dn
            .relative_to(partition.suffix())
            .ok_or_else(|| EngineError::NoSuchEntry { dn: dn.to_string() })?;
        let lineage = partition.lineage(entry);
        if lineage.len() != relative.len() + 1 {
            return Err(EngineError::NoSuchEntry { dn: dn.to_string() });
        }

        let mut values = SourceValues::new();
        for (mapping, rdn) in lineage.iter().zip(relative) {
            self.extract_level(mapping, rdn, &mut values);
        }
        if let (Some(root), Some(rdn)) = (lineage.last(), partition.suffix().rdn()) {
            self.extract_level(root, rdn, &mut values);
        }

        // Outermost first, so descendant references see ancestor keys.
        for mapping in lineage.iter().rev() {
            let sources: Vec<&SourceMapping> = mapping.sources.iter().collect();
            if let Err(missing) = propagate_down(&self.interpreter, &sources, &[], &mut values) {
                debug!(entry = %mapping.id, missing = %missing, "Key not derivable from DN");
            }
        }
        propagate_up(&lineage, &mut values);

        debug!(dn = %dn, keys = values.len(), "Extracted source values");
        Ok(values)
    }

    fn extract_level(&self, mapping: &EntryMapping, rdn: &Rdn, values: &mut SourceValues) {
        let attributes = rdn.to_attributes();
        let context = ValueContext::new().with(&attributes);

        for source in &mapping.sources {
            for field in &source.fields {
                if field.reference().is_some_and(|r| r.alias != source.alias) {
                    continue;
                }
                match self.interpreter.eval_field(field, &context) {
                    Ok(found) if !found.is_empty() => {
                        values.add(SourceValues::key(&source.alias, &field.name), found);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        debug!(alias = %source.alias, field = %field.name, error = %e, "Key not derivable from RDN");
                    }
                }
            }
        }
    }

    /// Resolve the primary connector of `entry` for a write, plus every
    /// other enabled source served by the same connector.
    fn write_target<'a>(
        &self,
        entry: &'a EntryMapping,
        operation: OperationKind,
        dn: &Dn,
    ) -> EngineResult<(BoxedConnector, Vec<&'a SourceMapping>)> {
        let primary = entry.primary_source().ok_or_else(|| {
            EngineError::unwilling(operation.as_str(), dn, "entry has no backend source")
        })?;
        if !primary.capability(operation).is_enabled() {
            return Err(EngineError::unwilling(
                operation.as_str(),
                dn,
                format!("source '{}' is disabled for {operation}", primary.alias),
            ));
        }
        if primary.read_only && operation != OperationKind::Bind {
            return Err(EngineError::Backend(ConnectorError::ReadOnlySource {
                alias: primary.alias.clone(),
            }));
        }

        let connector = self.registry.resolve(&primary.source)?;
        let mut sources = vec![primary];
        for source in entry.sources.iter().skip(1) {
            if !source.capability(operation).is_enabled() || source.read_only {
                continue;
            }
            let other = self.registry.resolve(&source.source)?;
            if Arc::ptr_eq(&connector, &other) {
                sources.push(source);
            }
        }
        Ok((connector, sources))
    }

    /// Add an entry.
    #[instrument(skip_all, fields(session = %session.id(), operation = %OperationId::new(), dn = %request.dn))]
    pub async fn add(
        &self,
        session: &Session,
        partition: &Partition,
        entry: &EntryMapping,
        request: &AddRequest,
    ) -> EngineResult<()> {
        let values = self.extract_source_values(partition, entry, &request.dn)?;
        let (connector, sources) = self.write_target(entry, OperationKind::Add, &request.dn)?;
        let ctx = SourceContext::new(partition.name(), entry, &sources, &values);

        connector.add(&ctx, request).await?;
        info!(entry = %entry.id, "Entry added");
        Ok(())
    }

    /// Delete an entry.
    #[instrument(skip_all, fields(session = %session.id(), operation = %OperationId::new(), dn = %request.dn))]
    pub async fn delete(
        &self,
        session: &Session,
        partition: &Partition,
        entry: &EntryMapping,
        request: &DeleteRequest,
    ) -> EngineResult<()> {
        let values = self.extract_source_values(partition, entry, &request.dn)?;
        let (connector, sources) = self.write_target(entry, OperationKind::Delete, &request.dn)?;
        let ctx = SourceContext::new(partition.name(), entry, &sources, &values);

        connector.delete(&ctx, request).await?;
        info!(entry = %entry.id, "Entry deleted");
        Ok(())
    }

    /// Modify an entry.
    #[instrument(skip_all, fields(session = %session.id(), operation = %OperationId::new(), dn = %request.dn))]
    pub async fn modify(
        &self,
        session: &Session,
        partition: &Partition,
        entry: &EntryMapping,
        request: &ModifyRequest,
    ) -> EngineResult<()> {
        let values = self.extract_source_values(partition, entry, &request.dn)?;
        let (connector, sources) = self.write_target(entry, OperationKind::Modify, &request.dn)?;
        let ctx = SourceContext::new(partition.name(), entry, &sources, &values);

        connector.modify(&ctx, request).await?;
        info!(entry = %entry.id, changes = request.modifications.len(), "Entry modified");
        Ok(())
    }

    /// Rename an entry within its parent.
    #[instrument(skip_all, fields(session = %session.id(), operation = %OperationId::new(), dn = %request.dn))]
    pub async fn modrdn(
        &self,
        session: &Session,
        partition: &Partition,
        entry: &EntryMapping,
        request: &ModRdnRequest,
    ) -> EngineResult<()> {
        if request.new_rdn.types() != entry.rdn_types() {
            return Err(EngineError::unwilling(
                "modrdn",
                &request.dn,
                format!("new RDN '{}' does not match the naming of entry '{}'", request.new_rdn, entry.id),
            ));
        }

        let values = self.extract_source_values(partition, entry, &request.dn)?;
        let (connector, sources) = self.write_target(entry, OperationKind::ModRdn, &request.dn)?;
        let ctx = SourceContext::new(partition.name(), entry, &sources, &values);

        connector.modrdn(&ctx, request).await?;
        info!(entry = %entry.id, new_dn = %request.new_dn(), "Entry renamed");
        Ok(())
    }

    /// Bind as an entry.
    ///
    /// The primary connector decides first. When it rejects the credential
    /// or cannot verify it, the credential is compared with the entry's
    /// synthesized password attribute, if the fallback is enabled. Other
    /// backend errors propagate unchanged.
    #[instrument(skip_all, fields(session = %session.id(), operation = %OperationId::new(), dn = %request.dn))]
    pub async fn bind(
        &self,
        session: &mut Session,
        partition: &Partition,
        entry: &EntryMapping,
        request: &BindRequest,
    ) -> EngineResult<()> {
        let values = self.extract_source_values(partition, entry, &request.dn)?;

        let outcome = match entry
            .primary_source()
            .filter(|s| s.capability(OperationKind::Bind).is_enabled())
        {
            Some(primary) => {
                let connector = self.registry.resolve(&primary.source)?;
                let sources = [primary];
                let ctx = SourceContext::new(partition.name(), entry, &sources, &values);
                match connector.bind(&ctx, request).await {
                    Ok(outcome) => outcome,
                    Err(ConnectorError::AuthenticationFailed) => BindOutcome::InvalidCredentials,
                    Err(e) => return Err(e.into()),
                }
            }
            None => BindOutcome::Unsupported,
        };

        let authenticated = match outcome {
            BindOutcome::Authenticated => true,
            BindOutcome::InvalidCredentials | BindOutcome::Unsupported if self.config.bind_fallback => {
                debug!(outcome = ?outcome, "Falling back to password attribute comparison");
                self.compare_password(session, partition, entry, &values, request)
                    .await?
            }
            BindOutcome::InvalidCredentials | BindOutcome::Unsupported => false,
        };

        if !authenticated {
            warn!(entry = %entry.id, "Bind rejected");
            session.set_bind_dn(None);
            return Err(EngineError::InvalidCredentials {
                dn: request.dn.to_string(),
            });
        }

        session.set_bind_dn(Some(request.dn.clone()));
        info!(entry = %entry.id, "Bind succeeded");
        Ok(())
    }

    /// Compare the credential with the password attribute of the entry.
    async fn compare_password(
        &self,
        session: &Session,
        partition: &Partition,
        entry: &EntryMapping,
        values: &SourceValues,
        request: &BindRequest,
    ) -> EngineResult<bool> {
        if request.password.is_empty() {
            return Ok(false);
        }

        let password_attribute = &self.config.password_attribute;
        let search = SearchRequest::new(request.dn.clone(), Scope::Base)
            .with_attributes(vec![password_attribute.clone()]);
        let mut buffer = BufferedResponse::new();
        self.search_entries(session, partition, entry, values, &search, &mut buffer)
            .await?;

        Ok(buffer.results().iter().any(|result| {
            result
                .attributes
                .get(password_attribute)
                .is_some_and(|stored| stored.iter().any(|v| v == &request.password))
        }))
    }

    /// Stream the entries of `entry` matching `request` without closing
    /// `response` or applying a size limit.
    pub async fn search_entries(
        &self,
        session: &Session,
        partition: &Partition,
        entry: &EntryMapping,
        values: &SourceValues,
        request: &SearchRequest,
        response: &mut dyn SearchResponse,
    ) -> EngineResult<()> {
        debug!(session = %session.id(), entry = %entry.id, "Searching entry mapping");
        self.search_engine
            .search(&self.registry, partition, entry, values, request, response)
            .await
    }

    /// Search the entries of `entry` below `request.base`.
    ///
    /// Applies the effective size limit and closes `response` exactly once,
    /// with the code of the returned error or success.
    #[instrument(skip_all, fields(session = %session.id(), operation = %OperationId::new(), base = %request.base, scope = %request.scope))]
    pub async fn search(
        &self,
        session: &Session,
        partition: &Partition,
        entry: &EntryMapping,
        values: &SourceValues,
        request: &SearchRequest,
        response: &mut dyn SearchResponse,
    ) -> EngineResult<()> {
        let limit = self.config.effective_size_limit(request.size_limit);
        let (result, sent) = {
            let mut limited = LimitedResponse::new(&mut *response, limit);
            let result = self
                .search_entries(session, partition, entry, values, request, &mut limited)
                .await;
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use xavyo_vdir_connector::mapping::{AttributeMapping, FieldMapping};

    fn partition() -> Partition {
        Partition::new(
            "example",
            Dn::parse("dc=example,dc=com").unwrap(),
            vec![
                EntryMapping::new("root"),
                EntryMapping::new("user")
                    .with_parent("root")
                    .with_source(
                        SourceMapping::new("u", "users")
                            .with_field(FieldMapping::variable("uid", "uid"))
                            .with_field(FieldMapping::constant("kind", "person")),
                    )
                    .with_attribute(AttributeMapping::variable("uid", "u.uid").rdn()),
            ],
        )
        .unwrap()
    }

    fn engine() -> Engine {
        Engine::new(ConnectorRegistry::new(), EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = EngineConfig::default().with_max_join_depth(0);
        let err = Engine::new(ConnectorRegistry::new(), config).unwrap_err();
        assert!(matches!(err, EngineError::Configuration { .. }));
    }

    #[test]
    fn test_extract_source_values_from_rdn() {
        let partition = partition();
        let entry = partition.mapping("user").unwrap();
        let dn = Dn::parse("uid=alice,dc=example,dc=com").unwrap();

        let values = engine()
            .extract_source_values(&partition, entry, &dn)
            .unwrap();

        assert_eq!(values.get("u.uid").unwrap(), &["alice".to_string()]);
        assert_eq!(values.get("u.kind").unwrap(), &["person".to_string()]);
    }

    #[test]
    fn test_extract_source_values_depth_mismatch() {
        let partition = partition();
        let entry = partition.mapping("user").unwrap();
        let dn = Dn::parse("uid=alice,ou=people,dc=example,dc=com").unwrap();

        let err = engine()
            .extract_source_values(&partition, entry, &dn)
            .unwrap_err();
        assert!(matches!(err, EngineError::NoSuchEntry { .. }));
    }

    #[test]
    fn test_extract_source_values_outside_suffix() {
        let partition = partition();
        let entry = partition.mapping("user").unwrap();
        let dn = Dn::parse("uid=alice,dc=other,dc=org").unwrap();

        assert!(engine().extract_source_values(&partition, entry, &dn).is_err());
    }

    #[tokio::test]
    async fn test_write_to_unregistered_source_is_configuration_error() {
        let partition = partition();
        let entry = partition.mapping("user").unwrap();
        let request = DeleteRequest::new(Dn::parse("uid=alice,dc=example,dc=com").unwrap());

        let err = engine()
            .delete(&Session::new(), &partition, entry, &request)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Configuration { .. }));
    }
}
