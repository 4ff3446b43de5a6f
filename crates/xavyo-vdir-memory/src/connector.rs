//! Memory connector implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use xavyo_vdir_connector::prelude::*;

/// One backend row: field name to values.
pub type Row = FieldValues;

/// Build a single-valued row.
pub fn row<I, K, V>(fields: I) -> Row
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    fields
        .into_iter()
        .map(|(name, value)| (name.into(), vec![value.into()]))
        .collect()
}

#[derive(Debug, Clone, Default)]
struct Table {
    rows: Vec<Row>,
    password_field: Option<String>,
}

/// Connector backed by in-process tables.
///
/// Clones share the same tables, so one instance can be registered under
/// several source names and inspected by tests afterwards.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    display_name: String,
    tables: Arc<RwLock<HashMap<String, Table>>>,
}

impl MemoryConnector {
    /// Create a connector with no tables.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            display_name: format!("memory: {}", name.into()),
            tables: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Append a row to the table of `source`.
    pub async fn insert(&self, source: &str, row: Row) {
        let mut tables = self.tables.write().await;
        tables.entry(source.to_string()).or_default().rows.push(row);
    }

    /// Snapshot of the rows of `source`.
    pub async fn rows(&self, source: &str) -> Vec<Row> {
        let tables = self.tables.read().await;
        tables
            .get(source)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Enable native binds on `source`, checking passwords stored in `field`.
    pub async fn set_password_field(&self, source: &str, field: impl Into<String>) {
        let mut tables = self.tables.write().await;
        tables.entry(source.to_string()).or_default().password_field = Some(field.into());
    }

    /// Run `write` against the table of every enabled source of the context.
    ///
    /// Read-only sources fail with `ReadOnlySource`. Failures of optional
    /// sources are logged and ignored.
    async fn write_each<F>(
        &self,
        ctx: &SourceContext<'_>,
        operation: OperationKind,
        mut write: F,
    ) -> ConnectorResult<()>
    where
        F: FnMut(&mut Table, &SourceMapping, bool) -> ConnectorResult<()> + Send,
    {
        let mut tables = self.tables.write().await;

        for (index, source) in ctx.sources.iter().copied().enumerate() {
            let capability = source.capability(operation);
            if !capability.is_enabled() {
                debug!(alias = %source.alias, operation = %operation, "Source disabled, skipping");
                continue;
            }

            let result = if source.read_only {
                Err(ConnectorError::ReadOnlySource {
                    alias: source.alias.clone(),
                })
            } else {
                let table = tables.entry(source.source.clone()).or_default();
                write(table, source, index == 0)
            };

            match result {
                Ok(()) => {}
                Err(e) if capability == Capability::Optional => {
                    warn!(alias = %source.alias, error = %e, "Optional source write failed, ignoring");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

fn value_matches(row: &Row, field: &str, wanted: &[String]) -> bool {
    row.get(field).is_some_and(|values| {
        values
            .iter()
            .any(|v| wanted.iter().any(|w| w.eq_ignore_ascii_case(v)))
    })
}

fn row_matches(row: &Row, keys: &FieldValues) -> bool {
    keys.iter()
        .all(|(field, wanted)| value_matches(row, field, wanted))
}

fn require_keys(ctx: &SourceContext<'_>, source: &SourceMapping) -> ConnectorResult<FieldValues> {
    let keys = ctx.keys_for(source);
    if keys.is_empty() {
        return Err(ConnectorError::invalid_data(format!(
            "no key values for source '{}'",
            source.alias
        )));
    }
    Ok(keys)
}

fn union(target: &mut Vec<String>, values: &[String]) {
    for value in values {
        if !target.contains(value) {
            target.push(value.clone());
        }
    }
}

fn apply_modification(row: &mut Row, field: &str, modification: &Modification) {
    match modification.kind {
        ModificationKind::Add => union(row.entry(field.to_string()).or_default(), &modification.values),
        ModificationKind::Delete if modification.values.is_empty() => {
            row.shift_remove(field);
        }
        ModificationKind::Delete => {
            if let Some(values) = row.get_mut(field) {
                values.retain(|v| !modification.values.contains(v));
                if values.is_empty() {
                    row.shift_remove(field);
                }
            }
        }
        ModificationKind::Replace if modification.values.is_empty() => {
            row.shift_remove(field);
        }
        ModificationKind::Replace => {
            row.insert(field.to_string(), modification.values.clone());
        }
    }
}

/// Fields of `source` fed directly by the LDAP attribute `attribute`.
fn fields_for_attribute<'a>(
    source: &'a SourceMapping,
    attribute: &'a str,
) -> impl Iterator<Item = &'a FieldMapping> + 'a {
    source.fields.iter().filter(move |f| {
        f.attribute()
            .is_some_and(|a| a.eq_ignore_ascii_case(attribute))
    })
}

#[async_trait]
impl Connector for MemoryConnector {
    fn display_name(&self) -> &str {
        &self.display_name
    }

    #[instrument(skip(self, ctx, request), fields(dn = %request.dn))]
    async fn add(&self, ctx: &SourceContext<'_>, request: &AddRequest) -> ConnectorResult<()> {
        self.write_each(ctx, OperationKind::Add, |table, source, _| {
            let row = ctx.row_for(source, &request.attributes);
            if row.is_empty() {
                return Err(ConnectorError::invalid_data(format!(
                    "no field of source '{}' could be computed",
                    source.alias
                )));
            }

            let keys = ctx.keys_for(source);
            if !keys.is_empty() && table.rows.iter().any(|r| row_matches(r, &keys)) {
                return Err(ConnectorError::ObjectAlreadyExists {
                    identifier: format!("{}:{}", source.source, request.dn),
                });
            }

            table.rows.push(row);
            info!(source = %source.source, "Memory row created");
            Ok(())
        })
        .await
    }

    #[instrument(skip(self, ctx, request), fields(dn = %request.dn))]
    async fn delete(&self, ctx: &SourceContext<'_>, request: &DeleteRequest) -> ConnectorResult<()> {
        self.write_each(ctx, OperationKind::Delete, |table, source, primary| {
            let keys = require_keys(ctx, source)?;
            let before = table.rows.len();
            table.rows.retain(|r| !row_matches(r, &keys));
            let removed = before - table.rows.len();

            if removed == 0 && primary {
                return Err(ConnectorError::not_found(request.dn.to_string()));
            }
            info!(source = %source.source, removed, "Memory rows deleted");
            Ok(())
        })
        .await
    }

    #[instrument(skip(self, ctx, request), fields(dn = %request.dn))]
    async fn modify(&self, ctx: &SourceContext<'_>, request: &ModifyRequest) -> ConnectorResult<()> {
        self.write_each(ctx, OperationKind::Modify, |table, source, primary| {
            let keys = require_keys(ctx, source)?;
            let mut matched = 0usize;

            for row in table.rows.iter_mut().filter(|r| row_matches(r, &keys)) {
                matched += 1;
                for modification in &request.modifications {
                    for field in fields_for_attribute(source, &modification.attribute) {
                        apply_modification(row, &field.name, modification);
                    }
                }
            }

            if matched == 0 && primary {
                return Err(ConnectorError::not_found(request.dn.to_string()));
            }
            info!(source = %source.source, matched, "Memory rows modified");
            Ok(())
        })
        .await
    }

    #[instrument(skip(self, ctx, request), fields(dn = %request.dn, new_rdn = %request.new_rdn))]
    async fn modrdn(&self, ctx: &SourceContext<'_>, request: &ModRdnRequest) -> ConnectorResult<()> {
        let rdn_types = request.new_rdn.types();
        let rdn_attributes = request.new_rdn.to_attributes();

        self.write_each(ctx, OperationKind::ModRdn, |table, source, primary| {
            let keys = require_keys(ctx, source)?;

            let mut updates = ctx.evaluate_fields(source, &rdn_attributes);
            updates.retain(|name, _| {
                source
                    .field(name)
                    .and_then(|f| f.attribute())
                    .is_some_and(|a| rdn_types.contains(&a.to_lowercase()))
            });

            if !updates.is_empty()
                && table
                    .rows
                    .iter()
                    .any(|r| row_matches(r, &updates) && !row_matches(r, &keys))
            {
                return Err(ConnectorError::ObjectAlreadyExists {
                    identifier: format!("{}:{}", source.source, request.new_dn()),
                });
            }

            let mut matched = 0usize;
            for row in table.rows.iter_mut().filter(|r| row_matches(r, &keys)) {
                matched += 1;
                for (field, values) in &updates {
                    if request.delete_old_rdn {
                        row.insert(field.clone(), values.clone());
                    } else {
                        union(row.entry(field.clone()).or_default(), values);
                    }
                }
            }

            if matched == 0 && primary {
                return Err(ConnectorError::not_found(request.dn.to_string()));
            }
            info!(source = %source.source, matched, "Memory rows renamed");
            Ok(())
        })
        .await
    }

    #[instrument(skip(self, ctx, request), fields(dn = %request.dn))]
    async fn bind(&self, ctx: &SourceContext<'_>, request: &BindRequest) -> ConnectorResult<BindOutcome> {
        let Some(source) = ctx.primary() else {
            return Ok(BindOutcome::Unsupported);
        };

        let tables = self.tables.read().await;
        let Some((table, password_field)) = tables
            .get(&source.source)
            .and_then(|t| t.password_field.as_deref().map(|f| (t, f)))
        else {
            debug!(source = %source.source, "No password field, native bind unsupported");
            return Ok(BindOutcome::Unsupported);
        };

        let keys = ctx.keys_for(source);
        if keys.is_empty() {
            return Ok(BindOutcome::InvalidCredentials);
        }

        let authenticated = table
            .rows
            .iter()
            .filter(|r| row_matches(r, &keys))
            .any(|r| {
                r.get(password_field)
                    .is_some_and(|p| p.iter().any(|p| p == &request.password))
            });

        Ok(if authenticated {
            BindOutcome::Authenticated
        } else {
            BindOutcome::InvalidCredentials
        })
    }

    #[instrument(skip_all, fields(partition = ctx.partition, entry = %ctx.entry.id))]
    async fn search(
        &self,
        ctx: &SourceContext<'_>,
        request: &SearchRequest,
        response: &mut dyn SearchResponse,
    ) -> ConnectorResult<()> {
        let sources: Vec<&SourceMapping> = ctx
            .sources
            .iter()
            .copied()
            .filter(|s| s.capability(OperationKind::Search).is_enabled())
            .collect();
        if sources.is_empty() {
            return Ok(());
        }

        // Snapshot so no lock is held while the response runs nested joins.
        let snapshot: Vec<Vec<Row>> = {
            let tables = self.tables.read().await;
            sources
                .iter()
                .map(|s| {
                    tables
                        .get(&s.source)
                        .map(|t| t.rows.clone())
                        .unwrap_or_default()
                })
                .collect()
        };

        debug!(filter = %request.filter, sources = sources.len(), "Searching memory tables");

        let mut combos = vec![SourceValues::new()];
        let mut joined_aliases: Vec<&str> = Vec::with_capacity(sources.len());
        for (source, rows) in sources.iter().zip(&snapshot) {
            let seeded = ctx.keys_for(source);
            let optional = source.capability(OperationKind::Search) == Capability::Optional;
            let mut next = Vec::new();

            for combo in combos {
                let mut keys = seeded.clone();
                let mut missing_key = false;
                for (field, reference) in source.references() {
                    match combo.get(&reference.key()) {
                        Some(values) => {
                            keys.insert(field.name.clone(), values.to_vec());
                        }
                        // A joined row without the key matches nothing.
                        None if joined_aliases.contains(&reference.alias)
                            && !keys.contains_key(&field.name) =>
                        {
                            missing_key = true;
                        }
                        None => {}
                    }
                }

                let mut joined = false;
                let candidates = rows.iter().filter(|r| !missing_key && row_matches(r, &keys));
                for row in candidates {
                    let mut merged = combo.clone();
                    for (field, values) in row {
                        merged.add(SourceValues::key(&source.alias, field), values.iter().cloned());
                    }
                    next.push(merged);
                    joined = true;
                }
                if !joined && optional {
                    next.push(combo);
                }
            }
            combos = next;
            joined_aliases.push(&source.alias);
        }

        debug!(rows = combos.len(), "Memory search matched");

        for combo in combos {
            let mut attributes = Attributes::new();
            for (name, values) in combo.iter() {
                attributes.add_values(name, values.iter().cloned());
            }
            response.add(SearchResult::row(attributes)).await?;
        }
        Ok(())
    }
}
