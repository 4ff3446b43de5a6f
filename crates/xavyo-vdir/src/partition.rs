//! Partitions: the entry-mapping tree of one virtual subtree.
//!
//! A [`Partition`] is built once from loader output and never mutated. It
//! answers the structural questions the engine asks: ancestors and children
//! of a mapping, which mapping a DN designates, and the ordered groups of
//! sources each entry joins.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use xavyo_vdir_connector::dn::{Dn, Rdn};
use xavyo_vdir_connector::mapping::{EntryMapping, Expression, SourceMapping};

use crate::error::{EngineError, EngineResult};

/// Loader output for one partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionConfig {
    pub name: String,
    pub suffix: Dn,
    pub mappings: Vec<EntryMapping>,
    /// Precomputed groups of source aliases, keyed by entry mapping id.
    #[serde(default)]
    pub groups: IndexMap<String, Vec<Vec<String>>>,
}

/// Ordered groups of source aliases of one entry mapping.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceGroups {
    groups: Vec<Vec<String>>,
}

impl SourceGroups {
    /// Use a precomputed group list verbatim.
    pub fn new(groups: Vec<Vec<String>>) -> Self {
        Self { groups }
    }

    /// Derive one group per source, dependencies first.
    ///
    /// A source whose fields reference another alias of the same entry is
    /// placed after it. Otherwise declaration order is kept.
    pub fn derive(entry: &EntryMapping) -> EngineResult<Self> {
        let local: HashSet<&str> = entry.sources.iter().map(|s| s.alias.as_str()).collect();
        let mut placed: Vec<&str> = Vec::with_capacity(entry.sources.len());

        while placed.len() < entry.sources.len() {
            let ready = entry.sources.iter().find(|source| {
                !placed.contains(&source.alias.as_str())
                    && source.references().all(|(_, reference)| {
                        !local.contains(reference.alias) || placed.contains(&reference.alias)
                    })
            });

            match ready {
                Some(source) => placed.push(&source.alias),
                None => {
                    return Err(EngineError::configuration(format!(
                        "source references of entry '{}' form a cycle",
                        entry.id
                    )))
                }
            }
        }

        Ok(Self {
            groups: placed.into_iter().map(|alias| vec![alias.to_string()]).collect(),
        })
    }

    /// The groups of aliases, in join order.
    pub fn groups(&self) -> &[Vec<String>] {
        &self.groups
    }

    /// Number of groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Check if there are no groups.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Resolve aliases to the source mappings of `entry`.
    pub fn resolve<'a>(&self, entry: &'a EntryMapping) -> EngineResult<Vec<Vec<&'a SourceMapping>>> {
        self.groups
            .iter()
            .map(|group| {
                group
                    .iter()
                    .map(|alias| {
                        entry.source(alias).ok_or_else(|| {
                            EngineError::configuration(format!(
                                "group of entry '{}' names unknown alias '{alias}'",
                                entry.id
                            ))
                        })
                    })
                    .collect::<EngineResult<Vec<_>>>()
            })
            .collect()
    }
}

/// An isolated namespace mapping one virtual subtree to its sources.
#[derive(Debug, Clone)]
pub struct Partition {
    name: String,
    suffix: Dn,
    mappings: IndexMap<String, EntryMapping>,
    root: String,
    groups: IndexMap<String, SourceGroups>,
}

impl Partition {
    /// Build a partition, checking that the mappings form a single-rooted
    /// acyclic tree and that aliases are unique within each lineage.
    pub fn new(
        name: impl Into<String>,
        suffix: Dn,
        mappings: Vec<EntryMapping>,
    ) -> EngineResult<Self> {
        let name = name.into();
        let mut by_id: IndexMap<String, EntryMapping> = IndexMap::with_capacity(mappings.len());

        for mapping in mappings {
            let mut aliases = HashSet::new();
            for source in &mapping.sources {
                if !aliases.insert(source.alias.as_str()) {
                    return Err(EngineError::configuration(format!(
                        "duplicate alias '{}' in entry '{}'",
                        source.alias, mapping.id
                    )));
                }
            }
            if by_id.contains_key(&mapping.id) {
                return Err(EngineError::configuration(format!(
                    "duplicate entry mapping id '{}'",
                    mapping.id
                )));
            }
            by_id.insert(mapping.id.clone(), mapping);
        }

        let roots: Vec<&str> = by_id
            .values()
            .filter(|m| m.parent_id.is_none())
            .map(|m| m.id.as_str())
            .collect();
        let root = match roots.as_slice() {
            [root] => (*root).to_string(),
            [] => {
                return Err(EngineError::configuration(format!(
                    "partition '{name}' has no root entry mapping"
                )))
            }
            _ => {
                return Err(EngineError::configuration(format!(
                    "partition '{name}' has several root entry mappings: {}",
                    roots.join(", ")
                )))
            }
        };

        for mapping in by_id.values() {
            let mut current = mapping;
            let mut steps = 0;
            while let Some(parent_id) = &current.parent_id {
                current = by_id.get(parent_id).ok_or_else(|| {
                    EngineError::configuration(format!(
                        "entry '{}' names unknown parent '{parent_id}'",
                        mapping.id
                    ))
                })?;
                steps += 1;
                if steps > by_id.len() {
                    return Err(EngineError::configuration(format!(
                        "entry '{}' is part of a parent cycle",
                        mapping.id
                    )));
                }
                // Values are keyed by alias across the whole lineage.
                if let Some(shared) = current
                    .sources
                    .iter()
                    .find(|s| mapping.source(&s.alias).is_some())
                {
                    return Err(EngineError::configuration(format!(
                        "alias '{}' of entry '{}' is already used by ancestor '{}'",
                        shared.alias, mapping.id, current.id
                    )));
                }
            }
        }

        debug!(partition = %name, suffix = %suffix, mappings = by_id.len(), "Partition loaded");

        Ok(Self {
            name,
            suffix,
            mappings: by_id,
            root,
            groups: IndexMap::new(),
        })
    }

    /// Build a partition from loader output.
    pub fn from_config(config: PartitionConfig) -> EngineResult<Self> {
        let mut partition = Self::new(config.name, config.suffix, config.mappings)?;
        for (entry_id, groups) in config.groups {
            partition = partition.with_groups(entry_id, SourceGroups::new(groups))?;
        }
        Ok(partition)
    }

    /// Attach a precomputed group list to an entry mapping.
    pub fn with_groups(
        mut self,
        entry_id: impl Into<String>,
        groups: SourceGroups,
    ) -> EngineResult<Self> {
        let entry_id = entry_id.into();
        let entry = self.mappings.get(&entry_id).ok_or_else(|| {
            EngineError::configuration(format!("groups given for unknown entry '{entry_id}'"))
        })?;

        groups.resolve(entry)?;
        let mut seen = HashSet::new();
        for alias in groups.groups().iter().flatten() {
            if !seen.insert(alias.as_str()) {
                return Err(EngineError::configuration(format!(
                    "alias '{alias}' appears in several groups of entry '{entry_id}'"
                )));
            }
        }

        self.groups.insert(entry_id, groups);
        Ok(self)
    }

    /// Partition name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// DN of the root entry mapping.
    pub fn suffix(&self) -> &Dn {
        &self.suffix
    }

    /// The root entry mapping.
    pub fn root(&self) -> &EntryMapping {
        &self.mappings[self.root.as_str()]
    }

    /// Check if `entry` is the root mapping.
    pub fn is_root(&self, entry: &EntryMapping) -> bool {
        entry.id == self.root
    }

    /// Look up a mapping by id.
    pub fn mapping(&self, id: &str) -> Option<&EntryMapping> {
        self.mappings.get(id)
    }

    /// All mappings in declaration order.
    pub fn mappings(&self) -> impl Iterator<Item = &EntryMapping> {
        self.mappings.values()
    }

    /// Parent of a mapping.
    pub fn parent(&self, entry: &EntryMapping) -> Option<&EntryMapping> {
        entry
            .parent_id
            .as_deref()
            .and_then(|id| self.mappings.get(id))
    }

    /// Ancestors of a mapping, innermost first, ending with the root.
    pub fn ancestors(&self, entry: &EntryMapping) -> Vec<&EntryMapping> {
        let mut ancestors = Vec::new();
        let mut current = self.parent(entry);
        while let Some(mapping) = current {
            ancestors.push(mapping);
            current = self.parent(mapping);
        }
        ancestors
    }

    /// The mapping followed by its ancestors, innermost first.
    pub fn lineage<'a>(&'a self, entry: &'a EntryMapping) -> Vec<&'a EntryMapping> {
        let mut lineage = vec![entry];
        lineage.extend(self.ancestors(entry));
        lineage
    }

    /// Direct children of a mapping, in declaration order.
    pub fn children(&self, entry: &EntryMapping) -> Vec<&EntryMapping> {
        self.mappings
            .values()
            .filter(|m| m.parent_id.as_deref() == Some(entry.id.as_str()))
            .collect()
    }

    /// The mapping and all its descendants, in tree pre-order.
    pub fn subtree(&self, entry: &EntryMapping) -> Vec<&EntryMapping> {
        let Some(start) = self.mapping(&entry.id) else {
            return Vec::new();
        };
        let mut result = Vec::new();
        let mut stack = vec![start];
        while let Some(mapping) = stack.pop() {
            result.push(mapping);
            stack.extend(self.children(mapping).into_iter().rev());
        }
        result
    }

    /// Number of RDNs between a mapping and the suffix.
    pub fn depth(&self, entry: &EntryMapping) -> usize {
        self.ancestors(entry).len()
    }

    /// Ordered groups of sources joined when searching `entry`.
    pub fn groups_for<'a>(&'a self, entry: &'a EntryMapping) -> EngineResult<Vec<Vec<&'a SourceMapping>>> {
        match self.groups.get(&entry.id) {
            Some(groups) => groups.resolve(entry),
            None => SourceGroups::derive(entry)?.resolve(entry),
        }
    }

    /// The mapping whose DN pattern matches `dn`.
    ///
    /// Every level must carry the mapping's RDN attribute types and any
    /// constant RDN value. When several mappings match, the one with the
    /// most constant matches wins, then declaration order.
    pub fn find_mapping(&self, dn: &Dn) -> Option<&EntryMapping> {
        let relative = dn.relative_to(&self.suffix)?;
        if relative.is_empty() {
            return Some(self.root());
        }

        let mut best: Option<(&EntryMapping, usize)> = None;
        for candidate in self.mappings.values() {
            let lineage = self.lineage(candidate);
            // The root mapping is named by the suffix itself.
            if lineage.len() != relative.len() + 1 {
                continue;
            }

            let score = lineage
                .iter()
                .zip(relative)
                .try_fold(0, |score, (mapping, rdn)| {
                    rdn_match_score(mapping, rdn).map(|s| score + s)
                });

            if let Some(score) = score {
                if best.map_or(true, |(_, best_score)| score > best_score) {
                    best = Some((candidate, score));
                }
            }
        }
        best.map(|(mapping, _)| mapping)
    }
}

/// Number of constant RDN values of `mapping` matched by `rdn`, or `None`
/// when the RDN cannot name an entry of `mapping`.
fn rdn_match_score(mapping: &EntryMapping, rdn: &Rdn) -> Option<usize> {
    if mapping.rdn_types() != rdn.types() {
        return None;
    }

    let mut score = 0;
    for attribute in mapping.rdn_attributes() {
        if let Expression::Constant { value } = &attribute.expression {
            if !rdn
                .get(&attribute.name)
                .is_some_and(|v| v.eq_ignore_ascii_case(value))
            {
                return None;
            }
            score += 1;
        }
    }
    Some(score)
}
