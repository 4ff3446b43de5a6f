//! Value containers.
//!
//! [`SourceValues`] accumulates backend field values keyed by
//! `alias.field`; [`Attributes`] holds LDAP attributes keyed
//! case-insensitively by attribute type. Both are ordered and multi-valued,
//! and both merge by union: a merge never drops a value already present.
//! The exception is [`SourceValues::merge_row`], where a backend row
//! replaces the values of the fields it returns.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Lookup of named values, used as a layer of an evaluation context.
pub trait Lookup: Send + Sync {
    /// Values bound to `name`, or `None` when the name is unbound.
    fn lookup(&self, name: &str) -> Option<&[String]>;
}

fn push_unique(target: &mut Vec<String>, value: String) {
    if !target.contains(&value) {
        target.push(value);
    }
}

/// Per-request accumulator of backend values keyed by `alias.field`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceValues {
    values: IndexMap<String, Vec<String>>,
}

impl SourceValues {
    /// Create an empty set of source values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Qualified key for a field of an alias.
    pub fn key(alias: &str, field: &str) -> String {
        format!("{alias}.{field}")
    }

    /// Add values under `name`, skipping duplicates.
    pub fn add<I, V>(&mut self, name: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let entry = self.values.entry(name.into()).or_default();
        for value in values {
            push_unique(entry, value.into());
        }
    }

    /// Add one value under `name` using the builder pattern.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.add(name, [value.into()]);
        self
    }

    /// Replace the values bound to `name`.
    pub fn set(&mut self, name: impl Into<String>, values: Vec<String>) {
        self.values.insert(name.into(), values);
    }

    /// Values bound to `name`.
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.values
            .get(name)
            .map(Vec::as_slice)
            .filter(|v| !v.is_empty())
    }

    /// Values bound to `alias.field`.
    pub fn get_field(&self, alias: &str, field: &str) -> Option<&[String]> {
        self.get(&Self::key(alias, field))
    }

    /// Check if `name` has at least one value.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Check if any field of `alias` has a value.
    pub fn has_alias(&self, alias: &str) -> bool {
        self.for_alias(alias).next().is_some()
    }

    /// Iterate the `(field, values)` pairs of one alias.
    pub fn for_alias<'a>(
        &'a self,
        alias: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a [String])> + 'a {
        self.values.iter().filter_map(move |(key, values)| {
            let field = key.strip_prefix(alias)?.strip_prefix('.')?;
            (!values.is_empty()).then_some((field, values.as_slice()))
        })
    }

    /// Remove and return the values bound to `name`.
    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        self.values.shift_remove(name)
    }

    /// Union-merge another set of source values into this one.
    pub fn merge(&mut self, other: &SourceValues) {
        for (name, values) in &other.values {
            self.add(name.clone(), values.iter().cloned());
        }
    }

    /// Merge a backend row whose attribute names are `alias.field` keys.
    ///
    /// The row is authoritative for the fields it carries: values seeded
    /// for those keys (from a request DN, say) are replaced, so a key never
    /// holds two spellings of the same backend value. Fields the row does
    /// not carry keep their accumulated values.
    pub fn merge_row(&mut self, row: &Attributes) {
        for attribute in row.iter().filter(|a| !a.values.is_empty()) {
            let mut values = Vec::with_capacity(attribute.values.len());
            for value in &attribute.values {
                push_unique(&mut values, value.clone());
            }
            self.values.insert(attribute.name.clone(), values);
        }
    }

    /// Iterate all `(name, values)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.values
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    /// Number of bound names.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if no name is bound.
    pub fn is_empty(&self) -> bool {
        self.values.values().all(Vec::is_empty)
    }
}

impl Lookup for SourceValues {
    fn lookup(&self, name: &str) -> Option<&[String]> {
        self.get(name)
    }
}

/// A single LDAP attribute with its original spelling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    /// Attribute type as first written.
    pub name: String,
    /// Ordered values.
    pub values: Vec<String>,
}

/// LDAP attributes keyed case-insensitively by attribute type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributes {
    attributes: IndexMap<String, Attribute>,
}

impl Attributes {
    /// Create an empty attribute set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one value, skipping duplicates.
    pub fn add_value(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.add_values(name, [value.into()]);
    }

    /// Add several values, skipping duplicates.
    pub fn add_values<I, V>(&mut self, name: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let name = name.into();
        let attribute = self
            .attributes
            .entry(name.to_lowercase())
            .or_insert_with(|| Attribute {
                name,
                values: Vec::new(),
            });
        for value in values {
            push_unique(&mut attribute.values, value.into());
        }
    }

    /// Add one value using the builder pattern.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_value(name, value);
        self
    }

    /// Replace all values of an attribute; an empty list removes it.
    pub fn set(&mut self, name: impl Into<String>, values: Vec<String>) {
        let name = name.into();
        if values.is_empty() {
            self.attributes.shift_remove(&name.to_lowercase());
        } else {
            self.attributes
                .insert(name.to_lowercase(), Attribute { name, values });
        }
    }

    /// Values of an attribute.
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.attributes
            .get(&name.to_lowercase())
            .map(|a| a.values.as_slice())
            .filter(|v| !v.is_empty())
    }

    /// First value of an attribute.
    pub fn get_first(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| v.first()).map(String::as_str)
    }

    /// Check if an attribute has at least one value.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Remove an attribute.
    pub fn remove(&mut self, name: &str) -> Option<Attribute> {
        self.attributes.shift_remove(&name.to_lowercase())
    }

    /// Keep only the named attributes (case-insensitive).
    pub fn retain_named(&mut self, names: &[String]) {
        self.attributes
            .retain(|key, _| names.iter().any(|n| n.eq_ignore_ascii_case(key)));
    }

    /// Union-merge another attribute set into this one.
    pub fn merge(&mut self, other: &Attributes) {
        for attribute in other.iter() {
            self.add_values(attribute.name.clone(), attribute.values.iter().cloned());
        }
    }

    /// Iterate attributes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.values()
    }

    /// Attribute names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.attributes.values().map(|a| a.name.as_str())
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Check if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

impl Lookup for Attributes {
    fn lookup(&self, name: &str) -> Option<&[String]> {
        self.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_values_union() {
        let mut values = SourceValues::new().with("g.groupname", "acme");
        values.add("g.groupname", ["acme", "beta"]);

        assert_eq!(
            values.get("g.groupname").unwrap(),
            &["acme".to_string(), "beta".to_string()]
        );
    }

    #[test]
    fn test_source_values_merge_never_overwrites() {
        let mut left = SourceValues::new()
            .with("m.member", "alice")
            .with("g.groupname", "acme");
        let right = SourceValues::new()
            .with("m.member", "bob")
            .with("g.groupname", "acme");

        left.merge(&right);

        assert_eq!(left.get("m.member").unwrap().len(), 2);
        assert_eq!(left.get("g.groupname").unwrap().len(), 1);
    }

    #[test]
    fn test_source_values_for_alias() {
        let values = SourceValues::new()
            .with("g.groupname", "acme")
            .with("g.description", "desc")
            .with("gm.member", "alice");

        let fields: Vec<&str> = values.for_alias("g").map(|(f, _)| f).collect();
        assert_eq!(fields, vec!["groupname", "description"]);
        assert!(values.has_alias("gm"));
        assert!(!values.has_alias("m"));
    }

    #[test]
    fn test_source_values_clone_is_independent() {
        let original = SourceValues::new().with("g.groupname", "acme");
        let mut copy = original.clone();
        copy.add("g.groupname", ["beta"]);

        assert_eq!(original.get("g.groupname").unwrap().len(), 1);
        assert_eq!(copy.get("g.groupname").unwrap().len(), 2);
    }

    #[test]
    fn test_merge_row() {
        let row = Attributes::new()
            .with("g.groupname", "acme")
            .with("g.description", "desc1");
        let mut values = SourceValues::new().with("a.uid", "alice");
        values.merge_row(&row);

        assert_eq!(values.get_field("g", "description").unwrap(), &["desc1"]);
        assert_eq!(values.get_field("a", "uid").unwrap(), &["alice"]);
    }

    #[test]
    fn test_merge_row_replaces_seeded_key() {
        let mut values = SourceValues::new().with("g.groupname", "ACME");
        values.merge_row(&Attributes::new().with("g.groupname", "acme"));

        assert_eq!(values.get("g.groupname").unwrap(), &["acme".to_string()]);
    }

    #[test]
    fn test_attributes_case_insensitive() {
        let attrs = Attributes::new()
            .with("objectClass", "top")
            .with("OBJECTCLASS", "groupOfNames");

        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs.get("objectclass").unwrap().len(), 2);
        assert_eq!(attrs.names().next(), Some("objectClass"));
    }

    #[test]
    fn test_attributes_set_empty_removes() {
        let mut attrs = Attributes::new().with("description", "x");
        attrs.set("Description", Vec::new());
        assert!(!attrs.contains("description"));
    }

    #[test]
    fn test_attributes_retain_named() {
        let mut attrs = Attributes::new()
            .with("cn", "acme")
            .with("description", "x")
            .with("objectClass", "top");
        attrs.retain_named(&["CN".to_string(), "objectclass".to_string()]);

        assert_eq!(attrs.len(), 2);
        assert!(!attrs.contains("description"));
    }
}
