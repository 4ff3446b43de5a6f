//! Entry mapping types.
//!
//! Declarative wiring of one virtual DIT node to its backend sources. These
//! are produced by the partition loader and never mutated afterwards.

use serde::{Deserialize, Serialize};

use crate::types::{Capability, OperationKind};

/// One virtual DIT node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryMapping {
    /// Identifier, unique within the partition.
    pub id: String,

    /// Identifier of the parent mapping; `None` for the partition root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    /// Object classes emitted on every synthesized entry.
    #[serde(default)]
    pub object_classes: Vec<String>,

    /// Backend sources, primary first.
    #[serde(default)]
    pub sources: Vec<SourceMapping>,

    /// Output attributes, in emission order.
    #[serde(default)]
    pub attributes: Vec<AttributeMapping>,
}

impl EntryMapping {
    /// Create an empty mapping.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_id: None,
            object_classes: Vec::new(),
            sources: Vec::new(),
            attributes: Vec::new(),
        }
    }

    /// Set the parent mapping.
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Add an object class.
    pub fn with_object_class(mut self, object_class: impl Into<String>) -> Self {
        self.object_classes.push(object_class.into());
        self
    }

    /// Add a source mapping.
    pub fn with_source(mut self, source: SourceMapping) -> Self {
        self.sources.push(source);
        self
    }

    /// Add an attribute mapping.
    pub fn with_attribute(mut self, attribute: AttributeMapping) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// The primary (first) source mapping.
    pub fn primary_source(&self) -> Option<&SourceMapping> {
        self.sources.first()
    }

    /// Look up a source mapping by alias.
    pub fn source(&self, alias: &str) -> Option<&SourceMapping> {
        self.sources.iter().find(|s| s.alias == alias)
    }

    /// Check if the entry has no backend sources.
    pub fn is_static(&self) -> bool {
        self.sources.is_empty()
    }

    /// Attribute mappings that contribute to the RDN.
    pub fn rdn_attributes(&self) -> impl Iterator<Item = &AttributeMapping> {
        self.attributes.iter().filter(|a| a.rdn)
    }

    /// RDN attribute types, lowercased and sorted.
    pub fn rdn_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.rdn_attributes().map(|a| a.name.to_lowercase()).collect();
        types.sort();
        types.dedup();
        types
    }
}

/// A named reference to a backend source plus its field wiring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMapping {
    /// Alias, unique within its entry mapping.
    pub alias: String,

    /// Source name, resolved to a connector by the registry.
    pub source: String,

    /// Field wiring.
    #[serde(default)]
    pub fields: Vec<FieldMapping>,

    /// Per-operation participation.
    #[serde(default)]
    pub capabilities: Capabilities,

    /// Whether writes through this source are refused.
    #[serde(default)]
    pub read_only: bool,
}

impl SourceMapping {
    /// Create a source mapping.
    pub fn new(alias: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            source: source.into(),
            fields: Vec::new(),
            capabilities: Capabilities::default(),
            read_only: false,
        }
    }

    /// Add a field mapping.
    pub fn with_field(mut self, field: FieldMapping) -> Self {
        self.fields.push(field);
        self
    }

    /// Set the capability for one operation.
    pub fn with_capability(mut self, operation: OperationKind, capability: Capability) -> Self {
        self.capabilities.set(operation, capability);
        self
    }

    /// Mark the source read-only.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Look up a field mapping by field name.
    pub fn field(&self, name: &str) -> Option<&FieldMapping> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Capability for one operation.
    pub fn capability(&self, operation: OperationKind) -> Capability {
        self.capabilities.get(operation)
    }

    /// Fields whose expression references a field of another alias.
    pub fn references(&self) -> impl Iterator<Item = (&FieldMapping, FieldRef<'_>)> {
        self.fields.iter().filter_map(move |f| {
            f.reference()
                .filter(|r| r.alias != self.alias)
                .map(|r| (f, r))
        })
    }
}

/// Per-operation participation of a source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(default)]
    pub add: Capability,
    #[serde(default)]
    pub bind: Capability,
    #[serde(default)]
    pub delete: Capability,
    #[serde(default)]
    pub modify: Capability,
    #[serde(default)]
    pub modrdn: Capability,
    #[serde(default)]
    pub search: Capability,
}

impl Capabilities {
    /// Capability for one operation.
    pub fn get(&self, operation: OperationKind) -> Capability {
        match operation {
            OperationKind::Add => self.add,
            OperationKind::Bind => self.bind,
            OperationKind::Delete => self.delete,
            OperationKind::Modify => self.modify,
            OperationKind::ModRdn => self.modrdn,
            OperationKind::Search => self.search,
        }
    }

    /// Set the capability for one operation.
    pub fn set(&mut self, operation: OperationKind, capability: Capability) {
        let slot = match operation {
            OperationKind::Add => &mut self.add,
            OperationKind::Bind => &mut self.bind,
            OperationKind::Delete => &mut self.delete,
            OperationKind::Modify => &mut self.modify,
            OperationKind::ModRdn => &mut self.modrdn,
            OperationKind::Search => &mut self.search,
        };
        *slot = capability;
    }
}

/// Reference from a field expression to `alias.field`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRef<'a> {
    pub alias: &'a str,
    pub field: &'a str,
}

impl FieldRef<'_> {
    /// The `alias.field` key of the referenced value.
    pub fn key(&self) -> String {
        format!("{}.{}", self.alias, self.field)
    }
}

/// Expression bound to one backend field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    /// Backend field name.
    pub name: String,

    /// Value expression.
    pub expression: Expression,

    /// Optional transformation applied to each value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<Transform>,
}

impl FieldMapping {
    /// Create a field mapping.
    pub fn new(name: impl Into<String>, expression: Expression) -> Self {
        Self {
            name: name.into(),
            expression,
            transform: None,
        }
    }

    /// Field taking the values of an attribute or `alias.field`.
    pub fn variable(name: impl Into<String>, variable: impl Into<String>) -> Self {
        Self::new(name, Expression::variable(variable))
    }

    /// Field holding a constant.
    pub fn constant(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, Expression::constant(value))
    }

    /// Set the transform.
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }

    /// The `alias.field` this field takes its value from, if any.
    pub fn reference(&self) -> Option<FieldRef<'_>> {
        match &self.expression {
            Expression::Variable { name } => {
                let (alias, field) = name.split_once('.')?;
                (!alias.is_empty() && !field.is_empty()).then_some(FieldRef { alias, field })
            }
            _ => None,
        }
    }

    /// The LDAP attribute this field takes its value from, if any.
    pub fn attribute(&self) -> Option<&str> {
        match &self.expression {
            Expression::Variable { name } if !name.contains('.') => Some(name),
            _ => None,
        }
    }
}

/// Expression bound to one output LDAP attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeMapping {
    /// LDAP attribute type.
    pub name: String,

    /// Value expression.
    pub expression: Expression,

    /// Optional transformation applied to each value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<Transform>,

    /// Whether the attribute contributes to the entry's RDN.
    #[serde(default)]
    pub rdn: bool,
}

impl AttributeMapping {
    /// Create an attribute mapping.
    pub fn new(name: impl Into<String>, expression: Expression) -> Self {
        Self {
            name: name.into(),
            expression,
            transform: None,
            rdn: false,
        }
    }

    /// Attribute taking the values of `alias.field`.
    pub fn variable(name: impl Into<String>, variable: impl Into<String>) -> Self {
        Self::new(name, Expression::variable(variable))
    }

    /// Attribute holding a constant.
    pub fn constant(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, Expression::constant(value))
    }

    /// Mark the attribute as RDN-contributing.
    pub fn rdn(mut self) -> Self {
        self.rdn = true;
        self
    }

    /// Set the transform.
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }
}

/// Value expression of a field or attribute mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Expression {
    /// A constant value.
    Constant { value: String },
    /// All values bound to a name (`alias.field` or an attribute type).
    Variable { name: String },
    /// First values of several expressions joined by a separator.
    Concat {
        parts: Vec<Expression>,
        #[serde(default)]
        separator: String,
    },
    /// `${name}` substitution; every operand must resolve.
    Template { template: String },
}

impl Expression {
    /// Create a constant expression.
    pub fn constant(value: impl Into<String>) -> Self {
        Expression::Constant {
            value: value.into(),
        }
    }

    /// Create a variable expression.
    pub fn variable(name: impl Into<String>) -> Self {
        Expression::Variable { name: name.into() }
    }

    /// Create a template expression.
    pub fn template(template: impl Into<String>) -> Self {
        Expression::Template {
            template: template.into(),
        }
    }

    /// Check if the expression is a constant.
    pub fn is_constant(&self) -> bool {
        matches!(self, Expression::Constant { .. })
    }
}

/// Transformation applied to each produced value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Transform {
    /// Convert to lowercase.
    Lowercase,
    /// Convert to uppercase.
    Uppercase,
    /// Trim whitespace.
    Trim,
    /// Replace occurrences.
    Replace { from: String, to: String },
    /// Substring extraction by character index.
    Substring {
        start: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        end: Option<usize>,
    },
    /// Regex capture (group 0 is the whole match).
    Regex {
        pattern: String,
        #[serde(default)]
        group: usize,
    },
    /// Use a default when the value is empty.
    Default { value: String },
    /// Apply transforms in order.
    Chain { transforms: Vec<Transform> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_reference() {
        let field = FieldMapping::variable("groupname", "g.groupname");
        let reference = field.reference().unwrap();
        assert_eq!(reference.alias, "g");
        assert_eq!(reference.field, "groupname");
        assert_eq!(reference.key(), "g.groupname");
        assert!(field.attribute().is_none());

        let field = FieldMapping::variable("groupname", "cn");
        assert!(field.reference().is_none());
        assert_eq!(field.attribute(), Some("cn"));

        assert!(FieldMapping::constant("kind", "x").reference().is_none());
    }

    #[test]
    fn test_references_skip_own_alias() {
        let source = SourceMapping::new("m", "members")
            .with_field(FieldMapping::variable("groupname", "g.groupname"))
            .with_field(FieldMapping::variable("member", "m.member"));

        let refs: Vec<String> = source.references().map(|(_, r)| r.key()).collect();
        assert_eq!(refs, vec!["g.groupname".to_string()]);
    }

    #[test]
    fn test_capabilities() {
        let source = SourceMapping::new("g", "groups")
            .with_capability(OperationKind::Bind, Capability::Disabled);

        assert_eq!(source.capability(OperationKind::Bind), Capability::Disabled);
        assert_eq!(source.capability(OperationKind::Add), Capability::Required);
    }

    #[test]
    fn test_rdn_types() {
        let entry = EntryMapping::new("group")
            .with_attribute(AttributeMapping::variable("cn", "g.groupname").rdn())
            .with_attribute(AttributeMapping::variable("description", "g.description"));

        assert_eq!(entry.rdn_types(), vec!["cn".to_string()]);
        assert!(entry.is_static());
    }

    #[test]
    fn test_entry_mapping_deserialization() {
        let json = r#"{
            "id": "group",
            "parent_id": "groups",
            "object_classes": ["groupOfUniqueNames"],
            "sources": [{
                "alias": "g",
                "source": "groups",
                "fields": [
                    {"name": "groupname", "expression": {"type": "variable", "name": "cn"}}
                ],
                "capabilities": {"bind": "disabled"}
            }],
            "attributes": [
                {"name": "cn", "expression": {"type": "variable", "name": "g.groupname"}, "rdn": true},
                {"name": "description", "expression": {"type": "variable", "name": "g.description"},
                 "transform": {"type": "trim"}}
            ]
        }"#;

        let entry: EntryMapping = serde_json::from_str(json).unwrap();
        assert_eq!(entry.parent_id.as_deref(), Some("groups"));
        assert_eq!(entry.primary_source().unwrap().alias, "g");
        assert_eq!(
            entry.primary_source().unwrap().capability(OperationKind::Bind),
            Capability::Disabled
        );
        assert!(!entry.primary_source().unwrap().read_only);
        assert_eq!(entry.rdn_attributes().count(), 1);
        assert_eq!(entry.attributes[1].transform, Some(Transform::Trim));
    }
}
