//! Connector Framework operation types
//!
//! Typed directory requests, search results and filters. Requests are
//! immutable for the duration of a call.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::dn::{Dn, Rdn};
use crate::types::{ModificationKind, Scope};
use crate::values::Attributes;

/// Add an entry.
#[derive(Debug, Clone)]
pub struct AddRequest {
    pub dn: Dn,
    pub attributes: Attributes,
}

impl AddRequest {
    pub fn new(dn: Dn, attributes: Attributes) -> Self {
        Self { dn, attributes }
    }
}

/// Delete an entry.
#[derive(Debug, Clone)]
pub struct DeleteRequest {
    pub dn: Dn,
}

impl DeleteRequest {
    pub fn new(dn: Dn) -> Self {
        Self { dn }
    }
}

/// One change of a modify request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modification {
    pub kind: ModificationKind,
    pub attribute: String,
    #[serde(default)]
    pub values: Vec<String>,
}

impl Modification {
    /// Add values to an attribute.
    pub fn add(attribute: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            kind: ModificationKind::Add,
            attribute: attribute.into(),
            values,
        }
    }

    /// Delete values (or the whole attribute when `values` is empty).
    pub fn delete(attribute: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            kind: ModificationKind::Delete,
            attribute: attribute.into(),
            values,
        }
    }

    /// Replace all values of an attribute.
    pub fn replace(attribute: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            kind: ModificationKind::Replace,
            attribute: attribute.into(),
            values,
        }
    }
}

/// Modify an entry.
#[derive(Debug, Clone)]
pub struct ModifyRequest {
    pub dn: Dn,
    pub modifications: Vec<Modification>,
}

impl ModifyRequest {
    pub fn new(dn: Dn, modifications: Vec<Modification>) -> Self {
        Self { dn, modifications }
    }
}

/// Rename an entry within its parent.
#[derive(Debug, Clone)]
pub struct ModRdnRequest {
    pub dn: Dn,
    pub new_rdn: Rdn,
    pub delete_old_rdn: bool,
}

impl ModRdnRequest {
    pub fn new(dn: Dn, new_rdn: Rdn, delete_old_rdn: bool) -> Self {
        Self {
            dn,
            new_rdn,
            delete_old_rdn,
        }
    }

    /// DN of the entry after the rename.
    pub fn new_dn(&self) -> Dn {
        self.dn.parent().child(self.new_rdn.clone())
    }
}

/// Simple bind.
#[derive(Clone)]
pub struct BindRequest {
    pub dn: Dn,
    pub password: String,
}

impl BindRequest {
    pub fn new(dn: Dn, password: impl Into<String>) -> Self {
        Self {
            dn,
            password: password.into(),
        }
    }
}

impl fmt::Debug for BindRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindRequest")
            .field("dn", &self.dn)
            .field("password", &"***")
            .finish()
    }
}

/// Search request.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub base: Dn,
    pub scope: Scope,
    pub filter: Filter,
    /// Maximum entries to return; 0 means unlimited.
    pub size_limit: usize,
    /// Attributes to return; empty or `*` means all.
    pub attributes: Vec<String>,
}

impl SearchRequest {
    /// Create a search for every entry in `scope` below `base`.
    pub fn new(base: Dn, scope: Scope) -> Self {
        Self {
            base,
            scope,
            filter: Filter::default(),
            size_limit: 0,
            attributes: Vec::new(),
        }
    }

    /// Set the filter.
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    /// Set the size limit.
    pub fn with_size_limit(mut self, size_limit: usize) -> Self {
        self.size_limit = size_limit;
        self
    }

    /// Set the requested attributes.
    pub fn with_attributes(mut self, attributes: Vec<String>) -> Self {
        self.attributes = attributes;
        self
    }

    /// Check if every attribute was requested.
    pub fn wants_all_attributes(&self) -> bool {
        self.attributes.is_empty() || self.attributes.iter().any(|a| a == "*")
    }
}

/// One entry of a search response.
///
/// Connectors return backend rows with `alias.field` attribute names and a
/// root DN unless the backend has native DNs; the engine emits virtual
/// entries with synthesized DNs and LDAP attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub dn: Dn,
    pub attributes: Attributes,
}

impl SearchResult {
    pub fn new(dn: Dn, attributes: Attributes) -> Self {
        Self { dn, attributes }
    }

    /// A backend row without a native DN.
    pub fn row(attributes: Attributes) -> Self {
        Self::new(Dn::root(), attributes)
    }
}

/// Search filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Filter {
    /// Attribute equals value.
    Equals { attribute: String, value: String },

    /// Attribute contains value (substring).
    Contains { attribute: String, value: String },

    /// Attribute starts with value.
    StartsWith { attribute: String, value: String },

    /// Attribute ends with value.
    EndsWith { attribute: String, value: String },

    /// Attribute is greater than or equal to value.
    GreaterThanOrEquals { attribute: String, value: String },

    /// Attribute is less than or equal to value.
    LessThanOrEquals { attribute: String, value: String },

    /// Attribute has any value.
    Present { attribute: String },

    /// Logical AND.
    And { filters: Vec<Filter> },

    /// Logical OR.
    Or { filters: Vec<Filter> },

    /// Logical NOT.
    Not { filter: Box<Filter> },
}

impl Default for Filter {
    fn default() -> Self {
        Filter::present("objectClass")
    }
}

impl Filter {
    /// Create an equals filter.
    pub fn eq(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Equals {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Create a contains filter.
    pub fn contains(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Contains {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Create a starts-with filter.
    pub fn starts_with(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::StartsWith {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Create a present filter.
    pub fn present(attribute: impl Into<String>) -> Self {
        Filter::Present {
            attribute: attribute.into(),
        }
    }

    /// Create an AND filter.
    pub fn and(filters: Vec<Filter>) -> Self {
        Filter::And { filters }
    }

    /// Create an OR filter.
    pub fn or(filters: Vec<Filter>) -> Self {
        Filter::Or { filters }
    }

    /// Create a NOT filter.
    pub fn negate(filter: Filter) -> Self {
        Filter::Not {
            filter: Box::new(filter),
        }
    }

    /// Evaluate the filter against an entry, ignoring case.
    pub fn matches(&self, attributes: &Attributes) -> bool {
        let any = |attribute: &str, test: &dyn Fn(&str) -> bool| {
            attributes
                .get(attribute)
                .is_some_and(|values| values.iter().any(|v| test(&v.to_lowercase())))
        };

        match self {
            Filter::Equals { attribute, value } => {
                let value = value.to_lowercase();
                any(attribute, &|v| v == value)
            }
            Filter::Contains { attribute, value } => {
                let value = value.to_lowercase();
                any(attribute, &|v| v.contains(&value))
            }
            Filter::StartsWith { attribute, value } => {
                let value = value.to_lowercase();
                any(attribute, &|v| v.starts_with(&value))
            }
            Filter::EndsWith { attribute, value } => {
                let value = value.to_lowercase();
                any(attribute, &|v| v.ends_with(&value))
            }
            Filter::GreaterThanOrEquals { attribute, value } => {
                let value = value.to_lowercase();
                any(attribute, &|v| v >= value.as_str())
            }
            Filter::LessThanOrEquals { attribute, value } => {
                let value = value.to_lowercase();
                any(attribute, &|v| v <= value.as_str())
            }
            // Every entry has an object class, synthesized or not.
            Filter::Present { attribute } => {
                attribute.eq_ignore_ascii_case("objectClass") || attributes.contains(attribute)
            }
            Filter::And { filters } => filters.iter().all(|f| f.matches(attributes)),
            Filter::Or { filters } => filters.iter().any(|f| f.matches(attributes)),
            Filter::Not { filter } => !filter.matches(attributes),
        }
    }
}

/// Escape special characters in LDAP filter values (RFC 4515).
fn escape_filter_value(value: &str) -> String {
    value
        .replace('\\', "\\5c")
        .replace('*', "\\2a")
        .replace('(', "\\28")
        .replace(')', "\\29")
        .replace('\0', "\\00")
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Equals { attribute, value } => {
                write!(f, "({}={})", attribute, escape_filter_value(value))
            }
            Filter::Contains { attribute, value } => {
                write!(f, "({}=*{}*)", attribute, escape_filter_value(value))
            }
            Filter::StartsWith { attribute, value } => {
                write!(f, "({}={}*)", attribute, escape_filter_value(value))
            }
            Filter::EndsWith { attribute, value } => {
                write!(f, "({}=*{})", attribute, escape_filter_value(value))
            }
            Filter::GreaterThanOrEquals { attribute, value } => {
                write!(f, "({}>={})", attribute, escape_filter_value(value))
            }
            Filter::LessThanOrEquals { attribute, value } => {
                write!(f, "({}<={})", attribute, escape_filter_value(value))
            }
            Filter::Present { attribute } => write!(f, "({attribute}=*)"),
            Filter::And { filters } => {
                f.write_str("(&")?;
                for filter in filters {
                    write!(f, "{filter}")?;
                }
                f.write_str(")")
            }
            Filter::Or { filters } => {
                f.write_str("(|")?;
                for filter in filters {
                    write!(f, "{filter}")?;
                }
                f.write_str(")")
            }
            Filter::Not { filter } => write!(f, "(!{filter})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> Attributes {
        Attributes::new()
            .with("cn", "Acme")
            .with("description", "Desc1")
            .with("objectClass", "groupOfNames")
    }

    #[test]
    fn test_filter_to_string() {
        let filter = Filter::and(vec![
            Filter::eq("cn", "a(b)"),
            Filter::negate(Filter::present("mail")),
            Filter::or(vec![Filter::starts_with("sn", "Do"), Filter::contains("o", "x*")]),
        ]);
        assert_eq!(
            filter.to_string(),
            r"(&(cn=a\28b\29)(!(mail=*))(|(sn=Do*)(o=*x\2a*)))"
        );
    }

    #[test]
    fn test_filter_matches_ignores_case() {
        let entry = entry();
        assert!(Filter::eq("CN", "acme").matches(&entry));
        assert!(Filter::starts_with("description", "desc").matches(&entry));
        assert!(Filter::contains("description", "SC1").matches(&entry));
        assert!(!Filter::eq("cn", "other").matches(&entry));
    }

    #[test]
    fn test_filter_boolean_combinators() {
        let entry = entry();
        assert!(Filter::and(vec![Filter::present("cn"), Filter::eq("cn", "acme")]).matches(&entry));
        assert!(Filter::or(vec![Filter::present("mail"), Filter::present("cn")]).matches(&entry));
        assert!(Filter::negate(Filter::present("mail")).matches(&entry));
        assert!(Filter::default().matches(&entry));
        assert!(Filter::default().matches(&Attributes::new()));
    }

    #[test]
    fn test_filter_ordering() {
        let entry = Attributes::new().with("uidNumber", "1500");
        assert!(Filter::GreaterThanOrEquals {
            attribute: "uidNumber".to_string(),
            value: "1000".to_string(),
        }
        .matches(&entry));
        assert!(!Filter::LessThanOrEquals {
            attribute: "uidNumber".to_string(),
            value: "1000".to_string(),
        }
        .matches(&entry));
    }

    #[test]
    fn test_modrdn_new_dn() {
        let request = ModRdnRequest::new(
            Dn::parse("cn=acme,ou=groups").unwrap(),
            Rdn::new("cn", "apex"),
            true,
        );
        assert_eq!(request.new_dn().to_string(), "cn=apex,ou=groups");
    }

    #[test]
    fn test_bind_request_debug_hides_password() {
        let request = BindRequest::new(Dn::parse("uid=a").unwrap(), "secret");
        assert!(!format!("{request:?}").contains("secret"));
    }

    #[test]
    fn test_search_request_attributes() {
        let request = SearchRequest::new(Dn::root(), Scope::Sub);
        assert!(request.wants_all_attributes());
        let request = request.with_attributes(vec!["cn".to_string()]);
        assert!(!request.wants_all_attributes());
    }
}
