//! Distinguished names.
//!
//! RFC 4514 parsing and formatting. A [`Dn`] stores its RDNs innermost
//! first, so `rdns()[0]` is the entry's own RDN. Attribute types compare
//! case-insensitively; values compare with ASCII case folding, which is
//! the matching rule of every naming attribute the engine synthesizes.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::values::Attributes;

/// Error parsing a DN string.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DnError {
    #[error("invalid DN '{dn}': {message}")]
    Syntax { dn: String, message: String },
}

impl DnError {
    fn syntax(dn: &str, message: impl Into<String>) -> Self {
        DnError::Syntax {
            dn: dn.to_string(),
            message: message.into(),
        }
    }
}

/// One `type=value` pair of an RDN.
#[derive(Debug, Clone, Eq)]
pub struct Ava {
    pub attr_type: String,
    pub value: String,
}

impl PartialEq for Ava {
    fn eq(&self, other: &Self) -> bool {
        self.attr_type.eq_ignore_ascii_case(&other.attr_type)
            && self.value.eq_ignore_ascii_case(&other.value)
    }
}

/// A relative distinguished name: one or more AVAs joined by `+`.
#[derive(Debug, Clone, Eq)]
pub struct Rdn {
    avas: Vec<Ava>,
}

impl Rdn {
    /// Create a single-valued RDN.
    pub fn new(attr_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            avas: vec![Ava {
                attr_type: attr_type.into(),
                value: value.into(),
            }],
        }
    }

    /// Create an RDN from its AVAs. Returns `None` when empty.
    pub fn from_avas(avas: Vec<Ava>) -> Option<Self> {
        (!avas.is_empty()).then_some(Self { avas })
    }

    /// Add another AVA using the builder pattern.
    pub fn and(mut self, attr_type: impl Into<String>, value: impl Into<String>) -> Self {
        self.avas.push(Ava {
            attr_type: attr_type.into(),
            value: value.into(),
        });
        self
    }

    /// The AVAs of this RDN.
    pub fn avas(&self) -> &[Ava] {
        &self.avas
    }

    /// Value of the first AVA with the given type.
    pub fn get(&self, attr_type: &str) -> Option<&str> {
        self.avas
            .iter()
            .find(|a| a.attr_type.eq_ignore_ascii_case(attr_type))
            .map(|a| a.value.as_str())
    }

    /// Attribute types of this RDN, lowercased and sorted.
    pub fn types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.avas.iter().map(|a| a.attr_type.to_lowercase()).collect();
        types.sort();
        types.dedup();
        types
    }

    /// The RDN as an attribute set, for expression evaluation.
    pub fn to_attributes(&self) -> Attributes {
        let mut attributes = Attributes::new();
        for ava in &self.avas {
            attributes.add_value(ava.attr_type.clone(), ava.value.clone());
        }
        attributes
    }

    fn parse(input: &str, dn: &str) -> Result<Self, DnError> {
        let mut avas = Vec::new();
        for part in split_unescaped(input, '+') {
            let (attr_type, value) = split_once_unescaped(part, '=')
                .ok_or_else(|| DnError::syntax(dn, format!("missing '=' in '{part}'")))?;
            let attr_type = attr_type.trim();
            if attr_type.is_empty() {
                return Err(DnError::syntax(dn, "empty attribute type"));
            }
            avas.push(Ava {
                attr_type: attr_type.to_string(),
                value: unescape_value(value.trim(), dn)?,
            });
        }
        Ok(Self { avas })
    }
}

impl PartialEq for Rdn {
    fn eq(&self, other: &Self) -> bool {
        self.avas.len() == other.avas.len() && self.avas.iter().all(|a| other.avas.contains(a))
    }
}

impl fmt::Display for Rdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, ava) in self.avas.iter().enumerate() {
            if i > 0 {
                f.write_str("+")?;
            }
            write!(f, "{}={}", ava.attr_type, escape_value(&ava.value))?;
        }
        Ok(())
    }
}

/// A distinguished name, innermost RDN first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dn {
    rdns: Vec<Rdn>,
}

impl Dn {
    /// The root DSE (empty DN).
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse an RFC 4514 string.
    pub fn parse(input: &str) -> Result<Self, DnError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Ok(Self::root());
        }
        let rdns = split_unescaped(trimmed, ',')
            .into_iter()
            .map(|part| Rdn::parse(part, input))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rdns })
    }

    /// Build a DN from RDNs, innermost first.
    pub fn from_rdns(rdns: Vec<Rdn>) -> Self {
        Self { rdns }
    }

    /// RDNs, innermost first.
    pub fn rdns(&self) -> &[Rdn] {
        &self.rdns
    }

    /// The entry's own RDN.
    pub fn rdn(&self) -> Option<&Rdn> {
        self.rdns.first()
    }

    /// Number of RDNs.
    pub fn len(&self) -> usize {
        self.rdns.len()
    }

    /// Check if this is the root DN.
    pub fn is_root(&self) -> bool {
        self.rdns.is_empty()
    }

    /// The parent DN (root stays root).
    pub fn parent(&self) -> Dn {
        Dn {
            rdns: self.rdns.iter().skip(1).cloned().collect(),
        }
    }

    /// A child of this DN.
    pub fn child(&self, rdn: Rdn) -> Dn {
        let mut rdns = Vec::with_capacity(self.rdns.len() + 1);
        rdns.push(rdn);
        rdns.extend(self.rdns.iter().cloned());
        Dn { rdns }
    }

    /// Append `suffix` below this (relative) DN.
    pub fn append(&self, suffix: &Dn) -> Dn {
        let mut rdns = self.rdns.clone();
        rdns.extend(suffix.rdns.iter().cloned());
        Dn { rdns }
    }

    /// Check if this DN equals `suffix` or lies below it.
    pub fn ends_with(&self, suffix: &Dn) -> bool {
        self.rdns.len() >= suffix.rdns.len()
            && self.rdns[self.rdns.len() - suffix.rdns.len()..] == suffix.rdns[..]
    }

    /// RDNs above `suffix`, innermost first. `None` when not below `suffix`.
    pub fn relative_to(&self, suffix: &Dn) -> Option<&[Rdn]> {
        self.ends_with(suffix)
            .then(|| &self.rdns[..self.rdns.len() - suffix.rdns.len()])
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, rdn) in self.rdns.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{rdn}")?;
        }
        Ok(())
    }
}

impl FromStr for Dn {
    type Err = DnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Dn {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Dn {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Dn::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Split on `separator` where it is not escaped by a backslash.
fn split_unescaped(input: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, ch) in input.char_indices() {
        if escaped {
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == separator {
            parts.push(&input[start..i]);
            start = i + ch.len_utf8();
        }
    }
    parts.push(&input[start..]);
    parts
}

fn split_once_unescaped(input: &str, separator: char) -> Option<(&str, &str)> {
    let mut escaped = false;
    for (i, ch) in input.char_indices() {
        if escaped {
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == separator {
            return Some((&input[..i], &input[i + ch.len_utf8()..]));
        }
    }
    None
}

fn unescape_value(value: &str, dn: &str) -> Result<String, DnError> {
    let mut bytes = Vec::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        let next = chars
            .next()
            .ok_or_else(|| DnError::syntax(dn, "dangling escape"))?;
        if next.is_ascii_hexdigit() {
            let low = chars
                .next()
                .filter(char::is_ascii_hexdigit)
                .ok_or_else(|| DnError::syntax(dn, "truncated hex escape"))?;
            let byte = u8::from_str_radix(&format!("{next}{low}"), 16)
                .map_err(|e| DnError::syntax(dn, e.to_string()))?;
            bytes.push(byte);
        } else {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(next.encode_utf8(&mut buf).as_bytes());
        }
    }
    String::from_utf8(bytes).map_err(|e| DnError::syntax(dn, e.to_string()))
}

/// Escape special characters in DN attribute values per RFC 4514.
pub fn escape_value(value: &str) -> String {
    let count = value.chars().count();
    let mut result = String::with_capacity(value.len() * 2);

    for (i, ch) in value.chars().enumerate() {
        let is_first = i == 0;
        let is_last = i + 1 == count;

        match ch {
            ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=' => {
                result.push('\\');
                result.push(ch);
            }
            '\0' => result.push_str("\\00"),
            ' ' if is_first || is_last => result.push_str("\\20"),
            '#' if is_first => result.push_str("\\23"),
            _ => result.push(ch),
        }
    }

    result
}
