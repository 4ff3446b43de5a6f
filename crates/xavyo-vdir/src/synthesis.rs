//! DN and attribute synthesis.

use tracing::{debug, warn};

use xavyo_vdir_connector::dn::{Ava, Dn, Rdn};
use xavyo_vdir_connector::interpreter::{Interpreter, ValueContext};
use xavyo_vdir_connector::mapping::EntryMapping;
use xavyo_vdir_connector::values::{Attributes, SourceValues};

use crate::partition::Partition;

const OBJECT_CLASS: &str = "objectClass";

/// Evaluate every attribute mapping of `entry` against `values`.
///
/// Object classes come first. An attribute whose expression fails or yields
/// nothing is absent.
pub fn compute_attributes(
    interpreter: &Interpreter,
    entry: &EntryMapping,
    values: &SourceValues,
) -> Attributes {
    let context = ValueContext::new().with(values);
    let mut attributes = Attributes::new();

    if !entry.object_classes.is_empty() {
        attributes.add_values(OBJECT_CLASS, entry.object_classes.iter().cloned());
    }

    for mapping in &entry.attributes {
        match interpreter.eval_attribute(mapping, &context) {
            Ok(found) if !found.is_empty() => attributes.add_values(mapping.name.clone(), found),
            Ok(_) => {}
            Err(e) if mapping.rdn => {
                warn!(entry = %entry.id, attribute = %mapping.name, error = %e, "RDN attribute not evaluated");
            }
            Err(e) => {
                debug!(entry = %entry.id, attribute = %mapping.name, error = %e, "Attribute not evaluated");
            }
        }
    }
    attributes
}

/// Candidate RDNs of one mapping: the cross product of the values of its
/// RDN attributes. Empty when any RDN attribute has no value.
pub fn compute_rdns(interpreter: &Interpreter, entry: &EntryMapping, values: &SourceValues) -> Vec<Rdn> {
    let context = ValueContext::new().with(values);
    let mut candidates: Vec<Vec<Ava>> = vec![Vec::new()];

    for mapping in entry.rdn_attributes() {
        let found = match interpreter.eval_attribute(mapping, &context) {
            Ok(found) => found,
            Err(e) => {
                warn!(entry = %entry.id, attribute = %mapping.name, error = %e, "RDN attribute not evaluated");
                Vec::new()
            }
        };
        if found.is_empty() {
            return Vec::new();
        }

        candidates = candidates
            .into_iter()
            .flat_map(|avas| {
                found.iter().map(move |value| {
                    let mut avas = avas.clone();
                    avas.push(Ava {
                        attr_type: mapping.name.clone(),
                        value: value.clone(),
                    });
                    avas
                })
            })
            .collect();
    }

    candidates.into_iter().filter_map(Rdn::from_avas).collect()
}

/// Candidate DNs of an entry of `entry`: RDN candidates per level, from the
/// entry up to the root's children, crossed and appended to the suffix.
pub fn compute_dns(
    interpreter: &Interpreter,
    partition: &Partition,
    entry: &EntryMapping,
    values: &SourceValues,
) -> Vec<Dn> {
    let mut relative: Vec<Vec<Rdn>> = vec![Vec::new()];

    for mapping in partition.lineage(entry) {
        if partition.is_root(mapping) {
            break;
        }
        let rdns = compute_rdns(interpreter, mapping, values);
        if rdns.is_empty() {
            debug!(entry = %entry.id, level = %mapping.id, "No RDN for level");
            return Vec::new();
        }

        relative = relative
            .into_iter()
            .flat_map(|prefix| {
                rdns.iter().map(move |rdn| {
                    let mut prefix = prefix.clone();
                    prefix.push(rdn.clone());
                    prefix
                })
            })
            .collect();
    }

    relative
        .into_iter()
        .map(|rdns| Dn::from_rdns(rdns).append(partition.suffix()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use xavyo_vdir_connector::mapping::{AttributeMapping, SourceMapping};

    fn partition() -> Partition {
        Partition::new(
            "example",
            Dn::parse("dc=example,dc=com").unwrap(),
            vec![
                EntryMapping::new("root"),
                EntryMapping::new("groups")
                    .with_parent("root")
                    .with_attribute(AttributeMapping::constant("ou", "groups").rdn()),
                EntryMapping::new("group")
                    .with_parent("groups")
                    .with_object_class("groupOfNames")
                    .with_source(SourceMapping::new("g", "groups"))
                    .with_attribute(AttributeMapping::variable("cn", "g.groupname").rdn())
                    .with_attribute(AttributeMapping::variable("description", "g.description"))
                    .with_attribute(AttributeMapping::new(
                        "mail",
                        xavyo_vdir_connector::mapping::Expression::template("${g.groupname}@${g.domain}"),
                    )),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_compute_attributes() {
        let partition = partition();
        let entry = partition.mapping("group").unwrap();
        let values = SourceValues::new()
            .with("g.groupname", "acme")
            .with("g.description", "desc1");

        let attributes = compute_attributes(&Interpreter::new(), entry, &values);

        let names: Vec<&str> = attributes.names().collect();
        assert_eq!(names, vec!["objectClass", "cn", "description"]);
        assert!(!attributes.contains("mail"), "unresolved template is absent");
    }

    #[test]
    fn test_compute_dns() {
        let partition = partition();
        let entry = partition.mapping("group").unwrap();
        let values = SourceValues::new().with("g.groupname", "acme");

        let dns = compute_dns(&Interpreter::new(), &partition, entry, &values);
        assert_eq!(dns.len(), 1);
        assert_eq!(dns[0].to_string(), "cn=acme,ou=groups,dc=example,dc=com");
    }

    #[test]
    fn test_multi_valued_rdn_cross_product() {
        let partition = partition();
        let entry = partition.mapping("group").unwrap();
        let mut values = SourceValues::new();
        values.add("g.groupname", ["acme", "apex"]);

        let dns: Vec<String> = compute_dns(&Interpreter::new(), &partition, entry, &values)
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            dns,
            vec![
                "cn=acme,ou=groups,dc=example,dc=com".to_string(),
                "cn=apex,ou=groups,dc=example,dc=com".to_string(),
            ]
        );
    }

    #[test]
    fn test_missing_rdn_value_yields_no_dn() {
        let partition = partition();
        let entry = partition.mapping("group").unwrap();
        let dns = compute_dns(&Interpreter::new(), &partition, entry, &SourceValues::new());
        assert!(dns.is_empty());
    }

    #[test]
    fn test_root_dn_is_suffix() {
        let partition = partition();
        let dns = compute_dns(&Interpreter::new(), &partition, partition.root(), &SourceValues::new());
        assert_eq!(dns, vec![Dn::parse("dc=example,dc=com").unwrap()]);
    }
}
