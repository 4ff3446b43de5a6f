//! Value propagation across sources.
//!
//! Down: fields that reference another alias receive its values before the
//! referencing source is searched. Up: a referenced field that is still
//! unbound receives the values of the field referencing it, so ancestor
//! RDNs resolve when a search is driven from a descendant entry.

use std::fmt;

use tracing::debug;

use xavyo_vdir_connector::interpreter::{Interpreter, ValueContext};
use xavyo_vdir_connector::mapping::{EntryMapping, SourceMapping};
use xavyo_vdir_connector::values::SourceValues;

/// A join key that could not be computed for the next source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingJoinKey {
    pub alias: String,
    pub field: String,
}

impl fmt::Display for MissingJoinKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.alias, self.field)
    }
}

/// Bind the referencing fields of `next` from the values of earlier sources.
///
/// References to an alias in `joined` are join keys: if one yields no
/// value the row cannot be joined and [`MissingJoinKey`] is returned.
/// References to any other alias are bound when a value is available.
pub fn propagate_down(
    interpreter: &Interpreter,
    next: &[&SourceMapping],
    joined: &[&str],
    values: &mut SourceValues,
) -> Result<(), MissingJoinKey> {
    for source in next {
        for (field, reference) in source.references() {
            let key = SourceValues::key(&source.alias, &field.name);
            if values.contains(&key) {
                continue;
            }

            let computed = {
                let context = ValueContext::new().with(&*values);
                interpreter.eval_field(field, &context)
            };

            match computed {
                Ok(found) if !found.is_empty() => values.set(key, found),
                outcome => {
                    if let Err(e) = outcome {
                        debug!(key = %key, error = %e, "Join key not evaluated");
                    }
                    if joined.contains(&reference.alias) {
                        return Err(MissingJoinKey {
                            alias: source.alias.clone(),
                            field: field.name.clone(),
                        });
                    }
                }
            }
        }
    }
    Ok(())
}

/// Fill unbound referenced fields from the fields referencing them, across
/// `lineage` (an entry mapping and its ancestors), until nothing changes.
pub fn propagate_up(lineage: &[&EntryMapping], values: &mut SourceValues) {
    loop {
        let mut changed = false;
        for entry in lineage {
            for source in &entry.sources {
                for (field, reference) in source.references() {
                    let target = reference.key();
                    if values.contains(&target) {
                        continue;
                    }
                    let Some(found) = values.get_field(&source.alias, &field.name) else {
                        continue;
                    };
                    let found = found.to_vec();
                    debug!(from = %SourceValues::key(&source.alias, &field.name), to = %target, "Propagating up");
                    values.set(target, found);
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }
}
