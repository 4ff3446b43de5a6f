//! Expression interpreter.
//!
//! Evaluates field and attribute expressions against an immutable
//! [`ValueContext`]. The interpreter holds no per-row state, so one instance
//! can be shared by every join stage.

use regex::Regex;

use crate::error::EvaluationError;
use crate::mapping::{AttributeMapping, Expression, FieldMapping, Transform};
use crate::values::Lookup;

// Supports dotted keys such as ${g.groupname}.
const TEMPLATE_PATTERN: &str = r"\$\{([\w.\-]+)\}";

/// Ordered stack of read-only lookups; the first layer binding a name wins.
#[derive(Clone, Default)]
pub struct ValueContext<'a> {
    layers: Vec<&'a dyn Lookup>,
}

impl<'a> ValueContext<'a> {
    /// Create an empty context.
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    /// Add a lower-priority layer.
    #[must_use]
    pub fn with(mut self, layer: &'a dyn Lookup) -> Self {
        self.layers.push(layer);
        self
    }

    /// Values bound to `name`, empty when unbound.
    pub fn get(&self, name: &str) -> &'a [String] {
        self.layers
            .iter()
            .copied()
            .find_map(|layer: &'a dyn Lookup| layer.lookup(name))
            .unwrap_or(&[])
    }
}

impl std::fmt::Debug for ValueContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueContext")
            .field("layers", &self.layers.len())
            .finish()
    }
}

/// Stateless expression evaluator.
#[derive(Debug, Clone, Copy, Default)]
pub struct Interpreter;

impl Interpreter {
    /// Create a new interpreter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Evaluate a field mapping.
    pub fn eval_field(
        &self,
        field: &FieldMapping,
        context: &ValueContext<'_>,
    ) -> Result<Vec<String>, EvaluationError> {
        self.eval(&field.expression, field.transform.as_ref(), context)
    }

    /// Evaluate an attribute mapping.
    pub fn eval_attribute(
        &self,
        attribute: &AttributeMapping,
        context: &ValueContext<'_>,
    ) -> Result<Vec<String>, EvaluationError> {
        self.eval(&attribute.expression, attribute.transform.as_ref(), context)
    }

    /// Evaluate an expression and apply an optional transform to each value.
    ///
    /// An empty result means the value is absent. Empty strings are dropped.
    pub fn eval(
        &self,
        expression: &Expression,
        transform: Option<&Transform>,
        context: &ValueContext<'_>,
    ) -> Result<Vec<String>, EvaluationError> {
        let values = self.eval_expression(expression, context)?;

        let mut result = Vec::with_capacity(values.len());
        for value in values {
            let value = match transform {
                Some(transform) => self.apply_transform(transform, &value)?,
                None => value,
            };
            if !value.is_empty() && !result.contains(&value) {
                result.push(value);
            }
        }
        Ok(result)
    }

    fn eval_expression(
        &self,
        expression: &Expression,
        context: &ValueContext<'_>,
    ) -> Result<Vec<String>, EvaluationError> {
        match expression {
            Expression::Constant { value } => Ok(vec![value.clone()]),
            Expression::Variable { name } => Ok(context.get(name).to_vec()),
            Expression::Concat { parts, separator } => {
                let mut pieces = Vec::new();
                for part in parts {
                    if let Some(value) = self.eval_expression(part, context)?.into_iter().next() {
                        if !value.is_empty() {
                            pieces.push(value);
                        }
                    }
                }
                if pieces.is_empty() {
                    Ok(Vec::new())
                } else {
                    Ok(vec![pieces.join(separator)])
                }
            }
            Expression::Template { template } => {
                self.eval_template(template, context).map(|v| vec![v])
            }
        }
    }

    /// Substitute every `${name}` with the first value bound to `name`.
    fn eval_template(
        &self,
        template: &str,
        context: &ValueContext<'_>,
    ) -> Result<String, EvaluationError> {
        let re = Regex::new(TEMPLATE_PATTERN).map_err(|e| EvaluationError::InvalidRegex {
            pattern: TEMPLATE_PATTERN.to_string(),
            message: e.to_string(),
        })?;
        let mut result = String::with_capacity(template.len());
        let mut last = 0;

        for cap in re.captures_iter(template) {
            let (Some(full), Some(name)) = (cap.get(0), cap.get(1)) else {
                continue;
            };
            let value = context
                .get(name.as_str())
                .first()
                .ok_or_else(|| EvaluationError::Unresolved {
                    name: name.as_str().to_string(),
                })?;
            result.push_str(&template[last..full.start()]);
            result.push_str(value);
            last = full.end();
        }

        result.push_str(&template[last..]);
        Ok(result)
    }

    /// Apply a transformation to a value.
    pub fn apply_transform(
        &self,
        transform: &Transform,
        value: &str,
    ) -> Result<String, EvaluationError> {
        match transform {
            Transform::Lowercase => Ok(value.to_lowercase()),
            Transform::Uppercase => Ok(value.to_uppercase()),
            Transform::Trim => Ok(value.trim().to_string()),
            Transform::Replace { from, to } => Ok(value.replace(from, to)),
            Transform::Substring { start, end } => {
                let chars: Vec<char> = value.chars().collect();
                let start = (*start).min(chars.len());
                let end = end.map_or(chars.len(), |e| e.min(chars.len())).max(start);
                Ok(chars[start..end].iter().collect())
            }
            Transform::Regex { pattern, group } => {
                let re = Regex::new(pattern).map_err(|e| EvaluationError::InvalidRegex {
                    pattern: pattern.clone(),
                    message: e.to_string(),
                })?;
                Ok(re
                    .captures(value)
                    .and_then(|caps| caps.get(*group))
                    .map_or_else(String::new, |m| m.as_str().to_string()))
            }
            Transform::Default { value: default } => {
                if value.is_empty() {
                    Ok(default.clone())
                } else {
                    Ok(value.to_string())
                }
            }
            Transform::Chain { transforms } => {
                let mut current = value.to_string();
                for t in transforms {
                    current = self.apply_transform(t, &current)?;
                }
                Ok(current)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::values::{Attributes, SourceValues};

    fn source_values() -> SourceValues {
        let mut values = SourceValues::new()
            .with("g.groupname", "acme")
            .with("g.description", "  Desc One ");
        values.add("m.member", ["alice", "bob"]);
        values
    }

    #[test]
    fn test_variable_is_multi_valued() {
        let values = source_values();
        let context = ValueContext::new().with(&values);
        let result = Interpreter::new()
            .eval(&Expression::variable("m.member"), None, &context)
            .unwrap();
        assert_eq!(result, vec!["alice".to_string(), "bob".to_string()]);
    }

    #[test]
    fn test_unbound_variable_is_absent() {
        let values = source_values();
        let context = ValueContext::new().with(&values);
        let result = Interpreter::new()
            .eval(&Expression::variable("x.missing"), None, &context)
            .unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_layers_first_binding_wins() {
        let rdn = Attributes::new().with("cn", "from-rdn");
        let attrs = Attributes::new()
            .with("cn", "from-entry")
            .with("description", "d");
        let context = ValueContext::new().with(&rdn).with(&attrs);

        assert_eq!(context.get("cn"), &["from-rdn".to_string()]);
        assert_eq!(context.get("description"), &["d".to_string()]);
        assert!(context.get("sn").is_empty());
    }

    #[test]
    fn test_template_substitution() {
        let values = source_values();
        let context = ValueContext::new().with(&values);
        let result = Interpreter::new()
            .eval(
                &Expression::template("cn=${g.groupname},ou=groups"),
                None,
                &context,
            )
            .unwrap();
        assert_eq!(result, vec!["cn=acme,ou=groups".to_string()]);
    }

    #[test]
    fn test_template_unresolved_operand() {
        let values = source_values();
        let context = ValueContext::new().with(&values);
        let err = Interpreter::new()
            .eval(&Expression::template("${u.uid}"), None, &context)
            .unwrap_err();
        assert_eq!(
            err,
            EvaluationError::Unresolved {
                name: "u.uid".to_string()
            }
        );
    }

    #[test]
    fn test_concat_skips_missing_parts() {
        let values = source_values();
        let context = ValueContext::new().with(&values);
        let expression = Expression::Concat {
            parts: vec![
                Expression::variable("g.groupname"),
                Expression::variable("x.missing"),
                Expression::constant("team"),
            ],
            separator: "-".to_string(),
        };
        let result = Interpreter::new().eval(&expression, None, &context).unwrap();
        assert_eq!(result, vec!["acme-team".to_string()]);
    }

    #[test]
    fn test_transform_applied_per_value() {
        let values = source_values();
        let context = ValueContext::new().with(&values);
        let field = FieldMapping::variable("description", "g.description")
            .with_transform(Transform::Chain {
                transforms: vec![Transform::Trim, Transform::Lowercase],
            });
        let result = Interpreter::new().eval_field(&field, &context).unwrap();
        assert_eq!(result, vec!["desc one".to_string()]);
    }

    #[test]
    fn test_transform_substring_and_regex() {
        let interpreter = Interpreter::new();
        assert_eq!(
            interpreter
                .apply_transform(&Transform::Substring { start: 6, end: None }, "hello world")
                .unwrap(),
            "world"
        );
        assert_eq!(
            interpreter
                .apply_transform(&Transform::Substring { start: 4, end: Some(2) }, "hello")
                .unwrap(),
            ""
        );
        assert_eq!(
            interpreter
                .apply_transform(
                    &Transform::Regex {
                        pattern: r"@(.+)$".to_string(),
                        group: 1,
                    },
                    "john@example.com",
                )
                .unwrap(),
            "example.com"
        );
    }

    #[test]
    fn test_invalid_regex_is_an_evaluation_error() {
        let err = Interpreter::new()
            .apply_transform(
                &Transform::Regex {
                    pattern: "(".to_string(),
                    group: 0,
                },
                "x",
            )
            .unwrap_err();
        assert!(matches!(err, EvaluationError::InvalidRegex { .. }));
    }

    #[test]
    fn test_default_and_empty_values() {
        let attrs = Attributes::new();
        let context = ValueContext::new().with(&attrs);
        let interpreter = Interpreter::new();

        let result = interpreter
            .eval(
                &Expression::constant(""),
                Some(&Transform::Default {
                    value: "n/a".to_string(),
                }),
                &context,
            )
            .unwrap();
        assert_eq!(result, vec!["n/a".to_string()]);

        let result = interpreter
            .eval(&Expression::constant(""), None, &context)
            .unwrap();
        assert!(result.is_empty());
    }
}
