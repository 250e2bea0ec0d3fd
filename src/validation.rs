//! Configuration validation against a [`Schema`].
//!
//! ```
//! use hemmer_provider_gitlab::schema::{Attribute, Schema};
//! use hemmer_provider_gitlab::validation::validate;
//! use serde_json::json;
//!
//! let schema = Schema::v0()
//!     .with_attribute("project", Attribute::required_string())
//!     .with_attribute("priority", Attribute::optional_int64());
//!
//! assert!(validate(&schema, &json!({"project": "foo/bar", "priority": 1})).is_empty());
//!
//! let diagnostics = validate(&schema, &json!({"project": "foo/bar", "priority": "high"}));
//! assert_eq!(diagnostics.len(), 1);
//! assert_eq!(diagnostics[0].attribute, Some("priority".to_string()));
//! ```

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};

use crate::schema::{Attribute, AttributeType, Diagnostic, Schema};

/// Validate a configuration value against a schema.
///
/// Rules:
/// - required attributes must be present and non-null
/// - computed-only attributes cannot be set
/// - attributes the schema does not declare are rejected
/// - values must match the declared type, and sets must not repeat elements
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let obj = match value {
        Value::Object(map) => map,
        Value::Null => {
            let empty = Map::new();
            validate_attributes(schema, &empty, &mut diagnostics);
            return diagnostics;
        }
        other => {
            diagnostics.push(
                Diagnostic::error("Expected object").with_detail(format!(
                    "Got {}",
                    value_type_name(other)
                )),
            );
            return diagnostics;
        }
    };
    validate_attributes(schema, obj, &mut diagnostics);
    diagnostics
}

/// Like [`validate`], returning the diagnostics as the error.
pub fn validate_result(schema: &Schema, value: &Value) -> Result<(), Vec<Diagnostic>> {
    let diagnostics = validate(schema, value);
    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(diagnostics)
    }
}

/// Whether `value` is valid against `schema`.
pub fn is_valid(schema: &Schema, value: &Value) -> bool {
    validate(schema, value).is_empty()
}

fn validate_attributes(schema: &Schema, obj: &Map<String, Value>, diagnostics: &mut Vec<Diagnostic>) {
    for (name, attr) in &schema.attributes {
        validate_attribute(name, attr, obj.get(name), diagnostics);
    }
    for name in obj.keys() {
        if !schema.attributes.contains_key(name) {
            diagnostics.push(
                Diagnostic::error(format!("Unsupported attribute '{}'", name))
                    .with_detail("This attribute is not declared by the schema")
                    .with_attribute(name),
            );
        }
    }
}

fn validate_attribute(
    name: &str,
    attr: &Attribute,
    value: Option<&Value>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match value {
        None | Some(Value::Null) => {
            if attr.flags.required {
                diagnostics.push(
                    Diagnostic::error(format!("Missing required attribute '{}'", name))
                        .with_detail("This attribute is required and must be provided")
                        .with_attribute(name),
                );
            }
        }
        Some(_) if attr.flags.is_computed_only() => {
            diagnostics.push(
                Diagnostic::error(format!("Cannot set computed attribute '{}'", name))
                    .with_detail("This attribute is set by the provider")
                    .with_attribute(name),
            );
        }
        Some(v) => validate_type(&attr.attr_type, v, name, diagnostics),
    }
}

fn validate_type(attr_type: &AttributeType, value: &Value, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    match attr_type {
        AttributeType::String => {
            if !value.is_string() {
                diagnostics.push(type_error(path, "string", value));
            }
        }
        AttributeType::Int64 => {
            if !is_int64(value) {
                diagnostics.push(type_error(path, "int64", value));
            }
        }
        AttributeType::Bool => {
            if !value.is_boolean() {
                diagnostics.push(type_error(path, "bool", value));
            }
        }
        AttributeType::List(element_type) => match value.as_array() {
            Some(arr) => validate_elements(element_type, arr, path, diagnostics),
            None => diagnostics.push(type_error(path, "list", value)),
        },
        AttributeType::Set(element_type) => match value.as_array() {
            Some(arr) => {
                validate_elements(element_type, arr, path, diagnostics);
                let mut seen = HashSet::new();
                for elem in arr {
                    if !seen.insert(elem.to_string()) {
                        diagnostics.push(
                            Diagnostic::error(format!("Duplicate element in set '{}'", path))
                                .with_detail(format!("{} appears more than once", elem))
                                .with_attribute(path),
                        );
                    }
                }
            }
            None => diagnostics.push(type_error(path, "set", value)),
        },
        AttributeType::Object(attrs) => match value.as_object() {
            Some(obj) => validate_object(attrs, obj, path, diagnostics),
            None => diagnostics.push(type_error(path, "object", value)),
        },
    }
}

fn validate_elements(element_type: &AttributeType, arr: &[Value], path: &str, diagnostics: &mut Vec<Diagnostic>) {
    for (i, elem) in arr.iter().enumerate() {
        validate_type(element_type, elem, &format!("{}.{}", path, i), diagnostics);
    }
}

fn validate_object(
    attrs: &HashMap<String, AttributeType>,
    obj: &Map<String, Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    // Object members carry no flags, so only types are checked.
    for (name, attr_type) in attrs {
        if let Some(value) = obj.get(name).filter(|v| !v.is_null()) {
            validate_type(attr_type, value, &format!("{}.{}", path, name), diagnostics);
        }
    }
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn is_int64(value: &Value) -> bool {
    match value {
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(_), _) => true,
            (None, Some(f)) => f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64,
            _ => false,
        },
        _ => false,
    }
}

fn type_error(path: &str, expected: &str, got: &Value) -> Diagnostic {
    Diagnostic::error(format!("Invalid type for attribute '{}'", path))
        .with_detail(format!("Expected {}, got {}", expected, value_type_name(got)))
        .with_attribute(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, Schema};
    use serde_json::json;

    fn label_schema() -> Schema {
        Schema::new(1)
            .with_attribute("id", Attribute::computed_string())
            .with_attribute("project", Attribute::required_string())
            .with_attribute("name", Attribute::required_string())
            .with_attribute("priority", Attribute::optional_int64())
    }

    #[test]
    fn test_missing_required_attribute() {
        let diagnostics = validate(&label_schema(), &json!({"project": "foo/bar"}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Missing required attribute 'name'"));

        let diagnostics = validate(&label_schema(), &json!({"project": "foo/bar", "name": null}));
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn test_computed_attribute_cannot_be_set() {
        let diagnostics = validate(
            &label_schema(),
            &json!({"id": "foo/bar:bug", "project": "foo/bar", "name": "bug"}),
        );
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("id"));
    }

    #[test]
    fn test_unknown_attribute_is_rejected() {
        let diagnostics = validate(
            &label_schema(),
            &json!({"project": "foo/bar", "name": "bug", "colour": "red"}),
        );
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("colour"));
    }

    #[test]
    fn test_int64_accepts_integral_floats() {
        let schema = label_schema();
        assert!(is_valid(&schema, &json!({"project": "p", "name": "n", "priority": 2})));
        assert!(is_valid(&schema, &json!({"project": "p", "name": "n", "priority": 2.0})));
        assert!(!is_valid(&schema, &json!({"project": "p", "name": "n", "priority": 2.5})));
    }

    #[test]
    fn test_set_rejects_duplicates() {
        let schema = Schema::v0().with_attribute("scopes", Attribute::required_string_set());
        assert!(is_valid(&schema, &json!({"scopes": ["read_repository", "read_registry"]})));

        let diagnostics = validate(&schema, &json!({"scopes": ["api", "api"]}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Duplicate"));

        let diagnostics = validate(&schema, &json!({"scopes": ["api", 1]}));
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("scopes.1"));
    }

    #[test]
    fn test_object_list_types() {
        let schema = Schema::v0().with_attribute(
            "labels",
            Attribute::new(
                AttributeType::list(AttributeType::object([
                    ("name", AttributeType::String),
                    ("priority", AttributeType::Int64),
                ])),
                crate::schema::AttributeFlags::optional(),
            ),
        );
        assert!(is_valid(&schema, &json!({"labels": [{"name": "bug", "priority": null}]})));
        let diagnostics = validate(&schema, &json!({"labels": [{"name": 1}]}));
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("labels.0.name"));
    }

    #[test]
    fn test_root_must_be_object() {
        let diagnostics = validate(&label_schema(), &json!("foo"));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].summary, "Expected object");
        assert!(validate_result(&label_schema(), &json!({"project": "p", "name": "n"})).is_ok());
    }
}
