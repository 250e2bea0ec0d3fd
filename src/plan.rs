//! Generic plan computation.
//!
//! Every resource plans the same way, driven by its [`Schema`]:
//!
//! - create: defaults fill unset attributes, every set attribute is added
//! - update: attributes the provider computes keep their prior value unless
//!   configured, the rest is compared; a change to a `force_new` attribute
//!   turns the update into a replacement
//! - delete: the planned state is `null`
//!
//! A missing attribute and an explicit `null` are the same thing. Sets compare
//! without regard to order.

use serde_json::{Map, Value};

use crate::error::{ProviderError, Result};
use crate::schema::{Attribute, AttributeType, Schema};
use crate::types::{AttributeChange, PlanResult};

/// Plan the transition from `prior` to `proposed`.
///
/// `prior` is `None` (or `null`) when the resource does not exist yet;
/// `proposed` is `null` when it should be destroyed.
pub fn plan(schema: &Schema, prior: Option<&Value>, proposed: &Value) -> Result<PlanResult> {
    let prior = prior.filter(|p| !p.is_null());
    match (prior, proposed) {
        (None, Value::Null) => Ok(PlanResult::no_change(Value::Null)),
        (Some(prior), Value::Null) => Ok(plan_delete(object(prior, "prior state")?)),
        (None, proposed) => Ok(plan_create(schema, object(proposed, "configuration")?)),
        (Some(prior), proposed) => Ok(plan_update(
            schema,
            object(prior, "prior state")?,
            object(proposed, "configuration")?,
        )),
    }
}

fn object<'a>(value: &'a Value, what: &str) -> Result<&'a Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| ProviderError::Validation(format!("{} must be an object, got {}", what, value)))
}

fn get<'a>(map: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    map.get(name).filter(|v| !v.is_null())
}

/// The configuration with defaults applied to unset attributes.
fn with_defaults(schema: &Schema, proposed: &Map<String, Value>) -> Map<String, Value> {
    let mut planned = proposed.clone();
    for (name, attr) in &schema.attributes {
        if let (None, Some(default)) = (get(proposed, name), &attr.default) {
            planned.insert(name.clone(), default.clone());
        }
    }
    planned
}

fn plan_create(schema: &Schema, proposed: &Map<String, Value>) -> PlanResult {
    let planned = with_defaults(schema, proposed);
    let changes = schema
        .attributes
        .keys()
        .filter_map(|name| get(&planned, name).map(|v| AttributeChange::added(name, v.clone())))
        .collect();
    PlanResult::with_changes(Value::Object(planned), changes, false)
}

fn plan_update(
    schema: &Schema,
    prior: &Map<String, Value>,
    proposed: &Map<String, Value>,
) -> PlanResult {
    let mut planned = with_defaults(schema, proposed);
    let mut changes = Vec::new();
    let mut requires_replace = false;

    for (name, attr) in &schema.attributes {
        let before = get(prior, name);
        if attr.flags.computed && get(&planned, name).is_none() {
            if let Some(before) = before {
                planned.insert(name.clone(), before.clone());
            }
            continue;
        }
        if attr.flags.is_computed_only() {
            continue;
        }
        let after = get(&planned, name);
        if equal(attr, before, after) {
            continue;
        }
        requires_replace |= attr.force_new;
        changes.push(AttributeChange::new(name, before.cloned(), after.cloned()));
    }

    if changes.is_empty() {
        return PlanResult::no_change(Value::Object(planned));
    }
    if requires_replace {
        // The replacement gets fresh provider-computed values.
        for (name, attr) in &schema.attributes {
            if attr.flags.is_computed_only() {
                planned.remove(name);
            }
        }
    }
    PlanResult::with_changes(Value::Object(planned), changes, requires_replace)
}

fn plan_delete(prior: &Map<String, Value>) -> PlanResult {
    let changes = prior
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(name, v)| AttributeChange::removed(name, v.clone()))
        .collect();
    PlanResult::with_changes(Value::Null, changes, false)
}

fn equal(attr: &Attribute, a: Option<&Value>, b: Option<&Value>) -> bool {
    match (&attr.attr_type, a, b) {
        (AttributeType::Set(_), Some(Value::Array(a)), Some(Value::Array(b))) => {
            let mut a: Vec<String> = a.iter().map(Value::to_string).collect();
            let mut b: Vec<String> = b.iter().map(Value::to_string).collect();
            a.sort();
            b.sort();
            a == b
        }
        (AttributeType::Int64, Some(Value::Number(a)), Some(Value::Number(b))) => {
            a.as_f64() == b.as_f64()
        }
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::new(1)
            .with_attribute("id", Attribute::computed_string())
            .with_attribute("project", Attribute::required_string().with_force_new())
            .with_attribute("url", Attribute::required_string())
            .with_attribute(
                "push_events",
                Attribute::optional_bool().with_default(json!(true)),
            )
            .with_attribute("username", Attribute::optional_computed_string())
            .with_attribute("scopes", Attribute::required_string_set())
            .with_attribute("description", Attribute::optional_string())
    }

    fn prior() -> Value {
        json!({
            "id": "99:1",
            "project": "99",
            "url": "https://a",
            "push_events": true,
            "username": "bot",
            "scopes": ["api", "read_repository"],
            "description": null
        })
    }

    #[test]
    fn test_create_fills_defaults() {
        let result = plan(
            &schema(),
            None,
            &json!({"project": "99", "url": "https://a", "scopes": ["api"]}),
        )
        .unwrap();
        assert_eq!(result.planned_state["push_events"], true);
        assert!(result.planned_state.get("id").is_none());
        let paths: Vec<&str> = result.changes.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, ["project", "push_events", "scopes", "url"]);
        assert!(!result.requires_replace);
    }

    #[test]
    fn test_unchanged_config_is_a_no_op() {
        let config = json!({
            "project": "99",
            "url": "https://a",
            "scopes": ["read_repository", "api"]
        });
        let result = plan(&schema(), Some(&prior()), &config).unwrap();
        assert!(!result.has_changes(), "{:?}", result.changes);
        assert_eq!(result.planned_state["id"], "99:1");
        assert_eq!(result.planned_state["username"], "bot");
    }

    #[test]
    fn test_in_place_update() {
        let config = json!({
            "project": "99",
            "url": "https://b",
            "scopes": ["api", "read_repository"],
            "description": "hook"
        });
        let result = plan(&schema(), Some(&prior()), &config).unwrap();
        assert!(!result.requires_replace);
        let paths: Vec<&str> = result.changes.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, ["description", "url"]);
        assert_eq!(result.planned_state["id"], "99:1");
    }

    #[test]
    fn test_force_new_replaces() {
        let config = json!({"project": "100", "url": "https://a", "scopes": ["api", "read_repository"]});
        let result = plan(&schema(), Some(&prior()), &config).unwrap();
        assert!(result.requires_replace);
        assert!(result.planned_state.get("id").is_none());
    }

    #[test]
    fn test_delete() {
        let result = plan(&schema(), Some(&prior()), &Value::Null).unwrap();
        assert!(result.is_delete());
        assert!(result.changes.iter().all(|c| c.after.is_none()));
        assert!(!result.changes.iter().any(|c| c.path == "description"));
    }

    #[test]
    fn test_rejects_non_objects() {
        assert!(plan(&schema(), None, &json!("x")).is_err());
    }
}
