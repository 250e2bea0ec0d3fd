//! State upgrades between schema versions.
//!
//! When a resource's identity encoding changes, its schema version is bumped
//! and a [`StateUpgrader`] for the previous version is registered. Persisted
//! state from any older version is carried forward by applying the upgraders
//! in order, once per transition:
//!
//! ```text
//! V0 --upgrader(0)--> V1 --upgrader(1)--> V2 ...
//! ```
//!
//! Upgraders see the raw, untyped state document because the typed state of
//! the current version cannot describe older layouts. The helpers in this
//! module read legacy fields defensively: numbers may be persisted as strings,
//! integers or floats, and missing or malformed values fail the upgrade
//! instead of producing a zero-valued identity.

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{ProviderError, Result};

/// Raw persisted state of a single resource instance.
pub type RawState = Map<String, Value>;

/// Signature of a single-version upgrade.
pub type UpgradeFn = fn(RawState) -> Result<RawState>;

/// Upgrades state persisted by schema `version` to `version + 1`.
#[derive(Debug, Clone, Copy)]
pub struct StateUpgrader {
    /// The schema version this upgrader reads.
    pub version: u64,
    /// The transformation.
    pub upgrade: UpgradeFn,
}

impl StateUpgrader {
    /// Create a new upgrader for `version`.
    pub const fn new(version: u64, upgrade: UpgradeFn) -> Self {
        Self { version, upgrade }
    }
}

/// Apply every upgrader from `from` up to (excluding) `to`.
///
/// State at the current version is returned unchanged. State from a newer
/// version than the provider knows is rejected; there is no downgrade path.
pub fn upgrade_state(
    resource_type: &str,
    upgraders: &[StateUpgrader],
    from: u64,
    to: u64,
    state: Value,
) -> Result<Value> {
    if from > to {
        return Err(ProviderError::Validation(format!(
            "{} state has schema version {} but this provider only knows version {}",
            resource_type, from, to
        )));
    }
    if from == to {
        return Ok(state);
    }

    let mut raw = match state {
        Value::Object(map) => map,
        other => {
            return Err(ProviderError::Validation(format!(
                "{} state must be an object, got {}",
                resource_type,
                type_name(&other)
            )))
        }
    };

    for version in from..to {
        let upgrader = upgraders
            .iter()
            .find(|u| u.version == version)
            .ok_or_else(|| {
                ProviderError::Registration(format!(
                    "{} has no state upgrader for version {}",
                    resource_type, version
                ))
            })?;
        debug!(resource_type, version, "applying state upgrader");
        raw = (upgrader.upgrade)(raw)?;
    }

    Ok(Value::Object(raw))
}

/// Read a legacy string field. Empty strings and nulls count as absent.
pub fn legacy_string(state: &RawState, field: &str) -> Result<Option<String>> {
    match state.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(Value::Number(n)) => match n.as_f64() {
            Some(f) if n.as_i64().is_none() => match whole_i64(f) {
                Some(i) => Ok(Some(i.to_string())),
                None => Ok(Some(n.to_string())),
            },
            _ => Ok(Some(n.to_string())),
        },
        Some(other) => Err(ProviderError::Validation(format!(
            "legacy field '{}' must be a string, got {}",
            field,
            type_name(other)
        ))),
    }
}

/// Read a required legacy string field.
pub fn required_legacy_string(state: &RawState, field: &str) -> Result<String> {
    legacy_string(state, field)?.ok_or_else(|| {
        ProviderError::Validation(format!("legacy state is missing required field '{}'", field))
    })
}

/// Read a required legacy integer field.
///
/// Accepts `42`, `42.0` and `"42"`; anything with a fractional part or that
/// does not parse fails with an error naming the offending value.
pub fn legacy_int(state: &RawState, field: &str) -> Result<i64> {
    let value = state.get(field).ok_or_else(|| {
        ProviderError::Validation(format!("legacy state is missing required field '{}'", field))
    })?;
    let invalid = || {
        ProviderError::Validation(format!(
            "legacy field '{}' is not an integer: {}",
            field, value
        ))
    };
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i)
            } else {
                n.as_f64().and_then(whole_i64).ok_or_else(invalid)
            }
        }
        Value::String(s) => s.trim().parse::<i64>().map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A float with no fractional part inside `[-2^63, 2^63)`. `i64::MAX as f64`
/// rounds up to 2^63, so the upper bound is exclusive.
fn whole_i64(f: f64) -> Option<i64> {
    (f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64).then(|| f as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawState {
        match value {
            Value::Object(map) => map,
            _ => panic!("test state must be an object"),
        }
    }

    fn add_suffix(mut state: RawState) -> Result<RawState> {
        let id = required_legacy_string(&state, "id")?;
        state.insert("id".into(), json!(format!("{}:a", id)));
        Ok(state)
    }

    fn add_second_suffix(mut state: RawState) -> Result<RawState> {
        let id = required_legacy_string(&state, "id")?;
        state.insert("id".into(), json!(format!("{}:b", id)));
        Ok(state)
    }

    const CHAIN: &[StateUpgrader] = &[
        StateUpgrader::new(1, add_second_suffix),
        StateUpgrader::new(0, add_suffix),
    ];

    #[test]
    fn test_chain_applies_in_version_order() {
        let upgraded = upgrade_state("t", CHAIN, 0, 2, json!({"id": "x"})).unwrap();
        assert_eq!(upgraded["id"], "x:a:b");

        let upgraded = upgrade_state("t", CHAIN, 1, 2, json!({"id": "x"})).unwrap();
        assert_eq!(upgraded["id"], "x:b");
    }

    #[test]
    fn test_current_version_passes_through() {
        let state = json!({"id": "anything", "other": 1});
        assert_eq!(upgrade_state("t", CHAIN, 2, 2, state.clone()).unwrap(), state);
    }

    #[test]
    fn test_newer_state_is_rejected() {
        let err = upgrade_state("t", CHAIN, 3, 2, json!({})).unwrap_err();
        assert!(err.to_string().contains("schema version 3"));
    }

    #[test]
    fn test_missing_upgrader_is_reported() {
        let err = upgrade_state("t", &CHAIN[..1], 0, 2, json!({"id": "x"})).unwrap_err();
        assert!(matches!(err, ProviderError::Registration(_)));
    }

    #[test]
    fn test_non_object_state_is_rejected() {
        assert!(upgrade_state("t", CHAIN, 0, 2, json!("x")).is_err());
    }

    #[test]
    fn test_legacy_int_accepts_int_float_and_string() {
        let state = raw(json!({"a": 42, "b": 42.0, "c": "42", "d": 42.5, "e": "4x2", "f": true}));
        assert_eq!(legacy_int(&state, "a").unwrap(), 42);
        assert_eq!(legacy_int(&state, "b").unwrap(), 42);
        assert_eq!(legacy_int(&state, "c").unwrap(), 42);

        let err = legacy_int(&state, "d").unwrap_err();
        assert!(err.to_string().contains("42.5"));
        let err = legacy_int(&state, "e").unwrap_err();
        assert!(err.to_string().contains("4x2"));
        assert!(legacy_int(&state, "f").is_err());
        assert!(legacy_int(&state, "missing").is_err());
    }

    #[test]
    fn test_legacy_int_rejects_floats_past_i64() {
        let state = raw(json!({"max": 9223372036854775808.0, "min": -9223372036854775808.0}));
        let err = legacy_int(&state, "max").unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
        assert_eq!(legacy_int(&state, "min").unwrap(), i64::MIN);
        assert_ne!(
            legacy_string(&state, "max").unwrap(),
            Some(i64::MAX.to_string())
        );
    }

    #[test]
    fn test_legacy_string_treats_empty_as_absent() {
        let state = raw(json!({"a": "", "b": null, "c": "foo", "d": 7, "e": [1], "f": 99.0}));
        assert_eq!(legacy_string(&state, "a").unwrap(), None);
        assert_eq!(legacy_string(&state, "b").unwrap(), None);
        assert_eq!(legacy_string(&state, "missing").unwrap(), None);
        assert_eq!(legacy_string(&state, "c").unwrap(), Some("foo".into()));
        assert_eq!(legacy_string(&state, "d").unwrap(), Some("7".into()));
        assert_eq!(legacy_string(&state, "f").unwrap(), Some("99".into()));
        assert!(legacy_string(&state, "e").is_err());
        assert!(required_legacy_string(&state, "a").is_err());
    }
}
