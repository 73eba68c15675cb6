//! Inbound contract: untyped host configuration → [`CallConfig`].
//!
//! [`parse_call_config`] is total over `serde_json::Value`. It either yields a
//! fully-typed config or exactly one [`ValidationError`] naming the first
//! offending property; it never accumulates and never touches the native
//! library.
//!
//! Check order is fixed: `backendId`, `field`, `hashId`, `profileId`,
//! `airPath`, `publicInputsJson`, then `friArity`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::ErrorValue;

/// Parameters shared by `prove` and `verify`.
///
/// Field names serialize in the camelCase spelling hosts use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallConfig {
    /// Backend identifier, e.g. `native@0.0`.
    pub backend_id: String,
    /// Field name, e.g. `Prime254`.
    pub field: String,
    /// Hash identifier, e.g. `blake3`.
    pub hash_id: String,
    /// FRI folding arity (≥ 1, fits in `u32`).
    pub fri_arity: u32,
    /// Proving profile identifier.
    pub profile_id: String,
    /// Path to the AIR program, passed through uninterpreted.
    pub air_path: String,
    /// Public inputs as JSON text; empty means "none".
    pub public_inputs_json: String,
}

/// First violation found while validating caller input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The configuration is not a JSON object.
    #[error("Configuration must be an object")]
    NotAnObject,
    /// A required property is absent.
    #[error("Missing required property '{0}'")]
    Missing(&'static str),
    /// A property that must be a string is something else.
    #[error("Property '{0}' must be a string")]
    NotAString(&'static str),
    /// A property that must be non-empty is empty.
    #[error("Property '{0}' must be a non-empty string")]
    Empty(&'static str),
    /// A string contains an interior NUL and cannot cross the C boundary.
    #[error("Property '{0}' must not contain NUL bytes")]
    InteriorNul(&'static str),
    /// `friArity` is not an integer in `1..=u32::MAX`.
    #[error("Property 'friArity' must be a positive integer")]
    FriArity,
}

impl From<ValidationError> for ErrorValue {
    fn from(err: ValidationError) -> Self {
        Self::invalid_argument(err.to_string())
    }
}

/// Validate `value` into a [`CallConfig`], stopping at the first violation.
pub fn parse_call_config(value: &Value) -> Result<CallConfig, ValidationError> {
    let obj = value.as_object().ok_or(ValidationError::NotAnObject)?;

    let backend_id = string_prop(obj, "backendId", false)?;
    let field = string_prop(obj, "field", false)?;
    let hash_id = string_prop(obj, "hashId", false)?;
    let profile_id = string_prop(obj, "profileId", false)?;
    let air_path = string_prop(obj, "airPath", false)?;
    let public_inputs_json = string_prop(obj, "publicInputsJson", true)?;

    let fri = obj
        .get("friArity")
        .ok_or(ValidationError::Missing("friArity"))?;
    let fri_arity = fri_arity(fri).ok_or(ValidationError::FriArity)?;

    Ok(CallConfig {
        backend_id,
        field,
        hash_id,
        fri_arity,
        profile_id,
        air_path,
        public_inputs_json,
    })
}

fn string_prop(
    obj: &Map<String, Value>,
    key: &'static str,
    allow_empty: bool,
) -> Result<String, ValidationError> {
    let value = obj.get(key).ok_or(ValidationError::Missing(key))?;
    let s = value.as_str().ok_or(ValidationError::NotAString(key))?;
    if !allow_empty && s.is_empty() {
        return Err(ValidationError::Empty(key));
    }
    if s.contains('\0') {
        return Err(ValidationError::InteriorNul(key));
    }
    Ok(s.to_owned())
}

/// Accept integers and integral floats in `1..=u32::MAX`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn fri_arity(value: &Value) -> Option<u32> {
    let Value::Number(n) = value else {
        return None;
    };
    if let Some(u) = n.as_u64() {
        return u32::try_from(u).ok().filter(|&a| a >= 1);
    }
    if n.is_i64() {
        // Negative integer.
        return None;
    }
    let f = n.as_f64()?;
    if !f.is_finite() || f.fract() != 0.0 || f < 1.0 || f > f64::from(u32::MAX) {
        return None;
    }
    Some(f as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> Value {
        json!({
            "backendId": "native@0.0",
            "field": "Prime254",
            "hashId": "blake3",
            "friArity": 2,
            "profileId": "balanced",
            "airPath": "examples/air/toy.air",
            "publicInputsJson": "{\"demo\":true,\"n\":7}",
        })
    }

    fn with(key: &str, v: Value) -> Value {
        let mut cfg = base();
        cfg[key] = v;
        cfg
    }

    fn without(key: &str) -> Value {
        let mut cfg = base();
        cfg.as_object_mut().unwrap().remove(key);
        cfg
    }

    #[test]
    fn accepts_complete_config() {
        let cfg = parse_call_config(&base()).unwrap();
        assert_eq!(cfg.backend_id, "native@0.0");
        assert_eq!(cfg.fri_arity, 2);
        assert_eq!(cfg.public_inputs_json, "{\"demo\":true,\"n\":7}");
    }

    #[test]
    fn non_object_is_rejected() {
        for v in [json!(null), json!([1, 2]), json!("cfg"), json!(3)] {
            assert_eq!(parse_call_config(&v), Err(ValidationError::NotAnObject));
        }
    }

    #[test]
    fn missing_fields_are_named_in_order() {
        assert_eq!(
            parse_call_config(&without("backendId")).unwrap_err().to_string(),
            "Missing required property 'backendId'"
        );
        // Both missing: the earlier key wins.
        let mut cfg = without("hashId");
        cfg.as_object_mut().unwrap().remove("airPath");
        assert_eq!(
            parse_call_config(&cfg),
            Err(ValidationError::Missing("hashId"))
        );
        assert_eq!(
            parse_call_config(&without("friArity")),
            Err(ValidationError::Missing("friArity"))
        );
    }

    #[test]
    fn string_rules() {
        assert_eq!(
            parse_call_config(&with("field", json!(7))),
            Err(ValidationError::NotAString("field"))
        );
        assert_eq!(
            parse_call_config(&with("profileId", json!(""))),
            Err(ValidationError::Empty("profileId"))
        );
        assert_eq!(
            parse_call_config(&with("airPath", json!("a\0b"))),
            Err(ValidationError::InteriorNul("airPath"))
        );
        let cfg = parse_call_config(&with("publicInputsJson", json!(""))).unwrap();
        assert!(cfg.public_inputs_json.is_empty());
    }

    #[test]
    fn fri_arity_domain() {
        for bad in [
            json!(0),
            json!(-1),
            json!(2.5),
            json!(0.5),
            json!(4_294_967_296_u64),
            json!(1e300),
            json!("2"),
            json!(null),
            json!(true),
        ] {
            assert_eq!(
                parse_call_config(&with("friArity", bad.clone())),
                Err(ValidationError::FriArity),
                "friArity {bad} should be rejected"
            );
        }
        for (good, want) in [
            (json!(1), 1),
            (json!(2.0), 2),
            (json!(4_294_967_295_u64), u32::MAX),
        ] {
            assert_eq!(
                parse_call_config(&with("friArity", good)).unwrap().fri_arity,
                want
            );
        }
    }

    #[test]
    fn converts_into_invalid_argument() {
        let err: ErrorValue = ValidationError::Missing("backendId").into();
        assert_eq!(err.code(), 1);
        assert_eq!(err.message(), "Invalid argument");
        assert_eq!(err.detail(), Some("Missing required property 'backendId'"));
    }

    #[test]
    fn serde_uses_camel_case() {
        let cfg = parse_call_config(&base()).unwrap();
        let v = serde_json::to_value(&cfg).unwrap();
        assert_eq!(v, base());
    }
}
