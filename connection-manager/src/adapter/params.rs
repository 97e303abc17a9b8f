//! Parameter schemas and validation.
//!
//! Adapters declare the config and connect parameters they need as static
//! [`ParamDef`] lists. Caller-supplied JSON maps are checked against those
//! lists by [`validate`], which is the only way to obtain a
//! [`ValidatedParams`] value. Adapters can therefore never be bound to
//! unchecked input.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

pub const PARAM_USERNAME: &str = "username";
pub const PARAM_PASSWORD: &str = "password";
pub const PARAM_TWO_FA_CODE: &str = "twoFACode";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Password,
    Bool,
    Int,
}

/// One declared parameter.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamDef {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub kind: ParamType,
    /// String form of the default; empty means "no default"
    pub def_value: &'static str,
    pub nullable: bool,
    /// Bounds for `Int` parameters
    pub min_value: i64,
    pub max_value: i64,
    pub group_name: &'static str,
}

impl ParamDef {
    pub const fn new(name: &'static str, kind: ParamType) -> Self {
        Self {
            name,
            kind,
            def_value: "",
            nullable: false,
            min_value: 0,
            max_value: 0,
            group_name: "",
        }
    }

    pub const fn with_default(mut self, def_value: &'static str) -> Self {
        self.def_value = def_value;
        self
    }

    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub const fn range(mut self, min_value: i64, max_value: i64) -> Self {
        self.min_value = min_value;
        self.max_value = max_value;
        self
    }

    /// Parses the declared default into a typed value.
    fn default_value(&self) -> Result<Option<ParamValue>, ParamError> {
        if self.def_value.is_empty() {
            return Ok(None);
        }

        let invalid = || ParamError::InvalidDefault {
            name: self.name.to_string(),
            value: self.def_value.to_string(),
        };

        let value = match self.kind {
            ParamType::String | ParamType::Password => ParamValue::Text(self.def_value.to_string()),
            ParamType::Bool => ParamValue::Flag(self.def_value.parse().map_err(|_| invalid())?),
            ParamType::Int => {
                let n: i64 = self.def_value.parse().map_err(|_| invalid())?;
                // Only defaults are range-checked; caller values are not.
                if n < self.min_value || n > self.max_value {
                    return Err(ParamError::OutOfRange {
                        name: self.name.to_string(),
                        value: n,
                        min: self.min_value,
                        max: self.max_value,
                    });
                }
                ParamValue::Number(n)
            }
        };

        Ok(Some(value))
    }

    /// Converts a caller-supplied JSON value, checking its type.
    fn accept(&self, value: &Value) -> Result<ParamValue, ParamError> {
        let mismatch = || ParamError::TypeMismatch {
            name: self.name.to_string(),
            expected: self.kind,
        };

        match self.kind {
            ParamType::String | ParamType::Password => value
                .as_str()
                .map(|s| ParamValue::Text(s.to_string()))
                .ok_or_else(mismatch),
            ParamType::Bool => value.as_bool().map(ParamValue::Flag).ok_or_else(mismatch),
            ParamType::Int => value.as_i64().map(ParamValue::Number).ok_or_else(mismatch),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParamError {
    #[error("missing mandatory parameter: {0}")]
    Missing(String),

    #[error("parameter '{name}' must be of type {expected:?}")]
    TypeMismatch { name: String, expected: ParamType },

    #[error("parameter '{name}' has an invalid default: {value}")]
    InvalidDefault { name: String, value: String },

    #[error("parameter '{name}' = {value} is outside [{min}, {max}]")]
    OutOfRange {
        name: String,
        value: i64,
        min: i64,
        max: i64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Text(String),
    Flag(bool),
    Number(i64),
}

/// Parameter map that has passed [`validate`].
///
/// Holds only declared parameters, with defaults filled in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidatedParams(BTreeMap<String, ParamValue>);

impl ValidatedParams {
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.0.get(name) {
            Some(ParamValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn flag(&self, name: &str) -> Option<bool> {
        match self.0.get(name) {
            Some(ParamValue::Flag(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn number(&self, name: &str) -> Option<i64> {
        match self.0.get(name) {
            Some(ParamValue::Number(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Validates `values` against `schema`, failing on the first bad field.
///
/// Absent (or null) values take the parameter default when there is one;
/// otherwise they are only accepted for nullable parameters. Keys not in
/// the schema are dropped.
pub fn validate(schema: &[ParamDef], values: &Map<String, Value>) -> Result<ValidatedParams, ParamError> {
    let mut validated = BTreeMap::new();

    for def in schema {
        match values.get(def.name).filter(|v| !v.is_null()) {
            Some(value) => {
                validated.insert(def.name.to_string(), def.accept(value)?);
            }
            None => match def.default_value()? {
                Some(value) => {
                    validated.insert(def.name.to_string(), value);
                }
                None if def.nullable => {}
                None => return Err(ParamError::Missing(def.name.to_string())),
            },
        }
    }

    Ok(ValidatedParams(validated))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SCHEMA: &[ParamDef] = &[
        ParamDef::new("username", ParamType::String),
        ParamDef::new("password", ParamType::Password),
        ParamDef::new("live", ParamType::Bool).with_default("false"),
        ParamDef::new("port", ParamType::Int).with_default("4001").range(1, 65535),
        ParamDef::new("note", ParamType::String).nullable(),
    ];

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_complete_input_is_accepted() {
        let params = validate(
            SCHEMA,
            &map(json!({"username": "alice", "password": "pw", "live": true, "port": 7497})),
        )
        .unwrap();

        assert_eq!(params.text("username"), Some("alice"));
        assert_eq!(params.text("password"), Some("pw"));
        assert_eq!(params.flag("live"), Some(true));
        assert_eq!(params.number("port"), Some(7497));
        assert_eq!(params.text("note"), None);
    }

    #[test]
    fn test_defaults_are_filled() {
        let params = validate(SCHEMA, &map(json!({"username": "alice", "password": "pw"}))).unwrap();
        assert_eq!(params.flag("live"), Some(false));
        assert_eq!(params.number("port"), Some(4001));
    }

    #[test]
    fn test_missing_mandatory_parameter() {
        let err = validate(SCHEMA, &map(json!({"username": "alice"}))).unwrap_err();
        assert_eq!(err, ParamError::Missing("password".to_string()));
        assert_eq!(err.to_string(), "missing mandatory parameter: password");
    }

    #[test]
    fn test_first_invalid_field_wins() {
        let err = validate(SCHEMA, &map(json!({"username": 1}))).unwrap_err();
        assert!(matches!(err, ParamError::TypeMismatch { ref name, .. } if name == "username"));
    }

    #[test]
    fn test_type_mismatches() {
        let err = validate(
            SCHEMA,
            &map(json!({"username": "a", "password": "b", "live": "yes"})),
        )
        .unwrap_err();
        assert_eq!(
            err,
            ParamError::TypeMismatch { name: "live".to_string(), expected: ParamType::Bool }
        );

        let err = validate(
            SCHEMA,
            &map(json!({"username": "a", "password": "b", "port": 1.5})),
        )
        .unwrap_err();
        assert_eq!(
            err,
            ParamError::TypeMismatch { name: "port".to_string(), expected: ParamType::Int }
        );
    }

    #[test]
    fn test_null_counts_as_absent() {
        let params = validate(
            SCHEMA,
            &map(json!({"username": "a", "password": "b", "note": null, "live": null})),
        )
        .unwrap();
        assert_eq!(params.text("note"), None);
        assert_eq!(params.flag("live"), Some(false));

        let err = validate(SCHEMA, &map(json!({"username": null, "password": "b"}))).unwrap_err();
        assert_eq!(err, ParamError::Missing("username".to_string()));
    }

    #[test]
    fn test_unknown_keys_are_dropped() {
        let params = validate(
            SCHEMA,
            &map(json!({"username": "a", "password": "b", "extra": 42})),
        )
        .unwrap();
        assert_eq!(params.number("extra"), None);
        assert_eq!(params.len(), 4);
    }

    #[test]
    fn test_caller_int_is_not_range_checked() {
        let params = validate(
            SCHEMA,
            &map(json!({"username": "a", "password": "b", "port": 70000})),
        )
        .unwrap();
        assert_eq!(params.number("port"), Some(70000));
    }

    #[test]
    fn test_out_of_range_default_is_rejected() {
        const BAD: &[ParamDef] = &[ParamDef::new("port", ParamType::Int).with_default("0").range(1, 10)];
        let err = validate(BAD, &Map::new()).unwrap_err();
        assert!(matches!(err, ParamError::OutOfRange { value: 0, .. }));
    }

    #[test]
    fn test_empty_schema_accepts_anything() {
        let params = validate(&[], &map(json!({"whatever": true}))).unwrap();
        assert!(params.is_empty());
    }
}
