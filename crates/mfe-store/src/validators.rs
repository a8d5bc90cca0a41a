//! Per-key write validation.
//!
//! A validator is a synchronous check run before any side effect of a write.
//! It rejects a value by returning `Err(reason)`. The table of validators is
//! fixed when the engine is built; configuration mistakes (empty or duplicate
//! keys) surface at build time rather than on the first write.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{StoreError, StoreResult};

/// A write check for one key.
pub type Validator = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

/// JSON value kinds, for [`of_kind`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
    Null,
    Bool,
    Number,
    String,
    Array,
    Object,
}

impl ValueKind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Bool,
            Value::Number(_) => Self::Number,
            Value::String(_) => Self::String,
            Value::Array(_) => Self::Array,
            Value::Object(_) => Self::Object,
        }
    }
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Number => "number",
            Self::String => "string",
            Self::Array => "array",
            Self::Object => "object",
        };
        write!(f, "{s}")
    }
}

/// Rejects `null`.
pub fn not_null() -> Validator {
    Arc::new(|value: &Value| -> Result<(), String> {
        match value {
            Value::Null => Err("value must not be null".into()),
            _ => Ok(()),
        }
    })
}

/// Accepts only values of `kind`.
pub fn of_kind(kind: ValueKind) -> Validator {
    Arc::new(move |value: &Value| -> Result<(), String> {
        let actual = ValueKind::of(value);
        if actual == kind {
            Ok(())
        } else {
            Err(format!("expected {kind}, got {actual}"))
        }
    })
}

/// Rejects values whose JSON encoding exceeds `max_bytes`.
pub fn max_serialized_len(max_bytes: usize) -> Validator {
    Arc::new(move |value: &Value| -> Result<(), String> {
        let len = serde_json::to_vec(value).map_err(|e| e.to_string())?.len();
        if len > max_bytes {
            Err(format!("encoded size {len} exceeds limit {max_bytes}"))
        } else {
            Ok(())
        }
    })
}

/// Immutable key-to-validator table.
#[derive(Clone, Default)]
pub struct ValidatorRegistry {
    validators: HashMap<String, Validator>,
}

impl ValidatorRegistry {
    /// Build a table from `(key, validator)` pairs.
    ///
    /// Fails on an empty key or on a key listed twice.
    pub fn from_entries<I>(entries: I) -> StoreResult<Self>
    where
        I: IntoIterator<Item = (String, Validator)>,
    {
        let mut validators = HashMap::new();
        for (key, validator) in entries {
            if key.is_empty() {
                return Err(StoreError::Config("validator key must not be empty".into()));
            }
            if validators.insert(key.clone(), validator).is_some() {
                return Err(StoreError::Config(format!(
                    "more than one validator registered for key {key:?}"
                )));
            }
        }
        Ok(Self { validators })
    }

    /// Run the validator for `key`, if any.
    pub fn check(&self, key: &str, value: &Value) -> StoreResult<()> {
        match self.validators.get(key) {
            Some(validator) => validator(value).map_err(|reason| StoreError::Validation {
                key: key.to_string(),
                reason,
            }),
            None => Ok(()),
        }
    }

    pub fn has_validator(&self, key: &str) -> bool {
        self.validators.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }
}

impl std::fmt::Debug for ValidatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<&String> = self.validators.keys().collect();
        keys.sort();
        f.debug_struct("ValidatorRegistry").field("keys", &keys).finish()
    }
}
