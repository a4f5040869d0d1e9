//! Applying a partial patch to the shared document.
//!
//! One pure function drives every write. How each top-level field is combined
//! is decided by a [`MergePolicy`] table rather than by the shape of the patch.

use std::collections::HashMap;

use serde_json::{Map, Value};

/// How a top-level field of the patch is combined with the current document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPolicy {
    /// The patch value replaces the current value.
    Replace,
    /// Object keys from the patch overwrite keys of the current object.
    ShallowMerge,
    /// Array items are upserted by their `id` field.
    MergeById,
}

/// Key holding the revision stamp inside the document. Never taken from a patch.
pub const REV_FIELD: &str = "rev";

const OBJECT_FIELDS: [&str; 4] = ["brand", "background", "layout", "payments"];
const ARRAY_FIELDS: [&str; 4] = ["categories", "tents", "reservations", "logs"];

/// Per-field merge table. Fields not listed fall back to [`FieldPolicy::Replace`].
#[derive(Debug, Clone)]
pub struct MergePolicy {
    fields: HashMap<String, FieldPolicy>,
}

impl Default for MergePolicy {
    /// Settings objects are shallow-merged, collections are replaced wholesale.
    fn default() -> Self {
        let mut fields = HashMap::new();
        for name in OBJECT_FIELDS {
            fields.insert(name.to_string(), FieldPolicy::ShallowMerge);
        }
        for name in ARRAY_FIELDS {
            fields.insert(name.to_string(), FieldPolicy::Replace);
        }
        Self { fields }
    }
}

impl MergePolicy {
    /// Like the default, but collections are upserted by `id`.
    pub fn upsert_arrays() -> Self {
        let mut policy = Self::default();
        for name in ARRAY_FIELDS {
            policy = policy.with(name, FieldPolicy::MergeById);
        }
        policy
    }

    pub fn with(mut self, field: impl Into<String>, policy: FieldPolicy) -> Self {
        self.fields.insert(field.into(), policy);
        self
    }

    /// Copy of this table where every array carried by `patch` replaces the
    /// current one. Used for patches that hold complete collections.
    pub fn replacing_arrays_of(&self, patch: &Value) -> Self {
        let mut policy = self.clone();
        if let Value::Object(map) = patch {
            for (key, value) in map {
                if value.is_array() {
                    policy.fields.insert(key.clone(), FieldPolicy::Replace);
                }
            }
        }
        policy
    }

    pub fn policy_for(&self, field: &str) -> FieldPolicy {
        self.fields
            .get(field)
            .copied()
            .unwrap_or(FieldPolicy::Replace)
    }
}

/// Combine `patch` into `current` field by field.
///
/// A non-object `current` reads as `{}`. A non-object `patch` changes nothing.
/// Known object fields missing from the result come back as `{}`, known array
/// fields as `[]`.
pub fn merge_document(current: &Value, patch: &Value, policy: &MergePolicy) -> Value {
    let mut out = match current {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };

    if let Value::Object(patch) = patch {
        for (key, incoming) in patch {
            if key == REV_FIELD {
                continue;
            }
            let merged = match policy.policy_for(key) {
                FieldPolicy::Replace => incoming.clone(),
                FieldPolicy::ShallowMerge => shallow_merge(out.get(key), incoming),
                FieldPolicy::MergeById => merge_by_id(out.get(key), incoming),
            };
            out.insert(key.clone(), merged);
        }
    }

    for name in OBJECT_FIELDS {
        if !out.get(name).is_some_and(Value::is_object) {
            out.insert(name.to_string(), Value::Object(Map::new()));
        }
    }
    for name in ARRAY_FIELDS {
        if !out.get(name).is_some_and(Value::is_array) {
            out.insert(name.to_string(), Value::Array(Vec::new()));
        }
    }

    Value::Object(out)
}

fn shallow_merge(current: Option<&Value>, incoming: &Value) -> Value {
    match (current, incoming) {
        (Some(Value::Object(base)), Value::Object(changes)) => {
            let mut merged = base.clone();
            for (key, value) in changes {
                merged.insert(key.clone(), value.clone());
            }
            Value::Object(merged)
        }
        _ => incoming.clone(),
    }
}

fn merge_by_id(current: Option<&Value>, incoming: &Value) -> Value {
    let Value::Array(items) = incoming else {
        return incoming.clone();
    };
    let mut merged = match current {
        Some(Value::Array(existing)) => existing.clone(),
        _ => Vec::new(),
    };

    for item in items {
        let position = item
            .get("id")
            .and_then(|id| merged.iter().position(|m| m.get("id") == Some(id)));
        match position {
            Some(i) => merged[i] = shallow_merge(Some(&merged[i]), item),
            None => merged.push(item.clone()),
        }
    }

    Value::Array(merged)
}
