//! JSON merge patch (RFC 7386) for status writes
//!
//! The reconciler never overwrites a stored object. It takes a snapshot at
//! the start of a pass, mutates a copy, and sends only the difference. Keys
//! this pass did not touch are absent from the patch, so concurrent writes to
//! them survive.

use serde_json::{Map, Value};

use crate::error::Result;
use crate::resource::Hostname;

/// A merge patch rooted at the object (e.g. `{"status": {...}}`)
#[derive(Debug, Clone, PartialEq)]
pub struct MergePatch(Value);

impl MergePatch {
    /// Build the status patch that turns `snapshot` into `mutated`
    pub fn status_from(snapshot: &Hostname, mutated: &Hostname) -> Result<Self> {
        let before = serde_json::to_value(&snapshot.status)?;
        let after = serde_json::to_value(&mutated.status)?;
        let status = diff(&before, &after).unwrap_or_else(|| Value::Object(Map::new()));

        let mut root = Map::new();
        root.insert("status".to_string(), status);
        Ok(Self(Value::Object(root)))
    }

    /// Wrap an already-formed merge patch document
    pub fn from_value(value: Value) -> Self {
        Self(value)
    }

    /// True when applying the patch would change nothing
    pub fn is_empty(&self) -> bool {
        match &self.0 {
            Value::Object(root) => root
                .values()
                .all(|v| matches!(v, Value::Object(m) if m.is_empty())),
            _ => false,
        }
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Apply in place to a JSON document
    pub fn apply_to(&self, doc: &mut Value) {
        json_patch::merge(doc, &self.0);
    }

    /// Apply to a typed resource, returning the patched copy
    pub fn apply_to_hostname(&self, hostname: &Hostname) -> Result<Hostname> {
        let mut doc = serde_json::to_value(hostname)?;
        self.apply_to(&mut doc);
        Ok(serde_json::from_value(doc)?)
    }
}

/// Compute the merge patch from `before` to `after`, or `None` if equal
fn diff(before: &Value, after: &Value) -> Option<Value> {
    if before == after {
        return None;
    }

    match (before, after) {
        (Value::Object(old), Value::Object(new)) => {
            let mut patch = Map::new();
            for (key, old_value) in old {
                match new.get(key) {
                    None => {
                        patch.insert(key.clone(), Value::Null);
                    }
                    Some(new_value) => {
                        if let Some(child) = diff(old_value, new_value) {
                            patch.insert(key.clone(), child);
                        }
                    }
                }
            }
            for (key, new_value) in new {
                if !old.contains_key(key) {
                    patch.insert(key.clone(), new_value.clone());
                }
            }
            Some(Value::Object(patch))
        }
        // Scalars and arrays are replaced whole
        _ => Some(after.clone()),
    }
}
