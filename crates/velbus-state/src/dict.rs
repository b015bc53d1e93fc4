//! The nested observable mapping every module's state tree is built
//! from. Mutations return the patch they produced instead of pushing it
//! to a stored subscriber list directly — callers (a module, then its
//! channels) propagate the returned patch up the call chain themselves,
//! prefixing paths as they go. This avoids the parent back-pointer the
//! original dict-subclass used.

use serde_json::{Map, Value};

use crate::patch::{JsonPatchOp, PatchOp};

/// A JSON-serializable nested mapping. Every leaf and every nested
/// object must already be valid JSON — there is no escape hatch to
/// install a non-JSON value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObservableDict {
    data: Map<String, Value>,
}

impl ObservableDict {
    pub fn new() -> Self {
        Self { data: Map::new() }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Upsert a leaf value. Emits `add` (the dict makes no distinction
    /// between inserting a new key and overwriting an existing one).
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> JsonPatchOp {
        let value = value.into();
        self.data.insert(key.to_string(), value.clone());
        JsonPatchOp::add(vec![key.to_string()], value)
    }

    /// Removes `key`, returning the patch op if it was present.
    pub fn remove(&mut self, key: &str) -> Option<JsonPatchOp> {
        self.data.remove(key).map(|_| JsonPatchOp::remove(vec![key.to_string()]))
    }

    /// `clear`: a single `replace path=[] value={}`.
    pub fn clear(&mut self) -> JsonPatchOp {
        self.data.clear();
        JsonPatchOp::replace(vec![], Value::Object(Map::new()))
    }

    /// Atomically replace the whole tree with `other`.
    pub fn replace(&mut self, other: Map<String, Value>) -> JsonPatchOp {
        self.data = other.clone();
        JsonPatchOp::replace(vec![], Value::Object(other))
    }

    /// Auto-vivifying access to a nested object under `key`: if absent,
    /// inserts `{}` and returns the `add` op that installs it alongside
    /// a mutable handle to the new (or existing) nested map.
    pub fn entry_object(&mut self, key: &str) -> (&mut Map<String, Value>, Option<JsonPatchOp>) {
        let existed = self.data.contains_key(key);
        let entry = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        let created = if existed {
            None
        } else {
            Some(JsonPatchOp::add(vec![key.to_string()], Value::Object(Map::new())))
        };
        let obj = entry
            .as_object_mut()
            .expect("entry_object called on a key holding a non-object value");
        (obj, created)
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.data.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.data.keys()
    }
}

/// Prefixes every op in `patch` with `prefix`, the propagate-up-the-
/// call-chain substitute for a weak parent back-reference.
pub fn prefix_patch(patch: &[JsonPatchOp], prefix: &[String]) -> Vec<JsonPatchOp> {
    patch.iter().map(|op| op.prefixed(prefix)).collect()
}

/// `op == Remove` convenience used by a couple of callers that only
/// care whether a mutation tombstoned a key.
pub fn is_removal(op: &JsonPatchOp) -> bool {
    op.op == PatchOp::Remove
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips() {
        let mut d = ObservableDict::new();
        let op = d.set("relay", true);
        assert_eq!(op.path, vec!["relay".to_string()]);
        assert_eq!(d.get("relay"), Some(&Value::Bool(true)));
    }

    #[test]
    fn entry_object_vivifies_once() {
        let mut d = ObservableDict::new();
        let (_, created) = d.entry_object("4");
        assert!(created.is_some());
        let (_, created_again) = d.entry_object("4");
        assert!(created_again.is_none());
    }

    #[test]
    fn clear_emits_root_replace() {
        let mut d = ObservableDict::new();
        d.set("a", 1);
        let op = d.clear();
        assert_eq!(op.path, Vec::<String>::new());
        assert!(d.is_empty());
    }

    #[test]
    fn prefix_patch_rehomes_paths() {
        let mut d = ObservableDict::new();
        let op = d.set("relay", true);
        let prefixed = prefix_patch(&[op], &["4".to_string()]);
        assert_eq!(prefixed[0].path, vec!["4".to_string(), "relay".to_string()]);
    }
}
