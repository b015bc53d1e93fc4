use serde_json::Value;

/// RFC-6902 operation kind. This crate only ever emits `add`, `remove`,
/// and `replace` — the three behaviors an observable dict needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOp {
    Add,
    Remove,
    Replace,
}

impl PatchOp {
    fn as_str(self) -> &'static str {
        match self {
            PatchOp::Add => "add",
            PatchOp::Remove => "remove",
            PatchOp::Replace => "replace",
        }
    }
}

/// One JSON-Patch operation. `path` is kept as key segments internally;
/// `to_wire_path` renders the RFC-6902 `/`-joined form with `~0`/`~1`
/// escaping applied to each segment.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonPatchOp {
    pub op: PatchOp,
    pub path: Vec<String>,
    pub value: Option<Value>,
}

impl JsonPatchOp {
    pub fn add(path: Vec<String>, value: Value) -> Self {
        JsonPatchOp {
            op: PatchOp::Add,
            path,
            value: Some(value),
        }
    }

    pub fn remove(path: Vec<String>) -> Self {
        JsonPatchOp {
            op: PatchOp::Remove,
            path,
            value: None,
        }
    }

    pub fn replace(path: Vec<String>, value: Value) -> Self {
        JsonPatchOp {
            op: PatchOp::Replace,
            path,
            value: Some(value),
        }
    }

    /// Returns a copy of this op with `prefix` segments prepended to its
    /// path — how a channel's patches are re-homed under its parent
    /// module's path as they propagate up the call chain.
    pub fn prefixed(&self, prefix: &[String]) -> Self {
        let mut path = prefix.to_vec();
        path.extend(self.path.iter().cloned());
        JsonPatchOp {
            op: self.op,
            path,
            value: self.value.clone(),
        }
    }

    pub fn to_wire_path(&self) -> String {
        if self.path.is_empty() {
            return String::new();
        }
        let mut out = String::new();
        for segment in &self.path {
            out.push('/');
            out.push_str(&segment.replace('~', "~0").replace('/', "~1"));
        }
        out
    }

    pub fn to_wire_json(&self) -> Value {
        let mut obj = serde_json::Map::new();
        obj.insert("op".to_string(), Value::String(self.op.as_str().to_string()));
        obj.insert("path".to_string(), Value::String(self.to_wire_path()));
        if let Some(v) = &self.value {
            obj.insert("value".to_string(), v.clone());
        }
        Value::Object(obj)
    }
}

/// A batch of operations delivered to a subscriber together. Internal
/// mutations each produce a single-op batch; an adapter is free to
/// coalesce batches before writing them to the wire.
pub type JsonPatch = Vec<JsonPatchOp>;

/// Applies a patch stream to an (initially empty) JSON object, used to
/// verify the decomposition property in tests: replaying every emitted
/// patch against `{}` reproduces the dict's current state.
pub fn apply(target: &mut Value, patch: &JsonPatch) {
    for op in patch {
        apply_one(target, op);
    }
}

fn apply_one(target: &mut Value, op: &JsonPatchOp) {
    if op.path.is_empty() {
        match op.op {
            PatchOp::Replace | PatchOp::Add => {
                *target = op.value.clone().unwrap_or(Value::Object(Default::default()));
            }
            PatchOp::Remove => *target = Value::Null,
        }
        return;
    }
    let (last, parents) = op.path.split_last().unwrap();
    let mut cursor = target;
    for key in parents {
        cursor = cursor
            .as_object_mut()
            .expect("patch path traverses a non-object")
            .entry(key.clone())
            .or_insert_with(|| Value::Object(Default::default()));
    }
    let obj = cursor.as_object_mut().expect("patch path traverses a non-object");
    match op.op {
        PatchOp::Add | PatchOp::Replace => {
            obj.insert(last.clone(), op.value.clone().unwrap_or(Value::Null));
        }
        PatchOp::Remove => {
            obj.remove(last);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_path_escapes_tilde_and_slash() {
        let op = JsonPatchOp::add(vec!["a~b".to_string(), "c/d".to_string()], Value::Bool(true));
        assert_eq!(op.to_wire_path(), "/a~0b/c~1d");
    }

    #[test]
    fn apply_reproduces_nested_state() {
        let mut target = Value::Object(Default::default());
        let patch = vec![
            JsonPatchOp::add(vec!["4".to_string()], Value::Object(Default::default())),
            JsonPatchOp::add(vec!["4".to_string(), "relay".to_string()], Value::Bool(true)),
        ];
        apply(&mut target, &patch);
        assert_eq!(target["4"]["relay"], Value::Bool(true));
    }

    #[test]
    fn apply_clear_replaces_root() {
        let mut target: Value = serde_json::json!({"1": {"relay": true}});
        let patch = vec![JsonPatchOp::replace(vec![], Value::Object(Default::default()))];
        apply(&mut target, &patch);
        assert_eq!(target, serde_json::json!({}));
    }
}
