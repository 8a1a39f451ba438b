//! JSON merge patches (RFC 7386).

use serde_json::{Map, Value};

/// Computes the merge patch that turns `old` into `new`.
///
/// Keys missing from `new` are emitted as `null`. Arrays are replaced as a whole.
pub fn create_merge_patch(old: &Value, new: &Value) -> Value {
    match (old, new) {
        (Value::Object(old_map), Value::Object(new_map)) => {
            let mut patch = Map::new();

            for (key, old_value) in old_map {
                match new_map.get(key) {
                    None => {
                        patch.insert(key.clone(), Value::Null);
                    }
                    Some(new_value) if new_value != old_value => {
                        let value = if old_value.is_object() && new_value.is_object() {
                            create_merge_patch(old_value, new_value)
                        } else {
                            new_value.clone()
                        };
                        patch.insert(key.clone(), value);
                    }
                    Some(_) => {}
                }
            }

            for (key, new_value) in new_map {
                if !old_map.contains_key(key) {
                    patch.insert(key.clone(), new_value.clone());
                }
            }

            Value::Object(patch)
        }
        _ => new.clone(),
    }
}

/// Applies a merge patch to `target` in place.
pub fn apply_merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };

    if !target.is_object() {
        *target = Value::Object(Map::new());
    }

    if let Value::Object(target_map) = target {
        for (key, value) in patch_map {
            if value.is_null() {
                target_map.remove(key);
            } else {
                apply_merge_patch(target_map.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

/// True when the patch would not change anything.
pub fn is_empty_patch(patch: &Value) -> bool {
    matches!(patch, Value::Object(map) if map.is_empty())
}
