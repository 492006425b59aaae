//! JSON tree merging
//!
//! Two strategies are provided:
//! - [`deep_merge`]: the patch overrides the target leaf by leaf, used for
//!   machine metadata.
//! - [`merge_config`]: Ignition-style merge where lists append and the
//!   caller decides which side wins on scalar conflicts.

use serde_json::{Map, Value};

/// Merges `patch` into `target`, recursing into objects present on both sides.
///
/// Any non-object value in `patch` replaces the value in `target`, as does an
/// object in `patch` landing on a non-object in `target`.
pub fn deep_merge(target: &mut Map<String, Value>, patch: &Map<String, Value>) {
    for (key, patch_value) in patch {
        match (target.get_mut(key), patch_value) {
            (Some(Value::Object(target_obj)), Value::Object(patch_obj)) => {
                deep_merge(target_obj, patch_obj);
            }
            _ => {
                target.insert(key.clone(), patch_value.clone());
            }
        }
    }
}

/// Merges an Ignition fragment into a base document.
///
/// Objects merge recursively and arrays append (fragment entries last).
/// When both sides hold a scalar, the fragment wins if `fragment_wins` is set.
pub fn merge_config(base: &mut Value, fragment: Value, fragment_wins: bool) {
    match (base, fragment) {
        (Value::Object(base_obj), Value::Object(fragment_obj)) => {
            for (key, value) in fragment_obj {
                match base_obj.get_mut(&key) {
                    Some(existing) => merge_config(existing, value, fragment_wins),
                    None => {
                        base_obj.insert(key, value);
                    }
                }
            }
        }
        (Value::Array(base_items), Value::Array(fragment_items)) => {
            base_items.extend(fragment_items);
        }
        (base, fragment) => {
            if fragment_wins || base.is_null() {
                *base = fragment;
            }
        }
    }
}
