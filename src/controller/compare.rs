//! Diff engine for owned resources
//!
//! Pure comparison and patch-construction helpers. The write side
//! (issuing the merge patch) lives in `resources`; everything here is
//! side-effect free so the "never patch when nothing changed" guarantee
//! can be unit tested without a cluster.

use k8s_openapi::api::core::v1::{PodTemplateSpec, ResourceRequirements};
use kube::api::ObjectMeta;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Compute the RFC 7386 merge patch turning `old` into `new`.
///
/// An empty object means the two are identical and no API call should
/// be made. Keys present in `old` but absent from `new` map to null
/// (deletion), nested objects are diffed recursively, everything else
/// is replaced wholesale.
pub fn merge_patch_diff(old: &Value, new: &Value) -> Value {
    if old == new {
        return Value::Object(Map::new());
    }

    match (old, new) {
        (Value::Object(old_map), Value::Object(new_map)) => {
            let mut patch = Map::new();
            for (key, new_value) in new_map {
                match old_map.get(key) {
                    Some(old_value) if old_value == new_value => {}
                    Some(old_value) => {
                        patch.insert(key.clone(), merge_patch_diff(old_value, new_value));
                    }
                    None => {
                        patch.insert(key.clone(), new_value.clone());
                    }
                }
            }
            for key in old_map.keys() {
                if !new_map.contains_key(key) {
                    patch.insert(key.clone(), Value::Null);
                }
            }
            Value::Object(patch)
        }
        _ => new.clone(),
    }
}

/// True iff `patch` is the empty merge patch (`{}`).
pub fn is_empty_patch(patch: &Value) -> bool {
    matches!(patch, Value::Object(map) if map.is_empty())
}

/// Enforce the operator-owned label set on an object's metadata.
///
/// Labels added by other parties are preserved; only the owned keys are
/// forced to their expected values. Returns whether anything changed.
pub fn enforce_labels(meta: &mut ObjectMeta, owned: &BTreeMap<String, String>) -> bool {
    let labels = meta.labels.get_or_insert_with(BTreeMap::new);
    let mut changed = false;

    for (key, value) in owned {
        if labels.get(key) != Some(value) {
            labels.insert(key.clone(), value.clone());
            changed = true;
        }
    }

    changed
}

/// Enforce operator-owned annotations, preserving foreign ones.
pub fn enforce_annotations(meta: &mut ObjectMeta, owned: &BTreeMap<String, String>) -> bool {
    let annotations = meta.annotations.get_or_insert_with(BTreeMap::new);
    let mut changed = false;

    for (key, value) in owned {
        if annotations.get(key) != Some(value) {
            annotations.insert(key.clone(), value.clone());
            changed = true;
        }
    }

    changed
}

/// Semantic equality for compute resource requirements.
///
/// The API server defaults an absent requirements block; treat `None`,
/// and empty request/limit maps, as equal to their explicit zero-value
/// so a round-tripped object does not look drifted.
pub fn resource_requirements_equal(
    a: Option<&ResourceRequirements>,
    b: Option<&ResourceRequirements>,
) -> bool {
    fn normalize(rr: Option<&ResourceRequirements>) -> Value {
        let rr = rr.cloned().unwrap_or_default();
        let requests = rr.requests.unwrap_or_default();
        let limits = rr.limits.unwrap_or_default();
        serde_json::json!({
            "requests": requests,
            "limits": limits,
        })
    }

    normalize(a) == normalize(b)
}

/// Semantic equality for generated vs. observed pod templates.
///
/// Containers are compared with their resource requirements normalized
/// the same way as [`resource_requirements_equal`]; all other fields
/// compare structurally.
pub fn pod_templates_equal(a: &PodTemplateSpec, b: &PodTemplateSpec) -> bool {
    normalize_template(a) == normalize_template(b)
}

fn normalize_template(template: &PodTemplateSpec) -> Value {
    let mut template = template.clone();

    if let Some(spec) = template.spec.as_mut() {
        for container in &mut spec.containers {
            let rr = container.resources.take().unwrap_or_default();
            if rr.requests.as_ref().is_none_or(|m| m.is_empty())
                && rr.limits.as_ref().is_none_or(|m| m.is_empty())
                && rr.claims.as_ref().is_none_or(|c| c.is_empty())
            {
                container.resources = None;
            } else {
                container.resources = Some(rr);
            }
        }
    }

    serde_json::to_value(&template).unwrap_or(Value::Null)
}

#[cfg(test)]
#[path = "compare_test.rs"]
mod tests;
