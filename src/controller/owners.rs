//! Owner index and duplicate reducer
//!
//! Children are discovered by owner UID plus the operator's label set,
//! never by name: promotion re-labels objects without renaming them and
//! `generateName` means child names are server-assigned. When a
//! singleton selector matches more than one object, the reducer deletes
//! all but one deterministically chosen survivor and the caller ends
//! its cycle so the next reconcile re-reads clean state.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::{DeleteParams, ListParams, ObjectMeta};
use kube::{Api, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt::Debug;
use tracing::{info, warn};

use super::labels::selector_string;

/// True iff the candidate's owner references include `owner_uid`.
pub fn is_owned_by(meta: &ObjectMeta, owner_uid: &str) -> bool {
    meta.owner_references
        .as_deref()
        .unwrap_or_default()
        .iter()
        .any(|reference| reference.uid == owner_uid)
}

/// List candidates matching the label set, filtered to those owned by
/// `owner_uid`. Underlying list failures propagate verbatim.
pub async fn list_owned<K>(
    api: &Api<K>,
    owner_uid: &str,
    labels: &BTreeMap<String, String>,
) -> Result<Vec<K>, kube::Error>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
{
    let params = ListParams::default().labels(&selector_string(labels));
    let list = api.list(&params).await?;

    Ok(list
        .items
        .into_iter()
        .filter(|item| is_owned_by(item.meta(), owner_uid))
        .collect())
}

/// Pick the index of the duplicate that survives reduction.
///
/// Rule: earliest creationTimestamp wins; a missing timestamp sorts
/// last; ties are broken by lexicographically smallest name. The rule
/// is deterministic so repeated invocations against a shrinking
/// candidate set converge on the same survivor.
pub fn pick_survivor<K>(candidates: &[K]) -> Option<usize>
where
    K: Resource<DynamicType = ()>,
{
    fn sort_key<K: Resource<DynamicType = ()>>(item: &K) -> (Option<&Time>, String) {
        (item.meta().creation_timestamp.as_ref(), item.name_any())
    }

    candidates
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            let (a_time, a_name) = sort_key(*a);
            let (b_time, b_name) = sort_key(*b);
            match (a_time, b_time) {
                (Some(x), Some(y)) => x.0.cmp(&y.0).then_with(|| a_name.cmp(&b_name)),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => a_name.cmp(&b_name),
            }
        })
        .map(|(index, _)| index)
}

/// Delete every candidate except the survivor.
///
/// A delete failure is returned verbatim and the operation is safe to
/// invoke again: after any partial completion the candidate set only
/// shrinks. Concurrent deletion (404) counts as already reduced.
/// Returns the number of objects deleted.
pub async fn reduce_duplicates<K>(api: &Api<K>, candidates: &[K]) -> Result<usize, kube::Error>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
{
    let Some(survivor) = pick_survivor(candidates) else {
        return Ok(0);
    };

    let mut deleted = 0;
    for (index, candidate) in candidates.iter().enumerate() {
        if index == survivor {
            continue;
        }

        let name = candidate.name_any();
        match api.delete(&name, &DeleteParams::default()).await {
            Ok(_) => {
                info!(object = %name, "Deleted duplicate owned resource");
                deleted += 1;
            }
            Err(kube::Error::Api(err)) if err.code == 404 => {
                warn!(object = %name, "Duplicate already gone");
            }
            Err(e) => return Err(e),
        }
    }

    Ok(deleted)
}

#[cfg(test)]
#[path = "owners_test.rs"]
mod tests;
