//! Ensure operations for owned resources
//!
//! One operation per child kind (Deployment, admin Service, proxy
//! Service, TLS Secret), all driving the same internal helper:
//! list candidates by owner + labels, reduce duplicates, then
//! diff/patch the single match or create the generated object.

pub mod deployment;
pub mod secret;
pub mod service;

use kube::api::{DeleteParams, Patch, PatchParams, PostParams};
use kube::{Api, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Debug;
use tracing::{info, warn};

use super::compare::{is_empty_patch, merge_patch_diff};
use super::owners::{list_owned, reduce_duplicates};
use super::ReconcileError;

/// Tri-state outcome of an ensure operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    Created,
    Updated,
    Noop,
}

impl EnsureOutcome {
    /// Whether the cluster was written to; callers requeue and observe
    /// the converged state on the next pass instead of acting on a
    /// just-written object.
    pub fn changed(&self) -> bool {
        !matches!(self, EnsureOutcome::Noop)
    }
}

/// What to do with the single existing candidate
pub(super) enum UpdateDecision<K> {
    /// Patch towards this in-memory mutation of the existing object
    Patch(Box<K>),
    /// The existing object cannot be patched into shape (immutable
    /// field drifted); delete it and let the next pass recreate
    Recreate,
}

/// Shared list → reduce → diff/patch-or-create driver.
///
/// `update` receives (existing, generated) and decides how to converge
/// the single candidate. At most one write is issued per invocation,
/// plus the reducer's delete burst when the singleton invariant is
/// found violated - in which case the distinguished
/// [`ReconcileError::DuplicatesReduced`] forces the caller to end the
/// cycle and re-read cleanly.
pub(super) async fn ensure_owned<K>(
    api: &Api<K>,
    kind: &'static str,
    owner_name: &str,
    owner_uid: &str,
    labels: &BTreeMap<String, String>,
    generated: K,
    update: impl FnOnce(&K, &K) -> UpdateDecision<K>,
) -> Result<(EnsureOutcome, K), ReconcileError>
where
    K: Resource<DynamicType = ()> + Clone + Serialize + DeserializeOwned + Debug,
{
    let mut candidates = list_owned(api, owner_uid, labels).await?;

    if candidates.len() > 1 {
        let deleted = reduce_duplicates(api, &candidates).await?;
        warn!(
            kind = kind,
            owner = %owner_name,
            deleted = deleted,
            "Reduced duplicate owned resources"
        );
        return Err(ReconcileError::DuplicatesReduced {
            kind,
            owner: owner_name.to_string(),
        });
    }

    let Some(existing) = candidates.pop() else {
        let created = api.create(&PostParams::default(), &generated).await?;
        info!(kind = kind, owner = %owner_name, object = %created.name_any(), "Created owned resource");
        return Ok((EnsureOutcome::Created, created));
    };

    match update(&existing, &generated) {
        UpdateDecision::Patch(updated) => {
            patch_if_changed(api, kind, owner_name, &existing, &updated, &generated).await
        }
        UpdateDecision::Recreate => {
            let name = existing.name_any();
            match api.delete(&name, &DeleteParams::default()).await {
                Ok(_) => info!(kind = kind, object = %name, "Deleted owned resource for recreation"),
                Err(kube::Error::Api(err)) if err.code == 404 => {}
                Err(e) => return Err(e.into()),
            }
            // Hand back the generated object: the existing one is a
            // tombstone now and its selector must not leak to callers
            Ok((EnsureOutcome::Updated, generated))
        }
    }
}

/// Patch the existing object towards `updated` if the merge patch
/// between the two is non-empty; otherwise make no API call at all.
///
/// A 404 mid-patch means the object vanished between list and act;
/// it is retried as a create, not surfaced as an error.
async fn patch_if_changed<K>(
    api: &Api<K>,
    kind: &'static str,
    owner_name: &str,
    existing: &K,
    updated: &K,
    generated: &K,
) -> Result<(EnsureOutcome, K), ReconcileError>
where
    K: Resource<DynamicType = ()> + Clone + Serialize + DeserializeOwned + Debug,
{
    let old_value = serde_json::to_value(existing).map_err(kube::Error::SerdeError)?;
    let new_value = serde_json::to_value(updated).map_err(kube::Error::SerdeError)?;

    let patch = merge_patch_diff(&old_value, &new_value);
    if is_empty_patch(&patch) {
        return Ok((EnsureOutcome::Noop, existing.clone()));
    }

    let name = existing.name_any();
    match api
        .patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
        .await
    {
        Ok(patched) => {
            info!(kind = kind, owner = %owner_name, object = %name, "Updated owned resource");
            Ok((EnsureOutcome::Updated, patched))
        }
        Err(kube::Error::Api(err)) if err.code == 404 => {
            let created = api.create(&PostParams::default(), generated).await?;
            info!(kind = kind, owner = %owner_name, object = %created.name_any(), "Recreated owned resource deleted mid-cycle");
            Ok((EnsureOutcome::Created, created))
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
#[path = "ensure_test.rs"]
mod tests;
