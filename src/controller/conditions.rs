//! Status condition bookkeeping for managed resources
//!
//! Conditions are unique by type and capped at eight entries (the
//! Kubernetes API size convention); setting an existing type replaces
//! it in place of growing the list, and status patches are suppressed
//! when the observable content would not change.

use chrono::Utc;

use crate::crd::controlplane::ControlPlaneStatus;
use crate::crd::dataplane::DataPlaneStatus;
use crate::crd::Condition;

/// Condition type published on every managed resource
pub const CONDITION_TYPE_READY: &str = "Ready";

/// Condition type tracking Blue-Green rollout progress on a DataPlane
pub const CONDITION_TYPE_ROLLED_OUT: &str = "RolledOut";

pub const CONDITION_TRUE: &str = "True";
pub const CONDITION_FALSE: &str = "False";

/// Maximum number of conditions kept on a status; oldest dropped first.
pub const MAX_CONDITIONS: usize = 8;

/// Anything carrying a status condition list
pub trait Conditioned {
    fn conditions(&self) -> &[Condition];
    fn conditions_mut(&mut self) -> &mut Vec<Condition>;
}

impl Conditioned for DataPlaneStatus {
    fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    fn conditions_mut(&mut self) -> &mut Vec<Condition> {
        &mut self.conditions
    }
}

impl Conditioned for ControlPlaneStatus {
    fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    fn conditions_mut(&mut self) -> &mut Vec<Condition> {
        &mut self.conditions
    }
}

/// Build a condition stamped with the current time.
pub fn new_condition(
    type_: &str,
    status: &str,
    reason: &str,
    message: &str,
    observed_generation: Option<i64>,
) -> Condition {
    Condition {
        type_: type_.to_string(),
        status: status.to_string(),
        reason: reason.to_string(),
        message: message.to_string(),
        observed_generation,
        last_transition_time: Utc::now().to_rfc3339(),
    }
}

/// Replace any condition of the same type and append the new one.
///
/// The transition timestamp is carried over from the replaced entry
/// when the status value did not change, so watchers see transition
/// times that reflect actual transitions. The list is pruned to
/// [`MAX_CONDITIONS`] afterwards.
pub fn set_condition<S: Conditioned>(status: &mut S, mut condition: Condition) {
    let conditions = status.conditions_mut();

    if let Some(pos) = conditions.iter().position(|c| c.type_ == condition.type_) {
        let previous = conditions.remove(pos);
        if previous.status == condition.status {
            condition.last_transition_time = previous.last_transition_time;
        }
    }

    conditions.push(condition);
    prune_conditions(status);
}

/// Look up a condition by type.
pub fn get_condition<'a, S: Conditioned>(status: &'a S, type_: &str) -> Option<&'a Condition> {
    status.conditions().iter().find(|c| c.type_ == type_)
}

/// True iff a Ready condition exists with status "True".
pub fn is_ready<S: Conditioned>(status: &S) -> bool {
    get_condition(status, CONDITION_TYPE_READY)
        .map(|c| c.status == CONDITION_TRUE)
        .unwrap_or(false)
}

/// Drop the oldest conditions (by list position) until the cap holds.
pub fn prune_conditions<S: Conditioned>(status: &mut S) {
    let conditions = status.conditions_mut();
    while conditions.len() > MAX_CONDITIONS {
        conditions.remove(0);
    }
}

/// Whether two condition sets differ in observable content.
///
/// Compared without regard to order on (type, status, reason, message);
/// transition timestamps are deliberately excluded so a freshly stamped
/// but otherwise identical set does not trigger a status write (which
/// would bump resourceVersion and re-trigger the watch forever).
pub fn needs_status_update(current: &[Condition], updated: &[Condition]) -> bool {
    if current.len() != updated.len() {
        return true;
    }

    let key = |c: &Condition| (c.type_.clone(), c.status.clone(), c.reason.clone(), c.message.clone());

    let mut current_keys: Vec<_> = current.iter().map(key).collect();
    let mut updated_keys: Vec<_> = updated.iter().map(key).collect();
    current_keys.sort();
    updated_keys.sort();

    current_keys != updated_keys
}

#[cfg(test)]
#[path = "conditions_test.rs"]
mod tests;
