//! Status conditions.
//!
//! Every terminal outcome of a reconcile writes exactly one condition. Types and
//! reasons are a closed set so clients can rely on them.

use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};

/// Condition type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionType {
    Created,
    Updated,
    GitOpsResourcesGenerated,
    GitOpsResourcesForceGenerated,
    Processing,
    Completed,
}

impl ConditionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionType::Created => "Created",
            ConditionType::Updated => "Updated",
            ConditionType::GitOpsResourcesGenerated => "GitOpsResourcesGenerated",
            ConditionType::GitOpsResourcesForceGenerated => "GitOpsResourcesForceGenerated",
            ConditionType::Processing => "Processing",
            ConditionType::Completed => "Completed",
        }
    }
}

impl std::fmt::Display for ConditionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Condition reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionReason {
    Ok,
    Error,
}

impl ConditionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionReason::Ok => "OK",
            ConditionReason::Error => "Error",
        }
    }
}

impl std::fmt::Display for ConditionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build a condition. `status` maps to "True"/"False".
pub fn new_condition(
    type_: ConditionType,
    status: bool,
    reason: ConditionReason,
    message: impl Into<String>,
) -> Condition {
    Condition {
        type_: type_.as_str().to_string(),
        status: if status { "True" } else { "False" }.to_string(),
        reason: reason.as_str().to_string(),
        message: message.into(),
        last_transition_time: Time(Utc::now()),
        observed_generation: None,
    }
}

/// Shorthand for a successful condition.
pub fn ok_condition(type_: ConditionType, message: impl Into<String>) -> Condition {
    new_condition(type_, true, ConditionReason::Ok, message)
}

/// Shorthand for a failed condition.
pub fn error_condition(type_: ConditionType, message: impl Into<String>) -> Condition {
    new_condition(type_, false, ConditionReason::Error, message)
}

/// Insert or replace the condition of the same type.
///
/// Returns false when an identical condition (status, reason, message) is
/// already present; the list is then left untouched so an unchanged reconcile
/// produces no status write. The transition time only moves when the status
/// flips.
pub fn set_condition(conditions: &mut Vec<Condition>, condition: Condition) -> bool {
    match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        Some(existing) => {
            if existing.status == condition.status
                && existing.reason == condition.reason
                && existing.message == condition.message
                && existing.observed_generation == condition.observed_generation
            {
                return false;
            }
            let transition_time = if existing.status == condition.status {
                existing.last_transition_time.clone()
            } else {
                condition.last_transition_time.clone()
            };
            *existing = Condition {
                last_transition_time: transition_time,
                ..condition
            };
            true
        }
        None => {
            conditions.push(condition);
            true
        }
    }
}

/// Remove a condition by type. Returns true when one was removed.
pub fn remove_condition(conditions: &mut Vec<Condition>, type_: ConditionType) -> bool {
    let before = conditions.len();
    conditions.retain(|c| c.type_ != type_.as_str());
    conditions.len() != before
}

pub fn find_condition(conditions: &[Condition], type_: ConditionType) -> Option<&Condition> {
    conditions.iter().find(|c| c.type_ == type_.as_str())
}

pub fn is_condition_true(conditions: &[Condition], type_: ConditionType) -> bool {
    find_condition(conditions, type_).is_some_and(|c| c.status == "True")
}
