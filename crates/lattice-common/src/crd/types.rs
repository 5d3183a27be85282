//! Shared status types for the serving CRDs

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition type reporting that every traffic target resolved
pub const CONDITION_ALL_TRAFFIC_ASSIGNED: &str = "AllTrafficAssigned";

/// Top-level readiness condition type
pub const CONDITION_READY: &str = "Ready";

/// Condition status following Kubernetes conventions
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Kubernetes-style condition for status reporting
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Condition {
    /// Type of condition (e.g., Ready, AllTrafficAssigned)
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,

    /// Human-readable message
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    /// Last time the condition transitioned
    #[serde(rename = "lastTransitionTime")]
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Create a new condition with the current timestamp
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }

    /// A True condition with no reason or message
    pub fn ready(type_: impl Into<String>) -> Self {
        Self::new(type_, ConditionStatus::True, "", "")
    }

    /// Whether the condition currently holds
    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }
}

/// Ordered set of conditions keyed by condition type
///
/// Serialized as a plain list. Each type appears at most once and keeps the
/// position it was first inserted at.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(transparent)]
pub struct ConditionSet(Vec<Condition>);

impl ConditionSet {
    /// Look up a condition by type
    pub fn get(&self, type_: &str) -> Option<&Condition> {
        self.0.iter().find(|c| c.type_ == type_)
    }

    /// Whether the condition of the given type is present and True
    pub fn is_true(&self, type_: &str) -> bool {
        self.get(type_).is_some_and(Condition::is_true)
    }

    /// Set a condition only if its status differs from the stored one
    ///
    /// An unchanged status keeps the stored reason, message and
    /// `lastTransitionTime`. Returns whether anything was written.
    pub fn set(&mut self, condition: Condition) -> bool {
        match self.0.iter_mut().find(|c| c.type_ == condition.type_) {
            Some(existing) if existing.status == condition.status => false,
            Some(existing) => {
                *existing = condition;
                true
            }
            None => {
                self.0.push(condition);
                true
            }
        }
    }

    /// Iterate conditions in order
    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.0.iter()
    }

    /// Number of conditions
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no condition has been set
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Condition> for ConditionSet {
    fn from_iter<I: IntoIterator<Item = Condition>>(iter: I) -> Self {
        let mut set = ConditionSet::default();
        for condition in iter {
            set.set(condition);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(condition: Condition, secs: i64) -> Condition {
        Condition {
            last_transition_time: Utc.timestamp_opt(secs, 0).single().unwrap(),
            ..condition
        }
    }

    #[test]
    fn set_inserts_new_types_in_order() {
        let mut set = ConditionSet::default();
        assert!(set.set(Condition::ready(CONDITION_ALL_TRAFFIC_ASSIGNED)));
        assert!(set.set(Condition::ready(CONDITION_READY)));

        let types: Vec<_> = set.iter().map(|c| c.type_.as_str()).collect();
        assert_eq!(types, vec![CONDITION_ALL_TRAFFIC_ASSIGNED, CONDITION_READY]);
        assert!(set.is_true(CONDITION_READY));
    }

    /// Story: a condition that keeps failing for a new reason does not churn
    ///
    /// Only a status transition refreshes the timestamp, reason and message.
    #[test]
    fn story_unchanged_status_preserves_transition_time() {
        let mut set = ConditionSet::default();
        set.set(at(
            Condition::new(
                CONDITION_READY,
                ConditionStatus::False,
                "ConfigurationMissing",
                "first",
            ),
            100,
        ));

        let changed = set.set(at(
            Condition::new(
                CONDITION_READY,
                ConditionStatus::False,
                "RevisionMissing",
                "second",
            ),
            200,
        ));

        assert!(!changed);
        let ready = set.get(CONDITION_READY).unwrap();
        assert_eq!(ready.reason, "ConfigurationMissing");
        assert_eq!(ready.message, "first");
        assert_eq!(ready.last_transition_time.timestamp(), 100);
    }

    #[test]
    fn story_status_change_refreshes_all_fields() {
        let mut set = ConditionSet::default();
        set.set(at(
            Condition::new(CONDITION_READY, ConditionStatus::False, "X", "broken"),
            100,
        ));

        assert!(set.set(at(Condition::ready(CONDITION_READY), 300)));

        let ready = set.get(CONDITION_READY).unwrap();
        assert_eq!(ready.status, ConditionStatus::True);
        assert!(ready.reason.is_empty());
        assert_eq!(ready.last_transition_time.timestamp(), 300);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn serializes_as_plain_list() {
        let set: ConditionSet = vec![at(Condition::ready(CONDITION_READY), 0)]
            .into_iter()
            .collect();
        let json = serde_json::to_value(&set).unwrap();
        assert!(json.is_array());
        assert_eq!(json[0]["type"], "Ready");
        assert_eq!(json[0]["status"], "True");
        assert!(json[0].get("reason").is_none());

        let back: ConditionSet = serde_json::from_value(json).unwrap();
        assert_eq!(back, set);
    }

    #[test]
    fn missing_condition_is_not_true() {
        let set = ConditionSet::default();
        assert!(set.is_empty());
        assert!(!set.is_true(CONDITION_READY));
    }
}
