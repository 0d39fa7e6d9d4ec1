//! # Conditions
//!
//! Tri-state status conditions and the living condition set that derives a
//! top-level `Ready` condition from its dependents.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Type of the top-level condition every living set manages
pub const CONDITION_READY: &str = "Ready";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConditionStatus::True => "True",
            ConditionStatus::False => "False",
            ConditionStatus::Unknown => "Unknown",
        })
    }
}

/// A named observation about a resource
///
/// Equality ignores `last_transition_time` so that refreshing a timestamp
/// alone never counts as a status change.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub r#type: String,
    pub status: ConditionStatus,
    /// RFC3339 time of the last status flip
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl PartialEq for Condition {
    fn eq(&self, other: &Self) -> bool {
        self.r#type == other.r#type
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
    }
}

impl Condition {
    #[must_use]
    pub fn new(type_: &str, status: ConditionStatus) -> Self {
        Self {
            r#type: type_.to_string(),
            status,
            last_transition_time: None,
            reason: None,
            message: None,
        }
    }

    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>, message: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }

    #[must_use]
    pub fn is_false(&self) -> bool {
        self.status == ConditionStatus::False
    }
}

/// Condition types managed together under a `Ready` condition
///
/// `Ready` is True once every dependent is True, False as soon as any
/// dependent is False, and Unknown otherwise.
#[derive(Debug, Clone, Copy)]
pub struct ConditionSet {
    happy: &'static str,
    dependents: &'static [&'static str],
}

impl ConditionSet {
    #[must_use]
    pub const fn living(dependents: &'static [&'static str]) -> Self {
        Self {
            happy: CONDITION_READY,
            dependents,
        }
    }

    /// Borrow a condition list for mutation under this set's rules
    pub fn manage<'a>(&self, conditions: &'a mut Vec<Condition>) -> ConditionManager<'a> {
        ConditionManager {
            set: *self,
            conditions,
        }
    }

    fn is_dependent(&self, type_: &str) -> bool {
        self.dependents.contains(&type_)
    }
}

#[derive(Debug)]
pub struct ConditionManager<'a> {
    set: ConditionSet,
    conditions: &'a mut Vec<Condition>,
}

impl ConditionManager<'_> {
    #[must_use]
    pub fn get_condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.r#type == type_)
    }

    #[must_use]
    pub fn is_happy(&self) -> bool {
        self.get_condition(self.set.happy)
            .is_some_and(Condition::is_true)
    }

    /// Insert or replace a condition, keeping the list sorted by type
    pub fn set_condition(&mut self, mut condition: Condition) {
        match self
            .conditions
            .iter_mut()
            .find(|c| c.r#type == condition.r#type)
        {
            Some(existing) if *existing == condition => return,
            Some(existing) => {
                condition.last_transition_time = if existing.status == condition.status {
                    existing.last_transition_time.take()
                } else {
                    Some(now())
                };
                *existing = condition;
            }
            None => {
                condition.last_transition_time = Some(now());
                self.conditions.push(condition);
            }
        }
        self.conditions.sort_by(|a, b| a.r#type.cmp(&b.r#type));
    }

    /// Add any missing condition as Unknown, or True for dependents of an already happy set
    pub fn initialize_conditions(&mut self) {
        let happy = match self.get_condition(self.set.happy) {
            Some(c) => c.status,
            None => {
                self.set_condition(Condition::new(self.set.happy, ConditionStatus::Unknown));
                ConditionStatus::Unknown
            }
        };
        let status = if happy == ConditionStatus::True {
            ConditionStatus::True
        } else {
            ConditionStatus::Unknown
        };
        let dependents = self.set.dependents;
        for dependent in dependents {
            if self.get_condition(dependent).is_none() {
                self.set_condition(Condition::new(dependent, status));
            }
        }
    }

    pub fn mark_true(&mut self, type_: &str) {
        self.set_condition(Condition::new(type_, ConditionStatus::True));

        let all_true = self
            .set
            .dependents
            .iter()
            .all(|d| self.get_condition(d).is_some_and(Condition::is_true));
        if all_true {
            self.set_condition(Condition::new(self.set.happy, ConditionStatus::True));
        }
    }

    pub fn mark_unknown(&mut self, type_: &str, reason: impl Into<String>, message: impl Into<String>) {
        let condition = Condition::new(type_, ConditionStatus::Unknown).with_reason(reason, message);
        self.set_condition(condition.clone());

        if !self.set.is_dependent(type_) {
            return;
        }
        // a False sibling keeps Ready False
        let sibling_false = self
            .set
            .dependents
            .iter()
            .filter(|d| **d != type_)
            .any(|d| self.get_condition(d).is_some_and(Condition::is_false));
        if sibling_false {
            return;
        }
        self.set_condition(Condition {
            r#type: self.set.happy.to_string(),
            ..condition
        });
    }

    pub fn mark_false(&mut self, type_: &str, reason: impl Into<String>, message: impl Into<String>) {
        let condition = Condition::new(type_, ConditionStatus::False).with_reason(reason, message);
        self.set_condition(condition.clone());

        if self.set.is_dependent(type_) {
            self.set_condition(Condition {
                r#type: self.set.happy.to_string(),
                ..condition
            });
        }
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}
