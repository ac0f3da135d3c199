use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::types::FlagValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagValueType {
    Boolean,
    String,
    Number,
}

impl FlagValueType {
    pub fn of(value: &FlagValue) -> Self {
        match value {
            FlagValue::Boolean(_) => FlagValueType::Boolean,
            FlagValue::String(_) => FlagValueType::String,
            FlagValue::Number(_) => FlagValueType::Number,
        }
    }
}

/// Lifecycle status shared by override rules and experiments. Only `Active`
/// records ever influence a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    Draft,
    Active,
    Paused,
    Completed,
    Archived,
    InTest,
    Disabled,
}

/// Which clients a rule (or experiment) applies to: the client attributes
/// that identify a caller for bucketing, and the fraction of the hashed
/// population that is enrolled.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Enrollment {
    #[serde(default)]
    pub attributes: Vec<String>,
    pub proportion: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ForcedValueRule {
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: RuleStatus,
    #[serde(default)]
    pub start_timestamp: Option<i64>,
    #[serde(default)]
    pub end_timestamp: Option<i64>,
    pub environment_name: String,
    pub enrollment: Enrollment,
    pub value: FlagValue,
}

/// A weak reference to an `Experiment` document. The rule id doubles as the
/// experiment id; the full record is always fetched separately through an
/// [`ExperimentReader`](crate::store::ExperimentReader), so a flag never owns
/// experiment data and the reference can dangle after an experiment is
/// deleted.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExperimentReferenceRule {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: RuleStatus,
    #[serde(default)]
    pub start_timestamp: Option<i64>,
    #[serde(default)]
    pub end_timestamp: Option<i64>,
    pub environment_name: String,
    pub enrollment: Enrollment,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum OverrideRule {
    ForcedValue(ForcedValueRule),
    ExperimentReference(ExperimentReferenceRule),
}

impl OverrideRule {
    pub fn id(&self) -> &str {
        match self {
            OverrideRule::ForcedValue(rule) => &rule.id,
            OverrideRule::ExperimentReference(rule) => &rule.id,
        }
    }

    pub fn status(&self) -> RuleStatus {
        match self {
            OverrideRule::ForcedValue(rule) => rule.status,
            OverrideRule::ExperimentReference(rule) => rule.status,
        }
    }

    pub fn environment_name(&self) -> &str {
        match self {
            OverrideRule::ForcedValue(rule) => &rule.environment_name,
            OverrideRule::ExperimentReference(rule) => &rule.environment_name,
        }
    }

    pub fn enrollment(&self) -> &Enrollment {
        match self {
            OverrideRule::ForcedValue(rule) => &rule.enrollment,
            OverrideRule::ExperimentReference(rule) => &rule.enrollment,
        }
    }

    pub fn start_timestamp(&self) -> Option<i64> {
        match self {
            OverrideRule::ForcedValue(rule) => rule.start_timestamp,
            OverrideRule::ExperimentReference(rule) => rule.start_timestamp,
        }
    }

    pub fn end_timestamp(&self) -> Option<i64> {
        match self {
            OverrideRule::ForcedValue(rule) => rule.end_timestamp,
            OverrideRule::ExperimentReference(rule) => rule.end_timestamp,
        }
    }

    /// A rule can only match while it is active and `now` falls inside its
    /// window `[start ?? 0, end ?? +inf)`. Ineligible rules are skipped
    /// entirely during selection, they never consume a match.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        if self.status() != RuleStatus::Active {
            return false;
        }
        let now_ms = now.timestamp_millis();
        if now_ms < self.start_timestamp().unwrap_or(0) {
            return false;
        }
        match self.end_timestamp() {
            Some(end) => now_ms < end,
            None => true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeatureFlag {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub value_type: FlagValueType,
    pub default_value: FlagValue,
    #[serde(default)]
    pub override_rules: Vec<OverrideRule>,
}

impl FeatureFlag {
    /// Rules targeting the given environment, in stored order. Order is
    /// caller-controlled on the flag document and selection is
    /// first-match-wins, so it must be preserved here.
    pub fn rules_for_environment(&self, environment_name: &str) -> Vec<&OverrideRule> {
        self.override_rules
            .iter()
            .filter(|rule| rule.environment_name() == environment_name)
            .collect()
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct FeatureFlagList {
    pub flags: Vec<FeatureFlag>,
}

impl FeatureFlagList {
    pub fn new(flags: Vec<FeatureFlag>) -> Self {
        Self { flags }
    }
}

/// A client-identifying attribute value, supplied per request and never
/// persisted by the engine.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ClientPropValue {
    Boolean(bool),
    String(String),
    Number(f64),
}

impl fmt::Display for ClientPropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientPropValue::String(s) => f.write_str(s),
            ClientPropValue::Boolean(b) => write!(f, "{}", b),
            // Whole numbers render without a trailing ".0" so the hash input
            // stays stable for clients that send 5 vs 5.0 interchangeably.
            ClientPropValue::Number(n) if n.fract() == 0.0 && n.is_finite() => {
                write!(f, "{}", *n as i64)
            }
            ClientPropValue::Number(n) => write!(f, "{}", n),
        }
    }
}

pub type ClientPropMapping = HashMap<String, ClientPropValue>;
