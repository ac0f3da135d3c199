use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::api::errors::FlagError;
use crate::api::types::FlagValue;
use crate::flags::flag_models::{Enrollment, RuleStatus};

/// The value one flag takes while a treatment is running.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FlagState {
    /// Id of the flag this state applies to.
    pub id: String,
    pub value: FlagValue,
}

/// A time-boxed intervention: for `duration` milliseconds, the listed flags
/// take the listed values for every client in the group running it.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Treatment {
    pub id: String,
    pub name: String,
    /// Milliseconds. Must be positive; enforced at creation time by
    /// [`Experiment::validate`], never re-checked on the read path.
    pub duration: i64,
    #[serde(default)]
    pub flag_states: Vec<FlagState>,
}

/// One partition of the experiment population. The group plays its treatment
/// sequence back-to-back from the experiment's start, repeating it `cycles`
/// times; once the cycles are exhausted no treatment applies.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExperimentGroup {
    pub id: String,
    pub name: String,
    pub proportion: f64,
    /// Ordered treatment ids, resolved against
    /// [`Experiment::defined_treatments`].
    #[serde(default)]
    pub sequence: Vec<String>,
    pub cycles: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Experiment {
    pub id: String,
    pub name: String,
    pub status: RuleStatus,
    /// Epoch milliseconds. Unset until the experiment is explicitly started;
    /// no treatment ever applies while it is unset.
    #[serde(default)]
    pub start_timestamp: Option<i64>,
    #[serde(default)]
    pub groups: Vec<ExperimentGroup>,
    pub enrollment: Enrollment,
    #[serde(default)]
    pub defined_treatments: HashMap<String, Treatment>,
    /// Flags this experiment drives. Kept for admin bookkeeping; the read
    /// path trusts the treatment `flag_states` instead.
    #[serde(default)]
    pub flag_ids: Vec<String>,
}

impl Experiment {
    pub fn group_ids(&self) -> Vec<String> {
        self.groups.iter().map(|group| group.id.clone()).collect()
    }

    /// Creation-time validation, called by whatever layer admits experiment
    /// records (the in-memory store does it on insert). The evaluation path
    /// assumes these invariants hold and does not re-check them.
    pub fn validate(&self) -> Result<(), FlagError> {
        if !(0.0..=1.0).contains(&self.enrollment.proportion) {
            return Err(FlagError::InvalidArgument(format!(
                "experiment {}: enrollment proportion {} is outside [0, 1]",
                self.id, self.enrollment.proportion
            )));
        }

        let mut seen_group_ids = HashSet::new();
        for group in &self.groups {
            if !seen_group_ids.insert(group.id.as_str()) {
                return Err(FlagError::InvalidArgument(format!(
                    "experiment {}: duplicate group id {}",
                    self.id, group.id
                )));
            }
            if !(0.0..=1.0).contains(&group.proportion) {
                return Err(FlagError::InvalidArgument(format!(
                    "experiment {}: group {} proportion {} is outside [0, 1]",
                    self.id, group.id, group.proportion
                )));
            }
            for treatment_id in &group.sequence {
                if !self.defined_treatments.contains_key(treatment_id) {
                    return Err(FlagError::InvalidArgument(format!(
                        "experiment {}: group {} sequence references undefined treatment {}",
                        self.id, group.id, treatment_id
                    )));
                }
            }
        }

        for treatment in self.defined_treatments.values() {
            if treatment.duration <= 0 {
                return Err(FlagError::InvalidArgument(format!(
                    "experiment {}: treatment {} has non-positive duration {}",
                    self.id, treatment.id, treatment.duration
                )));
            }
        }

        Ok(())
    }
}
