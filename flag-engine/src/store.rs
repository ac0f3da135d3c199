use std::collections::HashMap;

use async_trait::async_trait;

use crate::api::errors::FlagError;
use crate::experiments::experiment_models::Experiment;
use crate::flags::flag_models::{FeatureFlag, FeatureFlagList};

/// Resolves the weak reference from an experiment-type override rule to the
/// full experiment record. The engine never embeds experiment data in a flag;
/// it always goes through this seam, which is what lets it run against an
/// in-memory fake in tests.
#[async_trait]
pub trait ExperimentReader {
    /// Returns the experiment or `FlagError::ExperimentNotFound`.
    async fn experiment_by_id(&self, id: &str) -> Result<Experiment, FlagError>;
}

/// "Fetch all flags enabled for an environment" collaborator contract. The
/// surrounding service backs this with its document store; the engine only
/// specifies the shape.
#[async_trait]
pub trait FlagReader {
    async fn flags_for_environment(
        &self,
        environment_name: &str,
    ) -> Result<FeatureFlagList, FlagError>;
}

/// Map-backed store implementing both reader traits. Used by tests and
/// embedders; not a production datastore.
#[derive(Default)]
pub struct InMemoryStore {
    experiments: HashMap<String, Experiment>,
    flags: Vec<FeatureFlag>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admits an experiment record, enforcing the creation-time invariants
    /// the evaluation path assumes (positive durations, unique group ids,
    /// proportions in range).
    pub fn insert_experiment(&mut self, experiment: Experiment) -> Result<(), FlagError> {
        experiment.validate()?;
        self.experiments.insert(experiment.id.clone(), experiment);
        Ok(())
    }

    pub fn insert_flag(&mut self, flag: FeatureFlag) {
        self.flags.push(flag);
    }

    pub fn remove_experiment(&mut self, id: &str) -> Option<Experiment> {
        self.experiments.remove(id)
    }
}

#[async_trait]
impl ExperimentReader for InMemoryStore {
    async fn experiment_by_id(&self, id: &str) -> Result<Experiment, FlagError> {
        self.experiments
            .get(id)
            .cloned()
            .ok_or_else(|| FlagError::ExperimentNotFound(id.to_string()))
    }
}

#[async_trait]
impl FlagReader for InMemoryStore {
    /// A flag is considered enabled for an environment when at least one of
    /// its override rules targets that environment.
    async fn flags_for_environment(
        &self,
        environment_name: &str,
    ) -> Result<FeatureFlagList, FlagError> {
        let flags = self
            .flags
            .iter()
            .filter(|flag| {
                flag.override_rules
                    .iter()
                    .any(|rule| rule.environment_name() == environment_name)
            })
            .cloned()
            .collect();
        Ok(FeatureFlagList::new(flags))
    }
}
