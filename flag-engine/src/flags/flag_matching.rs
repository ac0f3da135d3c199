use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::{error, warn};

use crate::api::errors::FlagError;
use crate::api::types::{FlagResolution, FlagsResponse};
use crate::config::Config;
use crate::experiments::experiment_assignment::compute_assignment;
use crate::flags::flag_matching_utils::{
    compare_to_proportion, filter_identifiers, random_opaque_hash, AssignmentHasher,
};
use crate::flags::flag_models::{ClientPropMapping, FeatureFlag, FeatureFlagList, OverrideRule};
use crate::store::ExperimentReader;

/// Picks the override rule that applies to this client right now, if any.
///
/// Rules are visited in stored order and the first eligible rule whose
/// enrollment matches wins; later, equally eligible rules are never
/// considered. This is first-match-wins by design, not weighted selection.
/// `Ok(None)` is the normal "no override, use the default" outcome.
pub fn select_rule<'a>(
    rules: &[&'a OverrideRule],
    client_props: &ClientPropMapping,
    now: DateTime<Utc>,
) -> Result<Option<&'a OverrideRule>, FlagError> {
    for &rule in rules {
        if !rule.is_eligible(now) {
            continue;
        }
        let enrollment = rule.enrollment();
        let identifiers = filter_identifiers(client_props, &enrollment.attributes);
        if compare_to_proportion(identifiers, enrollment.proportion)? {
            return Ok(Some(rule));
        }
    }
    Ok(None)
}

/// Top-level resolution engine: combines rule selection with experiment
/// assignment (or forced-value extraction) to produce a final value per flag.
///
/// Holds no mutable state; every resolution is a pure computation over the
/// supplied records plus one experiment fetch and one assignment hash, so a
/// single resolver is safely shared across concurrent requests.
pub struct FeatureFlagResolver {
    experiment_reader: Arc<dyn ExperimentReader + Send + Sync>,
    hasher: AssignmentHasher,
}

impl FeatureFlagResolver {
    pub fn new(config: &Config, experiment_reader: Arc<dyn ExperimentReader + Send + Sync>) -> Self {
        Self {
            experiment_reader,
            hasher: AssignmentHasher::new(config),
        }
    }

    /// Resolves one flag for one client in one environment.
    ///
    /// A dangling experiment reference falls back to the flag's default and
    /// is not an error here; data-integrity failures propagate.
    pub async fn resolve_value(
        &self,
        flag: &FeatureFlag,
        environment_name: &str,
        client_props: &ClientPropMapping,
    ) -> Result<FlagResolution, FlagError> {
        match self
            .resolve_value_at(flag, environment_name, client_props, Utc::now())
            .await
        {
            Err(FlagError::ExperimentNotFound(id)) => {
                warn!(
                    flag = %flag.name,
                    experiment_id = %id,
                    "flag references an experiment that no longer exists, serving default"
                );
                Ok(default_resolution(flag))
            }
            other => other,
        }
    }

    /// Resolves every flag in the list independently and concurrently.
    ///
    /// One flag's failure never aborts its siblings: hard errors land in the
    /// response's error map, and flags whose experiment record is gone are
    /// served their default with a note in the same map.
    pub async fn resolve_all_for_environment(
        &self,
        flags: &FeatureFlagList,
        environment_name: &str,
        client_props: &ClientPropMapping,
    ) -> FlagsResponse {
        let now = Utc::now();
        let resolutions = join_all(flags.flags.iter().map(|flag| async move {
            (
                flag,
                self.resolve_value_at(flag, environment_name, client_props, now)
                    .await,
            )
        }))
        .await;

        let mut response = FlagsResponse::default();
        for (flag, result) in resolutions {
            match result {
                Ok(resolution) => {
                    response.flags.insert(flag.name.clone(), resolution);
                }
                Err(FlagError::ExperimentNotFound(id)) => {
                    warn!(
                        flag = %flag.name,
                        experiment_id = %id,
                        "flag references an experiment that no longer exists, serving default"
                    );
                    response.errors_while_computing_flags = true;
                    response.errors.insert(
                        flag.name.clone(),
                        format!("experiment {} not found, served default value", id),
                    );
                    response
                        .flags
                        .insert(flag.name.clone(), default_resolution(flag));
                }
                Err(e) => {
                    error!(flag = %flag.name, error = %e, "failed to resolve flag value");
                    response.errors_while_computing_flags = true;
                    response.errors.insert(flag.name.clone(), e.to_string());
                }
            }
        }
        response
    }

    /// Resolution against an explicit clock. Everything time-dependent hangs
    /// off `now` so tests control it; `ExperimentNotFound` is propagated and
    /// mapped to a default fallback by the public entry points.
    pub(crate) async fn resolve_value_at(
        &self,
        flag: &FeatureFlag,
        environment_name: &str,
        client_props: &ClientPropMapping,
        now: DateTime<Utc>,
    ) -> Result<FlagResolution, FlagError> {
        let rules = flag.rules_for_environment(environment_name);
        let Some(rule) = select_rule(&rules, client_props, now)? else {
            return Ok(default_resolution(flag));
        };

        match rule {
            OverrideRule::ForcedValue(forced) => Ok(FlagResolution {
                value: forced.value.clone(),
                hash: random_opaque_hash(),
            }),
            OverrideRule::ExperimentReference(reference) => {
                let experiment = self.experiment_reader.experiment_by_id(&reference.id).await?;
                match compute_assignment(&experiment, &flag.id, client_props, now)? {
                    Some(assignment) => {
                        let hash = self
                            .hasher
                            .hash(&[
                                &assignment.experiment_id,
                                &assignment.group_id,
                                &assignment.treatment_id,
                            ])
                            .await?;
                        Ok(FlagResolution {
                            value: assignment.value,
                            hash,
                        })
                    }
                    // Not started, out of window, or cycles exhausted.
                    None => Ok(default_resolution(flag)),
                }
            }
        }
    }
}

fn default_resolution(flag: &FeatureFlag) -> FlagResolution {
    FlagResolution {
        value: flag.default_value.clone(),
        hash: random_opaque_hash(),
    }
}
