use chrono::{DateTime, Utc};
use tracing::error;

use crate::api::errors::FlagError;
use crate::api::types::FlagValue;
use crate::experiments::experiment_models::{Experiment, ExperimentGroup, Treatment};
use crate::flags::flag_matching_utils::{assign, filter_identifiers};
use crate::flags::flag_models::{ClientPropMapping, RuleStatus};

/// The outcome of placing one client in one experiment for one flag: the ids
/// that make the placement reproducible, and the value the flag takes.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentAssignment {
    pub experiment_id: String,
    pub group_id: String,
    pub treatment_id: String,
    pub value: FlagValue,
}

/// Buckets the client into exactly one of the experiment's groups.
///
/// Stable for as long as the group-id set is unchanged; adding or removing a
/// group reshuffles every client's assignment. That is documented behavior,
/// not a bug.
pub fn assign_group<'a>(
    experiment: &'a Experiment,
    client_props: &ClientPropMapping,
) -> Result<&'a ExperimentGroup, FlagError> {
    let group_ids = experiment.group_ids();
    let chosen = assign(
        filter_identifiers(client_props, &experiment.enrollment.attributes),
        &group_ids,
    )?
    .to_string();

    experiment
        .groups
        .iter()
        .find(|group| group.id == chosen)
        .ok_or_else(|| {
            FlagError::Internal(format!(
                "assigned group {} missing from experiment {}",
                chosen, experiment.id
            ))
        })
}

/// Walks the group's treatment sequence to find the treatment covering `now`.
///
/// Treatments play back-to-back from `start_timestamp`, each consuming its
/// own duration, and the whole sequence repeats `cycles` times. There is no
/// persisted "current treatment" state anywhere; the position is always a
/// pure function of elapsed time and the durations.
///
/// Returns `None` (not an error) when the experiment has not been started,
/// is not active, has not reached its start yet, or has exhausted its cycles.
pub fn current_treatment<'a>(
    experiment: &'a Experiment,
    group: &ExperimentGroup,
    now: DateTime<Utc>,
) -> Result<Option<&'a Treatment>, FlagError> {
    if experiment.status != RuleStatus::Active {
        return Ok(None);
    }
    let Some(start) = experiment.start_timestamp else {
        return Ok(None);
    };
    let elapsed = now.timestamp_millis() - start;
    if elapsed < 0 {
        return Ok(None);
    }

    let mut cycle_len: i64 = 0;
    for treatment_id in &group.sequence {
        let treatment = lookup_treatment(experiment, group, treatment_id)?;
        cycle_len += treatment.duration;
    }
    if cycle_len == 0 {
        return Ok(None);
    }
    if elapsed / cycle_len >= i64::from(group.cycles) {
        return Ok(None);
    }

    let mut remaining = elapsed % cycle_len;
    for treatment_id in &group.sequence {
        let treatment = lookup_treatment(experiment, group, treatment_id)?;
        if remaining < treatment.duration {
            return Ok(Some(treatment));
        }
        remaining -= treatment.duration;
    }

    // remaining < cycle_len, so the walk above always terminates early.
    Ok(None)
}

fn lookup_treatment<'a>(
    experiment: &'a Experiment,
    group: &ExperimentGroup,
    treatment_id: &str,
) -> Result<&'a Treatment, FlagError> {
    experiment
        .defined_treatments
        .get(treatment_id)
        .ok_or_else(|| {
            error!(
                experiment_id = %experiment.id,
                group_id = %group.id,
                treatment_id = %treatment_id,
                "group sequence references a treatment the experiment does not define"
            );
            FlagError::DataIntegrityError(format!(
                "treatment {} in group {} sequence is not defined on experiment {}",
                treatment_id, group.id, experiment.id
            ))
        })
}

/// Full assignment for one flag: group, current treatment, and the value the
/// treatment prescribes for the flag.
///
/// `Ok(None)` means "no treatment applies right now, serve the default". A
/// treatment that is running but carries no state for a flag it supposedly
/// drives is a data-integrity failure and is surfaced loudly rather than
/// silently defaulted, since it means the flag references an experiment that
/// no longer targets it.
pub fn compute_assignment(
    experiment: &Experiment,
    flag_id: &str,
    client_props: &ClientPropMapping,
    now: DateTime<Utc>,
) -> Result<Option<ExperimentAssignment>, FlagError> {
    let group = assign_group(experiment, client_props)?;
    let Some(treatment) = current_treatment(experiment, group, now)? else {
        return Ok(None);
    };

    let state = treatment
        .flag_states
        .iter()
        .find(|state| state.id == flag_id)
        .ok_or_else(|| {
            error!(
                experiment_id = %experiment.id,
                treatment_id = %treatment.id,
                flag_id = %flag_id,
                "running treatment has no state for a flag driven by this experiment"
            );
            FlagError::DataIntegrityError(format!(
                "flag {} is driven by experiment {} but treatment {} defines no state for it",
                flag_id, experiment.id, treatment.id
            ))
        })?;

    Ok(Some(ExperimentAssignment {
        experiment_id: experiment.id.clone(),
        group_id: group.id.clone(),
        treatment_id: treatment.id.clone(),
        value: state.value.clone(),
    }))
}
