use std::collections::HashMap;

use crate::api::types::FlagValue;
use crate::experiments::experiment_models::{Experiment, ExperimentGroup, FlagState, Treatment};
use crate::flags::flag_models::{
    ClientPropMapping, ClientPropValue, Enrollment, ExperimentReferenceRule, FeatureFlag,
    FlagValueType, ForcedValueRule, OverrideRule, RuleStatus,
};

pub fn client_props(entries: &[(&str, &str)]) -> ClientPropMapping {
    entries
        .iter()
        .map(|(name, value)| {
            (
                name.to_string(),
                ClientPropValue::String(value.to_string()),
            )
        })
        .collect()
}

/// Enrollment that buckets on the client's `id` attribute and matches the
/// whole population.
pub fn enroll_everyone() -> Enrollment {
    Enrollment {
        attributes: vec!["id".to_string()],
        proportion: 1.0,
    }
}

pub fn create_test_flag(
    id: &str,
    name: &str,
    default_value: FlagValue,
    override_rules: Vec<OverrideRule>,
) -> FeatureFlag {
    FeatureFlag {
        id: id.to_string(),
        name: name.to_string(),
        description: None,
        value_type: FlagValueType::of(&default_value),
        default_value,
        override_rules,
    }
}

pub fn forced_value_rule(id: &str, environment_name: &str, value: FlagValue) -> OverrideRule {
    OverrideRule::ForcedValue(ForcedValueRule {
        id: id.to_string(),
        description: None,
        status: RuleStatus::Active,
        start_timestamp: None,
        end_timestamp: None,
        environment_name: environment_name.to_string(),
        enrollment: enroll_everyone(),
        value,
    })
}

pub fn experiment_reference_rule(experiment_id: &str, environment_name: &str) -> OverrideRule {
    OverrideRule::ExperimentReference(ExperimentReferenceRule {
        id: experiment_id.to_string(),
        name: format!("experiment {}", experiment_id),
        description: None,
        status: RuleStatus::Active,
        start_timestamp: None,
        end_timestamp: None,
        environment_name: environment_name.to_string(),
        enrollment: enroll_everyone(),
    })
}

pub fn create_test_treatment(
    id: &str,
    duration: i64,
    flag_values: &[(&str, FlagValue)],
) -> Treatment {
    Treatment {
        id: id.to_string(),
        name: id.to_string(),
        duration,
        flag_states: flag_values
            .iter()
            .map(|(flag_id, value)| FlagState {
                id: flag_id.to_string(),
                value: value.clone(),
            })
            .collect(),
    }
}

pub fn create_test_group(id: &str, sequence: &[&str], cycles: u32) -> ExperimentGroup {
    ExperimentGroup {
        id: id.to_string(),
        name: id.to_string(),
        proportion: 0.5,
        sequence: sequence.iter().map(|s| s.to_string()).collect(),
        cycles,
    }
}

pub fn create_test_experiment(
    id: &str,
    start_timestamp: Option<i64>,
    groups: Vec<ExperimentGroup>,
    treatments: Vec<Treatment>,
) -> Experiment {
    let flag_ids = treatments
        .iter()
        .flat_map(|treatment| treatment.flag_states.iter().map(|state| state.id.clone()))
        .collect();
    Experiment {
        id: id.to_string(),
        name: format!("experiment {}", id),
        status: RuleStatus::Active,
        start_timestamp,
        groups,
        enrollment: enroll_everyone(),
        defined_treatments: treatments
            .into_iter()
            .map(|treatment| (treatment.id.clone(), treatment))
            .collect::<HashMap<String, Treatment>>(),
        flag_ids,
    }
}
