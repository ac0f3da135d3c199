#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use test_case::test_case;

    use crate::{
        api::{errors::FlagError, types::FlagValue},
        experiments::experiment_assignment::{assign_group, compute_assignment, current_treatment},
        flags::flag_models::RuleStatus,
        test_utils::{
            client_props, create_test_experiment, create_test_group, create_test_treatment,
        },
    };

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(ms).unwrap()
    }

    /// One group playing `[a (1000ms), b (2000ms)]` from T0.
    fn switchback_experiment(cycles: u32) -> crate::experiments::experiment_models::Experiment {
        create_test_experiment(
            "exp-1",
            Some(0),
            vec![create_test_group("group-a", &["treatment-a", "treatment-b"], cycles)],
            vec![
                create_test_treatment("treatment-a", 1_000, &[("flag-1", FlagValue::Boolean(true))]),
                create_test_treatment(
                    "treatment-b",
                    2_000,
                    &[("flag-1", FlagValue::Boolean(false))],
                ),
            ],
        )
    }

    #[test_case(0, Some("treatment-a"); "sequence start")]
    #[test_case(500, Some("treatment-a"); "inside first treatment")]
    #[test_case(1_000, Some("treatment-b"); "first boundary is exclusive")]
    #[test_case(1_500, Some("treatment-b"); "inside second treatment")]
    #[test_case(2_999, Some("treatment-b"); "last millisecond of the cycle")]
    #[test_case(3_000, None; "cycle exhausted at the boundary")]
    #[test_case(3_500, None; "past the only cycle")]
    fn test_single_cycle_sequencing(now_ms: i64, expected: Option<&str>) {
        let experiment = switchback_experiment(1);
        let group = &experiment.groups[0];
        let treatment = current_treatment(&experiment, group, at(now_ms)).unwrap();
        assert_eq!(treatment.map(|t| t.id.as_str()), expected);
    }

    #[test_case(3_500, Some("treatment-a"); "second cycle restarts the sequence")]
    #[test_case(4_500, Some("treatment-b"); "second cycle second treatment")]
    #[test_case(6_000, None; "both cycles exhausted")]
    fn test_sequence_repeats_per_cycle(now_ms: i64, expected: Option<&str>) {
        let experiment = switchback_experiment(2);
        let group = &experiment.groups[0];
        let treatment = current_treatment(&experiment, group, at(now_ms)).unwrap();
        assert_eq!(treatment.map(|t| t.id.as_str()), expected);
    }

    #[test]
    fn test_unstarted_experiment_has_no_treatment() {
        let mut experiment = switchback_experiment(1);
        experiment.start_timestamp = None;
        let group = &experiment.groups[0];
        assert!(current_treatment(&experiment, group, at(500))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_inactive_experiment_has_no_treatment() {
        let mut experiment = switchback_experiment(1);
        experiment.status = RuleStatus::Paused;
        let group = &experiment.groups[0];
        assert!(current_treatment(&experiment, group, at(500))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_experiment_starting_in_the_future_has_no_treatment() {
        let mut experiment = switchback_experiment(1);
        experiment.start_timestamp = Some(10_000);
        let group = &experiment.groups[0];
        assert!(current_treatment(&experiment, group, at(500))
            .unwrap()
            .is_none());
        assert!(current_treatment(&experiment, group, at(10_500))
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_undefined_treatment_in_sequence_is_loud() {
        let mut experiment = switchback_experiment(1);
        experiment.defined_treatments.remove("treatment-b");
        let group = &experiment.groups[0];
        let result = current_treatment(&experiment, group, at(500));
        assert!(matches!(result, Err(FlagError::DataIntegrityError(_))));
    }

    #[test]
    fn test_group_assignment_is_stable() {
        let experiment = create_test_experiment(
            "exp-1",
            Some(0),
            vec![
                create_test_group("group-a", &["treatment-a"], 1),
                create_test_group("group-b", &["treatment-a"], 1),
                create_test_group("group-c", &["treatment-a"], 1),
            ],
            vec![create_test_treatment(
                "treatment-a",
                1_000,
                &[("flag-1", FlagValue::Boolean(true))],
            )],
        );
        let props = client_props(&[("id", "user-42")]);

        let first = assign_group(&experiment, &props).unwrap().id.clone();
        for _ in 0..10 {
            assert_eq!(assign_group(&experiment, &props).unwrap().id, first);
        }
        assert!(experiment.groups.iter().any(|group| group.id == first));
    }

    #[test]
    fn test_group_assignment_ignores_unenrolled_attributes() {
        let experiment = switchback_experiment(1);
        let bare = client_props(&[("id", "user-42")]);
        let with_noise = client_props(&[("id", "user-42"), ("plan", "enterprise")]);
        assert_eq!(
            assign_group(&experiment, &bare).unwrap().id,
            assign_group(&experiment, &with_noise).unwrap().id
        );
    }

    #[test]
    fn test_assignment_returns_treatment_value_for_flag() {
        let experiment = switchback_experiment(1);
        let props = client_props(&[("id", "user-42")]);

        let assignment = compute_assignment(&experiment, "flag-1", &props, at(500))
            .unwrap()
            .unwrap();
        assert_eq!(assignment.experiment_id, "exp-1");
        assert_eq!(assignment.group_id, "group-a");
        assert_eq!(assignment.treatment_id, "treatment-a");
        assert_eq!(assignment.value, FlagValue::Boolean(true));
    }

    #[test]
    fn test_flag_not_covered_by_treatment_is_loud() {
        let experiment = switchback_experiment(1);
        let props = client_props(&[("id", "user-42")]);

        let result = compute_assignment(&experiment, "flag-unrelated", &props, at(500));
        assert!(matches!(result, Err(FlagError::DataIntegrityError(_))));
    }

    #[test]
    fn test_exhausted_cycles_yield_no_assignment() {
        let experiment = switchback_experiment(1);
        let props = client_props(&[("id", "user-42")]);
        assert!(compute_assignment(&experiment, "flag-1", &props, at(10_000))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_validate_rejects_bad_experiments() {
        let mut non_positive = switchback_experiment(1);
        non_positive
            .defined_treatments
            .get_mut("treatment-a")
            .unwrap()
            .duration = 0;
        assert!(matches!(
            non_positive.validate(),
            Err(FlagError::InvalidArgument(_))
        ));

        let mut duplicate_groups = switchback_experiment(1);
        duplicate_groups
            .groups
            .push(create_test_group("group-a", &["treatment-a"], 1));
        assert!(matches!(
            duplicate_groups.validate(),
            Err(FlagError::InvalidArgument(_))
        ));

        let mut undefined_sequence = switchback_experiment(1);
        undefined_sequence.groups[0]
            .sequence
            .push("treatment-ghost".to_string());
        assert!(matches!(
            undefined_sequence.validate(),
            Err(FlagError::InvalidArgument(_))
        ));

        assert!(switchback_experiment(1).validate().is_ok());
    }
}
