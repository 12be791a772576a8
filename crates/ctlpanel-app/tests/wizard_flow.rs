mod support;

use std::sync::Arc;

use ctlpanel_app::{ControlPanel, WizardPhase, WizardSignal};
use ctlpanel_core::config::PanelConfig;
use ctlpanel_core::spec::parse_control_data;
use ctlpanel_core::validation::REQUIRED_MESSAGE;
use ctlpanel_core::{ControlError, ControlValue};

use support::{Call, ScriptedOps, open_wizard};

const CREATE_CLUSTER: &str = r#"
[[controls]]
id = "details"
type = "step"
name = "Details"

[[controls]]
id = "name"
type = "text"
validation = { required = true }

[[controls]]
id = "confirm"
type = "review"
name = "Review"
mutation = "createCluster"
"#;

#[test]
fn required_name_gates_the_first_step() {
    let (mut wizard, _ops) = open_wizard(CREATE_CLUSTER);
    let name = wizard.panel().control_id("name").expect("name");

    assert_eq!(wizard.next(), WizardSignal::Blocked);
    assert_eq!(wizard.active(), 0);
    assert_eq!(
        wizard.panel().store().control(name).expect("name").exception.as_deref(),
        Some(REQUIRED_MESSAGE)
    );
    assert!(!wizard.can_jump_to(1));

    wizard
        .panel_mut()
        .set_value(name, ControlValue::text("foo"))
        .expect("edit");
    assert_eq!(wizard.next(), WizardSignal::Moved(1));
    assert!(wizard.status(0).is_complete);
    assert!(wizard.can_jump_to(1));
    assert_eq!(
        wizard.active_step().expect("review").key,
        "confirm".to_string()
    );
}

#[test]
fn failed_mutations_keep_the_wizard_on_review() {
    let (mut wizard, ops) = open_wizard(CREATE_CLUSTER);
    wizard
        .panel_mut()
        .set_path("name", ControlValue::text("foo"))
        .expect("edit");
    assert_eq!(wizard.next(), WizardSignal::Moved(1));

    for attempt in 0..2 {
        assert_eq!(wizard.next(), WizardSignal::Pending);
        assert_eq!(wizard.phase(), WizardPhase::Committing);
        ops.answer_mutation(attempt, "ERROR");
        assert_eq!(
            wizard.on_tick(),
            WizardSignal::CommitFailed("ERROR".to_string())
        );
        assert_eq!(wizard.active(), 1);
        assert!(!wizard.status(1).is_complete);
        assert!(wizard.status(1).has_errors);
    }

    assert_eq!(wizard.mutation_failures(), 2);
    assert!(wizard.commit().is_none());
    let name = wizard.panel().control_id("name").expect("name");
    assert!(!wizard.panel().store().control(name).expect("name").disabled);
}

#[test]
fn successful_mutation_completes_review_and_locks_earlier_steps() {
    let (mut wizard, ops) = open_wizard(CREATE_CLUSTER);
    wizard
        .panel_mut()
        .set_path("name", ControlValue::text("foo"))
        .expect("edit");
    wizard.next();

    assert_eq!(wizard.next(), WizardSignal::Pending);
    assert_eq!(wizard.next(), WizardSignal::Busy);
    assert_eq!(wizard.back(), WizardSignal::Busy);

    ops.answer_mutation(0, "ERROR");
    wizard.on_tick();
    assert_eq!(wizard.next(), WizardSignal::Pending);
    ops.answer_mutation(1, "OK");
    assert_eq!(wizard.on_tick(), WizardSignal::Committed);

    assert!(wizard.status(1).is_complete);
    assert!(!wizard.status(1).has_errors);
    assert_eq!(wizard.active(), 1);

    let record = wizard.commit().expect("commit record");
    assert_eq!(record.status, "OK");
    assert_eq!(record.snapshot.value("name"), Some(&ControlValue::text("foo")));
    assert!(!record.committed_at.is_empty());

    let requests = ops.mutation_requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].mutation.as_deref(), Some("createCluster"));
    assert_eq!(
        requests[1].data.value("name"),
        Some(&ControlValue::text("foo"))
    );
    assert_eq!(
        ops.calls(),
        vec![
            Call::ResetStatus,
            Call::Mutate(Some("createCluster".to_string())),
            Call::ResetStatus,
            Call::Mutate(Some("createCluster".to_string())),
            Call::EditorReadOnly(true),
        ]
    );

    let error = wizard
        .panel_mut()
        .set_path("name", ControlValue::text("bar"))
        .expect_err("locked");
    assert!(matches!(error, ControlError::Disabled { .. }));
}

#[test]
fn committed_wizard_ignores_further_navigation() {
    let (mut wizard, ops) = open_wizard(CREATE_CLUSTER);
    wizard
        .panel_mut()
        .set_path("name", ControlValue::text("foo"))
        .expect("edit");
    assert_eq!(wizard.next(), WizardSignal::Moved(1));
    assert_eq!(wizard.next(), WizardSignal::Pending);
    ops.answer_mutation(0, "OK");
    assert_eq!(wizard.on_tick(), WizardSignal::Committed);
    assert_eq!(wizard.phase(), WizardPhase::Committed);
    assert!(wizard.is_committed());

    assert_eq!(wizard.next(), WizardSignal::Continue);
    assert_eq!(wizard.back(), WizardSignal::Continue);
    assert_eq!(wizard.jump_to(0), WizardSignal::Continue);
    assert_eq!(wizard.on_tick(), WizardSignal::Continue);
    assert_eq!(wizard.active(), 1);
    assert_eq!(ops.mutation_requests().len(), 1);
}

#[test]
fn commit_payload_carries_hidden_values_but_not_gated_ones() {
    let (mut wizard, ops) = open_wizard(
        r#"
[[controls]]
id = "token"
type = "hidden"
active = "secret-ref"

[[controls]]
id = "name"
type = "text"
active = "web"

[[controls]]
id = "addons"
type = "checkbox"
pause_control_creation_here_until_selected = true

[[controls]]
id = "monitoring"
type = "text"
active = "on"
"#,
    );

    assert_eq!(wizard.next(), WizardSignal::Moved(1));
    assert_eq!(wizard.next(), WizardSignal::Pending);
    let request = ops.mutation_requests().remove(0);
    assert_eq!(request.data.value("token"), Some(&ControlValue::text("secret-ref")));
    assert_eq!(request.data.value("name"), Some(&ControlValue::text("web")));
    assert_eq!(request.data.value("monitoring"), None);
    let labels = wizard
        .panel()
        .summarize()
        .into_iter()
        .map(|line| line.label)
        .collect::<Vec<_>>();
    assert_eq!(labels, ["name", "addons"]);
}

#[test]
fn lost_mutation_counts_as_failure() {
    let (mut wizard, ops) = open_wizard(CREATE_CLUSTER);
    wizard
        .panel_mut()
        .set_path("name", ControlValue::text("foo"))
        .expect("edit");
    wizard.next();
    wizard.next();
    ops.hang_up();

    assert_eq!(
        wizard.on_tick(),
        WizardSignal::CommitFailed("ERROR".to_string())
    );
}

#[test]
fn commit_side_effects_follow_config() {
    let specs = parse_control_data(CREATE_CLUSTER).expect("control data");
    let mut config = PanelConfig::default();
    config.wizard.disable_steps_on_commit = false;
    config.wizard.read_only_editor_on_commit = false;
    config.wizard.failure_status = "FAILED".to_string();
    let ops = Arc::new(ScriptedOps::default());
    let panel = ControlPanel::open(&specs, config, ops.clone()).expect("panel");
    let mut wizard = ctlpanel_app::Wizard::new(panel);

    wizard
        .panel_mut()
        .set_path("name", ControlValue::text("foo"))
        .expect("edit");
    wizard.next();
    wizard.next();
    ops.answer_mutation(0, "ERROR");
    assert_eq!(wizard.on_tick(), WizardSignal::Committed);

    assert!(!ops.calls().contains(&Call::EditorReadOnly(true)));
    wizard
        .panel_mut()
        .set_path("name", ControlValue::text("bar"))
        .expect("still editable");
}

#[test]
fn implicit_review_commits_without_a_named_mutation() {
    let (mut wizard, ops) = open_wizard(
        r#"
[[controls]]
id = "name"
type = "text"
"#,
    );
    assert_eq!(wizard.steps().len(), 2);
    assert_eq!(wizard.next(), WizardSignal::Moved(1));
    assert_eq!(wizard.next(), WizardSignal::Pending);
    ops.answer_mutation(0, "OK");
    assert_eq!(wizard.on_tick(), WizardSignal::Committed);
    assert!(wizard.status(1).is_complete);
    assert_eq!(ops.calls()[1], Call::Mutate(None));
}

#[test]
fn step_validators_run_together_and_gate_advancement() {
    let (mut wizard, ops) = open_wizard(
        r#"
[[controls]]
id = "network"
type = "step"

[[controls]]
id = "cidr"
type = "text"
validator = "checkCidr"

[[controls]]
id = "vpc"
type = "text"
validator = "checkVpc"

[[controls]]
id = "nodes"
type = "step"
"#,
    );

    assert_eq!(wizard.next(), WizardSignal::Pending);
    assert_eq!(
        ops.calls(),
        vec![
            Call::Validate("checkCidr".to_string()),
            Call::Validate("checkVpc".to_string()),
        ]
    );

    ops.answer_validator(1, &["vpc not found"]);
    assert_eq!(wizard.on_tick(), WizardSignal::Pending);
    ops.answer_validator(0, &[]);
    assert_eq!(wizard.on_tick(), WizardSignal::Blocked);
    assert!(wizard.status(0).has_errors);
    assert!(!wizard.can_jump_to(1));

    wizard
        .panel_mut()
        .set_path("vpc", ControlValue::text("vpc-2"))
        .expect("edit");
    assert_eq!(wizard.next(), WizardSignal::Pending);
    ops.answer_validator(2, &[]);
    ops.answer_validator(3, &[]);
    assert_eq!(wizard.on_tick(), WizardSignal::Moved(1));
    assert!(wizard.status(0).is_complete);
}

#[test]
fn can_jump_to_tracks_live_completion_of_earlier_steps() {
    let (mut wizard, _ops) = open_wizard(
        r#"
[[controls]]
id = "one"
type = "step"

[[controls]]
id = "name"
type = "text"
active = "web"
validation = { required = true }

[[controls]]
id = "two"
type = "step"

[[controls]]
id = "size"
type = "text"
active = "small"

[[controls]]
id = "three"
type = "step"
"#,
    );

    assert!(wizard.can_jump_to(0));
    assert!(!wizard.can_jump_to(1));
    assert_eq!(wizard.next(), WizardSignal::Moved(1));
    assert_eq!(wizard.next(), WizardSignal::Moved(2));
    assert!(wizard.can_jump_to(2));
    assert_eq!(wizard.jump_to(0), WizardSignal::Moved(0));

    wizard
        .panel_mut()
        .set_path("name", ControlValue::text(""))
        .expect("edit");
    assert!(!wizard.can_jump_to(1));
    assert_eq!(wizard.jump_to(2), WizardSignal::Blocked);
}

#[test]
fn cancel_delegates_without_moving() {
    let (mut wizard, ops) = open_wizard(CREATE_CLUSTER);
    assert_eq!(wizard.back(), WizardSignal::Continue);
    assert_eq!(wizard.cancel(), WizardSignal::Cancelled);
    assert_eq!(wizard.active(), 0);
    assert_eq!(ops.calls(), vec![Call::BackOverride, Call::CancelCreate]);
}
