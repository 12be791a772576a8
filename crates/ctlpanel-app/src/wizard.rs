use std::collections::BTreeMap;
use std::sync::mpsc::Receiver;

use ctlpanel_core::ControlId;
use ctlpanel_core::partition::StepKind;
use ctlpanel_core::snapshot::CommitRecord;
use ctlpanel_core::validation;
use tracing::{debug, warn};

use crate::ops::{ChangeCause, MutationRequest, ValidateRequest};
use crate::panel::ControlPanel;
use crate::pending::{Settled, poll};

/// Key of the review step appended when the data declares none.
pub const REVIEW_STEP_KEY: &str = "review";
/// Key of the single step a form without steps runs as.
pub const FORM_STEP_KEY: &str = "form";

const LOST_VALIDATOR_MESSAGE: &str = "validator ended without an answer";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WizardStep {
    pub key: String,
    /// The declaring step control; `None` for implicit steps.
    pub title: Option<ControlId>,
    pub kind: StepKind,
    pub controls: Vec<ControlId>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepStatus {
    pub is_complete: bool,
    pub has_errors: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardPhase {
    Idle,
    Validating,
    Committing,
    /// The mutation succeeded; no further transitions run.
    Committed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardSignal {
    /// Nothing happened.
    Continue,
    /// Waiting on validators or the mutation; poll with `on_tick`.
    Pending,
    /// Refused because validation or the mutation is still running.
    Busy,
    /// The step did not complete; exceptions or step errors are set.
    Blocked,
    Moved(usize),
    /// The back-button collaborator took over navigation.
    HostNavigation,
    Cancelled,
    Committed,
    CommitFailed(String),
}

struct PendingCheck {
    control: ControlId,
    receiver: Receiver<Vec<String>>,
}

enum Phase {
    Idle,
    Validating {
        step: usize,
        pending: Vec<PendingCheck>,
        errors: Vec<(ControlId, Vec<String>)>,
    },
    Committing {
        step: usize,
        receiver: Receiver<String>,
    },
    Committed,
}

/// Step-by-step driver over a panel. Steps are re-derived from the live
/// partition on every call, so hide rules and gating stay current. Step
/// status is kept per step index.
pub struct Wizard {
    panel: ControlPanel,
    active: usize,
    status: BTreeMap<usize, StepStatus>,
    phase: Phase,
    commit: Option<CommitRecord>,
    mutation_failures: usize,
}

impl Wizard {
    pub fn new(panel: ControlPanel) -> Self {
        let mut wizard = Self {
            panel,
            active: 0,
            status: BTreeMap::new(),
            phase: Phase::Idle,
            commit: None,
            mutation_failures: 0,
        };

        let steps = wizard.steps();
        let resume = steps
            .first()
            .and_then(|step| step.title)
            .and_then(|id| wizard.panel.store().get(id))
            .and_then(|control| control.start_at_step);
        if let Some(index) = resume
            && index < steps.len()
        {
            for earlier in 0..index {
                wizard.status.entry(earlier).or_default().is_complete = true;
            }
            wizard.active = index;
            debug!(step = index, "resumed wizard");
        }
        wizard
    }

    pub fn panel(&self) -> &ControlPanel {
        &self.panel
    }

    pub fn panel_mut(&mut self) -> &mut ControlPanel {
        &mut self.panel
    }

    pub fn into_panel(self) -> ControlPanel {
        self.panel
    }

    /// The current step list, with the review step appended when none is declared.
    pub fn steps(&self) -> Vec<WizardStep> {
        let store = self.panel.store();
        let partition = self.panel.partition();
        let leading = partition
            .sections
            .iter()
            .flat_map(|section| section.content.iter().copied())
            .collect::<Vec<_>>();

        let mut steps = Vec::new();
        if partition.is_flat_form() {
            steps.push(WizardStep {
                key: FORM_STEP_KEY.to_string(),
                title: None,
                kind: StepKind::Step,
                controls: leading,
            });
        } else {
            for (index, node) in partition.steps.iter().enumerate() {
                let mut controls = if index == 0 { leading.clone() } else { Vec::new() };
                controls.extend(node.content());
                steps.push(WizardStep {
                    key: store
                        .get(node.title)
                        .map(|control| control.key.clone())
                        .unwrap_or_else(|| node.title.to_string()),
                    title: Some(node.title),
                    kind: node.kind,
                    controls,
                });
            }
        }

        if !steps.iter().any(|step| step.kind == StepKind::Review) {
            steps.push(WizardStep {
                key: REVIEW_STEP_KEY.to_string(),
                title: None,
                kind: StepKind::Review,
                controls: Vec::new(),
            });
        }
        steps
    }

    pub fn active(&self) -> usize {
        self.active.min(self.steps().len().saturating_sub(1))
    }

    pub fn active_step(&self) -> Option<WizardStep> {
        let active = self.active();
        self.steps().into_iter().nth(active)
    }

    pub fn status(&self, index: usize) -> StepStatus {
        self.status.get(&index).copied().unwrap_or_default()
    }

    pub fn phase(&self) -> WizardPhase {
        match self.phase {
            Phase::Idle => WizardPhase::Idle,
            Phase::Validating { .. } => WizardPhase::Validating,
            Phase::Committing { .. } => WizardPhase::Committing,
            Phase::Committed => WizardPhase::Committed,
        }
    }

    pub fn is_working(&self) -> bool {
        matches!(self.phase, Phase::Validating { .. } | Phase::Committing { .. })
    }

    pub fn is_committed(&self) -> bool {
        matches!(self.phase, Phase::Committed)
    }

    pub fn commit(&self) -> Option<&CommitRecord> {
        self.commit.as_ref()
    }

    pub fn mutation_failures(&self) -> usize {
        self.mutation_failures
    }

    /// A step is reachable from the step list when every earlier step has
    /// been completed and still passes its checks.
    pub fn can_jump_to(&self, index: usize) -> bool {
        let steps = self.steps();
        if index >= steps.len() {
            return false;
        }
        steps[..index].iter().enumerate().all(|(earlier, step)| {
            self.status(earlier).is_complete
                && validation::all_complete(self.panel.store(), &step.controls)
        })
    }

    pub fn jump_to(&mut self, index: usize) -> WizardSignal {
        if self.is_committed() {
            return WizardSignal::Continue;
        }
        if self.is_working() {
            return WizardSignal::Busy;
        }
        if !self.can_jump_to(index) {
            return WizardSignal::Blocked;
        }
        self.move_to(index)
    }

    pub fn next(&mut self) -> WizardSignal {
        if self.is_committed() {
            return WizardSignal::Continue;
        }
        if self.is_working() {
            return WizardSignal::Busy;
        }
        let active = self.active();
        let Some(step) = self.active_step() else {
            return WizardSignal::Continue;
        };

        let failures = self.panel.validate_controls(&step.controls);
        if !failures.is_empty() {
            debug!(step = %step.key, failures = failures.len(), "step has invalid controls");
            self.set_status(active, false, true);
            return WizardSignal::Blocked;
        }

        if step.kind == StepKind::Review {
            return self.begin_commit(active, step);
        }
        self.begin_validation(active, step)
    }

    pub fn back(&mut self) -> WizardSignal {
        if self.is_committed() {
            return WizardSignal::Continue;
        }
        if matches!(self.phase, Phase::Committing { .. }) {
            return WizardSignal::Busy;
        }
        if let Phase::Validating { step, .. } = &self.phase {
            debug!(step, "abandoned step validation");
            self.phase = Phase::Idle;
        }

        let active = self.active();
        if active == 0 {
            if self.panel.ops.back_button_override() {
                return WizardSignal::HostNavigation;
            }
            return WizardSignal::Continue;
        }
        self.move_to(active - 1)
    }

    pub fn cancel(&mut self) -> WizardSignal {
        self.panel.ops.cancel_create();
        WizardSignal::Cancelled
    }

    /// Drains settled fetches, validators and the mutation.
    pub fn on_tick(&mut self) -> WizardSignal {
        self.panel.on_tick();
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Idle => WizardSignal::Continue,
            Phase::Committed => {
                self.phase = Phase::Committed;
                WizardSignal::Continue
            }
            Phase::Validating {
                step,
                pending,
                errors,
            } => self.poll_validation(step, pending, errors),
            Phase::Committing { step, receiver } => match poll(&receiver) {
                Settled::Pending => {
                    self.phase = Phase::Committing { step, receiver };
                    WizardSignal::Pending
                }
                Settled::Ready(status) => self.finish_commit(step, status),
                Settled::Lost => {
                    let status = self.panel.config().wizard.failure_status.clone();
                    self.finish_commit(step, status)
                }
            },
        }
    }

    fn begin_validation(&mut self, index: usize, step: WizardStep) -> WizardSignal {
        let store = self.panel.store();
        let data = self.panel.snapshot();
        let mut pending = Vec::new();
        for id in store.expand(&step.controls) {
            if store.is_hidden(id) {
                continue;
            }
            let Some(control) = store.get(id) else {
                continue;
            };
            let Some(validator) = control.validator.clone() else {
                continue;
            };
            let receiver = self.panel.ops.validate(ValidateRequest {
                control: control.key.clone(),
                validator,
                data: data.clone(),
            });
            pending.push(PendingCheck {
                control: id,
                receiver,
            });
        }

        if pending.is_empty() {
            return self.complete_and_advance(index);
        }
        debug!(step = %step.key, validators = pending.len(), "validating step");
        self.phase = Phase::Validating {
            step: index,
            pending,
            errors: Vec::new(),
        };
        WizardSignal::Pending
    }

    fn poll_validation(
        &mut self,
        step: usize,
        pending: Vec<PendingCheck>,
        mut errors: Vec<(ControlId, Vec<String>)>,
    ) -> WizardSignal {
        let mut still_pending = Vec::new();
        for check in pending {
            match poll(&check.receiver) {
                Settled::Pending => still_pending.push(check),
                Settled::Ready(found) => errors.push((check.control, found)),
                Settled::Lost => {
                    errors.push((check.control, vec![LOST_VALIDATOR_MESSAGE.to_string()]));
                }
            }
        }

        if !still_pending.is_empty() {
            self.phase = Phase::Validating {
                step,
                pending: still_pending,
                errors,
            };
            return WizardSignal::Pending;
        }

        let mut failed = Vec::new();
        for (id, found) in errors {
            let Some(first) = found.into_iter().next() else {
                continue;
            };
            if let Ok(control) = self.panel.store.control_mut(id) {
                warn!(control = %control.key, error = %first, "step validator reported errors");
                control.exception = Some(first);
            }
            failed.push(id);
        }

        if failed.is_empty() {
            return self.complete_and_advance(step);
        }
        self.set_status(step, false, true);
        self.panel.notify(ChangeCause::StepValidated, failed);
        WizardSignal::Blocked
    }

    fn begin_commit(&mut self, index: usize, step: WizardStep) -> WizardSignal {
        let mutation = step
            .title
            .and_then(|id| self.panel.store().get(id))
            .and_then(|control| control.mutation.clone());
        let request = MutationRequest {
            mutation,
            data: self.panel.snapshot(),
        };

        self.panel.ops.reset_status();
        debug!(step = %step.key, "committing");
        let receiver = self.panel.ops.mutate(request);
        self.phase = Phase::Committing {
            step: index,
            receiver,
        };
        WizardSignal::Pending
    }

    fn finish_commit(&mut self, step: usize, status: String) -> WizardSignal {
        let wizard = self.panel.config().wizard.clone();
        if status == wizard.failure_status {
            self.mutation_failures += 1;
            warn!(step, %status, attempts = self.mutation_failures, "mutation failed");
            self.set_status(step, false, true);
            self.panel.notify(ChangeCause::CommitFailed, Vec::new());
            return WizardSignal::CommitFailed(status);
        }

        self.set_status(step, true, false);
        self.phase = Phase::Committed;
        if wizard.read_only_editor_on_commit {
            self.panel.ops.set_editor_read_only(true);
        }

        let steps = self.steps();
        let mut disabled = Vec::new();
        if wizard.disable_steps_on_commit {
            let earlier = steps[..step.min(steps.len())]
                .iter()
                .flat_map(|step| step.controls.iter().copied())
                .collect::<Vec<_>>();
            for id in self.panel.store().expand(&earlier) {
                if let Ok(control) = self.panel.store.control_mut(id) {
                    control.disabled = true;
                    disabled.push(id);
                }
            }
        }

        match CommitRecord::new(status, self.panel.snapshot()) {
            Ok(record) => {
                debug!(step, status = %record.status, at = %record.committed_at, "committed");
                self.commit = Some(record);
            }
            Err(error) => warn!(%error, "failed to timestamp commit"),
        }
        self.panel.notify(ChangeCause::Committed, disabled);

        if step + 1 < steps.len() {
            self.move_to(step + 1);
        }
        WizardSignal::Committed
    }

    fn complete_and_advance(&mut self, step: usize) -> WizardSignal {
        self.set_status(step, true, false);
        let next = step + 1;
        if next >= self.steps().len() {
            return WizardSignal::Continue;
        }
        self.move_to(next)
    }

    fn move_to(&mut self, index: usize) -> WizardSignal {
        self.active = index;
        debug!(step = index, "step changed");
        self.panel.notify(ChangeCause::StepChanged, Vec::new());
        WizardSignal::Moved(index)
    }

    fn set_status(&mut self, index: usize, is_complete: bool, has_errors: bool) {
        self.status.insert(
            index,
            StepStatus {
                is_complete,
                has_errors,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc::{self, Sender};
    use std::sync::{Arc, Mutex};

    use ctlpanel_core::config::PanelConfig;
    use ctlpanel_core::spec::ValidationSpec;
    use ctlpanel_core::{ControlKind, ControlSpec, ControlValue};

    use super::*;
    use crate::ops::{FetchOutcome, FetchRequest, PanelOps};

    #[derive(Default)]
    struct FakeOps {
        back_override: bool,
        calls: Mutex<Vec<String>>,
        validators: Mutex<Vec<Sender<Vec<String>>>>,
        mutations: Mutex<Vec<Sender<String>>>,
    }

    impl FakeOps {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("lock").clone()
        }
    }

    impl PanelOps for FakeOps {
        fn fetch_available(&self, _request: FetchRequest) -> Receiver<FetchOutcome> {
            mpsc::channel().1
        }

        fn validate(&self, request: ValidateRequest) -> Receiver<Vec<String>> {
            let (sender, receiver) = mpsc::channel();
            self.calls.lock().expect("lock").push(format!("validate:{}", request.validator));
            self.validators.lock().expect("lock").push(sender);
            receiver
        }

        fn mutate(&self, _request: MutationRequest) -> Receiver<String> {
            let (sender, receiver) = mpsc::channel();
            self.calls.lock().expect("lock").push("mutate".to_string());
            self.mutations.lock().expect("lock").push(sender);
            receiver
        }

        fn back_button_override(&self) -> bool {
            self.calls.lock().expect("lock").push("back_override".to_string());
            self.back_override
        }

        fn cancel_create(&self) {
            self.calls.lock().expect("lock").push("cancel".to_string());
        }
    }

    fn step(id: &str) -> ControlSpec {
        let mut spec = ControlSpec::new(id, ControlKind::Step);
        spec.name = Some(id.to_string());
        spec
    }

    fn required(id: &str) -> ControlSpec {
        let mut spec = ControlSpec::new(id, ControlKind::Text);
        spec.validation = Some(ValidationSpec {
            required: true,
            ..ValidationSpec::default()
        });
        spec
    }

    fn wizard(specs: &[ControlSpec], ops: FakeOps) -> (Wizard, Arc<FakeOps>) {
        let ops = Arc::new(ops);
        let panel = ControlPanel::open(specs, PanelConfig::default(), ops.clone()).expect("panel");
        (Wizard::new(panel), ops)
    }

    #[test]
    fn review_is_appended_when_missing() {
        let (wizard, _) = wizard(&[step("details"), required("name")], FakeOps::default());
        let steps = wizard.steps();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[1].key, REVIEW_STEP_KEY);
        assert_eq!(steps[1].kind, StepKind::Review);
    }

    #[test]
    fn flat_form_runs_as_one_step() {
        let (wizard, _) = wizard(&[required("name")], FakeOps::default());
        let steps = wizard.steps();
        assert_eq!(steps[0].key, FORM_STEP_KEY);
        assert_eq!(steps[0].controls.len(), 1);
        assert_eq!(steps.len(), 2);
    }

    #[test]
    fn step_validators_block_until_every_answer_is_in() {
        let mut quota = ControlSpec::new("quota", ControlKind::Number);
        quota.validator = Some("checkQuota".to_string());
        let mut owner = ControlSpec::new("owner", ControlKind::Text);
        owner.validator = Some("checkOwner".to_string());
        let (mut wizard, ops) = wizard(&[step("limits"), quota, owner], FakeOps::default());

        assert_eq!(wizard.next(), WizardSignal::Pending);
        assert_eq!(wizard.phase(), WizardPhase::Validating);
        assert_eq!(wizard.next(), WizardSignal::Busy);

        let senders = ops.validators.lock().expect("lock").clone();
        senders[0].send(Vec::new()).expect("send");
        assert_eq!(wizard.on_tick(), WizardSignal::Pending);

        senders[1].send(vec!["owner unknown".to_string()]).expect("send");
        assert_eq!(wizard.on_tick(), WizardSignal::Blocked);
        assert_eq!(wizard.active(), 0);
        assert!(wizard.status(0).has_errors);

        let owner = wizard.panel().control_id("owner").expect("owner");
        assert_eq!(
            wizard.panel().store().control(owner).expect("owner").exception.as_deref(),
            Some("owner unknown")
        );
        assert!(!wizard.can_jump_to(1));
    }

    #[test]
    fn lost_validator_counts_as_error() {
        let mut quota = ControlSpec::new("quota", ControlKind::Number);
        quota.validator = Some("checkQuota".to_string());
        let (mut wizard, ops) = wizard(&[step("limits"), quota], FakeOps::default());

        assert_eq!(wizard.next(), WizardSignal::Pending);
        ops.validators.lock().expect("lock").clear();
        assert_eq!(wizard.on_tick(), WizardSignal::Blocked);
    }

    #[test]
    fn back_abandons_validation_and_defers_to_host_on_first_step() {
        let mut quota = ControlSpec::new("quota", ControlKind::Number);
        quota.validator = Some("checkQuota".to_string());
        let ops = FakeOps {
            back_override: true,
            ..FakeOps::default()
        };
        let (mut wizard, ops) = wizard(&[step("limits"), quota], ops);

        assert_eq!(wizard.next(), WizardSignal::Pending);
        assert_eq!(wizard.back(), WizardSignal::HostNavigation);
        assert_eq!(wizard.phase(), WizardPhase::Idle);
        assert_eq!(ops.calls(), vec!["validate:checkQuota", "back_override"]);
    }

    #[test]
    fn cancel_only_calls_the_collaborator() {
        let (mut wizard, ops) = wizard(&[step("details"), required("name")], FakeOps::default());
        assert_eq!(wizard.cancel(), WizardSignal::Cancelled);
        assert_eq!(wizard.active(), 0);
        assert_eq!(ops.calls(), vec!["cancel"]);
    }

    #[test]
    fn start_at_step_resumes_with_earlier_steps_complete() {
        let mut first = step("details");
        first.start_at_step = Some(1);
        let mut name = required("name");
        name.active = ControlValue::text("kept");
        let (wizard, _) = wizard(
            &[first, name, step("network"), required("cidr")],
            FakeOps::default(),
        );

        assert_eq!(wizard.active(), 1);
        assert!(wizard.status(0).is_complete);
        assert!(wizard.can_jump_to(1));
        assert!(!wizard.can_jump_to(2));
    }

    #[test]
    fn declared_step_named_review_keeps_its_own_status() {
        let mut quota = ControlSpec::new("quota", ControlKind::Number);
        quota.validator = Some("checkQuota".to_string());
        let (mut wizard, ops) = wizard(&[step(REVIEW_STEP_KEY), quota], FakeOps::default());
        let steps = wizard.steps();
        assert_eq!(steps[0].key, steps[1].key);

        assert_eq!(wizard.next(), WizardSignal::Pending);
        let senders = ops.validators.lock().expect("lock").clone();
        senders[0].send(vec!["over quota".to_string()]).expect("send");
        assert_eq!(wizard.on_tick(), WizardSignal::Blocked);

        assert!(wizard.status(0).has_errors);
        assert_eq!(wizard.status(1), StepStatus::default());
    }

    #[test]
    fn back_moves_to_previous_step() {
        let mut name = required("name");
        name.active = ControlValue::text("kept");
        let (mut wizard, _) = wizard(&[step("details"), name, step("network")], FakeOps::default());

        assert_eq!(wizard.next(), WizardSignal::Moved(1));
        assert_eq!(wizard.back(), WizardSignal::Moved(0));
        assert!(wizard.can_jump_to(1));
        assert_eq!(wizard.jump_to(1), WizardSignal::Moved(1));
    }
}
