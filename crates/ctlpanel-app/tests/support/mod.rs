use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

use ctlpanel_app::{
    ControlPanel, FetchOutcome, FetchRequest, MutationRequest, PanelOps, ValidateRequest, Wizard,
};
use ctlpanel_core::config::PanelConfig;
use ctlpanel_core::spec::parse_control_data;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Fetch(String),
    Validate(String),
    Mutate(Option<String>),
    BackOverride,
    CancelCreate,
    ResetStatus,
    EditorReadOnly(bool),
}

/// Collaborator whose answers are sent by the test through the retained
/// senders, then picked up by `on_tick`.
#[derive(Default)]
pub struct ScriptedOps {
    calls: Mutex<Vec<Call>>,
    fetches: Mutex<Vec<Sender<FetchOutcome>>>,
    validators: Mutex<Vec<Sender<Vec<String>>>>,
    mutations: Mutex<Vec<Sender<String>>>,
    mutation_requests: Mutex<Vec<MutationRequest>>,
}

impl ScriptedOps {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn answer_fetch(&self, index: usize, outcome: FetchOutcome) {
        self.fetches.lock().expect("fetches lock")[index]
            .send(outcome)
            .expect("fetch receiver alive");
    }

    pub fn answer_validator(&self, index: usize, errors: &[&str]) {
        self.validators.lock().expect("validators lock")[index]
            .send(errors.iter().map(|error| (*error).to_string()).collect())
            .expect("validator receiver alive");
    }

    pub fn answer_mutation(&self, index: usize, status: &str) {
        self.mutations.lock().expect("mutations lock")[index]
            .send(status.to_string())
            .expect("mutation receiver alive");
    }

    /// Drops every retained sender, as a collaborator that died would.
    #[allow(dead_code)]
    pub fn hang_up(&self) {
        self.fetches.lock().expect("fetches lock").clear();
        self.validators.lock().expect("validators lock").clear();
        self.mutations.lock().expect("mutations lock").clear();
    }

    pub fn mutation_requests(&self) -> Vec<MutationRequest> {
        self.mutation_requests.lock().expect("requests lock").clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().expect("calls lock").push(call);
    }
}

impl PanelOps for ScriptedOps {
    fn fetch_available(&self, request: FetchRequest) -> Receiver<FetchOutcome> {
        let (sender, receiver) = mpsc::channel();
        self.record(Call::Fetch(request.control));
        self.fetches.lock().expect("fetches lock").push(sender);
        receiver
    }

    fn validate(&self, request: ValidateRequest) -> Receiver<Vec<String>> {
        let (sender, receiver) = mpsc::channel();
        self.record(Call::Validate(request.validator));
        self.validators.lock().expect("validators lock").push(sender);
        receiver
    }

    fn mutate(&self, request: MutationRequest) -> Receiver<String> {
        let (sender, receiver) = mpsc::channel();
        self.record(Call::Mutate(request.mutation.clone()));
        self.mutation_requests.lock().expect("requests lock").push(request);
        self.mutations.lock().expect("mutations lock").push(sender);
        receiver
    }

    fn back_button_override(&self) -> bool {
        self.record(Call::BackOverride);
        false
    }

    fn cancel_create(&self) {
        self.record(Call::CancelCreate);
    }

    fn reset_status(&self) {
        self.record(Call::ResetStatus);
    }

    fn set_editor_read_only(&self, read_only: bool) {
        self.record(Call::EditorReadOnly(read_only));
    }
}

pub fn open_panel(raw: &str) -> (ControlPanel, Arc<ScriptedOps>) {
    let specs = parse_control_data(raw).expect("control data");
    let ops = Arc::new(ScriptedOps::default());
    let panel = ControlPanel::open(&specs, PanelConfig::default(), ops.clone()).expect("panel");
    (panel, ops)
}

#[allow(dead_code)]
pub fn open_wizard(raw: &str) -> (Wizard, Arc<ScriptedOps>) {
    let (panel, ops) = open_panel(raw);
    (Wizard::new(panel), ops)
}
