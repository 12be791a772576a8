use std::collections::BTreeMap;
use std::sync::mpsc::{self, Receiver};

use ctlpanel_core::ControlId;
use ctlpanel_core::available::AvailableItem;
use ctlpanel_core::snapshot::ControlDataSnapshot;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub control: String,
    pub query: String,
    pub variables: BTreeMap<String, String>,
    pub token: u64,
}

/// One answer from an availability query. A source may send `Loading`
/// before it settles; `Data` and `Error` are final.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Loading,
    Data(Vec<AvailableItem>),
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidateRequest {
    pub control: String,
    pub validator: String,
    pub data: ControlDataSnapshot,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MutationRequest {
    pub mutation: Option<String>,
    pub data: ControlDataSnapshot,
}

/// The collaborators a panel calls out to. Asynchronous answers arrive on
/// the returned receivers and are picked up by `on_tick`.
pub trait PanelOps: Send + Sync {
    fn fetch_available(&self, request: FetchRequest) -> Receiver<FetchOutcome>;

    /// Resolves to the list of errors found; empty means valid.
    fn validate(&self, request: ValidateRequest) -> Receiver<Vec<String>>;

    /// Resolves to a status string; the configured failure status means the
    /// commit did not happen.
    fn mutate(&self, request: MutationRequest) -> Receiver<String>;

    /// Called for Back on the first step. Returns true when the host took
    /// over navigation.
    fn back_button_override(&self) -> bool {
        false
    }

    fn cancel_create(&self) {}

    fn reset_status(&self) {}

    fn set_editor_read_only(&self, _read_only: bool) {}
}

/// Collaborator for panels that run without a data layer. Every request
/// settles as a lost answer.
#[derive(Debug, Default)]
pub struct DetachedOps;

impl DetachedOps {
    pub fn new() -> Self {
        Self
    }
}

impl PanelOps for DetachedOps {
    fn fetch_available(&self, _request: FetchRequest) -> Receiver<FetchOutcome> {
        mpsc::channel().1
    }

    fn validate(&self, _request: ValidateRequest) -> Receiver<Vec<String>> {
        mpsc::channel().1
    }

    fn mutate(&self, _request: MutationRequest) -> Receiver<String> {
        mpsc::channel().1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeCause {
    Edit,
    InstanceAdded,
    InstanceRemoved,
    FetchStarted,
    FetchSettled,
    /// A delegated query must be re-run by the caller's data layer.
    RefetchRequested,
    StepValidated,
    StepChanged,
    Committed,
    CommitFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub revision: u64,
    pub cause: ChangeCause,
    pub changed: Vec<ControlId>,
}

/// Receives control-tree-changed notifications after every mutation.
pub trait ChangeListener {
    fn control_tree_changed(&self, event: &ChangeEvent);
}
