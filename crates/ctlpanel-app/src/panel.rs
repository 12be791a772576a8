use std::sync::Arc;
use std::sync::mpsc::Receiver;

use ctlpanel_core::config::PanelConfig;
use ctlpanel_core::partition::{Partition, partition};
use ctlpanel_core::snapshot::ControlDataSnapshot;
use ctlpanel_core::summary::{SummaryLine, summarize};
use ctlpanel_core::sync::{SessionFlags, apply_edit};
use ctlpanel_core::{ControlError, ControlId, ControlSpec, ControlStore, ControlValue, group, validation};
use tracing::debug;

use crate::ops::{ChangeCause, ChangeEvent, ChangeListener, FetchOutcome, PanelOps};

pub(crate) struct PendingFetch {
    pub(crate) control: ControlId,
    pub(crate) token: u64,
    pub(crate) receiver: Receiver<FetchOutcome>,
}

/// One creation/edit session over a control tree. Owns the store, the
/// explicit session flags, in-flight fetches and the change listener.
pub struct ControlPanel {
    pub(crate) store: ControlStore,
    pub(crate) flags: SessionFlags,
    pub(crate) config: PanelConfig,
    pub(crate) ops: Arc<dyn PanelOps>,
    pub(crate) pending_fetches: Vec<PendingFetch>,
    pub(crate) next_fetch_token: u64,
    listener: Option<Box<dyn ChangeListener>>,
    revision: u64,
}

impl ControlPanel {
    pub fn open(
        specs: &[ControlSpec],
        config: PanelConfig,
        ops: Arc<dyn PanelOps>,
    ) -> Result<Self, ControlError> {
        let store = ControlStore::from_specs(specs)?;
        let mut panel = Self {
            store,
            flags: SessionFlags::default(),
            config,
            ops,
            pending_fetches: Vec::new(),
            next_fetch_token: 1,
            listener: None,
            revision: 0,
        };

        if panel.config.fetch.fetch_on_open {
            panel.start_visible_fetches();
        }
        Ok(panel)
    }

    pub fn with_listener(mut self, listener: Box<dyn ChangeListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn store(&self) -> &ControlStore {
        &self.store
    }

    pub fn flags(&self) -> &SessionFlags {
        &self.flags
    }

    pub fn config(&self) -> &PanelConfig {
        &self.config
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn control_id(&self, path: &str) -> Result<ControlId, ControlError> {
        self.store.find_path(path)
    }

    pub fn partition(&self) -> Partition {
        partition(&self.store)
    }

    pub fn summarize(&self) -> Vec<SummaryLine> {
        summarize(&self.store)
    }

    pub fn snapshot(&self) -> ControlDataSnapshot {
        ControlDataSnapshot::capture(&self.store)
    }

    /// Applies a user edit. Synchronization and per-control validation finish
    /// before the listener hears about it. An edit that opens a pause gate
    /// starts the queries of the controls it releases.
    pub fn set_value(&mut self, id: ControlId, value: ControlValue) -> Result<(), ControlError> {
        let (flags, outcome) = apply_edit(&mut self.store, self.flags.clone(), id, value)?;
        self.flags = flags;
        for changed in &outcome.changed {
            validation::refresh_exception(&mut self.store, *changed);
        }
        self.notify(ChangeCause::Edit, outcome.changed);
        if self.config.fetch.fetch_on_open {
            self.start_visible_fetches();
        }
        Ok(())
    }

    pub fn set_path(&mut self, path: &str, value: ControlValue) -> Result<(), ControlError> {
        let id = self.store.find_path(path)?;
        self.set_value(id, value)
    }

    pub fn add_instance(&mut self, group: ControlId) -> Result<usize, ControlError> {
        let index = group::add_instance(&mut self.store, group)?;
        self.after_instance_added(group, index);
        Ok(index)
    }

    pub fn duplicate_instance(&mut self, group: ControlId, index: usize) -> Result<usize, ControlError> {
        let index = group::duplicate_instance(&mut self.store, group, index)?;
        self.after_instance_added(group, index);
        Ok(index)
    }

    pub fn remove_instance(&mut self, group: ControlId, index: usize) -> Result<(), ControlError> {
        group::remove_instance(&mut self.store, group, index)?;
        validation::refresh_exception(&mut self.store, group);
        self.notify(ChangeCause::InstanceRemoved, vec![group]);
        Ok(())
    }

    pub fn shows_delete(&self, group: ControlId) -> bool {
        group::shows_delete(&self.store, group)
    }

    /// Validates every control the current partition renders and returns
    /// the failures. Controls behind an unselected gate are not checked.
    pub fn validate_all(&mut self) -> Vec<ControlId> {
        let partition = self.partition();
        let rendered = partition
            .sections
            .iter()
            .flat_map(|section| section.content.iter().copied())
            .chain(partition.steps.iter().flat_map(|step| step.content()))
            .collect::<Vec<_>>();
        self.validate_controls(&rendered)
    }

    /// Validates `ids`, group instances included, and returns the failures.
    pub fn validate_controls(&mut self, ids: &[ControlId]) -> Vec<ControlId> {
        let failures = validation::validate_controls(&mut self.store, ids);
        if !failures.is_empty() {
            self.notify(ChangeCause::Edit, failures.clone());
        }
        failures
    }

    /// Drains settled asynchronous work. Call on every UI tick.
    pub fn on_tick(&mut self) {
        self.drain_fetches();
    }

    fn after_instance_added(&mut self, group: ControlId, index: usize) {
        let members = group::instance_controls(&self.store, group, index)
            .map(<[ControlId]>::to_vec)
            .unwrap_or_default();
        if self.config.fetch.fetch_on_open {
            self.start_visible_fetches();
        }
        validation::refresh_exception(&mut self.store, group);
        let mut changed = vec![group];
        changed.extend(members);
        self.notify(ChangeCause::InstanceAdded, changed);
    }

    pub(crate) fn notify(&mut self, cause: ChangeCause, changed: Vec<ControlId>) {
        self.revision += 1;
        debug!(revision = self.revision, ?cause, count = changed.len(), "control tree changed");
        if let Some(listener) = &self.listener {
            listener.control_tree_changed(&ChangeEvent {
                revision: self.revision,
                cause,
                changed,
            });
        }
    }
}
