use ctlpanel_core::available::{FetchState, FetchStatus};
use ctlpanel_core::spec::FetchMode;
use ctlpanel_core::{ControlError, ControlId};
use tracing::{debug, warn};

use crate::ops::{ChangeCause, FetchOutcome, FetchRequest};
use crate::panel::{ControlPanel, PendingFetch};
use crate::pending::drain;

const DISCONNECTED_MESSAGE: &str = "availability query ended without an answer";

impl ControlPanel {
    /// Starts a managed query for `id` unless one is already loading.
    /// Returns false when nothing was started.
    pub fn start_fetch(&mut self, id: ControlId) -> Result<bool, ControlError> {
        let control = self.store.control(id)?;
        let Some(fetch) = control.fetch.as_ref() else {
            return Ok(false);
        };
        if fetch.mode == FetchMode::Delegated || control.fetch_state.is_loading() {
            return Ok(false);
        }
        self.launch_fetch(id)?;
        Ok(true)
    }

    /// Clears the cached candidates and re-runs the query. A query still in
    /// flight for the same control is superseded and its answer ignored.
    pub fn refetch(&mut self, id: ControlId) -> Result<(), ControlError> {
        let control = self.store.control_mut(id)?;
        let Some(mode) = control.fetch.as_ref().map(|fetch| fetch.mode) else {
            return Ok(());
        };
        control.available.clear();
        control.available_map.clear();

        match mode {
            FetchMode::Managed => self.launch_fetch(id),
            FetchMode::Delegated => {
                let token = self.next_token();
                let control = self.store.control_mut(id)?;
                control.fetch_state = FetchState {
                    status: FetchStatus::Loading,
                    token,
                };
                debug!(control = %control.key, token, "delegated refetch requested");
                self.notify(ChangeCause::RefetchRequested, vec![id]);
                Ok(())
            }
        }
    }

    /// Pushes a query answer in from the caller's data layer.
    pub fn set_available(&mut self, id: ControlId, outcome: FetchOutcome) -> Result<(), ControlError> {
        self.apply_fetch_outcome(id, outcome)
    }

    pub fn pending_fetch_count(&self) -> usize {
        self.pending_fetches.len()
    }

    /// Starts managed queries that never ran for controls that are rendered
    /// now. Controls behind an unselected gate wait until it opens.
    pub(crate) fn start_visible_fetches(&mut self) {
        let visible = self
            .store
            .iter()
            .filter(|control| {
                control.fetch.is_some()
                    && control.fetch_state.status == FetchStatus::Idle
                    && !self.store.is_hidden(control.id)
                    && !self.store.is_gated(control.id)
            })
            .map(|control| control.id)
            .collect::<Vec<_>>();
        for id in visible {
            self.start_fetch_if_managed(id);
        }
    }

    fn start_fetch_if_managed(&mut self, id: ControlId) {
        if let Err(error) = self.start_fetch(id) {
            warn!(control = %id, %error, "failed to start availability query");
        }
    }

    pub(crate) fn drain_fetches(&mut self) {
        let pending = std::mem::take(&mut self.pending_fetches);
        for fetch in pending {
            let (outcomes, disconnected) = drain(&fetch.receiver);
            let current = self.store.get(fetch.control).map(|control| control.fetch_state.token);
            if current != Some(fetch.token) {
                if outcomes.is_empty() {
                    debug!(control = %fetch.control, token = fetch.token, "dropped superseded query");
                } else {
                    warn!(
                        control = %fetch.control,
                        token = fetch.token,
                        current = ?current,
                        "discarded stale availability result"
                    );
                }
                continue;
            }

            let mut settled = false;
            for outcome in outcomes {
                settled = !matches!(outcome, FetchOutcome::Loading);
                if let Err(error) = self.apply_fetch_outcome(fetch.control, outcome) {
                    warn!(control = %fetch.control, %error, "failed to apply availability result");
                    settled = true;
                }
                if settled {
                    break;
                }
            }

            if !settled && disconnected {
                let outcome = FetchOutcome::Error(DISCONNECTED_MESSAGE.to_string());
                if let Err(error) = self.apply_fetch_outcome(fetch.control, outcome) {
                    warn!(control = %fetch.control, %error, "failed to apply availability result");
                }
                settled = true;
            }

            if !settled {
                self.pending_fetches.push(fetch);
            }
        }
    }

    fn launch_fetch(&mut self, id: ControlId) -> Result<(), ControlError> {
        let token = self.next_token();
        let control = self.store.control_mut(id)?;
        let Some(fetch) = control.fetch.as_ref() else {
            return Ok(());
        };
        let request = FetchRequest {
            control: control.key.clone(),
            query: fetch.query.clone(),
            variables: fetch.variables.clone(),
            token,
        };
        control.fetch_state = FetchState {
            status: FetchStatus::Loading,
            token,
        };
        debug!(control = %request.control, token, "availability query started");

        let receiver = self.ops.fetch_available(request);
        self.pending_fetches.push(PendingFetch {
            control: id,
            token,
            receiver,
        });
        self.notify(ChangeCause::FetchStarted, vec![id]);
        Ok(())
    }

    fn apply_fetch_outcome(&mut self, id: ControlId, outcome: FetchOutcome) -> Result<(), ControlError> {
        let control = self.store.control_mut(id)?;
        let cause = match outcome {
            FetchOutcome::Loading => {
                control.fetch_state.status = FetchStatus::Loading;
                ChangeCause::FetchStarted
            }
            FetchOutcome::Data(items) => {
                control.set_available_items(&items);
                control.fetch_state.status = FetchStatus::Loaded;
                debug!(control = %control.key, count = items.len(), "availability loaded");
                ChangeCause::FetchSettled
            }
            FetchOutcome::Error(message) => {
                warn!(control = %control.key, %message, "availability query failed");
                control.available.clear();
                control.available_map.clear();
                control.fetch_state.status = FetchStatus::Failed { message };
                ChangeCause::FetchSettled
            }
        };
        self.notify(cause, vec![id]);
        Ok(())
    }

    fn next_token(&mut self) -> u64 {
        let token = self.next_fetch_token;
        self.next_fetch_token += 1;
        token
    }
}
