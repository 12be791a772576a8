mod fetch;
pub mod ops;
pub mod panel;
pub(crate) mod pending;
pub mod wizard;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use ctlpanel_core::config::{PanelConfig, load_config_or_default, resolve_config_path};
use ctlpanel_core::spec::load_control_data;
use ctlpanel_core::{ControlSpec, ControlValue};

pub use ops::{
    ChangeCause, ChangeEvent, ChangeListener, DetachedOps, FetchOutcome, FetchRequest,
    MutationRequest, PanelOps, ValidateRequest,
};
pub use panel::ControlPanel;
pub use wizard::{StepStatus, Wizard, WizardPhase, WizardSignal, WizardStep};

pub struct App {
    pub config: PanelConfig,
    pub ops: Arc<dyn PanelOps>,
}

impl App {
    pub fn new(config: PanelConfig, ops: Arc<dyn PanelOps>) -> Self {
        Self { config, ops }
    }

    /// Builds an app from `~/.config/ctlpanel/config.toml`, or the defaults
    /// when that file does not exist.
    pub fn from_user_config(ops: Arc<dyn PanelOps>) -> Result<Self> {
        let config_path = resolve_config_path().context("failed to resolve config path")?;
        let config = load_config_or_default(&config_path).map_err(|error| {
            anyhow!(
                "invalid config at {}: {error}\nFix the config and retry.",
                config_path.display()
            )
        })?;
        Ok(Self::new(config, ops))
    }

    pub fn load_controls(&self, path: &Path) -> Result<Vec<ControlSpec>> {
        load_control_data(path)
            .with_context(|| format!("failed to load control data from {}", path.display()))
    }

    pub fn open_panel(&self, path: &Path) -> Result<ControlPanel> {
        let specs = self.load_controls(path)?;
        ControlPanel::open(&specs, self.config.clone(), self.ops.clone())
            .with_context(|| format!("invalid control data in {}", path.display()))
    }

    pub fn open_wizard(&self, path: &Path) -> Result<Wizard> {
        Ok(Wizard::new(self.open_panel(path)?))
    }

    /// Applies `path=value` edits in order, parsing each raw value for the
    /// kind of control it lands on.
    pub fn apply_edits(&self, panel: &mut ControlPanel, edits: &[(String, String)]) -> Result<()> {
        for (path, raw) in edits {
            let id = panel
                .control_id(path)
                .with_context(|| format!("cannot edit {path}"))?;
            let kind = panel.store().control(id)?.kind;
            panel
                .set_value(id, ControlValue::from_input(kind, raw))
                .with_context(|| format!("cannot edit {path}"))?;
        }
        Ok(())
    }
}
