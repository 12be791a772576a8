use tracing::debug;

use crate::error::ControlError;
use crate::names::{NAME_KEY, slug};
use crate::spec::ControlKind;
use crate::store::{ControlId, ControlStore};
use crate::value::ControlValue;

/// Session-wide state that used to live in captured closures. Every
/// operation that reads it takes it by value and hands back the new state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionFlags {
    /// Set once the user types directly into any `text` control; from then
    /// on names are never derived from selections.
    pub is_custom_name: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditOutcome {
    /// Every control whose state the edit touched, the edited one first.
    pub changed: Vec<ControlId>,
}

/// Applies a user edit and runs synchronization in the same step: sync
/// targets, sync teardown and derived names are all updated before this
/// returns.
pub fn apply_edit(
    store: &mut ControlStore,
    flags: SessionFlags,
    id: ControlId,
    value: ControlValue,
) -> Result<(SessionFlags, EditOutcome), ControlError> {
    let mut flags = flags;
    let mut outcome = EditOutcome::default();

    let control = store.control_mut(id)?;
    if control.disabled {
        return Err(ControlError::Disabled {
            key: control.key.clone(),
        });
    }
    control.active = value;
    let scope = control.scope;
    let kind = control.kind;
    let key = control.key.clone();
    let torn_down = control.synced_with.take();
    let sync_with = control.sync_with.clone();
    let name_prefix = control.update_name_prefix.clone();
    let text = control.active.as_text();
    let first_label = control
        .active
        .items()
        .first()
        .map(|value| control.display_value(value));
    outcome.changed.push(id);

    if kind == ControlKind::Text {
        flags.is_custom_name = true;
    }

    if let Some(source_key) = torn_down {
        if let Some(source) = store.find(scope, &source_key) {
            store.control_mut(source)?.sync_with = None;
        }
        debug!(control = %key, source = %source_key, "sync binding removed by direct edit");
    }

    if let Some(target_key) = sync_with
        && let Some(target) = store.find(scope, &target_key)
    {
        let target_control = store.control_mut(target)?;
        let suffix = target_control.synced_suffix.clone().unwrap_or_default();
        target_control.active = ControlValue::Text(format!("{text}{suffix}"));
        outcome.changed.push(target);
        debug!(control = %key, target = %target_key, "synced value");
    }

    if kind == ControlKind::MultiSelect
        && !flags.is_custom_name
        && let Some(prefix) = name_prefix
        && let Some(label) = first_label
        && let Some(name) = store.find(scope, NAME_KEY)
        && name != id
    {
        store.control_mut(name)?.active = ControlValue::Text(format!("{prefix}{}", slug(&label)));
        outcome.changed.push(name);
        debug!(control = %key, "derived name from selection");
    }

    Ok((flags, outcome))
}
