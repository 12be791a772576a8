use tracing::debug;

use crate::error::ControlError;
use crate::store::{ControlId, ControlStore, GroupState, Instance, Scope};

fn group_state(store: &ControlStore, group: ControlId) -> Result<&GroupState, ControlError> {
    let control = store.control(group)?;
    control.group.as_ref().ok_or_else(|| ControlError::NotAGroup {
        key: control.key.clone(),
        kind: control.kind,
    })
}

fn group_state_mut(
    store: &mut ControlStore,
    group: ControlId,
) -> Result<(String, &mut GroupState), ControlError> {
    let control = store.control_mut(group)?;
    let key = control.key.clone();
    let kind = control.kind;
    match control.group.as_mut() {
        Some(state) => Ok((key, state)),
        None => Err(ControlError::NotAGroup { key, kind }),
    }
}

pub fn instance_count(store: &ControlStore, group: ControlId) -> Result<usize, ControlError> {
    Ok(group_state(store, group)?.instances.len())
}

pub fn instance_controls(
    store: &ControlStore,
    group: ControlId,
    index: usize,
) -> Result<&[ControlId], ControlError> {
    let control = store.control(group)?;
    let state = group_state(store, group)?;
    state
        .instances
        .get(index)
        .map(|instance| instance.controls.as_slice())
        .ok_or_else(|| ControlError::NoSuchInstance {
            key: control.key.clone(),
            index,
        })
}

/// Appends an instance built from the template defaults and returns its index.
pub fn add_instance(store: &mut ControlStore, group: ControlId) -> Result<usize, ControlError> {
    append_instance(store, group, None)
}

/// Appends a copy of instance `index`, carrying over its current values.
pub fn duplicate_instance(
    store: &mut ControlStore,
    group: ControlId,
    index: usize,
) -> Result<usize, ControlError> {
    append_instance(store, group, Some(index))
}

pub fn remove_instance(
    store: &mut ControlStore,
    group: ControlId,
    index: usize,
) -> Result<(), ControlError> {
    let (key, state) = group_state_mut(store, group)?;
    if index >= state.instances.len() {
        return Err(ControlError::NoSuchInstance { key, index });
    }
    if state.minimum > 0 && state.instances.len() <= state.minimum {
        return Err(ControlError::BelowMinimum {
            key,
            minimum: state.minimum,
        });
    }

    let removed = state.instances.remove(index);
    debug!(group = %key, instance = removed.id, "removed group instance");
    for member in removed.controls {
        store.remove_subtree(member);
    }
    Ok(())
}

/// The delete affordance only appears when more than one instance exists and
/// the group declares a delete prompt.
pub fn shows_delete(store: &ControlStore, group: ControlId) -> bool {
    group_state(store, group).is_ok_and(|state| {
        state.instances.len() > 1
            && state
                .prompts
                .as_ref()
                .is_some_and(|prompts| prompts.delete_prompt.is_some())
    })
}

pub(crate) fn append_instance(
    store: &mut ControlStore,
    group: ControlId,
    source: Option<usize>,
) -> Result<usize, ControlError> {
    let (key, state) = group_state_mut(store, group)?;
    let source_members = match source {
        Some(index) => Some(
            state
                .instances
                .get(index)
                .map(|instance| instance.controls.clone())
                .ok_or(ControlError::NoSuchInstance {
                    key: key.clone(),
                    index,
                })?,
        ),
        None => None,
    };
    let template = state.template.clone();
    let ordinal = state.next_instance;
    state.next_instance += 1;

    let scope = Scope::Instance {
        group,
        instance: ordinal,
    };
    let mut members = Vec::with_capacity(template.len());
    for spec in &template {
        members.push(store.insert_spec(spec, scope, Some(ordinal))?);
    }

    if let Some(source_members) = source_members {
        for (source, target) in source_members.iter().zip(&members) {
            let Some(source) = store.get(*source).cloned() else {
                continue;
            };
            if source.group.is_some() {
                continue;
            }
            let target = store.control_mut(*target)?;
            target.active = source.active;
            target.available = source.available;
            target.available_map = source.available_map;
        }
    }

    let (key, state) = group_state_mut(store, group)?;
    state.instances.push(Instance {
        id: ordinal,
        controls: members,
    });
    debug!(group = %key, instance = ordinal, "added group instance");
    Ok(state.instances.len() - 1)
}
