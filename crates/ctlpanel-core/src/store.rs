use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;

use crate::available::{AvailableItem, FetchState, FetchStatus, split_items};
use crate::error::ControlError;
use crate::spec::{ControlKind, ControlSpec, FetchAvailable, GroupPrompts, HiddenRule};
use crate::value::ControlValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ControlId(u32);

impl fmt::Display for ControlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where a control lives. Keys are unique per scope, and sibling lookups
/// (sync targets, hide conditions, name derivation) resolve within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Root,
    Instance { group: ControlId, instance: u64 },
}

#[derive(Debug, Clone)]
pub struct Validation {
    pub required: bool,
    pub tester: Option<Regex>,
    pub notification: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    pub id: u64,
    pub controls: Vec<ControlId>,
}

#[derive(Debug, Clone)]
pub struct GroupState {
    pub template: Vec<ControlSpec>,
    pub instances: Vec<Instance>,
    pub minimum: usize,
    pub prompts: Option<GroupPrompts>,
    pub(crate) next_instance: u64,
}

#[derive(Debug, Clone)]
pub struct Control {
    pub id: ControlId,
    pub key: String,
    pub kind: ControlKind,
    pub title: Option<String>,
    pub scope: Scope,
    pub dom_key: String,
    pub active: ControlValue,
    pub available: Vec<String>,
    pub available_map: BTreeMap<String, String>,
    pub exception: Option<String>,
    pub disabled: bool,
    pub hidden: HiddenRule,
    pub validation: Option<Validation>,
    pub must_validate: bool,
    pub validator: Option<String>,
    pub sync_with: Option<String>,
    pub synced_with: Option<String>,
    pub synced_suffix: Option<String>,
    pub update_name_prefix: Option<String>,
    pub fetch: Option<FetchAvailable>,
    pub fetch_state: FetchState,
    pub pause_until_selected: bool,
    pub collapsable: bool,
    pub collapsed: bool,
    pub start_at_step: Option<usize>,
    pub mutation: Option<String>,
    pub group: Option<GroupState>,
}

impl Control {
    pub fn label(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.key)
    }

    pub fn display_value(&self, value: &str) -> String {
        self.available_map
            .get(value)
            .cloned()
            .unwrap_or_else(|| value.to_string())
    }

    /// Replaces the candidate list from fetched items. Display names land in
    /// `available_map`.
    pub fn set_available_items(&mut self, items: &[AvailableItem]) {
        let (values, labels) = split_items(items);
        self.available = values;
        self.available_map = labels;
    }

    /// Text shown in place of the interactive control when fetching failed
    /// or produced nothing.
    pub fn placeholder(&self) -> Option<String> {
        let fetch = self.fetch.as_ref()?;
        let failed = self.fetch_state.is_failed();
        let empty = self.fetch_state.status == FetchStatus::Loaded && self.available.is_empty();
        if !failed && !empty {
            return None;
        }
        Some(
            fetch
                .empty_desc
                .clone()
                .or_else(|| fetch.placeholder.clone())
                .unwrap_or_else(|| "No values available".to_string()),
        )
    }

    pub fn is_interactive(&self) -> bool {
        !self.disabled && !self.fetch_state.is_loading() && !self.fetch_state.is_failed()
    }
}

/// Arena of every live control in a session, keyed by `ControlId`. Groups
/// hold instance lists of ids; controls refer to their scope by id only.
#[derive(Debug, Clone, Default)]
pub struct ControlStore {
    controls: BTreeMap<ControlId, Control>,
    root: Vec<ControlId>,
    next_id: u32,
}

impl ControlStore {
    pub fn from_specs(specs: &[ControlSpec]) -> Result<Self, ControlError> {
        let mut store = Self::default();
        for spec in specs {
            let id = store.insert_spec(spec, Scope::Root, None)?;
            store.root.push(id);
        }
        Ok(store)
    }

    pub fn root(&self) -> &[ControlId] {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.controls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }

    pub fn get(&self, id: ControlId) -> Option<&Control> {
        self.controls.get(&id)
    }

    pub fn control(&self, id: ControlId) -> Result<&Control, ControlError> {
        self.controls
            .get(&id)
            .ok_or(ControlError::UnknownControl(id))
    }

    pub fn control_mut(&mut self, id: ControlId) -> Result<&mut Control, ControlError> {
        self.controls
            .get_mut(&id)
            .ok_or(ControlError::UnknownControl(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Control> {
        self.controls.values()
    }

    /// Controls of one scope, in declaration order.
    pub fn scope_members(&self, scope: Scope) -> &[ControlId] {
        match scope {
            Scope::Root => &self.root,
            Scope::Instance { group, instance } => self
                .get(group)
                .and_then(|control| control.group.as_ref())
                .and_then(|state| state.instances.iter().find(|item| item.id == instance))
                .map(|item| item.controls.as_slice())
                .unwrap_or(&[]),
        }
    }

    pub fn find(&self, scope: Scope, key: &str) -> Option<ControlId> {
        self.scope_members(scope)
            .iter()
            .copied()
            .find(|id| self.get(*id).is_some_and(|control| control.key == key))
    }

    pub fn find_root(&self, key: &str) -> Option<ControlId> {
        self.find(Scope::Root, key)
    }

    /// Resolves `key` or `group.index.key` (nesting allowed) to a control.
    pub fn find_path(&self, path: &str) -> Result<ControlId, ControlError> {
        let unknown = || ControlError::UnknownPath {
            path: path.to_string(),
        };
        let mut parts = path.split('.');
        let first = parts.next().ok_or_else(unknown)?;
        let mut current = self.find_root(first).ok_or_else(unknown)?;

        while let Some(index) = parts.next() {
            let index = index.parse::<usize>().map_err(|_| unknown())?;
            let key = parts.next().ok_or_else(unknown)?;
            let instance = self
                .get(current)
                .and_then(|control| control.group.as_ref())
                .and_then(|state| state.instances.get(index))
                .ok_or_else(unknown)?;
            current = instance
                .controls
                .iter()
                .copied()
                .find(|id| self.get(*id).is_some_and(|control| control.key == key))
                .ok_or_else(unknown)?;
        }

        Ok(current)
    }

    /// The dotted `group.index.key` path `find_path` resolves back to `id`.
    pub fn path_of(&self, id: ControlId) -> Option<String> {
        let control = self.get(id)?;
        match control.scope {
            Scope::Root => Some(control.key.clone()),
            Scope::Instance { group, instance } => {
                let index = self
                    .get(group)?
                    .group
                    .as_ref()?
                    .instances
                    .iter()
                    .position(|candidate| candidate.id == instance)?;
                Some(format!("{}.{index}.{}", self.path_of(group)?, control.key))
            }
        }
    }

    /// Not rendered: hidden by rule or of the `hidden` kind. Such controls
    /// skip partitioning, validation and the summary.
    pub fn is_hidden(&self, id: ControlId) -> bool {
        self.get(id)
            .is_none_or(|control| control.kind == ControlKind::Hidden)
            || self.is_hidden_by_rule(id)
    }

    /// Hidden by the control's own rule or by living inside an instance of a
    /// group hidden that way. `hidden`-kind controls still carry values.
    pub fn is_hidden_by_rule(&self, id: ControlId) -> bool {
        let Some(control) = self.get(id) else {
            return true;
        };

        let hidden_by_rule = match &control.hidden {
            HiddenRule::Flag(value) => *value,
            HiddenRule::When(condition) => {
                let target = self
                    .find(control.scope, &condition.control)
                    .or_else(|| self.find_root(&condition.control));
                match target.and_then(|target| self.get(target)) {
                    Some(target) => condition.holds_for(&target.active),
                    None => false,
                }
            }
        };
        if hidden_by_rule {
            return true;
        }

        match control.scope {
            Scope::Root => false,
            Scope::Instance { group, .. } => self.is_hidden_by_rule(group),
        }
    }

    /// Root index of the first visible pause gate still waiting for a
    /// selection. Root controls after it are not created yet.
    pub fn gate_position(&self) -> Option<usize> {
        self.root.iter().position(|id| {
            self.get(*id).is_some_and(|control| {
                control.pause_until_selected && !control.active.is_truthy()
            }) && !self.is_hidden(*id)
        })
    }

    /// True when `id`, or the root group holding it, sits after an
    /// unselected pause gate.
    pub fn is_gated(&self, id: ControlId) -> bool {
        let Some(gate) = self.gate_position() else {
            return false;
        };
        let mut current = id;
        while let Some(Scope::Instance { group, .. }) = self.get(current).map(|control| control.scope) {
            current = group;
        }
        self.root
            .iter()
            .position(|candidate| *candidate == current)
            .is_some_and(|index| index > gate)
    }

    /// Every control of `ids` plus the members of their group instances,
    /// depth first.
    pub fn expand(&self, ids: &[ControlId]) -> Vec<ControlId> {
        let mut output = Vec::new();
        for id in ids {
            self.expand_into(*id, &mut output);
        }
        output
    }

    fn expand_into(&self, id: ControlId, output: &mut Vec<ControlId>) {
        output.push(id);
        let Some(state) = self.get(id).and_then(|control| control.group.as_ref()) else {
            return;
        };
        for instance in &state.instances {
            for member in &instance.controls {
                self.expand_into(*member, output);
            }
        }
    }

    pub(crate) fn insert_spec(
        &mut self,
        spec: &ControlSpec,
        scope: Scope,
        instance: Option<u64>,
    ) -> Result<ControlId, ControlError> {
        let id = ControlId(self.next_id);
        self.next_id += 1;

        let validation = match &spec.validation {
            Some(validation) => {
                let tester = match &validation.tester {
                    Some(pattern) => Some(compile_tester(&spec.id, pattern)?),
                    None => None,
                };
                Some(Validation {
                    required: validation.required,
                    tester,
                    notification: validation.notification.clone(),
                })
            }
            None => None,
        };

        let group = (spec.kind == ControlKind::Group).then(|| GroupState {
            template: spec.controls.clone(),
            instances: Vec::new(),
            minimum: spec.minimum.unwrap_or(0),
            prompts: spec.prompts.clone(),
            next_instance: 0,
        });
        let dom_key = match instance {
            Some(instance) => format!("{}grp{instance}", spec.id),
            None => spec.id.clone(),
        };

        self.controls.insert(
            id,
            Control {
                id,
                key: spec.id.clone(),
                kind: spec.kind,
                title: spec.name.clone(),
                scope,
                dom_key,
                active: spec.active.clone(),
                available: spec.available.clone(),
                available_map: spec.available_map.clone(),
                exception: None,
                disabled: spec.disabled,
                hidden: spec.hidden.clone(),
                validation,
                must_validate: spec.must_validate,
                validator: spec.validator.clone(),
                sync_with: spec.sync_with.clone(),
                synced_with: spec.synced_with.clone(),
                synced_suffix: spec.synced_suffix.clone(),
                update_name_prefix: spec.update_name_prefix.clone(),
                fetch: spec.fetch_available.clone(),
                fetch_state: FetchState::default(),
                pause_until_selected: spec.pause_control_creation_here_until_selected,
                collapsable: spec.collapsable,
                collapsed: spec.collapsed,
                start_at_step: spec.start_at_step,
                mutation: spec.mutation.clone(),
                group,
            },
        );

        if spec.kind == ControlKind::Group {
            let initial = spec.minimum.unwrap_or(1).max(1);
            for _ in 0..initial {
                crate::group::append_instance(self, id, None)?;
            }
        }

        Ok(id)
    }

    pub(crate) fn remove_subtree(&mut self, id: ControlId) {
        let Some(control) = self.controls.remove(&id) else {
            return;
        };
        if let Some(state) = control.group {
            for instance in state.instances {
                for member in instance.controls {
                    self.remove_subtree(member);
                }
            }
        }
    }
}

fn compile_tester(key: &str, pattern: &str) -> Result<Regex, ControlError> {
    Regex::new(pattern).map_err(|source| ControlError::InvalidTester {
        key: key.to_string(),
        pattern: pattern.to_string(),
        source,
    })
}
