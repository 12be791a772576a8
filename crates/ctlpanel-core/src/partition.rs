use std::collections::BTreeSet;

use tracing::warn;

use crate::spec::{ControlKind, ControlSpec};
use crate::store::{ControlId, ControlStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Step,
    Review,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionNode {
    /// `None` for a section opened implicitly by loose content.
    pub title: Option<ControlId>,
    pub content: Vec<ControlId>,
    pub collapsable: bool,
    pub collapsed: bool,
}

impl SectionNode {
    fn implicit() -> Self {
        Self {
            title: None,
            content: Vec::new(),
            collapsable: false,
            collapsed: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepNode {
    pub title: ControlId,
    pub kind: StepKind,
    pub sections: Vec<SectionNode>,
}

impl StepNode {
    pub fn content(&self) -> impl Iterator<Item = ControlId> + '_ {
        self.sections
            .iter()
            .flat_map(|section| section.content.iter().copied())
    }
}

/// The rendered shape of a control list. With no step controls `steps` is
/// empty and the whole form lives in `sections`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    pub steps: Vec<StepNode>,
    pub sections: Vec<SectionNode>,
    pub duplicate_keys: Vec<String>,
}

impl Partition {
    pub fn is_flat_form(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn contains(&self, id: ControlId) -> bool {
        let in_sections = |sections: &[SectionNode]| {
            sections
                .iter()
                .any(|section| section.title == Some(id) || section.content.contains(&id))
        };
        in_sections(&self.sections)
            || self
                .steps
                .iter()
                .any(|step| step.title == id || in_sections(&step.sections))
    }
}

#[derive(Default)]
struct Cursor {
    steps: Vec<StepNode>,
    root_sections: Vec<SectionNode>,
    step: Option<StepNode>,
    section: Option<SectionNode>,
    skipping_step: bool,
    skipping_section: bool,
}

impl Cursor {
    fn close_section(&mut self) {
        let Some(section) = self.section.take() else {
            return;
        };
        match &mut self.step {
            Some(step) => step.sections.push(section),
            None if !self.skipping_step => self.root_sections.push(section),
            None => {}
        }
    }

    fn close_step(&mut self) {
        self.close_section();
        if let Some(step) = self.step.take() {
            self.steps.push(step);
        }
    }
}

/// Single left-to-right scan of the root list. Re-evaluated from scratch on
/// every call, so gating and hide rules always reflect the current values.
pub fn partition(store: &ControlStore) -> Partition {
    let mut cursor = Cursor::default();
    let mut seen = BTreeSet::new();
    let mut duplicate_keys = Vec::new();
    let gate = store.gate_position();

    for (index, id) in store.root().iter().enumerate() {
        let Some(control) = store.get(*id) else {
            continue;
        };
        if !control.key.is_empty() && !seen.insert(control.key.as_str()) {
            warn!(key = %control.key, "duplicate control id in root scope");
            duplicate_keys.push(control.key.clone());
        }
        if let Some(state) = &control.group {
            template_duplicates(&control.key, &state.template, &mut duplicate_keys);
        }
        if gate.is_some_and(|gate| index > gate) {
            continue;
        }

        let hidden = store.is_hidden(*id);
        match control.kind {
            ControlKind::Step | ControlKind::Review => {
                cursor.close_step();
                cursor.skipping_section = false;
                cursor.skipping_step = hidden;
                if !hidden {
                    cursor.step = Some(StepNode {
                        title: *id,
                        kind: if control.kind == ControlKind::Review {
                            StepKind::Review
                        } else {
                            StepKind::Step
                        },
                        sections: Vec::new(),
                    });
                }
            }
            ControlKind::Section => {
                cursor.close_section();
                cursor.skipping_section = hidden;
                if !hidden && !cursor.skipping_step {
                    cursor.section = Some(SectionNode {
                        title: Some(*id),
                        content: Vec::new(),
                        collapsable: control.collapsable,
                        collapsed: control.collapsed,
                    });
                }
            }
            ControlKind::Text
            | ControlKind::Number
            | ControlKind::Checkbox
            | ControlKind::Radio
            | ControlKind::SingleSelect
            | ControlKind::MultiSelect
            | ControlKind::TreeSelect
            | ControlKind::ComboBox
            | ControlKind::Cards
            | ControlKind::Table
            | ControlKind::Labels
            | ControlKind::Values
            | ControlKind::TextArea
            | ControlKind::Group
            | ControlKind::Custom
            | ControlKind::Hidden => {
                if !hidden && !cursor.skipping_step && !cursor.skipping_section {
                    cursor
                        .section
                        .get_or_insert_with(SectionNode::implicit)
                        .content
                        .push(*id);
                }
            }
        }
    }

    cursor.close_step();
    Partition {
        steps: cursor.steps,
        sections: cursor.root_sections,
        duplicate_keys,
    }
}

/// Instance scopes are stamped from the template, so a key repeated there
/// repeats in every instance. Reported as `group.key`.
fn template_duplicates(prefix: &str, template: &[ControlSpec], duplicate_keys: &mut Vec<String>) {
    let mut seen = BTreeSet::new();
    for spec in template {
        let path = format!("{prefix}.{}", spec.id);
        if !spec.id.is_empty() && !seen.insert(spec.id.as_str()) {
            warn!(key = %path, "duplicate control id in group template");
            duplicate_keys.push(path.clone());
        }
        if spec.kind == ControlKind::Group {
            template_duplicates(&path, &spec.controls, duplicate_keys);
        }
    }
}
