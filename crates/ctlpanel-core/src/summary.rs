use crate::spec::ControlKind;
use crate::store::{Control, ControlId, ControlStore};
use crate::value::ControlValue;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryLine {
    pub depth: usize,
    pub label: String,
    pub value: String,
    pub exception: Option<String>,
}

fn describe(control: &Control) -> String {
    match control.kind {
        ControlKind::Checkbox => {
            String::from(if control.active.is_truthy() { "yes" } else { "no" })
        }
        ControlKind::SingleSelect
        | ControlKind::MultiSelect
        | ControlKind::TreeSelect
        | ControlKind::ComboBox
        | ControlKind::Radio
        | ControlKind::Cards => control
            .active
            .items()
            .iter()
            .map(|value| control.display_value(value))
            .collect::<Vec<_>>()
            .join(", "),
        ControlKind::Labels | ControlKind::Values => control.active.items().join(", "),
        ControlKind::Table => match &control.active {
            ControlValue::Rows(rows) => format!("{} row(s)", rows.len()),
            _ => "0 row(s)".to_string(),
        },
        ControlKind::Group => {
            let count = control
                .group
                .as_ref()
                .map(|state| state.instances.len())
                .unwrap_or_default();
            format!("{count} instance(s)")
        }
        ControlKind::Text
        | ControlKind::Number
        | ControlKind::TextArea
        | ControlKind::Custom => control.active.as_text(),
        ControlKind::Section | ControlKind::Step | ControlKind::Review | ControlKind::Hidden => {
            String::new()
        }
    }
}

fn summarize_into(store: &ControlStore, ids: &[ControlId], depth: usize, lines: &mut Vec<SummaryLine>) {
    for id in ids {
        let Some(control) = store.get(*id) else {
            continue;
        };
        if store.is_hidden(*id) || store.is_gated(*id) {
            continue;
        }
        if control.kind.is_structural() {
            lines.push(SummaryLine {
                depth,
                label: control.label().to_string(),
                value: String::new(),
                exception: None,
            });
            continue;
        }

        lines.push(SummaryLine {
            depth,
            label: control.label().to_string(),
            value: describe(control),
            exception: control.exception.clone(),
        });

        if let Some(state) = &control.group {
            for (index, instance) in state.instances.iter().enumerate() {
                lines.push(SummaryLine {
                    depth: depth + 1,
                    label: format!("{} #{}", control.label(), index + 1),
                    value: String::new(),
                    exception: None,
                });
                summarize_into(store, &instance.controls, depth + 2, lines);
            }
        }
    }
}

/// Review-page summary of every rendered control, in declaration order.
/// Group instances are summarised one by one beneath their group.
pub fn summarize(store: &ControlStore) -> Vec<SummaryLine> {
    let mut lines = Vec::new();
    summarize_into(store, store.root(), 0, &mut lines);
    lines
}
