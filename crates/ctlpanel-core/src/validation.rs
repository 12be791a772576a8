use regex::Regex;

use crate::spec::ControlKind;
use crate::store::{Control, ControlId, ControlStore};
use crate::value::ControlValue;

pub const REQUIRED_MESSAGE: &str = "validation.required";
pub const INVALID_MESSAGE: &str = "validation.invalid";
pub const NUMBER_MESSAGE: &str = "validation.number";

fn tester_matches(tester: &Regex, value: &str) -> bool {
    tester
        .find(value)
        .is_some_and(|found| found.start() == 0 && found.end() == value.len())
}

fn invalid_message(control: &Control) -> String {
    control
        .validation
        .as_ref()
        .and_then(|validation| validation.notification.clone())
        .unwrap_or_else(|| INVALID_MESSAGE.to_string())
}

fn required(control: &Control) -> bool {
    control.must_validate
        || control
            .validation
            .as_ref()
            .is_some_and(|validation| validation.required)
}

fn tester(control: &Control) -> Option<&Regex> {
    control
        .validation
        .as_ref()
        .and_then(|validation| validation.tester.as_ref())
}

fn check_items<'a>(control: &Control, items: impl IntoIterator<Item = &'a str>) -> Option<String> {
    let tester = tester(control)?;
    items
        .into_iter()
        .any(|item| !tester_matches(tester, item))
        .then(|| invalid_message(control))
}

/// Computes the exception a control's current value deserves, without
/// touching the store. `None` means valid.
pub fn check_control(store: &ControlStore, id: ControlId) -> Option<String> {
    let control = store.get(id)?;
    if store.is_hidden(id) {
        return None;
    }
    let required = required(control);

    match control.kind {
        ControlKind::Text
        | ControlKind::TextArea
        | ControlKind::ComboBox
        | ControlKind::SingleSelect
        | ControlKind::Radio
        | ControlKind::Cards
        | ControlKind::TreeSelect => {
            let text = control.active.as_text();
            if text.is_empty() {
                return required.then(|| REQUIRED_MESSAGE.to_string());
            }
            check_items(control, [text.as_str()])
        }
        ControlKind::Number => {
            let text = control.active.as_text();
            if text.trim().is_empty() {
                return required.then(|| REQUIRED_MESSAGE.to_string());
            }
            if !matches!(control.active, ControlValue::Number(_)) && text.trim().parse::<f64>().is_err()
            {
                return Some(NUMBER_MESSAGE.to_string());
            }
            check_items(control, [text.trim()])
        }
        ControlKind::MultiSelect | ControlKind::Labels | ControlKind::Values => {
            let items = control.active.items();
            if items.is_empty() {
                return required.then(|| REQUIRED_MESSAGE.to_string());
            }
            check_items(control, items.iter().map(String::as_str))
        }
        ControlKind::Table => match &control.active {
            ControlValue::Rows(rows) if !rows.is_empty() => check_items(
                control,
                rows.iter().flat_map(|row| row.values().map(String::as_str)),
            ),
            _ => required.then(|| REQUIRED_MESSAGE.to_string()),
        },
        ControlKind::Checkbox | ControlKind::Custom => {
            (required && !control.active.is_truthy()).then(|| REQUIRED_MESSAGE.to_string())
        }
        ControlKind::Group => {
            let empty = control
                .group
                .as_ref()
                .is_none_or(|state| state.instances.is_empty());
            (required && empty).then(|| REQUIRED_MESSAGE.to_string())
        }
        ControlKind::Section | ControlKind::Step | ControlKind::Review | ControlKind::Hidden => None,
    }
}

/// Re-runs validation for one control and stores the result in its
/// `exception`. Returns true when the control is valid.
pub fn refresh_exception(store: &mut ControlStore, id: ControlId) -> bool {
    let exception = check_control(store, id);
    let valid = exception.is_none();
    if let Ok(control) = store.control_mut(id) {
        control.exception = exception;
    }
    valid
}

/// Validates `ids` and every control inside their group instances. Hidden
/// controls are cleared rather than checked. Returns the failing controls.
pub fn validate_controls(store: &mut ControlStore, ids: &[ControlId]) -> Vec<ControlId> {
    let mut failures = Vec::new();
    for id in store.expand(ids) {
        if !refresh_exception(store, id) {
            failures.push(id);
        }
    }
    failures
}

/// Read-only completion check for a set of controls, group instances
/// included. An exception left by a step validator keeps its control
/// incomplete until the next edit clears it.
pub fn all_complete(store: &ControlStore, ids: &[ControlId]) -> bool {
    store.expand(ids).into_iter().all(|id| {
        store.is_hidden(id)
            || (check_control(store, id).is_none()
                && store
                    .get(id)
                    .is_some_and(|control| control.exception.is_none()))
    })
}
