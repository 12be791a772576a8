use std::collections::BTreeMap;

/// One selectable value returned by an availability query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailableItem {
    pub value: String,
    pub label: String,
}

impl AvailableItem {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }

    pub fn plain(value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            label: value.clone(),
            value,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FetchStatus {
    #[default]
    Idle,
    Loading,
    Loaded,
    Failed {
        message: String,
    },
}

/// Per-control fetch bookkeeping. `token` is the generation of the most
/// recent request; results stamped with an older token are stale.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchState {
    pub status: FetchStatus,
    pub token: u64,
}

impl FetchState {
    pub fn is_loading(&self) -> bool {
        self.status == FetchStatus::Loading
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, FetchStatus::Failed { .. })
    }
}

pub(crate) fn split_items(items: &[AvailableItem]) -> (Vec<String>, BTreeMap<String, String>) {
    let values = items.iter().map(|item| item.value.clone()).collect();
    let labels = items
        .iter()
        .map(|item| (item.value.clone(), item.label.clone()))
        .collect();
    (values, labels)
}
