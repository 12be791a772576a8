use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::spec::ControlKind;
use crate::store::{ControlId, ControlStore};
use crate::value::ControlValue;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ControlKind,
    #[serde(skip_serializing_if = "ControlValue::is_unset")]
    pub active: ControlValue,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub instances: Vec<Vec<SnapshotEntry>>,
}

/// Key/value view of the control tree as created so far. This is the
/// payload handed to step validators and to the commit mutation. Controls of
/// the `hidden` kind are carried; rule-hidden and gated ones are not.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ControlDataSnapshot {
    pub controls: Vec<SnapshotEntry>,
}

impl ControlDataSnapshot {
    pub fn capture(store: &ControlStore) -> Self {
        Self {
            controls: capture_scope(store, store.root()),
        }
    }

    pub fn value(&self, key: &str) -> Option<&ControlValue> {
        self.controls
            .iter()
            .find(|entry| entry.id == key)
            .map(|entry| &entry.active)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string(self)
    }
}

fn capture_scope(store: &ControlStore, ids: &[ControlId]) -> Vec<SnapshotEntry> {
    ids.iter()
        .filter(|id| !store.is_hidden_by_rule(**id) && !store.is_gated(**id))
        .filter_map(|id| store.get(*id))
        .filter(|control| !control.kind.is_structural())
        .map(|control| SnapshotEntry {
            id: control.key.clone(),
            kind: control.kind,
            active: control.active.clone(),
            instances: control
                .group
                .as_ref()
                .map(|state| {
                    state
                        .instances
                        .iter()
                        .map(|instance| capture_scope(store, &instance.controls))
                        .collect()
                })
                .unwrap_or_default(),
        })
        .collect()
}

/// What a successful commit recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitRecord {
    pub committed_at: String,
    pub status: String,
    pub snapshot: ControlDataSnapshot,
}

impl CommitRecord {
    pub fn new(status: String, snapshot: ControlDataSnapshot) -> Result<Self, time::error::Format> {
        Ok(Self {
            committed_at: OffsetDateTime::now_utc().format(&Rfc3339)?,
            status,
            snapshot,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::HiddenRule;
    use crate::test_support::{group, spec, step};

    #[test]
    fn snapshot_skips_structure_and_rule_hidden_controls() {
        let mut name = spec("name", ControlKind::Text);
        name.active = ControlValue::text("demo");
        let mut token = spec("token", ControlKind::Hidden);
        token.active = ControlValue::text("secret-ref");
        let mut internal = spec("internal", ControlKind::Text);
        internal.hidden = HiddenRule::Flag(true);
        let store = ControlStore::from_specs(&[
            step("details"),
            name,
            token,
            internal,
            group("pools", vec![spec("size", ControlKind::Number)]),
        ])
        .expect("store");

        let snapshot = ControlDataSnapshot::capture(&store);
        let ids = snapshot
            .controls
            .iter()
            .map(|entry| entry.id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, ["name", "token", "pools"]);
        assert_eq!(snapshot.value("name"), Some(&ControlValue::text("demo")));
        assert_eq!(snapshot.value("token"), Some(&ControlValue::text("secret-ref")));
        assert_eq!(snapshot.controls[2].instances.len(), 1);
    }

    #[test]
    fn snapshot_leaves_out_controls_behind_unselected_gate() {
        let mut provider = spec("provider", ControlKind::Cards);
        provider.pause_control_creation_here_until_selected = true;
        let mut region = spec("region", ControlKind::Text);
        region.active = ControlValue::text("us-east-1");
        let mut store = ControlStore::from_specs(&[
            provider,
            region,
            group("pools", vec![spec("size", ControlKind::Number)]),
        ])
        .expect("store");

        let snapshot = ControlDataSnapshot::capture(&store);
        assert_eq!(snapshot.value("region"), None);
        assert_eq!(snapshot.controls.len(), 1);

        let gate = store.find_root("provider").expect("provider");
        store.control_mut(gate).expect("provider").active = ControlValue::text("aws");
        let snapshot = ControlDataSnapshot::capture(&store);
        assert_eq!(snapshot.value("region"), Some(&ControlValue::text("us-east-1")));
        assert_eq!(snapshot.controls.len(), 3);
    }

    #[test]
    fn snapshot_renders_as_toml() {
        let mut name = spec("name", ControlKind::Text);
        name.active = ControlValue::text("demo");
        let store = ControlStore::from_specs(&[name, spec("empty", ControlKind::Text)])
            .expect("store");

        let rendered = ControlDataSnapshot::capture(&store).to_toml().expect("toml");
        assert!(rendered.contains("id = \"name\""));
        assert!(rendered.contains("active = \"demo\""));
        assert!(rendered.contains("type = \"text\""));
    }

    #[test]
    fn commit_record_is_timestamped() {
        let record = CommitRecord::new("OK".to_string(), ControlDataSnapshot::default())
            .expect("record");
        assert!(record.committed_at.ends_with('Z'));
        assert!(record.committed_at.contains('T'));
    }
}
