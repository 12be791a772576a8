use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::value::ControlValue;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlKind {
    #[default]
    Text,
    Number,
    Checkbox,
    Radio,
    SingleSelect,
    MultiSelect,
    TreeSelect,
    ComboBox,
    Cards,
    Table,
    Labels,
    Values,
    TextArea,
    Section,
    Step,
    Review,
    Group,
    Custom,
    Hidden,
}

impl ControlKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Checkbox => "checkbox",
            Self::Radio => "radio",
            Self::SingleSelect => "singleselect",
            Self::MultiSelect => "multiselect",
            Self::TreeSelect => "treeselect",
            Self::ComboBox => "combobox",
            Self::Cards => "cards",
            Self::Table => "table",
            Self::Labels => "labels",
            Self::Values => "values",
            Self::TextArea => "textarea",
            Self::Section => "section",
            Self::Step => "step",
            Self::Review => "review",
            Self::Group => "group",
            Self::Custom => "custom",
            Self::Hidden => "hidden",
        }
    }

    pub fn is_step(self) -> bool {
        matches!(self, Self::Step | Self::Review)
    }

    /// Structural kinds partition the tree and carry no user value.
    pub fn is_structural(self) -> bool {
        matches!(self, Self::Section | Self::Step | Self::Review)
    }
}

impl fmt::Display for ControlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One control descriptor as produced by the template layer. Missing fields
/// fall back to their defaults rather than failing the load.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ControlSpec {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ControlKind,
    pub name: Option<String>,
    pub active: ControlValue,
    pub available: Vec<String>,
    pub available_map: BTreeMap<String, String>,
    pub disabled: bool,
    pub hidden: HiddenRule,
    pub validation: Option<ValidationSpec>,
    pub must_validate: bool,
    pub validator: Option<String>,
    pub sync_with: Option<String>,
    pub synced_with: Option<String>,
    pub synced_suffix: Option<String>,
    pub update_name_prefix: Option<String>,
    pub fetch_available: Option<FetchAvailable>,
    pub pause_control_creation_here_until_selected: bool,
    pub collapsable: bool,
    pub collapsed: bool,
    pub start_at_step: Option<usize>,
    pub mutation: Option<String>,
    pub controls: Vec<ControlSpec>,
    pub minimum: Option<usize>,
    pub prompts: Option<GroupPrompts>,
}

impl ControlSpec {
    pub fn new(id: impl Into<String>, kind: ControlKind) -> Self {
        Self {
            id: id.into(),
            kind,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum HiddenRule {
    Flag(bool),
    When(HiddenCondition),
}

impl Default for HiddenRule {
    fn default() -> Self {
        Self::Flag(false)
    }
}

/// Hides a control while another control in the same scope (or the root
/// scope, when not found locally) satisfies the test.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HiddenCondition {
    pub control: String,
    #[serde(default)]
    pub is: ConditionTest,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionTest {
    #[default]
    Truthy,
    Falsy,
    Equals,
    NotEquals,
}

impl HiddenCondition {
    pub fn holds_for(&self, value: &ControlValue) -> bool {
        let expected = self.value.as_deref().unwrap_or_default();
        match self.is {
            ConditionTest::Truthy => value.is_truthy(),
            ConditionTest::Falsy => !value.is_truthy(),
            ConditionTest::Equals => value.items().iter().any(|item| item == expected),
            ConditionTest::NotEquals => !value.items().iter().any(|item| item == expected),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ValidationSpec {
    pub required: bool,
    pub tester: Option<String>,
    pub notification: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    /// The panel runs the query itself through its collaborator.
    #[default]
    Managed,
    /// The caller's data layer runs the query and pushes results in.
    Delegated,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FetchAvailable {
    pub query: String,
    pub mode: FetchMode,
    pub variables: BTreeMap<String, String>,
    pub empty_desc: Option<String>,
    pub placeholder: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct GroupPrompts {
    pub add_prompt: Option<String>,
    pub delete_prompt: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
struct ControlDataFile {
    #[serde(default)]
    controls: Vec<ControlSpec>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read control data at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse control data: {source}")]
    Parse {
        #[source]
        source: toml::de::Error,
    },
}

pub fn parse_control_data(raw: &str) -> Result<Vec<ControlSpec>, LoadError> {
    let parsed: ControlDataFile =
        toml::from_str(raw).map_err(|source| LoadError::Parse { source })?;
    Ok(parsed.controls)
}

pub fn load_control_data(path: &Path) -> Result<Vec<ControlSpec>, LoadError> {
    let raw = fs::read_to_string(path).map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_control_data(&raw)
}
