use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::spec::ControlKind;

/// The `active` value of a control. Its shape depends on the control kind:
/// scalars for text-like kinds, lists for multi-value kinds, rows for tables.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ControlValue {
    #[default]
    Unset,
    Flag(bool),
    Number(f64),
    Text(String),
    List(Vec<String>),
    Rows(Vec<BTreeMap<String, String>>),
}

impl ControlValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn list<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::List(values.into_iter().map(Into::into).collect())
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Unset => false,
            Self::Flag(value) => *value,
            Self::Number(value) => *value != 0.0 && !value.is_nan(),
            Self::Text(value) => !value.is_empty(),
            Self::List(values) => !values.is_empty(),
            Self::Rows(rows) => !rows.is_empty(),
        }
    }

    /// Scalar rendering used for sync propagation and regex testing.
    /// Lists join with `,`; rows have no scalar form.
    pub fn as_text(&self) -> String {
        match self {
            Self::Unset | Self::Rows(_) => String::new(),
            Self::Flag(value) => value.to_string(),
            Self::Number(value) => value.to_string(),
            Self::Text(value) => value.clone(),
            Self::List(values) => values.join(","),
        }
    }

    pub fn items(&self) -> Vec<String> {
        match self {
            Self::Unset | Self::Rows(_) => Vec::new(),
            Self::List(values) => values.clone(),
            other => {
                let text = other.as_text();
                if text.is_empty() { Vec::new() } else { vec![text] }
            }
        }
    }

    /// Interprets raw user input (for example a `key=value` argument) in the
    /// shape the given kind expects.
    pub fn from_input(kind: ControlKind, raw: &str) -> Self {
        match kind {
            ControlKind::Checkbox => match raw.trim() {
                "true" | "yes" | "on" | "1" => Self::Flag(true),
                _ => Self::Flag(false),
            },
            ControlKind::Number => match raw.trim().parse::<f64>() {
                Ok(value) => Self::Number(value),
                Err(_) => Self::Text(raw.to_string()),
            },
            ControlKind::MultiSelect | ControlKind::Labels | ControlKind::Values => {
                Self::List(
                    raw.split(',')
                        .map(str::trim)
                        .filter(|value| !value.is_empty())
                        .map(str::to_string)
                        .collect(),
                )
            }
            _ => Self::Text(raw.to_string()),
        }
    }
}
