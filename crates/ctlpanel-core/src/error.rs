use thiserror::Error;

use crate::spec::ControlKind;
use crate::store::ControlId;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("unknown control {0}")]
    UnknownControl(ControlId),
    #[error("no control at path '{path}'")]
    UnknownPath { path: String },
    #[error("control '{key}' is a {kind} control, expected a group")]
    NotAGroup { key: String, kind: ControlKind },
    #[error("group '{key}' has no instance at index {index}")]
    NoSuchInstance { key: String, index: usize },
    #[error("group '{key}' requires at least {minimum} instance(s)")]
    BelowMinimum { key: String, minimum: usize },
    #[error("control '{key}' is disabled")]
    Disabled { key: String },
    #[error("control '{key}' has an invalid tester '{pattern}': {source}")]
    InvalidTester {
        key: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}
