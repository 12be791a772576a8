pub mod available;
pub mod config;
pub mod error;
pub mod group;
pub mod names;
pub mod partition;
pub mod snapshot;
pub mod spec;
pub mod store;
pub mod summary;
pub mod sync;
#[cfg(test)]
pub(crate) mod test_support;
pub mod validation;
pub mod value;

pub use error::ControlError;
pub use spec::{ControlKind, ControlSpec};
pub use store::{Control, ControlId, ControlStore, Scope};
pub use value::ControlValue;
