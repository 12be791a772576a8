use crate::spec::{ControlKind, ControlSpec, ValidationSpec};

pub fn spec(id: &str, kind: ControlKind) -> ControlSpec {
    ControlSpec::new(id, kind)
}

pub fn required(id: &str, kind: ControlKind) -> ControlSpec {
    let mut control = ControlSpec::new(id, kind);
    control.validation = Some(ValidationSpec {
        required: true,
        tester: None,
        notification: None,
    });
    control
}

pub fn group(id: &str, template: Vec<ControlSpec>) -> ControlSpec {
    let mut control = ControlSpec::new(id, ControlKind::Group);
    control.controls = template;
    control
}

pub fn step(id: &str) -> ControlSpec {
    let mut control = ControlSpec::new(id, ControlKind::Step);
    control.name = Some(id.to_string());
    control
}
