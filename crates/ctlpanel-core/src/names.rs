/// Key of the control that receives names derived from selections.
pub const NAME_KEY: &str = "name";

/// Lowercases and replaces every run of characters outside `[a-z0-9]` with a
/// single `-`, trimming dashes at both ends.
pub fn slug(value: &str) -> String {
    let mut output = String::with_capacity(value.len());
    let mut pending_dash = false;

    for character in value.chars() {
        if character.is_ascii_alphanumeric() {
            if pending_dash && !output.is_empty() {
                output.push('-');
            }
            pending_dash = false;
            output.push(character.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_normalizes_labels() {
        assert_eq!(slug("OpenShift 4.14.2"), "openshift-4-14-2");
        assert_eq!(slug("  us-east-1 (N. Virginia) "), "us-east-1-n-virginia");
        assert_eq!(slug("img4.9.0-x86_64"), "img4-9-0-x86-64");
    }

    #[test]
    fn slug_of_symbols_is_empty() {
        assert_eq!(slug("--//--"), "");
        assert_eq!(slug(""), "");
    }
}
