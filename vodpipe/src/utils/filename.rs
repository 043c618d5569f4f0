//! Turning video identifiers into directory names.

/// Characters rejected by at least one common filesystem.
const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Windows device names that cannot be used as a path component.
const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Longest directory name produced, in characters.
const MAX_COMPONENT_CHARS: usize = 120;

/// Sanitize a string for use as a single path component.
///
/// Runs of invalid or control characters collapse into one `_`, surrounding
/// spaces and dots are trimmed, reserved device names get a `_` prefix and the
/// result never escapes its parent directory (`..` becomes `unnamed`).
///
/// ```
/// use vodpipe::utils::filename::sanitize_component;
///
/// assert_eq!(sanitize_component("av170001"), "av170001");
/// assert_eq!(sanitize_component("../etc/passwd"), "_etc_passwd");
/// assert_eq!(sanitize_component(""), "unnamed");
/// ```
pub fn sanitize_component(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut last_was_replacement = false;

    for c in input.chars().take(MAX_COMPONENT_CHARS) {
        if c.is_control() || INVALID_CHARS.contains(&c) {
            if !last_was_replacement {
                result.push('_');
                last_was_replacement = true;
            }
        } else {
            result.push(c);
            last_was_replacement = false;
        }
    }

    let trimmed = result.trim_matches(|c| c == ' ' || c == '.');
    if trimmed.is_empty() {
        return "unnamed".to_string();
    }

    let upper = trimmed.to_uppercase();
    let stem = upper.split('.').next().unwrap_or_default();
    if RESERVED_NAMES.contains(&stem) {
        return format!("_{trimmed}");
    }

    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_ids_unchanged() {
        assert_eq!(sanitize_component("av170001"), "av170001");
        assert_eq!(sanitize_component("BV1xx411c7mD"), "BV1xx411c7mD");
        assert_eq!(sanitize_component("虹之间"), "虹之间");
    }

    #[test]
    fn test_path_traversal_is_neutralized() {
        assert_eq!(sanitize_component(".."), "unnamed");
        assert_eq!(sanitize_component("../../x"), "_x");
        assert_eq!(sanitize_component("a/b\\c"), "a_b_c");
    }

    #[test]
    fn test_reserved_names() {
        assert_eq!(sanitize_component("con"), "_con");
        assert_eq!(sanitize_component("NUL.flv"), "_NUL.flv");
        assert_eq!(sanitize_component("console"), "console");
    }

    #[test]
    fn test_length_is_capped() {
        let long = "a".repeat(500);
        assert_eq!(sanitize_component(&long).chars().count(), MAX_COMPONENT_CHARS);
    }

    #[test]
    fn test_idempotent() {
        for input in ["a?b", "  x  ", "CON", "../y", "\u{0}z"] {
            let once = sanitize_component(input);
            assert_eq!(sanitize_component(&once), once, "input: {input:?}");
        }
    }
}
