/// Saves are compatible only with the exact build version that wrote them.
/// A missing version on either side is never compatible.
pub fn is_compatible_with(save_version: Option<&str>, build_version: Option<&str>) -> bool {
    match (save_version, build_version) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match_only() {
        assert!(is_compatible_with(Some("1.2.0"), Some("1.2.0")));
        assert!(!is_compatible_with(Some("1.2.0"), Some("1.2.1")));
        assert!(!is_compatible_with(Some("1.2.0"), Some("1.2.0 ")));
    }

    #[test]
    fn test_missing_versions_incompatible() {
        assert!(!is_compatible_with(None, Some("1.0")));
        assert!(!is_compatible_with(Some("1.0"), None));
        assert!(!is_compatible_with(None, None));
    }
}
