//! Wazuh API version negotiation
//!
//! Each segment of the reported version is checked on its own against the
//! inclusive `[MIN_VERSION[i], MAX_VERSION[i]]` range. This is a per-segment
//! clamp, not semantic version ordering: "1.2.9" is not "below" "1.3.0" here,
//! it simply fails on the minor segment.

/// Major, minor, patch
pub type VersionTuple = [u64; 3];

/// Lowest supported Wazuh API version (inclusive, per segment)
pub const MIN_VERSION: VersionTuple = [1, 3, 0];

/// Highest supported Wazuh API version (inclusive, per segment)
pub const MAX_VERSION: VersionTuple = [1, 3, 0];

/// Version sent to the Wazuh API in the `api-version` header
pub const API_VERSION_HEADER: &str = "v1.3.0";

/// Parse `"v1.3.0"` / `"1.3.0"` into a tuple. Exactly three numeric segments.
pub fn parse_version(version: &str) -> Option<VersionTuple> {
    let version = version.strip_prefix('v').unwrap_or(version);

    let mut parts = version.split('.');
    let mut tuple = [0u64; 3];
    for slot in tuple.iter_mut() {
        *slot = parts.next()?.parse().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(tuple)
}

/// Whether the reported version is inside the supported range
pub fn is_compatible(version: &str) -> bool {
    is_within(version, &MIN_VERSION, &MAX_VERSION)
}

/// Per-segment range check against explicit bounds
pub fn is_within(version: &str, min: &VersionTuple, max: &VersionTuple) -> bool {
    match parse_version(version) {
        Some(tuple) => (0..3).all(|i| min[i] <= tuple[i] && tuple[i] <= max[i]),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("v1.3.0"), Some([1, 3, 0]));
        assert_eq!(parse_version("2.10.7"), Some([2, 10, 7]));
        assert_eq!(parse_version("1.3"), None);
        assert_eq!(parse_version("1.3.0.1"), None);
        assert_eq!(parse_version("1.x.0"), None);
        assert_eq!(parse_version("1.3.-1"), None);
        assert_eq!(parse_version(""), None);
    }

    #[test]
    fn test_supported_version() {
        assert!(is_compatible("v1.3.0"));
        assert!(is_compatible("1.3.0"));
    }

    #[test]
    fn test_unsupported_versions() {
        assert!(!is_compatible("1.3"));
        assert!(!is_compatible("1.4.0"));
        assert!(!is_compatible("2.0.0"));
        assert!(!is_compatible("1.2.9"));
        assert!(!is_compatible("v1.3.0-rc1"));
        assert!(!is_compatible("vv1.3.0"));
    }

    #[test]
    fn test_per_segment_clamp_is_not_semver_ordering() {
        let min = [1, 2, 0];
        let max = [1, 3, 5];

        // Each segment individually in range passes.
        assert!(is_within("1.2.5", &min, &max));
        assert!(is_within("1.3.0", &min, &max));

        // Semantically between 1.2.0 and 1.3.5, but patch 9 exceeds max[2].
        assert!(!is_within("1.2.9", &min, &max));
    }
}
