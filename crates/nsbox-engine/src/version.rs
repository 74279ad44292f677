//! Engine version string comparison.
//!
//! Engine builds frequently decorate their version with packaging or
//! pre-release suffixes (`5.0.0-devel`, `5.0.0~git2209-g5a7b9ce67-0ubuntu1`).
//! The comparator only looks at the leading numeric part of each dotted
//! component, so decorated versions compare by their numeric core.

/// Parses a version string into `(major, minor, micro)`.
///
/// Each dotted component contributes its leading run of ASCII digits;
/// anything after the digits is ignored. Missing components read as zero.
#[must_use]
pub fn parse_version(version: &str) -> (u32, u32, u32) {
    let mut parts = version.split('.').map(leading_number);
    (
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
    )
}

/// Returns whether `version` is at least `major.minor.micro`.
#[must_use]
pub fn version_at_least(version: &str, major: u32, minor: u32, micro: u32) -> bool {
    parse_version(version) >= (major, minor, micro)
}

fn leading_number(component: &str) -> u32 {
    let digits: String = component
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_version_compares() {
        assert!(version_at_least("5.0.0", 2, 1, 0));
        assert!(!version_at_least("1.0.0", 2, 1, 0));
        assert!(version_at_least("2.1.0", 2, 1, 0));
        assert!(!version_at_least("2.0.9", 2, 1, 0));
    }

    #[test]
    fn decorated_versions_compare_by_numeric_core() {
        assert!(version_at_least("5.0.0-devel", 2, 1, 0));
        assert!(version_at_least("5.0.0~git2209-g5a7b9ce67-0ubuntu1", 2, 1, 0));
        assert!(!version_at_least("1.0.0~beta2", 2, 1, 0));
    }

    #[test]
    fn short_and_garbage_versions_read_as_zero() {
        assert_eq!(parse_version("3"), (3, 0, 0));
        assert_eq!(parse_version("3.2"), (3, 2, 0));
        assert_eq!(parse_version(""), (0, 0, 0));
        assert_eq!(parse_version("abc"), (0, 0, 0));
    }
}
