//! Semantic version ordering for schema versions
//!
//! Version strings are compared numerically component by component, so
//! `1.10.0` sorts after `1.9.0`. Parsing is deliberately lenient: a missing
//! or non-numeric component reads as `0`, which makes `"1.2"` equal to
//! `"1.2.0"`. Nothing in this module can fail.

use std::cmp::Ordering;
use std::fmt;

/// A parsed `major.minor.patch` version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SchemaVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl SchemaVersion {
    /// Create a version from its components
    #[must_use]
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self { major, minor, patch }
    }

    /// Parse a version string leniently
    ///
    /// Splits on `.` and parses the first three parts as integers. Missing
    /// parts and parts that are not a plain non-negative integer become `0`.
    /// Anything past the third part is ignored.
    ///
    /// # Examples
    ///
    /// ```
    /// use teamforge::version::SchemaVersion;
    ///
    /// assert_eq!(SchemaVersion::parse("1.10.2"), SchemaVersion::new(1, 10, 2));
    /// assert_eq!(SchemaVersion::parse("1.2"), SchemaVersion::new(1, 2, 0));
    /// assert_eq!(SchemaVersion::parse("1.x.3"), SchemaVersion::new(1, 0, 3));
    /// ```
    #[must_use]
    pub fn parse(version: &str) -> Self {
        let mut parts = version
            .trim()
            .split('.')
            .map(|part| part.trim().parse::<u64>().unwrap_or(0));

        Self {
            major: parts.next().unwrap_or(0),
            minor: parts.next().unwrap_or(0),
            patch: parts.next().unwrap_or(0),
        }
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Compare two version strings numerically
#[must_use]
pub fn compare(v1: &str, v2: &str) -> Ordering {
    SchemaVersion::parse(v1).cmp(&SchemaVersion::parse(v2))
}

/// `true` when `v1` is strictly newer than `v2`
#[must_use]
pub fn is_greater(v1: &str, v2: &str) -> bool {
    compare(v1, v2) == Ordering::Greater
}

/// `true` when `v1` is newer than or equal to `v2`
#[must_use]
pub fn is_greater_or_equal(v1: &str, v2: &str) -> bool {
    compare(v1, v2) != Ordering::Less
}

/// Every version in `all_versions` that is newer than `from` and at most `to`
///
/// The lower bound is exclusive and the upper bound inclusive. The result is
/// sorted ascending by numeric comparison, whatever the input order. Returns
/// an empty list when `from >= to`.
///
/// # Examples
///
/// ```
/// use teamforge::version::versions_between;
///
/// let all = ["1.0.0", "1.9.0", "1.10.0"].map(String::from);
/// assert_eq!(versions_between(&all, "1.9.0", "1.10.0"), vec!["1.10.0".to_string()]);
/// ```
#[must_use]
pub fn versions_between<S: AsRef<str>>(all_versions: &[S], from: &str, to: &str) -> Vec<String> {
    let lower = SchemaVersion::parse(from);
    let upper = SchemaVersion::parse(to);
    if lower >= upper {
        return Vec::new();
    }

    let mut selected: Vec<&str> = all_versions
        .iter()
        .map(AsRef::as_ref)
        .filter(|candidate| {
            let parsed = SchemaVersion::parse(candidate);
            parsed > lower && parsed <= upper
        })
        .collect();

    selected.sort_by(|a, b| compare(a, b));
    selected.into_iter().map(str::to_string).collect()
}

/// The numerically greatest version in `all_versions`
#[must_use]
pub fn latest<S: AsRef<str>>(all_versions: &[S]) -> Option<String> {
    all_versions
        .iter()
        .map(AsRef::as_ref)
        .max_by(|a, b| compare(a, b))
        .map(str::to_string)
}
