//! Dotted-integer version tuples.
//!
//! Comparison is lexicographic on the tuples after right-padding the shorter
//! one with zeros, so `"1"` and `"1.0.0"` compare equal.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A dotted-integer version, e.g. `1.2.0`.
#[derive(Debug, Clone, Eq)]
pub struct Version(Vec<u64>);

impl Version {
    /// The default version assigned to a manifest that omits `version`.
    pub fn zero() -> Self {
        Version(vec![0, 0, 0])
    }

    /// Parses a dotted-integer string such as `"1.2.0"`.
    ///
    /// Returns `None` if any component is not a non-negative integer, or if
    /// the string is empty.
    pub fn parse(s: &str) -> Option<Self> {
        if s.is_empty() {
            return None;
        }
        let parts: Option<Vec<u64>> = s.split('.').map(|p| p.parse::<u64>().ok()).collect();
        parts.map(Version)
    }

    fn compare(&self, other: &Self) -> Ordering {
        let len = self.0.len().max(other.0.len());
        for i in 0..len {
            let a = self.0.get(i).copied().unwrap_or(0);
            let b = other.0.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        Ordering::Equal
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl Hash for Version {
    // Trailing zero components must hash the same as their absence, to stay
    // consistent with the padded `PartialEq` above.
    fn hash<H: Hasher>(&self, state: &mut H) {
        let trimmed = match self.0.iter().rposition(|&c| c != 0) {
            Some(last_nonzero) => &self.0[..=last_nonzero],
            None => &[][..],
        };
        trimmed.hash(state);
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.compare(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.0.iter().map(u64::to_string).collect();
        write!(f, "{}", rendered.join("."))
    }
}

impl Default for Version {
    fn default() -> Self {
        Version::zero()
    }
}
