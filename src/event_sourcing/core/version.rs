use serde::{Deserialize, Serialize};
use std::fmt;

/// Position in an aggregate's event history.
///
/// Equals the physical offset of the record in the aggregate's event shard.
/// `Version::NONE` (-1) means no committed history yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    pub const NONE: Version = Version(-1);

    /// Any negative offset collapses to `NONE`
    pub fn from_offset(offset: i64) -> Self {
        if offset < 0 {
            Self::NONE
        } else {
            Self(offset)
        }
    }

    pub fn value(self) -> i64 {
        self.0
    }

    pub fn is_none(self) -> bool {
        self.0 < 0
    }

    /// Offset of the record that would follow this version
    pub fn next(self) -> i64 {
        self.0 + 1
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::NONE
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            f.write_str("NONE")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_sentinel() {
        assert_eq!(Version::NONE.value(), -1);
        assert!(Version::NONE.is_none());
        assert_eq!(Version::NONE.next(), 0);
        assert_eq!(Version::default(), Version::NONE);
    }

    #[test]
    fn test_from_offset() {
        assert_eq!(Version::from_offset(-7), Version::NONE);
        assert_eq!(Version::from_offset(4).value(), 4);
        assert!(Version::from_offset(0) > Version::NONE);
    }
}
