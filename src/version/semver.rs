//! `<major>.<minor>` version strings, bump rules, and lexicographic-numeric
//! ordering (§4.3, §6).

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, TddbError};
use crate::version::diff::ChangeKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeVersion {
    pub major: u32,
    pub minor: u32,
}

impl TypeVersion {
    pub const INITIAL: TypeVersion = TypeVersion { major: 0, minor: 1 };
    pub const RELEASED: TypeVersion = TypeVersion { major: 1, minor: 0 };

    pub fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Compute the next version given this version (the previous one) and
    /// the classified change. `noChange` should never reach this (callers
    /// skip persisting on `noChange`), but is handled as a no-op bump for
    /// completeness.
    pub fn bump(self, change: ChangeKind) -> TypeVersion {
        match change {
            ChangeKind::NoChange => self,
            ChangeKind::BackwardCompatible => TypeVersion::new(self.major, self.minor + 1),
            ChangeKind::NotCompatible => {
                if self.major >= 1 {
                    TypeVersion::new(self.major + 1, 0)
                } else {
                    // major == 0: still pre-release, stays in minor bumps
                    // until the module is released (§3 TypeInfo invariant).
                    TypeVersion::new(self.major, self.minor + 1)
                }
            }
        }
    }

    /// Promote a pre-release (`major == 0`) version to `1.0`, as done by
    /// `releaseModule` for every `major == 0` type/func.
    pub fn release(self) -> TypeVersion {
        debug_assert_eq!(self.major, 0, "release() is only defined for major == 0");
        TypeVersion::RELEASED
    }
}

impl fmt::Display for TypeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for TypeVersion {
    type Err = TddbError;

    fn from_str(s: &str) -> Result<Self> {
        let (major_str, minor_str) = s
            .split_once('.')
            .ok_or_else(|| TddbError::parse(format!("malformed version string: {s:?}")))?;
        let major = major_str
            .parse::<u32>()
            .map_err(|_| TddbError::parse(format!("malformed version major: {s:?}")))?;
        let minor = minor_str
            .parse::<u32>()
            .map_err(|_| TddbError::parse(format!("malformed version minor: {s:?}")))?;
        Ok(TypeVersion { major, minor })
    }
}

impl PartialOrd for TypeVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TypeVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major.cmp(&other.major).then(self.minor.cmp(&other.minor))
    }
}
