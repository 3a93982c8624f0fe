//! Package versions and interval-notation version ranges.
//!
//! Versions are compared numerically on up to four components, then by
//! pre-release label with semver precedence (a pre-release sorts below its
//! release). Build metadata after `+` is ignored.
//!
//! Ranges use interval notation:
//!
//! | Range      | Meaning              |
//! |------------|----------------------|
//! | `1.0`      | exactly 1.0          |
//! | `[1.0]`    | exactly 1.0          |
//! | `[1.0,)`   | 1.0 <= v             |
//! | `(1.0,)`   | 1.0 < v              |
//! | `(,2.0]`   | v <= 2.0             |
//! | `[1.0,2.0)`| 1.0 <= v < 2.0       |

use semver::Prerelease;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("invalid version '{0}'")]
    InvalidVersion(String),
    #[error("invalid version range '{0}'")]
    InvalidRange(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageVersion {
    numbers: [u64; 4],
    pre: Prerelease,
}

impl PackageVersion {
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let invalid = || VersionError::InvalidVersion(input.to_string());

        let trimmed = input.trim();
        let trimmed = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);
        let without_meta = trimmed.split('+').next().unwrap_or_default();

        let (release, pre) = match without_meta.split_once('-') {
            Some((release, pre)) => (release, pre),
            None => (without_meta, ""),
        };

        let parts: Vec<&str> = release.split('.').collect();
        if parts.is_empty() || parts.len() > 4 {
            return Err(invalid());
        }

        let mut numbers = [0u64; 4];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            *slot = part.parse().map_err(|_| invalid())?;
        }

        // Labels compare case-insensitively.
        let pre = Prerelease::new(&pre.to_ascii_lowercase()).map_err(|_| invalid())?;

        Ok(Self { numbers, pre })
    }

    pub fn is_prerelease(&self) -> bool {
        !self.pre.is_empty()
    }
}

impl FromStr for PackageVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Ord for PackageVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.numbers
            .cmp(&other.numbers)
            .then_with(|| self.pre.cmp(&other.pre))
    }
}

impl PartialOrd for PackageVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [major, minor, patch, revision] = self.numbers;
        write!(f, "{}.{}.{}", major, minor, patch)?;
        if revision > 0 {
            write!(f, ".{}", revision)?;
        }
        if !self.pre.is_empty() {
            write!(f, "-{}", self.pre)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Bound {
    version: PackageVersion,
    inclusive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VersionRange {
    min: Option<Bound>,
    max: Option<Bound>,
}

impl VersionRange {
    /// A range matching every version.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn exact(version: PackageVersion) -> Self {
        Self {
            min: Some(Bound {
                version: version.clone(),
                inclusive: true,
            }),
            max: Some(Bound {
                version,
                inclusive: true,
            }),
        }
    }

    /// Parses a range; blank input yields [`VersionRange::any`].
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let invalid = || VersionError::InvalidRange(input.to_string());
        let s = input.trim();

        if s.is_empty() {
            return Ok(Self::any());
        }

        let min_inclusive = match s.chars().next() {
            Some('[') => true,
            Some('(') => false,
            _ => {
                let version = PackageVersion::parse(s).map_err(|_| invalid())?;
                return Ok(Self::exact(version));
            }
        };
        let max_inclusive = match s.chars().last() {
            Some(']') => true,
            Some(')') => false,
            _ => return Err(invalid()),
        };
        if s.len() < 2 {
            return Err(invalid());
        }
        let inner = &s[1..s.len() - 1];

        let Some((low, high)) = inner.split_once(',') else {
            if !(min_inclusive && max_inclusive) {
                return Err(invalid());
            }
            let version = PackageVersion::parse(inner).map_err(|_| invalid())?;
            return Ok(Self::exact(version));
        };

        let parse_bound = |text: &str, inclusive: bool| -> Result<Option<Bound>, VersionError> {
            let text = text.trim();
            if text.is_empty() {
                return Ok(None);
            }
            let version = PackageVersion::parse(text).map_err(|_| invalid())?;
            Ok(Some(Bound { version, inclusive }))
        };

        let range = Self {
            min: parse_bound(low, min_inclusive)?,
            max: parse_bound(high, max_inclusive)?,
        };

        if let (Some(min), Some(max)) = (&range.min, &range.max) {
            let empty = match min.version.cmp(&max.version) {
                Ordering::Greater => true,
                Ordering::Equal => !(min.inclusive && max.inclusive),
                Ordering::Less => false,
            };
            if empty {
                return Err(invalid());
            }
        }

        Ok(range)
    }

    pub fn satisfies(&self, version: &PackageVersion) -> bool {
        if let Some(min) = &self.min {
            match version.cmp(&min.version) {
                Ordering::Less => return false,
                Ordering::Equal if !min.inclusive => return false,
                _ => {}
            }
        }
        if let Some(max) = &self.max {
            match version.cmp(&max.version) {
                Ordering::Greater => return false,
                Ordering::Equal if !max.inclusive => return false,
                _ => {}
            }
        }
        true
    }
}

/// Parses both sides and checks `version` against `range`.
pub fn satisfies(range: &str, version: &str) -> Result<bool, VersionError> {
    let range = VersionRange::parse(range)?;
    let version = PackageVersion::parse(version)?;
    Ok(range.satisfies(&version))
}
