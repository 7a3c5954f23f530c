//! Migration version tokens.
//!
//! A version is a `/`-separated list of segments. The first segment of a
//! multi-segment version names the release branch (`v3_4_0/I7014_doi` belongs
//! to branch `v3_4_0`). Versions order segment by segment using a natural,
//! digit-aware comparison so that `v10` sorts after `v9` and `I1000` after
//! `I999`.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Separator between branch and unit segments.
pub const SEGMENT_SEPARATOR: char = '/';

/// Invalid version token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    /// The token was empty.
    #[error("version token is empty")]
    Empty,

    /// A segment between separators was empty.
    #[error("version {0:?} contains an empty segment")]
    EmptySegment(String),

    /// The token contains a character outside `[A-Za-z0-9_.-/]`.
    #[error("version {token:?} contains invalid character {ch:?}")]
    InvalidCharacter {
        /// The rejected token.
        token: String,
        /// The offending character.
        ch: char,
    },
}

/// A totally ordered migration version token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MigrationVersion(String);

impl MigrationVersion {
    /// Parse and validate a version token.
    pub fn new(token: impl Into<String>) -> Result<Self, VersionError> {
        let token = token.into();
        if token.is_empty() {
            return Err(VersionError::Empty);
        }
        if let Some(ch) = token
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(*c, '_' | '-' | '.' | SEGMENT_SEPARATOR)))
        {
            return Err(VersionError::InvalidCharacter { token, ch });
        }
        if token.split(SEGMENT_SEPARATOR).any(str::is_empty) {
            return Err(VersionError::EmptySegment(token));
        }
        Ok(Self(token))
    }

    /// Build a branch-qualified version.
    pub fn in_branch(branch: &str, unit: &str) -> Result<Self, VersionError> {
        Self::new(format!("{branch}{SEGMENT_SEPARATOR}{unit}"))
    }

    /// The raw token.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterate over the segments of the token.
    pub fn segments(&self) -> impl Iterator<Item = &str> + Clone {
        self.0.split(SEGMENT_SEPARATOR)
    }

    /// Number of segments.
    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// Release branch, if the version is branch-qualified.
    pub fn branch(&self) -> Option<&str> {
        self.0.split_once(SEGMENT_SEPARATOR).map(|(branch, _)| branch)
    }

    /// Last segment of the token.
    pub fn unit_name(&self) -> &str {
        self.0
            .rsplit_once(SEGMENT_SEPARATOR)
            .map_or(self.0.as_str(), |(_, unit)| unit)
    }

    /// Compare against a range bound, truncating `self` to the bound's depth.
    ///
    /// A branch-only bound (`v3_5_0`) compares `Equal` to every unit inside
    /// that branch, which lets callers express "everything up to and
    /// including release 3.5.0".
    pub fn cmp_bounded(&self, bound: &MigrationVersion) -> Ordering {
        compare_segments(self.segments().take(bound.depth()), bound.segments())
    }

    /// Whether `self` lies in the half-open range `(from, to]`.
    ///
    /// `from = None` means "from the beginning".
    pub fn in_range(&self, from: Option<&MigrationVersion>, to: &MigrationVersion) -> bool {
        let after_from = from.map_or(true, |from| self.cmp_bounded(from) == Ordering::Greater);
        after_from && self.cmp_bounded(to) != Ordering::Greater
    }
}

impl Ord for MigrationVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_segments(self.segments(), other.segments()).then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for MigrationVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for MigrationVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for MigrationVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for MigrationVersion {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for MigrationVersion {
    type Error = VersionError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MigrationVersion> for String {
    fn from(version: MigrationVersion) -> Self {
        version.0
    }
}

impl AsRef<str> for MigrationVersion {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn compare_segments<'a>(
    left: impl Iterator<Item = &'a str>,
    mut right: impl Iterator<Item = &'a str>,
) -> Ordering {
    for l in left {
        match right.next() {
            None => return Ordering::Greater,
            Some(r) => match natural_cmp(l, r) {
                Ordering::Equal => continue,
                ord => return ord,
            },
        }
    }
    if right.next().is_some() {
        Ordering::Less
    } else {
        Ordering::Equal
    }
}

#[derive(Debug, Clone, Copy)]
enum Chunk<'a> {
    Digits(&'a str),
    Text(&'a str),
}

/// Splits a string into maximal runs of ASCII digits and non-digits.
struct Chunks<'a> {
    rest: &'a str,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let first = self.rest.chars().next()?;
        let digits = first.is_ascii_digit();
        let end = self
            .rest
            .find(|c: char| c.is_ascii_digit() != digits)
            .unwrap_or(self.rest.len());
        let (chunk, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(if digits {
            Chunk::Digits(chunk)
        } else {
            Chunk::Text(chunk)
        })
    }
}

fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = Chunks { rest: a };
    let mut right = Chunks { rest: b };
    loop {
        let ord = match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(Chunk::Digits(l)), Some(Chunk::Digits(r))) => compare_digits(l, r),
            (Some(Chunk::Text(l)), Some(Chunk::Text(r))) => l.cmp(r),
            (Some(Chunk::Digits(_)), Some(Chunk::Text(_))) => Ordering::Less,
            (Some(Chunk::Text(_)), Some(Chunk::Digits(_))) => Ordering::Greater,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
}

fn compare_digits(l: &str, r: &str) -> Ordering {
    let l = l.trim_start_matches('0');
    let r = r.trim_start_matches('0');
    l.len().cmp(&r.len()).then_with(|| l.cmp(r))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(token: &str) -> MigrationVersion {
        MigrationVersion::new(token).unwrap()
    }

    #[test]
    fn test_natural_ordering() {
        assert!(v("v2") < v("v10"));
        assert!(v("v9") < v("v10"));
        assert!(v("v3_4_0/I999_x") < v("v3_4_0/I1000_y"));
        assert!(v("v3_4_0/I9999_z") < v("v3_5_0/I1_a"));
        assert!(v("v3_4_0") < v("v3_4_0/I1"));
    }

    #[test]
    fn test_ordering_consistent_with_eq() {
        assert_ne!(v("v01"), v("v1"));
        assert_ne!(v("v01").cmp(&v("v1")), Ordering::Equal);
    }

    #[test]
    fn test_branch_and_unit() {
        let version = v("v3_4_0/I7014_DoiMigration");
        assert_eq!(version.branch(), Some("v3_4_0"));
        assert_eq!(version.unit_name(), "I7014_DoiMigration");
        assert_eq!(version.depth(), 2);

        let flat = v("v1");
        assert_eq!(flat.branch(), None);
        assert_eq!(flat.unit_name(), "v1");
    }

    #[test]
    fn test_branch_bounds() {
        let unit = v("v3_5_0/I1_first");
        assert!(unit.in_range(Some(&v("v3_4_0")), &v("v3_5_0")));
        assert!(!unit.in_range(Some(&v("v3_5_0")), &v("v3_6_0")));
        assert!(!unit.in_range(None, &v("v3_4_0")));
    }

    #[test]
    fn test_flat_range() {
        assert!(v("v2").in_range(Some(&v("v1")), &v("v3")));
        assert!(v("v3").in_range(Some(&v("v1")), &v("v3")));
        assert!(!v("v1").in_range(Some(&v("v1")), &v("v3")));
        assert!(v("v1").in_range(None, &v("v3")));
    }

    #[test]
    fn test_invalid_tokens() {
        assert_eq!(MigrationVersion::new(""), Err(VersionError::Empty));
        assert!(matches!(
            MigrationVersion::new("v1//x"),
            Err(VersionError::EmptySegment(_))
        ));
        assert!(matches!(
            MigrationVersion::new("v1 x"),
            Err(VersionError::InvalidCharacter { ch: ' ', .. })
        ));
    }

    #[test]
    fn test_accepts_separator_punctuation() {
        let version = v("v3.4-0/I1_doi");
        assert_eq!(version.branch(), Some("v3.4-0"));
        assert!(matches!(
            MigrationVersion::new("v1/I1:x"),
            Err(VersionError::InvalidCharacter { ch: ':', .. })
        ));
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&v("v3_4_0/I1")).unwrap();
        assert_eq!(json, "\"v3_4_0/I1\"");
        assert!(serde_json::from_str::<MigrationVersion>("\"\"").is_err());
    }
}
