//! Package version parsing and comparison.
//!
//! A version is a sequence of dot-separated numeric components optionally
//! followed by a release stage (`2.1.0`, `2.1.0 beta 3`, `1.0.0 rc2`). Numeric
//! components compare numerically, a shorter component list is treated as
//! padded with zeros, and a version without a stage token is "more final" than
//! the same numeric prefix with one (`3.0.0 rc 1` < `3.0.0`).

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ValidationError;

/// Release stage of a version, ordered from least to most final. A version
/// carrying no stage orders strictly above every staged version with the same
/// numeric components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReleaseStage {
    Dev,
    Alpha,
    Beta,
    ReleaseCandidate,
}

impl ReleaseStage {
    fn parse(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "d" | "dev" => Some(ReleaseStage::Dev),
            "a" | "alpha" | "pre" | "pre-release" => Some(ReleaseStage::Alpha),
            "b" | "beta" => Some(ReleaseStage::Beta),
            "rc" | "release-candidate" => Some(ReleaseStage::ReleaseCandidate),
            _ => None,
        }
    }

    /// Canonical lowercase token for this stage.
    pub fn token(self) -> &'static str {
        match self {
            ReleaseStage::Dev => "dev",
            ReleaseStage::Alpha => "alpha",
            ReleaseStage::Beta => "beta",
            ReleaseStage::ReleaseCandidate => "rc",
        }
    }
}

/// A parsed, totally ordered package version.
///
/// Equality and ordering are defined on the canonical value, so `1.0` and
/// `1.0.0` compare equal; `Display` keeps the text the version was parsed
/// from.
#[derive(Debug, Clone)]
pub struct Version {
    /// Trimmed source text, preserved for display and error details.
    text: String,
    /// Numeric components with trailing zeros stripped, so `1.0` and `1.0.0`
    /// are the same value.
    components: Vec<u64>,
    /// Release stage and increment, absent for final releases.
    stage: Option<(ReleaseStage, u64)>,
}

impl Version {
    /// Parses a version string.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidPackageVersion`] when the text
    /// contains characters outside `[0-9.a-zA-Z-]` (whitespace separates
    /// tokens), has an empty numeric component, or names an unknown release
    /// stage.
    pub fn parse(text: &str) -> crate::Result<Self> {
        let invalid = || ValidationError::InvalidPackageVersion {
            package_version: text.to_string(),
        };

        if text
            .chars()
            .any(|c| !c.is_ascii_alphanumeric() && c != '.' && c != '-' && c != ' ')
        {
            return Err(invalid());
        }

        let mut tokens = text.split_ascii_whitespace();
        let numeric = tokens.next().ok_or_else(invalid)?;

        let mut components = Vec::new();
        for part in numeric.split('.') {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            components.push(part.parse::<u64>().map_err(|_| invalid())?);
        }

        let stage = match tokens.next() {
            None => None,
            Some(token) => {
                let (word, glued) = split_stage_token(token);
                let stage = ReleaseStage::parse(word).ok_or_else(invalid)?;
                let increment = match (glued, tokens.next()) {
                    // increment glued to the token, e.g. "rc2"
                    (Some(digits), None) => digits.parse::<u64>().map_err(|_| invalid())?,
                    (Some(_), Some(_)) => return Err(invalid()),
                    // space-separated increment, e.g. "beta 3"
                    (None, Some(number)) => {
                        if !number.bytes().all(|b| b.is_ascii_digit()) || number.is_empty() {
                            return Err(invalid());
                        }
                        number.parse::<u64>().map_err(|_| invalid())?
                    }
                    (None, None) => 0,
                };
                Some((stage, increment))
            }
        };

        if tokens.next().is_some() {
            return Err(invalid());
        }

        // Canonical form: no trailing zero components, at least one component.
        while components.len() > 1 && components.last() == Some(&0) {
            components.pop();
        }

        Ok(Version {
            text: text.trim().to_string(),
            components,
            stage,
        })
    }

    /// Numeric components in canonical form.
    pub fn components(&self) -> &[u64] {
        &self.components
    }

    /// Release stage and increment, `None` for final releases.
    pub fn stage(&self) -> Option<(ReleaseStage, u64)> {
        self.stage
    }
}

/// Splits a stage token into its alphabetic word and an optional glued
/// numeric suffix (`"rc2"` -> `("rc", Some("2"))`).
fn split_stage_token(token: &str) -> (&str, Option<&str>) {
    match token.find(|c: char| c.is_ascii_digit()) {
        Some(idx) if idx > 0 && token[idx..].bytes().all(|b| b.is_ascii_digit()) => {
            (&token[..idx], Some(&token[idx..]))
        }
        _ => (token, None),
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl std::hash::Hash for Version {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        // hashes the canonical value, consistent with `Eq`
        self.components.hash(state);
        self.stage.hash(state);
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        // Trailing zeros are stripped, so lexicographic comparison of the
        // component vectors matches zero-padded numeric comparison.
        self.components
            .cmp(&other.components)
            .then_with(|| match (&self.stage, &other.stage) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => a.cmp(b),
            })
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for Version {
    type Err = ValidationError;

    fn from_str(s: &str) -> crate::Result<Self> {
        Version::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Version::parse(&text).map_err(D::Error::custom)
    }
}
