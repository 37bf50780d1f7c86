//! Download scope
//!
//! A scope is a threshold over [`Requirement`]: a resource is downloaded
//! when the configured scope ranks at or above the resource's requirement.
//!
//! | Scope       | Downloads                          |
//! |-------------|------------------------------------|
//! | `REQUIRED`  | required resources only            |
//! | `PREFERRED` | required and preferred resources   |
//! | `DEFERRED`  | everything                         |

use crate::api::manifest::{Requirement, Resource};
use crate::error::{KindleError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

impl Requirement {
    /// Every level, from narrowest to widest
    pub const ALL: [Requirement; 3] = [Requirement::Required, Requirement::Preferred, Requirement::Deferred];

    /// Rank used for scope comparison.
    ///
    /// Kept as an explicit table so reordering the enum cannot change it.
    pub fn rank(self) -> u8 {
        match self {
            Requirement::Required => 0,
            Requirement::Preferred => 1,
            Requirement::Deferred => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Requirement::Required => "REQUIRED",
            Requirement::Preferred => "PREFERRED",
            Requirement::Deferred => "DEFERRED",
        }
    }
}

impl FromStr for Requirement {
    type Err = KindleError;

    fn from_str(s: &str) -> Result<Self> {
        Requirement::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| KindleError::InvalidScope {
                name: s.to_string(),
                valid: Requirement::ALL.iter().map(|r| r.as_str()).collect(),
            })
    }
}

impl std::fmt::Display for Requirement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resource selection by requirement threshold
///
/// Deserializes from a scope name with the same case-insensitive rules as
/// [`ScopeFilter::parse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ScopeFilter {
    scope: Requirement,
}

impl ScopeFilter {
    pub fn new(scope: Requirement) -> Self {
        Self { scope }
    }

    /// Parse a scope name case-insensitively
    ///
    /// # Errors
    /// `InvalidScope` listing the valid names
    pub fn parse(name: &str) -> Result<Self> {
        Ok(Self::new(name.parse()?))
    }

    pub fn scope(&self) -> Requirement {
        self.scope
    }

    /// Whether a resource with the given requirement is in scope
    pub fn should_download(&self, requirement: Requirement) -> bool {
        self.scope.rank() >= requirement.rank()
    }

    /// Resources in scope, in their original order
    pub fn select<'a>(&self, resources: &'a [Resource]) -> Vec<&'a Resource> {
        resources
            .iter()
            .filter(|r| self.should_download(r.requirement))
            .collect()
    }
}

impl TryFrom<String> for ScopeFilter {
    type Error = KindleError;

    fn try_from(name: String) -> Result<Self> {
        Self::parse(&name)
    }
}

impl From<ScopeFilter> for String {
    fn from(filter: ScopeFilter) -> Self {
        filter.scope.as_str().to_string()
    }
}

impl Default for ScopeFilter {
    fn default() -> Self {
        Self::new(Requirement::Deferred)
    }
}
