//! Deployment target and branch reference

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DeployError;

/// A host identified by its domain name.
///
/// The same name is used to reach the host and as its hostname.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Target(String);

impl Target {
    pub fn domain(&self) -> &str {
        &self.0
    }
}

impl FromStr for Target {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let domain = s.trim_end_matches('.').to_ascii_lowercase();
        if domain.is_empty() || domain.len() > 253 {
            return Err(DeployError::ValidationError(format!(
                "invalid domain: {:?}",
                s
            )));
        }

        for label in domain.split('.') {
            let valid = !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
            if !valid {
                return Err(DeployError::ValidationError(format!(
                    "invalid domain label {:?} in {:?}",
                    label, s
                )));
            }
        }

        Ok(Target(domain))
    }
}

impl TryFrom<String> for Target {
    type Error = DeployError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Target> for String {
    fn from(target: Target) -> Self {
        target.0
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name of the remote branch to deploy.
///
/// Checked against the subset of `git check-ref-format` rules that matter
/// for a name that ends up on a command line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BranchRef(String);

impl BranchRef {
    pub fn name(&self) -> &str {
        &self.0
    }

    /// Remote-tracking ref for this branch
    pub fn remote_ref(&self) -> String {
        format!("refs/remotes/origin/{}", self.0)
    }

    /// Local branch ref
    pub fn local_ref(&self) -> String {
        format!("refs/heads/{}", self.0)
    }
}

impl FromStr for BranchRef {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = s.is_empty()
            || s.starts_with('-')
            || s.starts_with('/')
            || s.ends_with('/')
            || s.ends_with('.')
            || s.ends_with(".lock")
            || s.contains("..")
            || s.contains("//")
            || s.contains("@{")
            || s == "@"
            || s.chars().any(|c| {
                c.is_ascii_control()
                    || c.is_whitespace()
                    || matches!(c, '~' | '^' | ':' | '?' | '*' | '[' | '\\' | '\'' | '"')
            });

        if invalid {
            return Err(DeployError::ValidationError(format!(
                "invalid branch name: {:?}",
                s
            )));
        }
        Ok(BranchRef(s.to_string()))
    }
}

impl TryFrom<String> for BranchRef {
    type Error = DeployError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BranchRef> for String {
    fn from(branch: BranchRef) -> Self {
        branch.0
    }
}

impl fmt::Display for BranchRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
