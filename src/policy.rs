//! Block-list and allow-list evaluation.
//!
//! A rule matches a package when its id pattern matches the package id and
//! its version range is empty or satisfied by the package version. Rules
//! that cannot be evaluated (malformed range or package version) never
//! match.

use crate::model::{AllowRule, BlockRule, HasVersionRule, Package, VersionRule};
use crate::pattern::WildcardPattern;
use crate::version::{PackageVersion, VersionRange};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Which policy check a package failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    Blocked,
    NotAllowed,
}

impl ViolationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::Blocked => "blocked",
            ViolationKind::NotAllowed => "not_allowed",
        }
    }
}

/// A package that failed a policy check. Always reported, never raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyViolation {
    pub kind: ViolationKind,
    /// Custom message from the matching block rule, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// The configured rule lists.
#[derive(Debug, Clone, Default)]
pub struct Policy {
    pub blocked: Vec<BlockRule>,
    pub allowed: Vec<AllowRule>,
}

impl Policy {
    pub fn new(blocked: Vec<BlockRule>, allowed: Vec<AllowRule>) -> Self {
        Self { blocked, allowed }
    }

    /// Evaluates both lists for one package.
    ///
    /// # Example
    ///
    /// ```
    /// use vulngate::{model::BlockRule, Package, Policy};
    ///
    /// let policy = Policy::new(vec![BlockRule::new("Foo.*", "[1.0,2.0)")], vec![]);
    /// assert_eq!(policy.evaluate(&Package::new("Foo.Core", "1.5.0")).len(), 1);
    /// assert!(policy.evaluate(&Package::new("Foo.Core", "2.0.0")).is_empty());
    /// ```
    pub fn evaluate(&self, package: &Package) -> Vec<PolicyViolation> {
        let mut violations = Vec::new();

        if let Some(rule) = is_blocked(package, &self.blocked) {
            violations.push(PolicyViolation {
                kind: ViolationKind::Blocked,
                message: rule.message.clone(),
            });
        }

        if !is_allowed(package, &self.allowed) {
            violations.push(PolicyViolation {
                kind: ViolationKind::NotAllowed,
                message: None,
            });
        }

        violations
    }
}

/// Returns the first block rule matching `package`. Rule order is significant.
pub fn is_blocked<'a>(package: &Package, rules: &'a [BlockRule]) -> Option<&'a BlockRule> {
    rules.iter().find(|rule| rule_matches(rule.version_rule(), package))
}

/// True when no allow rules are configured or at least one matches.
pub fn is_allowed(package: &Package, rules: &[AllowRule]) -> bool {
    if rules.is_empty() {
        return true;
    }
    rules.iter().any(|rule| rule_matches(rule.version_rule(), package))
}

pub fn rule_matches(rule: &VersionRule, package: &Package) -> bool {
    if !WildcardPattern::new(&rule.id).matches(&package.id) {
        return false;
    }
    if !rule.has_range() {
        return true;
    }

    let range = match VersionRange::parse(&rule.version) {
        Ok(range) => range,
        Err(e) => {
            warn!(rule = %rule.id, error = %e, "Ignoring rule with malformed version range");
            return false;
        }
    };

    match PackageVersion::parse(&package.version) {
        Ok(version) => range.satisfies(&version),
        Err(e) => {
            warn!(package = %package, error = %e, "Cannot compare package version against rule");
            false
        }
    }
}
