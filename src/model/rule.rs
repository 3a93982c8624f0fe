use super::fold_id;
use serde::{Deserialize, Serialize};

/// Matches packages by id pattern and optional version range.
///
/// `id` may contain `*` wildcards. An empty `version` matches every version.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VersionRule {
    pub id: String,
    pub version: String,
}

impl VersionRule {
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
        }
    }

    pub fn any_version(id: impl Into<String>) -> Self {
        Self::new(id, "")
    }

    pub fn has_range(&self) -> bool {
        !self.version.trim().is_empty()
    }

    /// Identity used when merging rule lists.
    pub fn key(&self) -> (String, String) {
        (fold_id(&self.id), self.version.trim().to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockRule {
    #[serde(flatten)]
    pub rule: VersionRule,
    /// Replaces the default diagnostic message when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl BlockRule {
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            rule: VersionRule::new(id, version),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AllowRule {
    #[serde(flatten)]
    pub rule: VersionRule,
}

impl AllowRule {
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            rule: VersionRule::new(id, version),
        }
    }
}

/// Anything carrying a [`VersionRule`].
pub trait HasVersionRule {
    fn version_rule(&self) -> &VersionRule;
}

impl HasVersionRule for BlockRule {
    fn version_rule(&self) -> &VersionRule {
        &self.rule
    }
}

impl HasVersionRule for AllowRule {
    fn version_rule(&self) -> &VersionRule {
        &self.rule
    }
}
