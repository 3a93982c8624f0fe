use super::fold_id;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Package id (lowercased) to vulnerability id to record.
pub type VulnerabilityMap = BTreeMap<String, BTreeMap<String, Vulnerability>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vulnerability {
    pub id: String,
    /// CVSS base score on the 0.0-10.0 scale.
    pub cvss_score: f32,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_url: Option<String>,
    /// Name of the source that reported this record.
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwe: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_version: Option<String>,
}

impl Vulnerability {
    pub fn new(
        id: impl Into<String>,
        cvss_score: f32,
        description: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            cvss_score,
            description: description.into(),
            reference_url: None,
            source: source.into(),
            cwe: None,
            fixed_version: None,
        }
    }

    pub fn with_reference(mut self, url: impl Into<String>) -> Self {
        self.reference_url = Some(url.into());
        self
    }

    pub fn severity(&self) -> Severity {
        Severity::from_score(self.cvss_score)
    }
}

/// Qualitative CVSS rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Unknown,
}

impl Severity {
    pub fn from_score(score: f32) -> Self {
        match score {
            s if s >= 9.0 => Severity::Critical,
            s if s >= 7.0 => Severity::High,
            s if s >= 4.0 => Severity::Medium,
            s if s > 0.0 => Severity::Low,
            _ => Severity::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Unknown => "unknown",
        }
    }
}

/// Builds a map entry for `package_id`, lowercasing the key.
pub fn insert_vulnerability(map: &mut VulnerabilityMap, package_id: &str, vuln: Vulnerability) {
    map.entry(fold_id(package_id))
        .or_default()
        .entry(vuln.id.clone())
        .or_insert(vuln);
}
