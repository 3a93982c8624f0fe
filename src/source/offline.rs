use super::VulnerabilitySource;
use crate::error::{Result, ScanError};
use crate::model::{insert_vulnerability, Package, Vulnerability, VulnerabilityMap};
use crate::version;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, warn};

const SOURCE_NAME: &str = "offline";

/// One record of the offline database.
///
/// `versions` is a NuGet range; empty means every version is affected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineEntry {
    pub package: String,
    #[serde(default)]
    pub versions: String,
    pub id: String,
    pub cvss_score: f32,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwe: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_version: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct OfflineDatabase {
    #[serde(default)]
    vulnerabilities: Vec<OfflineEntry>,
}

impl OfflineEntry {
    fn affects(&self, package: &Package) -> bool {
        if !package.same_id(&self.package) {
            return false;
        }
        match version::satisfies(&self.versions, &package.version) {
            Ok(affected) => affected,
            Err(e) => {
                warn!(
                    vulnerability = %self.id,
                    package = %package,
                    error = %e,
                    "Skipping offline record with unusable version"
                );
                false
            }
        }
    }

    fn to_vulnerability(&self) -> Vulnerability {
        let mut vuln =
            Vulnerability::new(&self.id, self.cvss_score, &self.description, SOURCE_NAME);
        vuln.reference_url = self.reference_url.clone();
        vuln.cwe = self.cwe.clone();
        vuln.fixed_version = self.fixed_version.clone();
        vuln
    }
}

/// A JSON vulnerability database on the local disk.
///
/// The file is read on every check, so it can be refreshed between scans.
///
/// ```json
/// {
///   "vulnerabilities": [
///     {
///       "package": "Foo",
///       "versions": "[1.0,2.0)",
///       "id": "CVE-2024-0001",
///       "cvss_score": 9.8,
///       "description": "Remote code execution"
///     }
///   ]
/// }
/// ```
pub struct OfflineSource {
    path: PathBuf,
}

impl OfflineSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self) -> Result<Vec<OfflineEntry>> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            ScanError::source_unavailable(SOURCE_NAME, format!("{}: {}", self.path.display(), e))
        })?;
        let db: OfflineDatabase = serde_json::from_str(&content).map_err(|e| {
            ScanError::source_unavailable(SOURCE_NAME, format!("{}: {}", self.path.display(), e))
        })?;
        Ok(db.vulnerabilities)
    }
}

#[async_trait]
impl VulnerabilitySource for OfflineSource {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn is_remote(&self) -> bool {
        false
    }

    async fn check(&self, packages: &[Package]) -> Result<VulnerabilityMap> {
        let entries = self.load().await?;
        debug!(
            path = %self.path.display(),
            records = entries.len(),
            packages = packages.len(),
            "Checking offline database"
        );

        let mut map = VulnerabilityMap::new();
        for pkg in packages {
            for entry in entries.iter().filter(|e| e.affects(pkg)) {
                insert_vulnerability(&mut map, &pkg.id, entry.to_vulnerability());
            }
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const DATABASE: &str = r#"{
        "vulnerabilities": [
            {
                "package": "Foo",
                "versions": "[1.0,2.0)",
                "id": "CVE-1",
                "cvss_score": 9.8,
                "description": "bad",
                "reference_url": "https://example.com/CVE-1"
            },
            {
                "package": "foo",
                "id": "CVE-2",
                "cvss_score": 5.0,
                "description": "any version"
            },
            {
                "package": "Bar",
                "versions": "[oops",
                "id": "CVE-3",
                "cvss_score": 7.0,
                "description": "broken range"
            }
        ]
    }"#;

    fn write_db(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("db.json");
        fs::write(&path, DATABASE).unwrap();
        path
    }

    #[tokio::test]
    async fn test_matches_id_and_range() {
        let dir = TempDir::new().unwrap();
        let source = OfflineSource::new(write_db(&dir));

        let map = source
            .check(&[
                Package::new("FOO", "1.5.0"),
                Package::new("Bar", "1.0.0"),
                Package::new("Baz", "1.0.0"),
            ])
            .await
            .unwrap();

        assert_eq!(map.len(), 1);
        let foo = &map["foo"];
        assert_eq!(foo.keys().collect::<Vec<_>>(), vec!["CVE-1", "CVE-2"]);
        assert_eq!(foo["CVE-1"].source, "offline");
        assert_eq!(foo["CVE-1"].reference_url.as_deref(), Some("https://example.com/CVE-1"));
    }

    #[tokio::test]
    async fn test_version_outside_range() {
        let dir = TempDir::new().unwrap();
        let source = OfflineSource::new(write_db(&dir));

        let map = source.check(&[Package::new("Foo", "2.0.0")]).await.unwrap();
        assert_eq!(map["foo"].keys().collect::<Vec<_>>(), vec!["CVE-2"]);
    }

    #[tokio::test]
    async fn test_non_ascii_id_matches_and_keys_consistently() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.json");
        fs::write(
            &path,
            r#"{"vulnerabilities": [
                {"package": "Ärger.Lib", "id": "CVE-7", "cvss_score": 7.0, "description": "x"}
            ]}"#,
        )
        .unwrap();

        let package = Package::new("ÄRGER.LIB", "1.0.0");
        let map = OfflineSource::new(path).check(&[package.clone()]).await.unwrap();
        assert_eq!(map[&package.lookup_id()].keys().collect::<Vec<_>>(), vec!["CVE-7"]);
    }

    #[tokio::test]
    async fn test_missing_database_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let source = OfflineSource::new(dir.path().join("missing.json"));

        let err = source.check(&[Package::new("Foo", "1.0")]).await.unwrap_err();
        assert!(matches!(err, ScanError::SourceUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_malformed_database_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.json");
        fs::write(&path, "{ not json").unwrap();

        let err = OfflineSource::new(path).check(&[]).await.unwrap_err();
        assert!(matches!(err, ScanError::SourceUnavailable { .. }));
    }
}
