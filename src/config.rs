//! Settings file handling.
//!
//! Settings live in `vulngate.toml` next to the scanned project (or at the
//! path given with `--settings`). A missing file is created with defaults;
//! concurrent scans starting in the same directory retry until the file is
//! readable, falling back to defaults after a bounded wait.
//!
//! # Example Settings
//!
//! ```toml
//! warn_only = false
//! severity_threshold = 7.0
//! check_referenced_projects = true
//! sensitive_packages = ["Contoso.*"]
//! sources = ["osv", "offline"]
//! required_sources = []
//!
//! [[blocked_packages]]
//! id = "Foo"
//! version = "[1.0,1.1)"
//! message = "Foo 1.0 is banned"
//!
//! [ignore]
//! packages = ["Contoso.Internal.*"]
//! vulnerabilities = ["CVE-2021-12345"]
//!
//! [reports]
//! json = "reports/{project}.json"
//! ```
//!
//! Version 0 files used `blacklisted_packages` and `whitelisted_packages`;
//! these are folded into `blocked_packages` and `allowed_packages` on load.

use crate::error::{Result, ScanError};
use crate::model::{AllowRule, BlockRule, HasVersionRule};
use crate::policy::Policy;
use crate::report::ReportOptions;
use crate::retry::{retry_with_backoff, RetryConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Settings file name looked up next to the scan target.
pub const SETTINGS_FILE_NAME: &str = "vulngate.toml";

/// Version written by this release.
pub const CURRENT_SETTINGS_VERSION: u32 = 1;

/// A vulnerability source, listed in priority order in [`Settings::sources`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Osv,
    Offline,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Osv => "osv",
            SourceKind::Offline => "offline",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub version: u32,

    /// Report findings as warnings and always succeed.
    pub warn_only: bool,

    /// Minimum CVSS score (inclusive) for reported vulnerabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity_threshold: Option<f32>,

    /// Follow `-r` references to child projects.
    pub check_referenced_projects: bool,

    /// Package id patterns never sent to remote sources.
    pub sensitive_packages: Vec<String>,

    /// Sources to query, highest priority first.
    pub sources: Vec<SourceKind>,

    /// Sources whose failure aborts the scan.
    pub required_sources: Vec<SourceKind>,

    /// OSV ecosystem name used for queries.
    pub osv_ecosystem: String,

    /// Local JSON vulnerability database for the offline source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offline_database: Option<PathBuf>,

    /// How long to cache source responses, in hours.
    pub cache_ttl_hours: u64,

    pub blocked_packages: Vec<BlockRule>,
    pub allowed_packages: Vec<AllowRule>,

    #[serde(skip_serializing)]
    pub blacklisted_packages: Vec<BlockRule>,
    #[serde(skip_serializing)]
    pub whitelisted_packages: Vec<AllowRule>,

    pub ignore: IgnoreConfig,
    pub reports: ReportPaths,
}

/// Packages and vulnerabilities excluded from scanning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IgnoreConfig {
    /// Package id patterns (supports `*`). Ignored packages are never queried.
    pub packages: Vec<String>,

    /// Vulnerability ids, matched exactly.
    pub vulnerabilities: Vec<String>,
}

/// Report output paths. `{project}` is replaced with the scanned project's name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportPaths {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xml: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_SETTINGS_VERSION,
            warn_only: false,
            severity_threshold: None,
            check_referenced_projects: false,
            sensitive_packages: Vec::new(),
            sources: vec![SourceKind::Osv],
            required_sources: Vec::new(),
            osv_ecosystem: "NuGet".to_string(),
            offline_database: None,
            cache_ttl_hours: 24,
            blocked_packages: Vec::new(),
            allowed_packages: Vec::new(),
            blacklisted_packages: Vec::new(),
            whitelisted_packages: Vec::new(),
            ignore: IgnoreConfig::default(),
            reports: ReportPaths::default(),
        }
    }
}

/// Merges a legacy rule list into the current one.
///
/// Current rules keep their order; legacy rules follow, skipping any whose
/// (id, version) pair is already present.
pub fn migrate_rules<R: HasVersionRule + Clone>(legacy: &[R], current: &[R]) -> Vec<R> {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    current
        .iter()
        .chain(legacy)
        .filter(|rule| seen.insert(rule.version_rule().key()))
        .cloned()
        .collect()
}

impl Settings {
    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        let settings: Settings = toml::from_str(content)?;
        Ok(settings.migrate())
    }

    /// Folds legacy rule lists into the canonical ones. Runs once per load.
    pub fn migrate(mut self) -> Self {
        let has_legacy =
            !self.blacklisted_packages.is_empty() || !self.whitelisted_packages.is_empty();
        if self.version >= CURRENT_SETTINGS_VERSION && !has_legacy {
            return self;
        }

        debug!(from = self.version, to = CURRENT_SETTINGS_VERSION, "Migrating settings");
        self.blocked_packages = migrate_rules(&self.blacklisted_packages, &self.blocked_packages);
        self.allowed_packages = migrate_rules(&self.whitelisted_packages, &self.allowed_packages);
        self.blacklisted_packages.clear();
        self.whitelisted_packages.clear();
        self.version = CURRENT_SETTINGS_VERSION;
        self
    }

    /// Loads settings from `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| ScanError::settings(path, e))?;
        Self::from_toml(&content).map_err(|e| ScanError::settings(path, e))
    }

    /// Saves the settings to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, self.to_toml(path)?)?;
        Ok(())
    }

    fn to_toml(&self, path: &Path) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ScanError::settings(path, e))
    }

    /// Loads `path`, creating it with defaults when absent.
    ///
    /// Another process may be creating the same file, so a missing, empty or
    /// changing file is retried with back-off. When `retry.max_wait` runs out
    /// the defaults are returned.
    ///
    /// # Arguments
    ///
    /// * `path` - Settings file, usually from [`Settings::path_for_target`]
    /// * `retry` - Back-off and the longest time to wait for another process
    ///
    /// # Errors
    ///
    /// A file that fails to parse twice with the same content is malformed
    /// rather than half-written, and is reported as [`ScanError::Settings`].
    /// So are read and create errors other than a missing or existing file.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use std::path::Path;
    /// use vulngate::{retry::RetryConfig, Settings};
    ///
    /// let path = Settings::path_for_target(Path::new("app/vulngate.deps"));
    /// let settings = Settings::load_or_init(&path, &RetryConfig::default())?;
    /// println!("warn only: {}", settings.warn_only);
    /// # Ok::<(), vulngate::ScanError>(())
    /// ```
    pub fn load_or_init(path: &Path, retry: &RetryConfig) -> Result<Settings> {
        let mut rejected: Option<String> = None;
        let result = retry_with_backoff(retry, || Self::try_load_or_create(path, &mut rejected));

        match result {
            Ok(outcome) => outcome,
            Err(timeout) => {
                warn!(
                    path = %path.display(),
                    attempts = timeout.attempts,
                    error = %timeout.last_error,
                    "Settings initialization timed out, using defaults"
                );
                Ok(Settings::default())
            }
        }
    }

    /// One attempt of [`Settings::load_or_init`].
    ///
    /// `Err` asks for another attempt; `Ok` carries the final result.
    /// `rejected` holds content that already failed to parse once.
    fn try_load_or_create(
        path: &Path,
        rejected: &mut Option<String>,
    ) -> std::result::Result<Result<Settings>, ScanError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return match Self::create_default(path) {
                    Ok(Some(settings)) => Ok(Ok(settings)),
                    Ok(None) => Err(ScanError::settings(path, "being created by another process")),
                    Err(e) => Ok(Err(e)),
                };
            }
            Err(e) => return Ok(Err(ScanError::settings(path, e))),
        };
        if content.trim().is_empty() {
            return Err(ScanError::settings(path, "file is empty"));
        }

        match Self::from_toml(&content) {
            Ok(settings) => Ok(Ok(settings)),
            Err(e) if rejected.as_deref() == Some(content.as_str()) => {
                Ok(Err(ScanError::settings(path, e)))
            }
            Err(e) => {
                *rejected = Some(content);
                Err(ScanError::settings(path, e))
            }
        }
    }

    /// Writes defaults to a new file. `None` if the file already exists.
    fn create_default(path: &Path) -> Result<Option<Settings>> {
        let settings = Settings::default();
        let content = settings.to_toml(path)?;

        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(None),
            Err(e) => return Err(ScanError::settings(path, e)),
        };
        file.write_all(content.as_bytes())?;
        debug!(path = %path.display(), "Created default settings");
        Ok(Some(settings))
    }

    /// Path of the settings file used for a scan target.
    pub fn path_for_target(target: &Path) -> PathBuf {
        let dir = if target.is_dir() {
            target
        } else {
            target.parent().unwrap_or_else(|| Path::new(""))
        };
        dir.join(SETTINGS_FILE_NAME)
    }

    pub fn generate_default_config() -> String {
        toml::to_string_pretty(&Settings::default()).unwrap_or_default()
    }

    pub fn policy(&self) -> Policy {
        Policy::new(self.blocked_packages.clone(), self.allowed_packages.clone())
    }

    pub fn report_options(&self) -> ReportOptions {
        ReportOptions {
            warn_only: self.warn_only,
            severity_threshold: self.severity_threshold,
        }
    }

    pub fn is_required(&self, source: SourceKind) -> bool {
        self.required_sources.contains(&source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VersionRule;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_settings_default() {
        let settings = Settings::default();

        assert_eq!(settings.version, CURRENT_SETTINGS_VERSION);
        assert!(!settings.warn_only);
        assert_eq!(settings.severity_threshold, None);
        assert_eq!(settings.sources, vec![SourceKind::Osv]);
        assert_eq!(settings.cache_ttl_hours, 24);
        assert!(settings.blocked_packages.is_empty());
    }

    #[test]
    fn test_parse_full_settings() {
        let content = r#"
            warn_only = true
            severity_threshold = 7.0
            sensitive_packages = ["Contoso.*"]
            sources = ["offline", "osv"]
            required_sources = ["offline"]

            [[blocked_packages]]
            id = "Foo"
            version = "[1.0,1.1)"
            message = "banned"

            [[allowed_packages]]
            id = "Bar"

            [ignore]
            vulnerabilities = ["CVE-1"]

            [reports]
            json = "out/{project}.json"
        "#;

        let settings = Settings::from_toml(content).unwrap();
        assert!(settings.warn_only);
        assert_eq!(settings.severity_threshold, Some(7.0));
        assert_eq!(settings.sources, vec![SourceKind::Offline, SourceKind::Osv]);
        assert!(settings.is_required(SourceKind::Offline));
        assert_eq!(
            settings.blocked_packages,
            vec![BlockRule::new("Foo", "[1.0,1.1)").with_message("banned")]
        );
        assert_eq!(settings.allowed_packages, vec![AllowRule::new("Bar", "")]);
        assert_eq!(settings.ignore.vulnerabilities, vec!["CVE-1".to_string()]);
        assert_eq!(settings.reports.json.as_deref(), Some("out/{project}.json"));
    }

    #[test]
    fn test_migrate_rules_keeps_current_first() {
        let legacy = vec![AllowRule::new("Old", ""), AllowRule::new("shared", "1.0")];
        let current = vec![AllowRule::new("Shared", "1.0"), AllowRule::new("New", "")];

        let merged = migrate_rules(&legacy, &current);
        let ids: Vec<&VersionRule> = merged.iter().map(|r| &r.rule).collect();
        assert_eq!(
            ids,
            vec![
                &VersionRule::new("Shared", "1.0"),
                &VersionRule::new("New", ""),
                &VersionRule::any_version("Old"),
            ]
        );
    }

    #[test]
    fn test_legacy_fields_are_migrated_on_load() {
        let content = r#"
            version = 0

            [[blacklisted_packages]]
            id = "Legacy"

            [[blocked_packages]]
            id = "Current"

            [[whitelisted_packages]]
            id = "Allowed"
        "#;

        let settings = Settings::from_toml(content).unwrap();
        assert_eq!(settings.version, CURRENT_SETTINGS_VERSION);
        assert_eq!(
            settings.blocked_packages,
            vec![BlockRule::new("Current", ""), BlockRule::new("Legacy", "")]
        );
        assert_eq!(settings.allowed_packages, vec![AllowRule::new("Allowed", "")]);
        assert!(settings.blacklisted_packages.is_empty());

        let saved = toml::to_string_pretty(&settings).unwrap();
        assert!(!saved.contains("blacklisted"));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILE_NAME);

        let mut settings = Settings::default();
        settings.severity_threshold = Some(5.5);
        settings.blocked_packages = vec![BlockRule::new("Foo", "").with_message("no")];
        settings.reports.xml = Some("{project}.xml".to_string());
        settings.save(&path).unwrap();

        assert_eq!(Settings::load(&path).unwrap(), settings);
    }

    #[test]
    fn test_load_or_init_creates_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);

        let settings = Settings::load_or_init(&path, &RetryConfig::default()).unwrap();
        assert_eq!(settings, Settings::default());
        assert!(path.exists());

        let mut changed = settings.clone();
        changed.warn_only = true;
        changed.save(&path).unwrap();
        assert!(Settings::load_or_init(&path, &RetryConfig::default()).unwrap().warn_only);
    }

    #[test]
    fn test_load_or_init_rejects_malformed_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        let malformed = "warn_only = [not valid\n[[blocked_packages]]\nid = \"Foo\"\n";
        fs::write(&path, malformed).unwrap();

        let started = std::time::Instant::now();
        let err = Settings::load_or_init(&path, &RetryConfig::default()).unwrap_err();
        assert!(matches!(err, ScanError::Settings { .. }));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(fs::read_to_string(&path).unwrap(), malformed);
    }

    #[test]
    fn test_load_or_init_waits_for_empty_file_then_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        fs::write(&path, "").unwrap();

        let settings =
            Settings::load_or_init(&path, &RetryConfig::with_max_wait(Duration::from_millis(50)))
                .unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_load_or_init_picks_up_file_finished_by_another_process() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        fs::write(&path, "warn_only = tr").unwrap();

        let writer = {
            let path = path.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(10));
                fs::write(&path, "warn_only = true\n").unwrap();
            })
        };
        let retry = RetryConfig {
            initial_delay: Duration::from_millis(200),
            ..RetryConfig::default()
        };
        let settings = Settings::load_or_init(&path, &retry).unwrap();
        writer.join().unwrap();
        assert!(settings.warn_only);
    }

    #[test]
    fn test_path_for_target() {
        assert_eq!(
            Settings::path_for_target(Path::new("app/vulngate.deps")),
            PathBuf::from("app").join(SETTINGS_FILE_NAME)
        );
    }

    #[test]
    fn test_generate_default_config_parses() {
        let content = Settings::generate_default_config();
        assert_eq!(Settings::from_toml(&content).unwrap(), Settings::default());
    }
}
