//! Scan reports and their output formats.
//!
//! [`ReportBuilder`] combines the merged vulnerability map, the package set,
//! and the policy into an immutable [`ScanReport`]. The report can then be
//! rendered as:
//!
//! - build diagnostics ([`ScanReport::diagnostics`])
//! - a plain-text summary ([`text::render_text`])
//! - a JSON tree ([`json::to_json`])
//! - an XML tree ([`xml::to_xml`])
//! - flat rows ([`ScanReport::to_flat`])

pub mod diagnostic;
pub mod json;
mod rows;
pub mod text;
pub mod xml;

pub use diagnostic::{Category, Diagnostic};
pub use rows::{FlatReport, ReportRow, RowKind};

use crate::model::{Package, PackageSet, Vulnerability, VulnerabilityMap};
use crate::policy::{Policy, PolicyViolation, ViolationKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings that shape a report.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReportOptions {
    /// Demote every finding to a warning.
    pub warn_only: bool,
    /// Minimum CVSS score (inclusive) for a vulnerability to be reported.
    pub severity_threshold: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMeta {
    pub tool_version: String,
    pub scan_time: DateTime<Utc>,
    pub warn_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity_threshold: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageReport {
    pub package: Package,
    #[serde(default)]
    pub vulnerabilities: Vec<Vulnerability>,
    #[serde(default)]
    pub violations: Vec<PolicyViolation>,
}

impl PackageReport {
    pub fn is_clean(&self) -> bool {
        self.vulnerabilities.is_empty() && self.violations.is_empty()
    }

    pub fn finding_count(&self) -> usize {
        self.vulnerabilities.len() + self.violations.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectReport {
    pub project: PathBuf,
    pub packages: Vec<PackageReport>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub projects: usize,
    pub packages: usize,
    pub vulnerable_packages: usize,
    pub vulnerabilities: usize,
    pub violations: usize,
    pub errors: usize,
    pub warnings: usize,
}

impl Totals {
    fn compute(projects: &[ProjectReport], warn_only: bool) -> Self {
        let mut totals = Totals {
            projects: projects.len(),
            ..Totals::default()
        };

        for package in projects.iter().flat_map(|p| &p.packages) {
            totals.packages += 1;
            if !package.vulnerabilities.is_empty() {
                totals.vulnerable_packages += 1;
            }
            totals.vulnerabilities += package.vulnerabilities.len();
            totals.violations += package.violations.len();
        }

        let findings = totals.vulnerabilities + totals.violations;
        if warn_only {
            totals.warnings = findings;
        } else {
            totals.errors = findings;
        }
        totals
    }
}

/// The result of one scan. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    #[serde(flatten)]
    pub meta: ReportMeta,
    pub projects: Vec<ProjectReport>,
    pub totals: Totals,
}

impl ScanReport {
    pub fn new(meta: ReportMeta, projects: Vec<ProjectReport>) -> Self {
        let totals = Totals::compute(&projects, meta.warn_only);
        Self {
            meta,
            projects,
            totals,
        }
    }

    /// Number of error-category findings; this decides the exit status.
    pub fn error_count(&self) -> usize {
        self.totals.errors
    }

    pub fn category(&self) -> Category {
        if self.meta.warn_only {
            Category::Warning
        } else {
            Category::Error
        }
    }

    /// One diagnostic per reported vulnerability and per policy violation,
    /// in project and package order.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        let category = self.category();
        let mut out = Vec::new();

        for project in &self.projects {
            for entry in &project.packages {
                for violation in &entry.violations {
                    out.push(Diagnostic::at_package(
                        &project.project,
                        &entry.package,
                        category,
                        violation_code(violation.kind),
                        violation_message(&entry.package, violation),
                    ));
                }
                for vuln in &entry.vulnerabilities {
                    out.push(Diagnostic::at_package(
                        &project.project,
                        &entry.package,
                        category,
                        diagnostic::CODE_VULNERABILITY,
                        vulnerability_message(&entry.package, vuln),
                    ));
                }
            }
        }

        out
    }

    /// Substitutes `{project}` in a configured report path with the file
    /// stem of the first scanned project.
    pub fn resolve_output_path(&self, template: &str) -> PathBuf {
        let name = self
            .projects
            .first()
            .map(|p| project_name(&p.project))
            .unwrap_or_default();
        PathBuf::from(template.replace("{project}", &name))
    }
}

/// File name of a project without extension, or its directory name for
/// manifests named `vulngate.deps`.
pub fn project_name(project: &Path) -> String {
    let is_manifest = project
        .file_name()
        .map(|n| n == crate::loader::MANIFEST_FILE_NAME)
        .unwrap_or(false);

    let named = if is_manifest {
        project.parent().and_then(|p| p.file_name())
    } else {
        project.file_stem()
    };

    named
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string())
}

fn violation_code(kind: ViolationKind) -> &'static str {
    match kind {
        ViolationKind::Blocked => diagnostic::CODE_BLOCKED,
        ViolationKind::NotAllowed => diagnostic::CODE_NOT_ALLOWED,
    }
}

pub fn violation_message(package: &Package, violation: &PolicyViolation) -> String {
    if let Some(message) = violation.message.as_deref().filter(|m| !m.trim().is_empty()) {
        return message.to_string();
    }
    match violation.kind {
        ViolationKind::Blocked => format!("{} is blocked by policy", package),
        ViolationKind::NotAllowed => format!("{} is not on the allowed package list", package),
    }
}

pub fn vulnerability_message(package: &Package, vuln: &Vulnerability) -> String {
    let mut message = format!(
        "{} has vulnerability {} (CVSS {:.1}): {}",
        package, vuln.id, vuln.cvss_score, vuln.description
    );
    if let Some(url) = &vuln.reference_url {
        message.push_str(&format!(" See {}", url));
    }
    message
}

/// Builds [`ScanReport`]s.
#[derive(Debug, Clone, Default)]
pub struct ReportBuilder {
    options: ReportOptions,
}

impl ReportBuilder {
    pub fn new(options: ReportOptions) -> Self {
        Self { options }
    }

    pub fn build(
        &self,
        vulnerabilities: &VulnerabilityMap,
        packages: &PackageSet,
        policy: &Policy,
    ) -> ScanReport {
        let projects = packages
            .projects()
            .map(|project| ProjectReport {
                project: project.project.clone(),
                packages: project
                    .packages
                    .iter()
                    .map(|package| PackageReport {
                        package: package.clone(),
                        vulnerabilities: self.applicable(vulnerabilities, package),
                        violations: policy.evaluate(package),
                    })
                    .collect(),
            })
            .collect();

        ScanReport::new(
            ReportMeta {
                tool_version: env!("CARGO_PKG_VERSION").to_string(),
                scan_time: Utc::now(),
                warn_only: self.options.warn_only,
                severity_threshold: self.options.severity_threshold,
            },
            projects,
        )
    }

    fn applicable(&self, map: &VulnerabilityMap, package: &Package) -> Vec<Vulnerability> {
        let Some(vulns) = map.get(&package.lookup_id()) else {
            return Vec::new();
        };

        vulns
            .values()
            .filter(|v| match self.options.severity_threshold {
                Some(threshold) => v.cvss_score >= threshold,
                None => true,
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{insert_vulnerability, BlockRule, SourceLocation};

    fn scenario() -> (VulnerabilityMap, PackageSet, Policy) {
        let mut set = PackageSet::new();
        set.insert_project(
            "app/vulngate.deps",
            vec![
                Package::new("Foo", "1.0.0")
                    .with_location(SourceLocation::new("app/vulngate.deps", 1, 1)),
                Package::new("Bar", "2.0.0")
                    .with_location(SourceLocation::new("app/vulngate.deps", 2, 1)),
            ],
        );

        let mut map = VulnerabilityMap::new();
        insert_vulnerability(
            &mut map,
            "Bar",
            Vulnerability::new("CVE-9999", 9.1, "Remote code execution", "osv")
                .with_reference("https://example.com/CVE-9999"),
        );

        let policy = Policy::new(
            vec![BlockRule::new("Foo", "[1.0,1.1)").with_message("banned")],
            vec![],
        );
        (map, set, policy)
    }

    #[test]
    fn test_build_reports_vulnerabilities_and_violations() {
        let (map, set, policy) = scenario();
        let report = ReportBuilder::new(ReportOptions {
            warn_only: false,
            severity_threshold: Some(7.0),
        })
        .build(&map, &set, &policy);

        assert_eq!(report.error_count(), 2);
        assert_eq!(report.totals.vulnerabilities, 1);
        assert_eq!(report.totals.violations, 1);
        assert_eq!(report.totals.vulnerable_packages, 1);

        let lines: Vec<String> = report.diagnostics().iter().map(|d| d.to_string()).collect();
        assert_eq!(
            lines,
            vec![
                "app/vulngate.deps(1,1): error VG0002: banned".to_string(),
                "app/vulngate.deps(2,1): error VG0001: Bar@2.0.0 has vulnerability CVE-9999 \
                 (CVSS 9.1): Remote code execution See https://example.com/CVE-9999"
                    .to_string(),
            ]
        );
    }

    #[test]
    fn test_threshold_excludes_lower_scores() {
        let (map, set, policy) = scenario();
        let report = ReportBuilder::new(ReportOptions {
            warn_only: false,
            severity_threshold: Some(9.5),
        })
        .build(&map, &set, &policy);

        assert_eq!(report.error_count(), 1);
        assert_eq!(report.totals.vulnerabilities, 0);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let (map, set, policy) = scenario();
        let report = ReportBuilder::new(ReportOptions {
            warn_only: false,
            severity_threshold: Some(9.1),
        })
        .build(&map, &set, &policy);

        assert_eq!(report.totals.vulnerabilities, 1);
    }

    #[test]
    fn test_warn_only_demotes_findings() {
        let (map, set, policy) = scenario();
        let report = ReportBuilder::new(ReportOptions {
            warn_only: true,
            severity_threshold: None,
        })
        .build(&map, &set, &policy);

        assert_eq!(report.error_count(), 0);
        assert_eq!(report.totals.warnings, 2);
        assert!(report
            .diagnostics()
            .iter()
            .all(|d| d.category == Category::Warning));
    }

    #[test]
    fn test_clean_packages_stay_listed() {
        let (_, set, _) = scenario();
        let mut map = VulnerabilityMap::new();
        map.insert("bar".to_string(), Default::default());

        let report = ReportBuilder::default().build(&map, &set, &Policy::default());
        assert_eq!(report.projects[0].packages.len(), 2);
        assert!(report.projects[0].packages.iter().all(|p| p.is_clean()));
        assert!(report.diagnostics().is_empty());
    }

    #[test]
    fn test_default_violation_messages() {
        let package = Package::new("Foo", "1.0.0");
        let blocked = PolicyViolation {
            kind: ViolationKind::Blocked,
            message: None,
        };
        let not_allowed = PolicyViolation {
            kind: ViolationKind::NotAllowed,
            message: None,
        };
        assert_eq!(violation_message(&package, &blocked), "Foo@1.0.0 is blocked by policy");
        assert_eq!(
            violation_message(&package, &not_allowed),
            "Foo@1.0.0 is not on the allowed package list"
        );
    }

    #[test]
    fn test_resolve_output_path() {
        let (map, set, policy) = scenario();
        let report = ReportBuilder::default().build(&map, &set, &policy);

        assert_eq!(
            report.resolve_output_path("reports/{project}.json"),
            PathBuf::from("reports/app.json")
        );
        assert_eq!(project_name(Path::new("src/Api.csproj")), "Api");
    }
}
