use super::{PackageReport, ProjectReport, ReportMeta, ScanReport};
use crate::model::{Package, SourceLocation, Vulnerability};
use crate::policy::{PolicyViolation, ViolationKind};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowKind {
    /// A package with no findings.
    Clean,
    /// A project without packages; package fields are empty.
    EmptyProject,
    Vulnerability,
    Violation,
}

/// One row of the tabular report form: a single finding, or a clean package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub project: PathBuf,
    pub package_id: String,
    pub package_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    pub kind: RowKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vulnerability_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cvss_score: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwe: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub violation: Option<ViolationKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub violation_message: Option<String>,
}

impl ReportRow {
    fn base(project: &ProjectReport, package: &Package, kind: RowKind) -> Self {
        let location = package.location.as_ref();
        Self {
            project: project.project.clone(),
            package_id: package.id.clone(),
            package_version: package.version.clone(),
            file: location.map(|l| l.file.clone()),
            line: location.map(|l| l.line),
            column: location.map(|l| l.column),
            kind,
            vulnerability_id: None,
            cvss_score: None,
            description: None,
            reference_url: None,
            source: None,
            cwe: None,
            fixed_version: None,
            violation: None,
            violation_message: None,
        }
    }

    fn package(&self) -> Package {
        let package = Package::new(&self.package_id, &self.package_version);
        match (&self.file, self.line, self.column) {
            (Some(file), Some(line), Some(column)) => {
                package.with_location(SourceLocation::new(file, line, column))
            }
            _ => package,
        }
    }

    fn vulnerability(&self) -> Option<Vulnerability> {
        Some(Vulnerability {
            id: self.vulnerability_id.clone()?,
            cvss_score: self.cvss_score.unwrap_or_default(),
            description: self.description.clone().unwrap_or_default(),
            reference_url: self.reference_url.clone(),
            source: self.source.clone().unwrap_or_default(),
            cwe: self.cwe.clone(),
            fixed_version: self.fixed_version.clone(),
        })
    }

    fn violation(&self) -> Option<PolicyViolation> {
        Some(PolicyViolation {
            kind: self.violation?,
            message: self.violation_message.clone(),
        })
    }
}

/// The tabular report form: report metadata plus flat rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatReport {
    #[serde(flatten)]
    pub meta: ReportMeta,
    pub rows: Vec<ReportRow>,
}

impl ScanReport {
    pub fn to_flat(&self) -> FlatReport {
        let mut rows = Vec::new();

        for project in &self.projects {
            if project.packages.is_empty() {
                rows.push(ReportRow::base(
                    project,
                    &Package::new("", ""),
                    RowKind::EmptyProject,
                ));
            }
            for entry in &project.packages {
                if entry.is_clean() {
                    rows.push(ReportRow::base(project, &entry.package, RowKind::Clean));
                    continue;
                }
                for violation in &entry.violations {
                    let mut row = ReportRow::base(project, &entry.package, RowKind::Violation);
                    row.violation = Some(violation.kind);
                    row.violation_message = violation.message.clone();
                    rows.push(row);
                }
                for vuln in &entry.vulnerabilities {
                    let mut row = ReportRow::base(project, &entry.package, RowKind::Vulnerability);
                    row.vulnerability_id = Some(vuln.id.clone());
                    row.cvss_score = Some(vuln.cvss_score);
                    row.description = Some(vuln.description.clone());
                    row.reference_url = vuln.reference_url.clone();
                    row.source = Some(vuln.source.clone());
                    row.cwe = vuln.cwe.clone();
                    row.fixed_version = vuln.fixed_version.clone();
                    rows.push(row);
                }
            }
        }

        FlatReport {
            meta: self.meta.clone(),
            rows,
        }
    }

    /// Reassembles a report from its tabular form.
    pub fn from_flat(flat: FlatReport) -> ScanReport {
        let mut projects: Vec<ProjectReport> = Vec::new();

        for row in flat.rows {
            let project_index = match projects.iter().position(|p| p.project == row.project) {
                Some(index) => index,
                None => {
                    projects.push(ProjectReport {
                        project: row.project.clone(),
                        packages: Vec::new(),
                    });
                    projects.len() - 1
                }
            };
            if row.kind == RowKind::EmptyProject {
                continue;
            }
            let packages = &mut projects[project_index].packages;

            let package = row.package();
            let package_index = match packages
                .iter()
                .position(|p| p.package.key() == package.key())
            {
                Some(index) => index,
                None => {
                    packages.push(PackageReport {
                        package,
                        vulnerabilities: Vec::new(),
                        violations: Vec::new(),
                    });
                    packages.len() - 1
                }
            };
            let entry = &mut packages[package_index];

            match row.kind {
                RowKind::Clean | RowKind::EmptyProject => {}
                RowKind::Vulnerability => entry.vulnerabilities.extend(row.vulnerability()),
                RowKind::Violation => entry.violations.extend(row.violation()),
            }
        }

        ScanReport::new(flat.meta, projects)
    }
}
