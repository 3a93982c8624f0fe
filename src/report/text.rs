use super::{violation_message, ScanReport};
use crate::model::Severity;
use std::fmt::Write;
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
struct FindingRow {
    #[tabled(rename = "Package")]
    package: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Finding")]
    finding: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Details")]
    details: String,
}

/// Renders the plain-text summary report.
pub fn render_text(report: &ScanReport) -> String {
    let mut out = String::new();
    let totals = &report.totals;

    let _ = writeln!(
        out,
        "Scan completed at: {}",
        report.meta.scan_time.format("%Y-%m-%d %H:%M:%S UTC")
    );
    if let Some(threshold) = report.meta.severity_threshold {
        let _ = writeln!(out, "Reporting vulnerabilities with CVSS >= {:.1}", threshold);
    }

    for project in &report.projects {
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", project.project.display());

        let rows: Vec<FindingRow> = project
            .packages
            .iter()
            .flat_map(|entry| {
                let package = &entry.package;
                let violations = entry.violations.iter().map(move |v| FindingRow {
                    package: truncate(&package.id, 40),
                    version: package.version.clone(),
                    finding: v.kind.as_str().to_string(),
                    severity: "policy".to_string(),
                    details: truncate(&violation_message(package, v), 60),
                });
                let vulns = entry.vulnerabilities.iter().map(move |v| FindingRow {
                    package: truncate(&package.id, 40),
                    version: package.version.clone(),
                    finding: v.id.clone(),
                    severity: format_severity(v.severity(), v.cvss_score),
                    details: truncate(&v.description, 60),
                });
                violations.chain(vulns)
            })
            .collect();

        if rows.is_empty() {
            let _ = writeln!(out, "  No findings in {} packages.", project.packages.len());
        } else {
            let table = Table::new(rows).with(Style::rounded()).to_string();
            let _ = writeln!(out, "{}", table);
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Summary:");
    let _ = writeln!(
        out,
        "  Projects: {}, packages: {}",
        totals.projects, totals.packages
    );
    let _ = writeln!(
        out,
        "  Vulnerabilities: {} in {} packages",
        totals.vulnerabilities, totals.vulnerable_packages
    );
    let _ = writeln!(out, "  Policy violations: {}", totals.violations);
    let _ = writeln!(
        out,
        "  Errors: {}, warnings: {}",
        totals.errors, totals.warnings
    );

    out
}

fn format_severity(severity: Severity, score: f32) -> String {
    format!("{} ({:.1})", severity.as_str().to_uppercase(), score)
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{insert_vulnerability, BlockRule, Package, PackageSet, Vulnerability, VulnerabilityMap};
    use crate::policy::Policy;
    use crate::report::{ReportBuilder, ReportOptions};

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a-very-long-package-name", 10), "a-very-...");
    }

    #[test]
    fn test_render_text_lists_findings_and_totals() {
        let mut set = PackageSet::new();
        set.insert_project(
            "app/vulngate.deps",
            vec![Package::new("Foo", "1.0.0"), Package::new("Bar", "2.0.0")],
        );
        set.insert_project("lib/vulngate.deps", vec![Package::new("Baz", "3.0.0")]);
        let mut map = VulnerabilityMap::new();
        insert_vulnerability(&mut map, "Bar", Vulnerability::new("CVE-9999", 9.1, "RCE", "osv"));
        let policy = Policy::new(vec![BlockRule::new("Foo", "").with_message("banned")], vec![]);

        let report = ReportBuilder::new(ReportOptions::default()).build(&map, &set, &policy);
        let text = render_text(&report);

        assert!(text.contains("app/vulngate.deps"));
        assert!(text.contains("CVE-9999"));
        assert!(text.contains("CRITICAL (9.1)"));
        assert!(text.contains("banned"));
        assert!(text.contains("No findings in 1 packages."));
        assert!(text.contains("Errors: 2, warnings: 0"));
    }
}
