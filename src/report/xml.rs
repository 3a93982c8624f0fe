//! XML report output format.
//!
//! Mirrors the JSON tree: `<scan>` holds `<project>` elements, each holding
//! `<package>` elements with their `<vulnerability>` and `<violation>`
//! children.

use super::ScanReport;

pub fn to_xml(report: &ScanReport) -> String {
    let meta = &report.meta;
    let mut xml = String::new();

    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str(&format!(
        "<scan toolVersion=\"{}\" scanTime=\"{}\" warnOnly=\"{}\"{}>\n",
        xml_escape(&meta.tool_version),
        meta.scan_time.to_rfc3339(),
        meta.warn_only,
        meta.severity_threshold
            .map(|t| format!(" severityThreshold=\"{}\"", t))
            .unwrap_or_default()
    ));

    for project in &report.projects {
        xml.push_str(&format!(
            "  <project path=\"{}\">\n",
            xml_escape(&project.project.display().to_string())
        ));

        for entry in &project.packages {
            let package = &entry.package;
            let location = package
                .location
                .as_ref()
                .map(|l| {
                    format!(
                        " file=\"{}\" line=\"{}\" column=\"{}\"",
                        xml_escape(&l.file.display().to_string()),
                        l.line,
                        l.column
                    )
                })
                .unwrap_or_default();
            let open = format!(
                "    <package id=\"{}\" version=\"{}\"{}",
                xml_escape(&package.id),
                xml_escape(&package.version),
                location
            );

            if entry.is_clean() {
                xml.push_str(&open);
                xml.push_str(" />\n");
                continue;
            }
            xml.push_str(&open);
            xml.push_str(">\n");

            for violation in &entry.violations {
                match &violation.message {
                    Some(message) => xml.push_str(&format!(
                        "      <violation kind=\"{}\">{}</violation>\n",
                        violation.kind.as_str(),
                        xml_escape(message)
                    )),
                    None => xml.push_str(&format!(
                        "      <violation kind=\"{}\" />\n",
                        violation.kind.as_str()
                    )),
                }
            }

            for vuln in &entry.vulnerabilities {
                xml.push_str(&format!(
                    "      <vulnerability id=\"{}\" cvssScore=\"{}\" source=\"{}\">\n",
                    xml_escape(&vuln.id),
                    vuln.cvss_score,
                    xml_escape(&vuln.source)
                ));
                xml.push_str(&format!(
                    "        <description>{}</description>\n",
                    xml_escape(&vuln.description)
                ));
                if let Some(url) = &vuln.reference_url {
                    xml.push_str(&format!("        <reference>{}</reference>\n", xml_escape(url)));
                }
                if let Some(cwe) = &vuln.cwe {
                    xml.push_str(&format!("        <cwe>{}</cwe>\n", xml_escape(cwe)));
                }
                if let Some(fixed) = &vuln.fixed_version {
                    xml.push_str(&format!(
                        "        <fixedVersion>{}</fixedVersion>\n",
                        xml_escape(fixed)
                    ));
                }
                xml.push_str("      </vulnerability>\n");
            }

            xml.push_str("    </package>\n");
        }

        xml.push_str("  </project>\n");
    }

    let totals = &report.totals;
    xml.push_str(&format!(
        "  <totals projects=\"{}\" packages=\"{}\" vulnerablePackages=\"{}\" vulnerabilities=\"{}\" violations=\"{}\" errors=\"{}\" warnings=\"{}\" />\n",
        totals.projects,
        totals.packages,
        totals.vulnerable_packages,
        totals.vulnerabilities,
        totals.violations,
        totals.errors,
        totals.warnings
    ));
    xml.push_str("</scan>\n");

    xml
}

/// Escapes markup characters and replaces characters XML 1.0 cannot
/// carry, even as references, with U+FFFD.
fn xml_escape(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            '\t' | '\n' | '\r' => escaped.push(c),
            c if is_xml_char(c) => escaped.push(c),
            _ => escaped.push(char::REPLACEMENT_CHARACTER),
        }
    }
    escaped
}

fn is_xml_char(c: char) -> bool {
    matches!(c, '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..='\u{10FFFF}')
}
