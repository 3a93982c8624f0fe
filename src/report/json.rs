use super::ScanReport;
use anyhow::Result;

pub fn to_json(report: &ScanReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

pub fn from_json(content: &str) -> Result<ScanReport> {
    Ok(serde_json::from_str(content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{insert_vulnerability, Package, PackageSet, SourceLocation, Vulnerability, VulnerabilityMap};
    use crate::policy::Policy;
    use crate::model::BlockRule;
    use crate::report::{ReportBuilder, ReportOptions};

    #[test]
    fn test_json_round_trip_keeps_every_field() {
        let mut set = PackageSet::new();
        set.insert_project(
            "app/vulngate.deps",
            vec![
                Package::new("Foo", "1.0.0")
                    .with_location(SourceLocation::new("app/vulngate.deps", 3, 2)),
                Package::new("Clean", "1.0.0"),
            ],
        );
        let mut map = VulnerabilityMap::new();
        let mut vuln = Vulnerability::new("GHSA-1234", 6.5, "Denial of service", "offline")
            .with_reference("https://example.com/GHSA-1234");
        vuln.cwe = Some("CWE-400".to_string());
        vuln.fixed_version = Some("1.0.1".to_string());
        insert_vulnerability(&mut map, "foo", vuln);
        let policy = Policy::new(vec![BlockRule::new("Foo", "").with_message("no")], vec![]);

        let report = ReportBuilder::new(ReportOptions {
            warn_only: true,
            severity_threshold: Some(5.0),
        })
        .build(&map, &set, &policy);

        let json = to_json(&report).unwrap();
        assert!(json.contains("\"cwe\": \"CWE-400\""));
        assert_eq!(from_json(&json).unwrap(), report);
    }
}
