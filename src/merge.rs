//! Combining vulnerability maps from several sources.
//!
//! Merging is first-source-wins: when two maps report the same
//! vulnerability id for the same package, the record already present is
//! kept. Callers merge in the fixed source priority order so the outcome
//! does not depend on which query finished first.

use crate::model::VulnerabilityMap;
use std::collections::HashSet;

/// Adds every entry of `incoming` that `existing` does not already hold.
pub fn merge(existing: Option<VulnerabilityMap>, incoming: VulnerabilityMap) -> VulnerabilityMap {
    let Some(mut merged) = existing else {
        return incoming;
    };

    for (package_id, vulns) in incoming {
        let entry = merged.entry(package_id).or_default();
        for (vuln_id, vuln) in vulns {
            entry.entry(vuln_id).or_insert(vuln);
        }
    }

    merged
}

/// Folds `maps`, given in priority order, into one map.
///
/// For a (package, vulnerability id) pair reported by several sources, the
/// earliest map's record is kept.
///
/// # Arguments
///
/// * `maps` - One map per source, highest priority first
pub fn merge_all(maps: impl IntoIterator<Item = VulnerabilityMap>) -> VulnerabilityMap {
    maps.into_iter()
        .fold(None, |acc, map| Some(merge(acc, map)))
        .unwrap_or_default()
}

/// Drops findings whose vulnerability id is listed in `ignored_ids`.
///
/// Ids compare case-sensitively. Packages left without findings keep an
/// empty entry.
pub fn ignore_by_vulnerability_id<S: AsRef<str>>(
    map: VulnerabilityMap,
    ignored_ids: &[S],
) -> VulnerabilityMap {
    if ignored_ids.is_empty() {
        return map;
    }
    let ignored: HashSet<&str> = ignored_ids.iter().map(|id| id.as_ref()).collect();

    map.into_iter()
        .map(|(package_id, vulns)| {
            let kept = vulns
                .into_iter()
                .filter(|(vuln_id, _)| !ignored.contains(vuln_id.as_str()))
                .collect();
            (package_id, kept)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{insert_vulnerability, Vulnerability};
    use std::collections::BTreeMap;

    fn map_of(entries: &[(&str, &str, f32, &str)]) -> VulnerabilityMap {
        let mut map = VulnerabilityMap::new();
        for (package, vuln, score, source) in entries {
            insert_vulnerability(
                &mut map,
                package,
                Vulnerability::new(*vuln, *score, format!("{} from {}", vuln, source), *source),
            );
        }
        map
    }

    #[test]
    fn test_merge_without_existing_returns_incoming() {
        let incoming = map_of(&[("foo", "CVE-1", 5.0, "osv")]);
        assert_eq!(merge(None, incoming.clone()), incoming);
    }

    #[test]
    fn test_merge_unions_entries() {
        let a = map_of(&[("foo", "CVE-1", 5.0, "osv")]);
        let b = map_of(&[("foo", "CVE-2", 6.0, "offline"), ("bar", "CVE-3", 7.0, "offline")]);

        let merged = merge(Some(a), b);
        assert_eq!(merged["foo"].len(), 2);
        assert_eq!(merged["bar"].len(), 1);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let a = map_of(&[("foo", "CVE-1", 5.0, "osv")]);
        let b = map_of(&[("foo", "CVE-1", 9.0, "offline"), ("bar", "CVE-3", 7.0, "offline")]);

        let once = merge(Some(a.clone()), b.clone());
        let twice = merge(Some(once.clone()), b);
        assert_eq!(once, twice);
        assert_eq!(twice["foo"].len(), 1);
    }

    #[test]
    fn test_merge_first_source_wins() {
        let a = map_of(&[("foo", "CVE-1", 5.0, "osv")]);
        let b = map_of(&[("foo", "CVE-1", 9.0, "offline")]);

        let ab = merge(Some(a.clone()), b.clone());
        assert_eq!(ab["foo"]["CVE-1"].source, "osv");
        assert_eq!(ab["foo"]["CVE-1"].cvss_score, 5.0);

        let ba = merge(Some(b), a);
        assert_eq!(ba["foo"]["CVE-1"].source, "offline");
        assert_ne!(ab, ba);
    }

    #[test]
    fn test_merge_all_follows_priority_order() {
        let maps = vec![
            map_of(&[("foo", "CVE-1", 5.0, "first")]),
            map_of(&[("foo", "CVE-1", 6.0, "second")]),
            map_of(&[("foo", "CVE-1", 7.0, "third"), ("bar", "CVE-2", 1.0, "third")]),
        ];

        let merged = merge_all(maps);
        assert_eq!(merged["foo"]["CVE-1"].source, "first");
        assert_eq!(merged["bar"]["CVE-2"].source, "third");
        assert!(merge_all(Vec::new()).is_empty());
    }

    #[test]
    fn test_ignore_by_id_keeps_empty_package() {
        let map = map_of(&[("foo", "CVE-1", 5.0, "osv")]);

        let filtered = ignore_by_vulnerability_id(map, &["CVE-1"]);
        let mut expected = VulnerabilityMap::new();
        expected.insert("foo".to_string(), BTreeMap::new());
        assert_eq!(filtered, expected);
    }

    #[test]
    fn test_ignore_by_id_is_case_sensitive() {
        let map = map_of(&[("foo", "CVE-1", 5.0, "osv"), ("bar", "CVE-1", 5.0, "osv")]);

        let filtered = ignore_by_vulnerability_id(map.clone(), &["cve-1"]);
        assert_eq!(filtered, map);

        let filtered = ignore_by_vulnerability_id(map, &["CVE-1"]);
        assert!(filtered["foo"].is_empty());
        assert!(filtered["bar"].is_empty());
    }
}
