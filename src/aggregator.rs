//! Collecting, deduplicating, and scoping packages per project.

use crate::error::ScanError;
use crate::loader::{normalize_path, ProjectLoader};
use crate::model::{Package, PackageSet};
use crate::pattern::PatternSet;
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use tracing::debug;

/// A project the loader could not read.
#[derive(Debug)]
pub struct ProjectFailure {
    pub project: PathBuf,
    pub error: ScanError,
    /// Top-level failures are fatal; referenced projects may be skipped.
    pub top_level: bool,
}

#[derive(Debug, Default)]
pub struct Aggregation {
    pub packages: PackageSet,
    pub failures: Vec<ProjectFailure>,
}

impl Aggregation {
    pub fn top_level_failures(&self) -> impl Iterator<Item = &ProjectFailure> {
        self.failures.iter().filter(|f| f.top_level)
    }
}

/// Loads every project in `project_paths`, following references when
/// `check_referenced` is set.
///
/// A failing project is recorded in [`Aggregation::failures`] and does not
/// stop the remaining projects from loading. Paths are normalized before
/// they are compared, so a project reached through several references is
/// loaded once and reference cycles terminate.
///
/// # Arguments
///
/// * `project_paths` - Top-level projects; a failure here is marked `top_level`
/// * `loader` - Reads one project into packages and references
/// * `check_referenced` - Follow `references` breadth-first
pub fn aggregate(
    project_paths: &[PathBuf],
    loader: &dyn ProjectLoader,
    check_referenced: bool,
) -> Aggregation {
    let mut aggregation = Aggregation::default();
    let mut visited: HashSet<PathBuf> = HashSet::new();
    let mut queue: VecDeque<(PathBuf, bool)> =
        project_paths.iter().map(|p| (p.clone(), true)).collect();

    while let Some((project, top_level)) = queue.pop_front() {
        let project = normalize_path(&project);
        if !visited.insert(project.clone()) {
            continue;
        }

        match loader.load(&project) {
            Ok(loaded) => {
                debug!(
                    project = %project.display(),
                    packages = loaded.packages.len(),
                    references = loaded.references.len(),
                    "Loaded project"
                );
                if check_referenced {
                    queue.extend(loaded.references.into_iter().map(|r| (r, false)));
                }
                aggregation
                    .packages
                    .insert_project(project, dedup_packages(loaded.packages));
            }
            Err(error) => aggregation.failures.push(ProjectFailure {
                project,
                error,
                top_level,
            }),
        }
    }

    aggregation
}

/// Removes repeated (id, version) pairs, keeping the first occurrence.
pub fn dedup_packages(packages: Vec<Package>) -> Vec<Package> {
    let mut seen = HashSet::new();
    packages
        .into_iter()
        .filter(|p| seen.insert(p.key()))
        .collect()
}

/// Splits `set` into (sensitive, non-sensitive) packages.
///
/// Sensitive packages are never sent to remote vulnerability sources.
pub fn partition<S: AsRef<str>>(set: PackageSet, sensitive_patterns: &[S]) -> (PackageSet, PackageSet) {
    let patterns = PatternSet::new(sensitive_patterns);
    if patterns.is_empty() {
        return (PackageSet::new(), set);
    }

    let sensitive = set.retain_packages(|p| patterns.matches(&p.id));
    let non_sensitive = set.retain_packages(|p| !patterns.matches(&p.id));
    (sensitive, non_sensitive)
}

/// Removes packages whose id matches any ignored pattern.
pub fn filter_ignored<S: AsRef<str>>(set: &PackageSet, ignored_patterns: &[S]) -> PackageSet {
    let patterns = PatternSet::new(ignored_patterns);
    if patterns.is_empty() {
        return set.clone();
    }

    let filtered = set.retain_packages(|p| !patterns.matches(&p.id));
    debug!(
        removed = set.package_count() - filtered.package_count(),
        "Filtered ignored packages"
    );
    filtered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::loader::LoadedProject;
    use std::collections::HashMap;
    use std::path::Path;

    struct FakeLoader {
        projects: HashMap<PathBuf, LoadedProject>,
    }

    impl FakeLoader {
        fn new(entries: Vec<(&str, Vec<Package>, Vec<&str>)>) -> Self {
            Self {
                projects: entries
                    .into_iter()
                    .map(|(path, packages, refs)| {
                        (
                            PathBuf::from(path),
                            LoadedProject {
                                packages,
                                references: refs.into_iter().map(PathBuf::from).collect(),
                            },
                        )
                    })
                    .collect(),
            }
        }
    }

    impl ProjectLoader for FakeLoader {
        fn load(&self, project: &Path) -> Result<LoadedProject> {
            self.projects
                .get(project)
                .cloned()
                .ok_or_else(|| ScanError::load(project, "unreadable"))
        }
    }

    fn paths(items: &[&str]) -> Vec<PathBuf> {
        items.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_aggregate_dedups_within_project() {
        let loader = FakeLoader::new(vec![(
            "app",
            vec![
                Package::new("Foo", "1.0.0"),
                Package::new("Bar", "2.0.0"),
                Package::new("foo", "1.0.0"),
                Package::new("Foo", "1.1.0"),
            ],
            vec![],
        )]);

        let result = aggregate(&paths(&["app"]), &loader, false);
        let ids: Vec<_> = result.packages.get(Path::new("app")).unwrap()
            .iter()
            .map(|p| p.to_string())
            .collect();
        assert_eq!(ids, vec!["Foo@1.0.0", "Bar@2.0.0", "Foo@1.1.0"]);
        assert!(result.failures.is_empty());
    }

    #[test]
    fn test_aggregate_follows_references_when_enabled() {
        let loader = FakeLoader::new(vec![
            ("app", vec![Package::new("Foo", "1.0.0")], vec!["lib", "app"]),
            ("lib", vec![Package::new("Bar", "1.0.0")], vec!["app"]),
        ]);

        let result = aggregate(&paths(&["app"]), &loader, true);
        let order: Vec<_> = result.packages.projects().map(|p| p.project.clone()).collect();
        assert_eq!(order, paths(&["app", "lib"]));

        let result = aggregate(&paths(&["app"]), &loader, false);
        assert_eq!(result.packages.project_count(), 1);
    }

    #[test]
    fn test_aggregate_loads_shared_library_once() {
        let loader = FakeLoader::new(vec![
            ("app", vec![Package::new("Foo", "1.0.0")], vec!["app/../lib"]),
            ("tests", vec![Package::new("Bar", "1.0.0")], vec!["tests/../lib", "./lib"]),
            ("lib", vec![Package::new("Baz", "1.0.0")], vec![]),
        ]);

        let result = aggregate(&paths(&["app", "tests"]), &loader, true);
        let order: Vec<_> = result.packages.projects().map(|p| p.project.clone()).collect();
        assert_eq!(order, paths(&["app", "tests", "lib"]));
        assert_eq!(result.packages.package_count(), 3);
        assert!(result.failures.is_empty());
    }

    #[test]
    fn test_aggregate_reference_cycle_terminates() {
        let loader = FakeLoader::new(vec![
            ("app/vulngate.deps", vec![Package::new("Foo", "1.0.0")], vec!["lib/../lib/vulngate.deps"]),
            ("lib/vulngate.deps", vec![Package::new("Bar", "1.0.0")], vec!["lib/../app/vulngate.deps"]),
        ]);

        let result = aggregate(&paths(&["app/vulngate.deps"]), &loader, true);
        assert_eq!(result.packages.project_count(), 2);
        assert!(result.failures.is_empty());
    }

    #[test]
    fn test_aggregate_records_failures_without_aborting() {
        let loader = FakeLoader::new(vec![
            ("app", vec![Package::new("Foo", "1.0.0")], vec!["missing-child"]),
        ]);

        let result = aggregate(&paths(&["broken", "app"]), &loader, true);
        assert_eq!(result.packages.project_count(), 1);
        assert_eq!(result.failures.len(), 2);

        let top: Vec<_> = result.top_level_failures().map(|f| f.project.clone()).collect();
        assert_eq!(top, paths(&["broken"]));
        assert!(!result.failures[1].top_level);
    }

    #[test]
    fn test_partition_without_patterns_is_noop() {
        let mut set = PackageSet::new();
        set.insert_project("app", vec![Package::new("Foo", "1.0.0")]);

        let (sensitive, rest) = partition::<&str>(set.clone(), &[]);
        assert!(sensitive.is_empty());
        assert_eq!(rest, set);
    }

    #[test]
    fn test_partition_by_wildcard() {
        let mut set = PackageSet::new();
        set.insert_project(
            "app",
            vec![
                Package::new("Contoso.Core", "1.0.0"),
                Package::new("Newtonsoft.Json", "13.0.1"),
                Package::new("contoso.data", "2.0.0"),
            ],
        );

        let (sensitive, rest) = partition(set, &["Contoso.*"]);
        let sensitive_ids: Vec<_> = sensitive.unique_packages().into_iter().map(|p| p.id).collect();
        let rest_ids: Vec<_> = rest.unique_packages().into_iter().map(|p| p.id).collect();
        assert_eq!(sensitive_ids, vec!["Contoso.Core", "contoso.data"]);
        assert_eq!(rest_ids, vec!["Newtonsoft.Json"]);
    }

    #[test]
    fn test_filter_ignored() {
        let mut set = PackageSet::new();
        set.insert_project(
            "app",
            vec![Package::new("Foo.Bar", "1.0.0"), Package::new("Baz", "1.0.0")],
        );

        let filtered = filter_ignored(&set, &["foo.*"]);
        assert_eq!(filtered.package_count(), 1);
        assert_eq!(filtered.unique_packages()[0].id, "Baz");

        let everything = filter_ignored(&set, &["*"]);
        assert!(everything.is_empty());
        assert_eq!(everything.project_count(), 1);
    }
}
