use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Where a package reference appears in its manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: PathBuf,
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    pub fn new(file: impl Into<PathBuf>, line: u32, column: u32) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub id: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
}

impl Package {
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
            location: None,
        }
    }

    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    /// Identity used for deduplication: ids compare case-insensitively.
    pub fn key(&self) -> (String, String) {
        (self.lookup_id(), self.version.clone())
    }

    /// The id under which this package is stored in a [`VulnerabilityMap`](super::VulnerabilityMap).
    pub fn lookup_id(&self) -> String {
        fold_id(&self.id)
    }

    /// Compares ids under the same folding as [`Package::lookup_id`].
    pub fn same_id(&self, other: &str) -> bool {
        self.lookup_id() == fold_id(other)
    }
}

/// Case folding applied to package ids wherever they are compared or keyed.
pub fn fold_id(id: &str) -> String {
    id.to_lowercase()
}

impl std::fmt::Display for Package {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.id, self.version)
    }
}

/// The packages of one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectPackages {
    pub project: PathBuf,
    pub packages: Vec<Package>,
}

/// Packages grouped per project.
///
/// Projects keep the order they were inserted in, and each project path
/// appears at most once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageSet {
    projects: Vec<ProjectPackages>,
}

impl PackageSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a project, replacing the packages of an existing entry with the same path.
    pub fn insert_project(&mut self, project: impl Into<PathBuf>, packages: Vec<Package>) {
        let project = project.into();
        match self.projects.iter_mut().find(|p| p.project == project) {
            Some(existing) => existing.packages = packages,
            None => self.projects.push(ProjectPackages { project, packages }),
        }
    }

    pub fn projects(&self) -> impl Iterator<Item = &ProjectPackages> {
        self.projects.iter()
    }

    pub fn get(&self, project: &Path) -> Option<&[Package]> {
        self.projects
            .iter()
            .find(|p| p.project == project)
            .map(|p| p.packages.as_slice())
    }

    pub fn contains_project(&self, project: &Path) -> bool {
        self.projects.iter().any(|p| p.project == project)
    }

    pub fn project_count(&self) -> usize {
        self.projects.len()
    }

    pub fn package_count(&self) -> usize {
        self.projects.iter().map(|p| p.packages.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.package_count() == 0
    }

    /// Every distinct package across all projects, first occurrence first.
    ///
    /// This is the list handed to vulnerability sources.
    pub fn unique_packages(&self) -> Vec<Package> {
        let mut seen = HashSet::new();
        self.projects
            .iter()
            .flat_map(|p| p.packages.iter())
            .filter(|pkg| seen.insert(pkg.key()))
            .cloned()
            .collect()
    }

    /// Builds a new set keeping only the packages accepted by `keep`.
    ///
    /// Projects are retained even when all their packages are dropped.
    pub fn retain_packages(&self, mut keep: impl FnMut(&Package) -> bool) -> PackageSet {
        PackageSet {
            projects: self
                .projects
                .iter()
                .map(|p| ProjectPackages {
                    project: p.project.clone(),
                    packages: p.packages.iter().filter(|pkg| keep(pkg)).cloned().collect(),
                })
                .collect(),
        }
    }
}
