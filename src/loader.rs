//! Project manifest loading.
//!
//! The engine only depends on the [`ProjectLoader`] trait. [`ManifestLoader`]
//! reads the line-based `vulngate.deps` format:
//!
//! ```text
//! # comments and blank lines are skipped
//! Newtonsoft.Json==13.0.1
//! Serilog == 2.12.0
//! -r ../Shared/vulngate.deps
//! ```
//!
//! `-r` lines reference another project, resolved relative to the
//! manifest's directory. A directory argument is searched recursively for
//! `vulngate.deps` files.

use crate::error::{Result, ScanError};
use crate::model::{Package, SourceLocation};
use std::fs;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// File name searched for when a directory is scanned.
pub const MANIFEST_FILE_NAME: &str = "vulngate.deps";

/// What a loader returns for one project.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadedProject {
    pub packages: Vec<Package>,
    /// Child projects referenced by this one.
    pub references: Vec<PathBuf>,
}

pub trait ProjectLoader: Send + Sync {
    fn load(&self, project: &Path) -> Result<LoadedProject>;
}

pub struct ManifestLoader;

impl ManifestLoader {
    pub fn parse(project: &Path, content: &str) -> Result<LoadedProject> {
        let base = project.parent().unwrap_or_else(|| Path::new(""));
        let mut loaded = LoadedProject::default();

        for (index, raw) in content.lines().enumerate() {
            let line_number = index as u32 + 1;
            let trimmed = raw.trim();

            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            if let Some(reference) = trimmed.strip_prefix("-r") {
                let reference = reference.trim();
                if reference.is_empty() {
                    return Err(ScanError::load(
                        project,
                        format!("line {}: missing referenced project path", line_number),
                    ));
                }
                loaded.references.push(normalize_path(&base.join(reference)));
                continue;
            }

            let Some((id, version)) = trimmed.split_once("==") else {
                return Err(ScanError::load(
                    project,
                    format!("line {}: expected 'name==version', found '{}'", line_number, trimmed),
                ));
            };
            let (id, version) = (id.trim(), version.trim());
            if id.is_empty() || version.is_empty() {
                return Err(ScanError::load(
                    project,
                    format!("line {}: package name and version are required", line_number),
                ));
            }

            let column = raw.len() - raw.trim_start().len() + 1;
            loaded.packages.push(
                Package::new(id, version)
                    .with_location(SourceLocation::new(project, line_number, column as u32)),
            );
        }

        Ok(loaded)
    }
}

impl ProjectLoader for ManifestLoader {
    fn load(&self, project: &Path) -> Result<LoadedProject> {
        let content = fs::read_to_string(project)
            .map_err(|e| ScanError::load(project, e.to_string()))?;
        Self::parse(project, &content)
    }
}

/// Resolves `.` and `..` components without touching the filesystem.
///
/// Two routes to the same manifest (`app/../lib` and `tests/../lib`) end up
/// as one path. A `..` above the start of a relative path is kept, and one
/// directly under the root is dropped.
///
/// # Example
///
/// ```
/// use std::path::{Path, PathBuf};
/// use vulngate::loader::normalize_path;
///
/// assert_eq!(
///     normalize_path(Path::new("app/./../lib/vulngate.deps")),
///     PathBuf::from("lib/vulngate.deps")
/// );
/// assert_eq!(normalize_path(Path::new("../lib")), PathBuf::from("../lib"));
/// ```
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match normalized.components().next_back() {
                Some(Component::Normal(_)) => {
                    normalized.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => normalized.push(".."),
            },
            other => normalized.push(other.as_os_str()),
        }
    }
    if normalized.as_os_str().is_empty() {
        normalized.push(".");
    }
    normalized
}

/// Expands a scan target into manifest paths.
///
/// Files are returned as-is; directories are walked for [`MANIFEST_FILE_NAME`]
/// in sorted order so discovery is stable.
pub fn discover_projects(target: &Path) -> Result<Vec<PathBuf>> {
    if !target.is_dir() {
        return Ok(vec![target.to_path_buf()]);
    }

    let mut found = Vec::new();
    for entry in WalkDir::new(target).sort_by_file_name() {
        let entry = entry.map_err(|e| ScanError::load(target, e.to_string()))?;
        if entry.file_type().is_file() && entry.file_name() == MANIFEST_FILE_NAME {
            found.push(entry.into_path());
        }
    }

    if found.is_empty() {
        return Err(ScanError::load(
            target,
            format!("no {} found", MANIFEST_FILE_NAME),
        ));
    }
    Ok(found)
}
