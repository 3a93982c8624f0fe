use crate::model::Package;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

pub const CODE_VULNERABILITY: &str = "VG0001";
pub const CODE_BLOCKED: &str = "VG0002";
pub const CODE_NOT_ALLOWED: &str = "VG0003";
pub const CODE_FATAL: &str = "VG9999";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Error,
    Warning,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Error => "error",
            Category::Warning => "warning",
        }
    }
}

/// One build diagnostic line.
///
/// Renders as `file(line,col): category CODE: message`, the format build
/// hosts parse into clickable errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub file: PathBuf,
    pub line: u32,
    pub column: u32,
    pub category: Category,
    pub code: String,
    pub message: String,
}

impl Diagnostic {
    /// Points at the package's manifest entry, or at the start of the
    /// project file when the location is unknown.
    pub fn at_package(
        project: &Path,
        package: &Package,
        category: Category,
        code: &str,
        message: String,
    ) -> Self {
        let (file, line, column) = match &package.location {
            Some(loc) => (loc.file.clone(), loc.line.max(1), loc.column.max(1)),
            None => (project.to_path_buf(), 1, 1),
        };
        Self {
            file,
            line,
            column,
            category,
            code: code.to_string(),
            message,
        }
    }

    pub fn fatal(file: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line: 1,
            column: 1,
            category: Category::Error,
            code: CODE_FATAL.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Newlines would split one diagnostic into several build log entries.
        let message = self.message.replace(['\r', '\n'], " ");
        write!(
            f,
            "{}({},{}): {} {}: {}",
            self.file.display(),
            self.line,
            self.column,
            self.category.as_str(),
            self.code,
            message
        )
    }
}
