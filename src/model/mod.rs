//! Core data types for packages, vulnerabilities, and policy rules.
//!
//! - [`Package`] - A resolved dependency with its origin in a manifest
//! - [`PackageSet`] - Packages grouped per project, in discovery order
//! - [`Vulnerability`] - A known vulnerability reported by a source
//! - [`VulnerabilityMap`] - Package id to vulnerability id to record
//! - [`BlockRule`] / [`AllowRule`] - Policy rules matched by id and version range
//!
//! # Example
//!
//! ```
//! use vulngate::{Package, PackageSet};
//!
//! let mut set = PackageSet::new();
//! set.insert_project("app/vulngate.deps", vec![Package::new("Newtonsoft.Json", "12.0.1")]);
//!
//! assert_eq!(set.package_count(), 1);
//! ```

mod package;
mod rule;
mod vulnerability;

pub use package::*;
pub use rule::*;
pub use vulnerability::*;
