pub mod aggregator;
pub mod cache;
pub mod config;
pub mod error;
pub mod loader;
pub mod merge;
pub mod model;
pub mod orchestrator;
pub mod pattern;
pub mod policy;
pub mod report;
pub mod retry;
pub mod sink;
pub mod source;
pub mod version;

pub use cache::Cache;
pub use config::{Settings, SourceKind};
pub use error::ScanError;
pub use loader::{ManifestLoader, ProjectLoader};
pub use model::{Package, PackageSet, Vulnerability, VulnerabilityMap};
pub use orchestrator::{ScanOrchestrator, ScanOutcome};
pub use policy::Policy;
pub use report::{Diagnostic, ScanReport};
pub use source::VulnerabilitySource;
