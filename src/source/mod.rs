//! Vulnerability sources.
//!
//! Each source answers for a list of packages with a [`VulnerabilityMap`].
//! Sources are queried concurrently and merged in priority order by the
//! orchestrator; a source never sees another source's results.
//!
//! | Source | Kind | Remote |
//! |--------|------|--------|
//! | [`OsvSource`] | `osv` | yes |
//! | [`OfflineSource`] | `offline` | no |

mod cvss;
mod offline;
mod osv;

pub use cvss::cvss_base_score;
pub use offline::{OfflineEntry, OfflineSource};
pub use osv::OsvSource;

use crate::cache::Cache;
use crate::config::{Settings, SourceKind};
use crate::error::{Result, ScanError};
use crate::model::{Package, VulnerabilityMap};
use async_trait::async_trait;

#[async_trait]
pub trait VulnerabilitySource: Send + Sync {
    /// Human-readable name, recorded on every vulnerability this source reports.
    fn name(&self) -> &'static str;

    /// Remote sources never receive sensitive packages.
    fn is_remote(&self) -> bool;

    /// Looks up vulnerabilities for `packages`.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::SourceUnavailable`] if the source cannot answer.
    async fn check(&self, packages: &[Package]) -> Result<VulnerabilityMap>;
}

/// A source together with its configured identity.
pub struct ConfiguredSource {
    pub kind: SourceKind,
    pub required: bool,
    pub source: Box<dyn VulnerabilitySource>,
}

/// Builds the sources listed in `settings.sources`, in priority order.
///
/// Duplicate entries are skipped.
///
/// # Arguments
///
/// * `settings` - Source list, required sources, ecosystem and cache TTL
/// * `use_cache` - Give the OSV source a response cache
///
/// # Errors
///
/// Returns [`ScanError::SourceUnavailable`] when `offline` is listed but
/// `offline_database` is not set.
///
/// # Example
///
/// ```
/// use vulngate::{source::configured_sources, Settings, SourceKind};
///
/// let settings = Settings::default();
/// let sources = configured_sources(&settings, false).unwrap();
/// assert_eq!(sources.len(), 1);
/// assert_eq!(sources[0].kind, SourceKind::Osv);
/// ```
pub fn configured_sources(settings: &Settings, use_cache: bool) -> Result<Vec<ConfiguredSource>> {
    let mut sources: Vec<ConfiguredSource> = Vec::new();

    for &kind in &settings.sources {
        if sources.iter().any(|s| s.kind == kind) {
            continue;
        }
        let source: Box<dyn VulnerabilitySource> = match kind {
            SourceKind::Osv => {
                let cache = use_cache.then(|| Cache::new(settings.cache_ttl_hours));
                Box::new(OsvSource::new(&settings.osv_ecosystem, cache))
            }
            SourceKind::Offline => {
                let path = settings.offline_database.clone().ok_or_else(|| {
                    ScanError::source_unavailable(
                        "offline",
                        "`offline_database` is not set in settings",
                    )
                })?;
                Box::new(OfflineSource::new(path))
            }
        };
        sources.push(ConfiguredSource {
            kind,
            required: settings.is_required(kind),
            source,
        });
    }

    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_sources_follow_priority_order() {
        let settings = Settings {
            sources: vec![SourceKind::Offline, SourceKind::Osv, SourceKind::Offline],
            required_sources: vec![SourceKind::Osv],
            offline_database: Some("db.json".into()),
            ..Settings::default()
        };

        let sources = configured_sources(&settings, false).unwrap();
        let kinds: Vec<_> = sources.iter().map(|s| (s.kind, s.required)).collect();
        assert_eq!(
            kinds,
            vec![(SourceKind::Offline, false), (SourceKind::Osv, true)]
        );
        assert!(!sources[0].source.is_remote());
        assert!(sources[1].source.is_remote());
    }

    #[test]
    fn test_offline_source_requires_database_path() {
        let settings = Settings {
            sources: vec![SourceKind::Offline],
            ..Settings::default()
        };
        assert!(configured_sources(&settings, false).is_err());
    }
}
