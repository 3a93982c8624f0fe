use super::cvss::cvss_base_score;
use super::VulnerabilitySource;
use crate::cache::Cache;
use crate::error::{Result, ScanError};
use crate::model::{insert_vulnerability, Package, Vulnerability, VulnerabilityMap};
use async_trait::async_trait;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tracing::debug;

/// Maximum number of packages to query in a single batch request.
const BATCH_SIZE: usize = 100;

const DEFAULT_BASE_URL: &str = "https://api.osv.dev/v1";
const SOURCE_NAME: &str = "OSV.dev";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Queries the OSV.dev database.
///
/// A batch query finds the vulnerability ids affecting each package; the
/// full records are then fetched once per id. Both steps are cached.
pub struct OsvSource {
    client: reqwest::Client,
    base_url: String,
    ecosystem: String,
    cache: Option<Cache>,
}

impl OsvSource {
    pub fn new(ecosystem: &str, cache: Option<Cache>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("vulngate/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            ecosystem: ecosystem.to_string(),
            cache,
        }
    }

    /// Points the source at a different OSV-compatible API.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// `@` never appears in a package id, so id and version stay apart.
    fn ids_cache_key(&self, package: &Package) -> String {
        format!(
            "osv/{}/{}@{}",
            self.ecosystem.to_lowercase(),
            package.lookup_id(),
            package.version
        )
    }

    fn unavailable(error: impl ToString) -> ScanError {
        ScanError::source_unavailable(SOURCE_NAME, error)
    }

    /// Returns the vulnerability ids affecting each package, in input order.
    async fn batch_query(&self, packages: &[&Package]) -> Result<Vec<Vec<String>>> {
        let queries = packages
            .iter()
            .map(|pkg| OsvBatchQueryItem {
                package: OsvPackage {
                    name: pkg.id.clone(),
                    ecosystem: self.ecosystem.clone(),
                },
                version: pkg.version.clone(),
            })
            .collect();

        let response = self
            .client
            .post(format!("{}/querybatch", self.base_url))
            .json(&OsvBatchQuery { queries })
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(Self::unavailable)?;

        let batch: OsvBatchResponse = response.json().await.map_err(Self::unavailable)?;
        if batch.results.len() != packages.len() {
            return Err(Self::unavailable(format!(
                "expected {} batch results, got {}",
                packages.len(),
                batch.results.len()
            )));
        }

        Ok(batch
            .results
            .into_iter()
            .map(|result| {
                result
                    .vulns
                    .unwrap_or_default()
                    .into_iter()
                    .map(|v| v.id)
                    .collect()
            })
            .collect())
    }

    async fn vulnerability(&self, id: &str) -> Result<Vulnerability> {
        let cache_key = format!("osv/vuln/{}", id);
        if let Some(vuln) = self.cache.as_ref().and_then(|c| c.get(&cache_key)) {
            return Ok(vuln);
        }

        let record: OsvVuln = self
            .client
            .get(format!("{}/vulns/{}", self.base_url, id))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(Self::unavailable)?
            .json()
            .await
            .map_err(Self::unavailable)?;

        let vuln = to_vulnerability(record);
        if let Some(cache) = &self.cache {
            let _ = cache.set(&cache_key, &vuln);
        }
        Ok(vuln)
    }
}

#[derive(Serialize)]
struct OsvPackage {
    name: String,
    ecosystem: String,
}

#[derive(Serialize)]
struct OsvBatchQuery {
    queries: Vec<OsvBatchQueryItem>,
}

#[derive(Serialize)]
struct OsvBatchQueryItem {
    package: OsvPackage,
    version: String,
}

#[derive(Deserialize)]
struct OsvBatchResponse {
    #[serde(default)]
    results: Vec<OsvBatchResult>,
}

#[derive(Deserialize)]
struct OsvBatchResult {
    vulns: Option<Vec<OsvVulnRef>>,
}

#[derive(Deserialize)]
struct OsvVulnRef {
    id: String,
}

#[derive(Deserialize)]
struct OsvVuln {
    id: String,
    summary: Option<String>,
    details: Option<String>,
    severity: Option<Vec<OsvSeverity>>,
    affected: Option<Vec<OsvAffected>>,
    references: Option<Vec<OsvReference>>,
    database_specific: Option<OsvDatabaseSpecific>,
}

#[derive(Deserialize)]
struct OsvSeverity {
    score: Option<String>,
}

#[derive(Deserialize)]
struct OsvAffected {
    ranges: Option<Vec<OsvRange>>,
}

#[derive(Deserialize)]
struct OsvRange {
    events: Option<Vec<OsvEvent>>,
}

#[derive(Deserialize)]
struct OsvEvent {
    fixed: Option<String>,
}

#[derive(Deserialize)]
struct OsvReference {
    #[serde(rename = "type")]
    reference_type: Option<String>,
    url: Option<String>,
}

#[derive(Deserialize)]
struct OsvDatabaseSpecific {
    severity: Option<String>,
    cwe_ids: Option<Vec<String>>,
}

#[async_trait]
impl VulnerabilitySource for OsvSource {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn is_remote(&self) -> bool {
        true
    }

    async fn check(&self, packages: &[Package]) -> Result<VulnerabilityMap> {
        let mut affecting: Vec<(&Package, Vec<String>)> = Vec::with_capacity(packages.len());
        let mut pending: Vec<&Package> = Vec::new();

        for pkg in packages {
            let cached: Option<Vec<String>> =
                self.cache.as_ref().and_then(|c| c.get(&self.ids_cache_key(pkg)));
            match cached {
                Some(ids) => affecting.push((pkg, ids)),
                None => pending.push(pkg),
            }
        }

        debug!(
            total = packages.len(),
            cached = affecting.len(),
            "Querying OSV.dev"
        );

        for chunk in pending.chunks(BATCH_SIZE) {
            let results = self.batch_query(chunk).await?;
            for (pkg, ids) in chunk.iter().zip(results) {
                if let Some(cache) = &self.cache {
                    let _ = cache.set(&self.ids_cache_key(pkg), &ids);
                }
                affecting.push((pkg, ids));
            }
        }

        let unique_ids: BTreeSet<&str> = affecting
            .iter()
            .flat_map(|(_, ids)| ids.iter().map(String::as_str))
            .collect();
        let records = try_join_all(unique_ids.iter().map(|id| self.vulnerability(id))).await?;
        let records: HashMap<&str, Vulnerability> = unique_ids.into_iter().zip(records).collect();

        let mut map = VulnerabilityMap::new();
        for (pkg, ids) in &affecting {
            for id in ids {
                if let Some(vuln) = records.get(id.as_str()) {
                    insert_vulnerability(&mut map, &pkg.id, vuln.clone());
                }
            }
        }
        Ok(map)
    }
}

fn to_vulnerability(vuln: OsvVuln) -> Vulnerability {
    let cvss_score = parse_score(&vuln);
    let fixed_version = extract_fixed_version(&vuln);
    let cwe = vuln
        .database_specific
        .as_ref()
        .and_then(|d| d.cwe_ids.as_ref())
        .and_then(|ids| ids.first().cloned());
    let reference_url = vuln.references.as_ref().and_then(|refs| {
        refs.iter()
            .find(|r| r.reference_type.as_deref() == Some("ADVISORY"))
            .or_else(|| refs.first())
            .and_then(|r| r.url.clone())
    });
    let description = vuln
        .summary
        .or(vuln.details)
        .unwrap_or_else(|| "No description available".to_string());

    let mut result = Vulnerability::new(vuln.id, cvss_score, description, SOURCE_NAME);
    result.reference_url = reference_url;
    result.cwe = cwe;
    result.fixed_version = fixed_version;
    result
}

/// Highest score among the record's severities.
///
/// Numeric scores and CVSS v3 vectors are understood. Records without either
/// fall back to the database's qualitative rating, then to 0.0.
fn parse_score(vuln: &OsvVuln) -> f32 {
    let scored = vuln
        .severity
        .iter()
        .flatten()
        .filter_map(|s| s.score.as_deref())
        .filter_map(|score| score.trim().parse::<f32>().ok().or_else(|| cvss_base_score(score)))
        .fold(None, |max: Option<f32>, s| Some(max.map_or(s, |m| m.max(s))));
    if let Some(score) = scored {
        return score;
    }

    match vuln
        .database_specific
        .as_ref()
        .and_then(|d| d.severity.as_deref())
        .map(str::to_ascii_uppercase)
        .as_deref()
    {
        Some("CRITICAL") => 9.0,
        Some("HIGH") => 7.0,
        Some("MODERATE") | Some("MEDIUM") => 4.0,
        Some("LOW") => 0.1,
        _ => 0.0,
    }
}

fn extract_fixed_version(vuln: &OsvVuln) -> Option<String> {
    vuln.affected.as_ref()?.iter().find_map(|affected| {
        affected.ranges.as_ref()?.iter().find_map(|range| {
            range
                .events
                .as_ref()?
                .iter()
                .find_map(|event| event.fixed.clone())
        })
    })
}
