//! The scan pipeline.
//!
//! [`ScanOrchestrator::run`] loads projects, queries every configured source
//! concurrently, merges their answers in priority order, builds the report,
//! emits diagnostics through the [`ReportContext`] and writes any
//! configured report files.

use crate::aggregator::{aggregate, filter_ignored, partition, ProjectFailure};
use crate::config::Settings;
use crate::error::{Result, ScanError};
use crate::loader::ProjectLoader;
use crate::merge::{ignore_by_vulnerability_id, merge_all};
use crate::model::{Package, VulnerabilityMap};
use crate::report::{json, text, xml, ReportBuilder, ScanReport};
use crate::sink::ReportContext;
use crate::source::ConfiguredSource;
use futures::future::join_all;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// What a completed scan produced.
#[derive(Debug)]
pub struct ScanOutcome {
    pub report: ScanReport,
    /// Referenced projects that could not be loaded and were skipped.
    pub skipped_projects: Vec<ProjectFailure>,
    /// Optional sources that failed and contributed no results.
    pub failed_sources: Vec<ScanError>,
    /// Report files that could not be written.
    pub write_failures: Vec<ScanError>,
}

impl ScanOutcome {
    pub fn error_count(&self) -> usize {
        self.report.error_count()
    }

    /// Process exit status: 0 without error findings, else their count
    /// clamped by [`exit_status`].
    pub fn exit_code(&self) -> i32 {
        exit_status(self.error_count())
    }
}

/// Largest status a parent process sees unchanged.
#[cfg(unix)]
const MAX_EXIT_STATUS: usize = 255;
#[cfg(not(unix))]
const MAX_EXIT_STATUS: usize = i32::MAX as usize;

/// Maps an error count to an exit status.
///
/// Unix keeps only the low 8 bits of a status, so counts are clamped rather
/// than truncated: 256 findings must not read as success.
///
/// # Example
///
/// ```
/// use vulngate::orchestrator::exit_status;
///
/// assert_eq!(exit_status(0), 0);
/// assert_eq!(exit_status(3), 3);
/// assert_ne!(exit_status(256), 0);
/// ```
pub fn exit_status(error_count: usize) -> i32 {
    // MAX_EXIT_STATUS never exceeds i32::MAX.
    error_count.min(MAX_EXIT_STATUS) as i32
}

pub struct ScanOrchestrator {
    settings: Settings,
    loader: Box<dyn ProjectLoader>,
    sources: Vec<ConfiguredSource>,
    context: ReportContext,
}

impl ScanOrchestrator {
    pub fn new(settings: Settings, loader: impl ProjectLoader + 'static, context: ReportContext) -> Self {
        Self {
            settings,
            loader: Box::new(loader),
            sources: Vec::new(),
            context,
        }
    }

    /// Sets the sources to query, highest priority first.
    pub fn with_sources(mut self, sources: Vec<ConfiguredSource>) -> Self {
        self.sources = sources;
        self
    }

    /// Scans `projects`.
    ///
    /// # Errors
    ///
    /// Fails when a top-level project cannot be loaded or a required source
    /// is unavailable. Everything else degrades and is recorded in the
    /// returned [`ScanOutcome`].
    pub async fn run(&self, projects: &[PathBuf]) -> Result<ScanOutcome> {
        let settings = &self.settings;

        let aggregation = aggregate(
            projects,
            self.loader.as_ref(),
            settings.check_referenced_projects,
        );
        let (fatal, skipped_projects): (Vec<_>, Vec<_>) =
            aggregation.failures.into_iter().partition(|f| f.top_level);
        if let Some(failure) = fatal.into_iter().next() {
            return Err(failure.error);
        }
        for skipped in &skipped_projects {
            warn!(
                project = %skipped.project.display(),
                error = %skipped.error,
                "Skipping referenced project"
            );
        }

        let packages = filter_ignored(&aggregation.packages, &settings.ignore.packages);
        let (sensitive, non_sensitive) = partition(packages.clone(), &settings.sensitive_packages);
        let all_packages = packages.unique_packages();
        let remote_packages = non_sensitive.unique_packages();

        info!(
            projects = packages.project_count(),
            packages = all_packages.len(),
            sensitive = sensitive.package_count(),
            sources = self.sources.len(),
            "Checking packages"
        );

        let (maps, failed_sources) = self.query_sources(&all_packages, &remote_packages).await?;
        let merged = ignore_by_vulnerability_id(merge_all(maps), &settings.ignore.vulnerabilities);

        let report = ReportBuilder::new(settings.report_options()).build(
            &merged,
            &packages,
            &settings.policy(),
        );

        for diagnostic in report.diagnostics() {
            self.context.emit(&diagnostic);
        }
        self.context.emit_summary(&text::render_text(&report));

        let write_failures = self.write_reports(&report);

        info!(
            errors = report.totals.errors,
            warnings = report.totals.warnings,
            vulnerabilities = report.totals.vulnerabilities,
            violations = report.totals.violations,
            "Scan finished"
        );

        Ok(ScanOutcome {
            report,
            skipped_projects,
            failed_sources,
            write_failures,
        })
    }

    /// Runs every source at once and returns their maps in priority order.
    async fn query_sources(
        &self,
        all_packages: &[Package],
        remote_packages: &[Package],
    ) -> Result<(Vec<VulnerabilityMap>, Vec<ScanError>)> {
        let queries = self.sources.iter().map(|configured| {
            let packages = if configured.source.is_remote() {
                remote_packages
            } else {
                all_packages
            };
            debug!(
                source = configured.source.name(),
                packages = packages.len(),
                "Querying source"
            );
            configured.source.check(packages)
        });
        let results = join_all(queries).await;

        let mut maps = Vec::with_capacity(results.len());
        let mut failed = Vec::new();
        for (configured, result) in self.sources.iter().zip(results) {
            match result {
                Ok(map) => {
                    debug!(
                        source = configured.source.name(),
                        vulnerable_packages = map.len(),
                        "Source answered"
                    );
                    maps.push(map);
                }
                Err(e) if configured.required => return Err(e),
                Err(e) => {
                    warn!(
                        source = configured.source.name(),
                        error = %e,
                        "Source unavailable, continuing without it"
                    );
                    failed.push(e);
                }
            }
        }
        Ok((maps, failed))
    }

    fn write_reports(&self, report: &ScanReport) -> Vec<ScanError> {
        let paths = &self.settings.reports;
        let mut failures = Vec::new();

        let outputs: [(&Option<String>, fn(&ScanReport) -> io::Result<String>); 3] = [
            (&paths.text, |r| Ok(text::render_text(r))),
            (&paths.json, |r| json::to_json(r).map_err(|e| io::Error::other(e.to_string()))),
            (&paths.xml, |r| Ok(xml::to_xml(r))),
        ];

        for (template, render) in outputs {
            let Some(template) = template else {
                continue;
            };
            let path = report.resolve_output_path(template);
            let written = render(report).and_then(|content| write_report(&path, &content));
            match written {
                Ok(()) => info!(path = %path.display(), "Wrote report"),
                Err(source) => {
                    error!(path = %path.display(), error = %source, "Failed to write report");
                    failures.push(ScanError::ReportWrite { path, source });
                }
            }
        }

        failures
    }
}

fn write_report(path: &Path, content: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, content)
}
