use anyhow::Result;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use vulngate::{
    cache::Cache,
    config::SETTINGS_FILE_NAME,
    loader::{discover_projects, ManifestLoader},
    report::Diagnostic,
    retry::RetryConfig,
    sink::{ConsoleWriter, ReportContext, TracingWriter},
    source::configured_sources,
    ScanOrchestrator, Settings,
};

/// Exit codes for build integration. A failed scan exits with its error count,
/// clamped so a large count never reads as success.
mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const FATAL: i32 = -1;
}

#[derive(Parser)]
#[command(name = "vulngate")]
#[command(
    author,
    version,
    about = "Check resolved packages against vulnerability sources and package policy"
)]
struct Cli {
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a project manifest, or every vulngate.deps under a directory
    Scan {
        path: PathBuf,

        /// Settings file (default: vulngate.toml next to the project)
        #[arg(short, long)]
        settings: Option<PathBuf>,

        /// Report findings as warnings and exit successfully
        #[arg(long)]
        warn_only: bool,

        /// Only report vulnerabilities with a CVSS score at or above this value
        #[arg(long)]
        threshold: Option<f32>,

        /// Bypass the response cache
        #[arg(long)]
        no_cache: bool,
    },

    /// Create a default settings file
    Init {
        /// Directory to create vulngate.toml in
        #[arg(default_value = ".")]
        dir: PathBuf,
    },

    /// Clear the response cache
    ClearCache,
}

impl Commands {
    /// File fatal diagnostics point at.
    fn target(&self) -> PathBuf {
        match self {
            Commands::Scan { path, .. } => path.clone(),
            Commands::Init { dir } => dir.join(SETTINGS_FILE_NAME),
            Commands::ClearCache => PathBuf::from("vulngate"),
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let target = cli.command.target();
    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Scan aborted");
            println!("{}", Diagnostic::fatal(target, format!("{:#}", e)));
            exit_codes::FATAL
        }
    };
    std::process::exit(code);
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "vulngate=debug" } else { "vulngate=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Scan {
            path,
            settings,
            warn_only,
            threshold,
            no_cache,
        } => {
            let mut settings = match settings {
                Some(explicit) => Settings::load(&explicit)?,
                None => Settings::load_or_init(
                    &Settings::path_for_target(&path),
                    &RetryConfig::default(),
                )?,
            };
            if warn_only {
                settings.warn_only = true;
            }
            if threshold.is_some() {
                settings.severity_threshold = threshold;
            }

            run_scan(&path, settings, !no_cache, cli.verbose).await
        }
        Commands::Init { dir } => {
            handle_init(&dir)?;
            Ok(exit_codes::SUCCESS)
        }
        Commands::ClearCache => {
            let cache = Cache::new(Settings::default().cache_ttl_hours);
            cache.clear()?;
            println!("Cache cleared.");
            Ok(exit_codes::SUCCESS)
        }
    }
}

async fn run_scan(target: &Path, settings: Settings, use_cache: bool, verbose: bool) -> Result<i32> {
    let projects = discover_projects(target)?;
    let sources = configured_sources(&settings, use_cache)?;

    let mut context = ReportContext::new().with_writer(ConsoleWriter {
        print_summary: true,
    });
    if verbose {
        context = context.with_writer(TracingWriter);
    }

    let progress = ProgressBar::new_spinner();
    progress.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    progress.enable_steady_tick(Duration::from_millis(100));
    progress.set_message(format!("Scanning {} project(s)...", projects.len()));

    let orchestrator = ScanOrchestrator::new(settings, ManifestLoader, context).with_sources(sources);
    let outcome = orchestrator.run(&projects).await;
    progress.finish_and_clear();

    let outcome = outcome?;
    if !outcome.write_failures.is_empty() {
        tracing::warn!(
            failures = outcome.write_failures.len(),
            "Some reports could not be written"
        );
    }
    Ok(outcome.exit_code())
}

fn handle_init(dir: &Path) -> Result<()> {
    let path = dir.join(SETTINGS_FILE_NAME);
    if path.exists() {
        println!("Settings file already exists at: {}", path.display());
        return Ok(());
    }

    Settings::default().save(&path)?;
    println!("Created settings file at: {}", path.display());
    println!();
    println!("Default settings:");
    println!("{}", Settings::generate_default_config());
    Ok(())
}
