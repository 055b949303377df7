//! Reaction Audio Sync command-line interface.
//!
//! # Examples
//!
//! ```bash
//! # Align a reaction to the reference and remove the reference audio
//! ras reference.wav reaction.wav -o cleaned.wav
//!
//! # Alignment only, JSON report on stdout
//! ras reference.wav reaction.wav -o aligned.wav --no-cancel --no-expand --report json
//!
//! # Keep a stronger cancellation for later runs
//! ras reference.wav reaction.wav -o cleaned.wav -c ras.toml --alpha 0.8 --save-config
//! ```

mod wav;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};
use ras_core::analysis::StrategyKind;
use ras_core::config::{ConfigManager, ConfigSection, Settings};
use ras_core::logging::{init_tracing, LogLevel};
use ras_core::orchestrator::AlignmentReport;
use ras_core::SyncOrchestrator;

use wav::OutputFormat;

/// Align a target recording to a reference and cancel the reference from it.
#[derive(Parser, Debug)]
#[command(name = "ras")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Reference recording (defines the output timeline)
    reference: PathBuf,

    /// Target recording to align
    target: PathBuf,

    /// Output WAV path
    #[arg(short, long)]
    output: PathBuf,

    /// Settings file (TOML)
    #[arg(short, long, env = "RAS_CONFIG")]
    config: Option<PathBuf>,

    /// Write the overrides below into the settings file (created if missing)
    #[arg(long, requires = "config")]
    save_config: bool,

    /// Coarse search strategy
    #[arg(long)]
    strategy: Option<StrategyKind>,

    /// Over-subtraction factor
    #[arg(long)]
    alpha: Option<f64>,

    /// Spectral floor (0..1)
    #[arg(long)]
    beta: Option<f64>,

    /// Skip background cancellation
    #[arg(long)]
    no_cancel: bool,

    /// Skip the post expander
    #[arg(long)]
    no_expand: bool,

    /// Expander threshold in dBFS
    #[arg(long, allow_hyphen_values = true)]
    threshold_db: Option<f64>,

    /// Expander gain below threshold
    #[arg(long)]
    ratio: Option<f64>,

    /// Expander release in milliseconds
    #[arg(long)]
    release_ms: Option<f64>,

    /// Write 32-bit float instead of 16-bit PCM
    #[arg(long)]
    float: bool,

    /// Report format printed to stdout
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    report: ReportFormat,

    /// Increase verbosity (can be used multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    Text,
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = LogLevel::from_verbosity(cli.verbose, cli.quiet);
    init_tracing(level);

    match run(cli, level) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, level: LogLevel) -> Result<()> {
    let mut settings = match cli.config.as_deref() {
        Some(path) if cli.save_config => save_overrides(path, &cli)?,
        path => {
            let mut settings = load_settings(path)?;
            apply_overrides(&mut settings, &cli);
            settings
        }
    };
    settings.logging.level = level;

    let reference = wav::read_wav(&cli.reference)?;
    let target = wav::read_wav(&cli.target)?;

    let run_name = cli
        .target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "sync".to_string());

    let orchestrator = SyncOrchestrator::new(settings).with_run_name(run_name);
    let result = orchestrator
        .run(&reference, &target)
        .context("Alignment failed")?;

    let format = if cli.float {
        OutputFormat::Float32
    } else {
        OutputFormat::Pcm16
    };
    wav::write_wav(&cli.output, &result.audio, format)?;
    tracing::info!(path = %cli.output.display(), "Wrote output");

    let report = result.report();
    match cli.report {
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        ReportFormat::Text if !cli.quiet => print_text_report(&report),
        ReportFormat::Text => {}
    }
    Ok(())
}

fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let Some(path) = path else {
        return Ok(Settings::default());
    };
    let mut manager = ConfigManager::new(path);
    manager
        .load()
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    Ok(manager.into_settings())
}

/// Sections the command line can override.
const OVERRIDDEN_SECTIONS: [ConfigSection; 3] =
    [ConfigSection::Coarse, ConfigSection::Cancel, ConfigSection::Expand];

/// Load (or create) the settings file and persist the overrides into it.
///
/// Only the overridden tables are rewritten; other tables and their
/// comments stay as they are on disk.
fn save_overrides(path: &Path, cli: &Cli) -> Result<Settings> {
    let mut manager = ConfigManager::new(path);
    manager
        .load_or_create()
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    apply_overrides(manager.settings_mut(), cli);
    manager
        .settings()
        .validate()
        .map_err(|field| anyhow!("Invalid setting {field}"))?;

    for section in OVERRIDDEN_SECTIONS {
        manager.update_section(section).with_context(|| {
            format!("Failed to update [{}] in {}", section.table_name(), path.display())
        })?;
    }
    tracing::info!(path = %path.display(), "Saved overrides");
    Ok(manager.into_settings())
}

fn apply_overrides(settings: &mut Settings, cli: &Cli) {
    if let Some(strategy) = cli.strategy {
        settings.coarse.strategy = strategy;
    }
    if let Some(alpha) = cli.alpha {
        settings.cancel.alpha = alpha;
    }
    if let Some(beta) = cli.beta {
        settings.cancel.beta = beta;
    }
    if cli.no_cancel {
        settings.cancel.enabled = false;
    }
    if cli.no_expand {
        settings.expand.enabled = false;
    }
    if let Some(threshold) = cli.threshold_db {
        settings.expand.threshold_db = threshold;
    }
    if let Some(ratio) = cli.ratio {
        settings.expand.ratio = ratio;
    }
    if let Some(release) = cli.release_ms {
        settings.expand.release_ms = release;
    }
}

fn print_text_report(report: &AlignmentReport) {
    println!(
        "Lag: {:.3} samples ({:.3} ms) [{} {:+.3}]",
        report.total_lag, report.delay_ms, report.integer_lag, report.fractional_lag
    );
    println!("Method: {} (confidence {:.1})", report.method, report.confidence);
    println!(
        "Similarity: {:.4} (residual {:.4})",
        report.similarity, report.residual_error
    );
    println!(
        "Output: {} ch, {} frames @ {} Hz",
        report.channels, report.frames, report.sample_rate
    );
    for warning in &report.warnings {
        println!("Warning: {}", warning);
    }
}
