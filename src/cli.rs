//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use crate::adapters::bar_cache::CachedDataProvider;
use crate::adapters::csv_source::{write_bars, CsvPriceSource};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::webhook_notifier::WebhookNotifier;
use crate::domain::error::AlphascanError;
use crate::domain::quality::{GateOutcome, Notification, QualityGate};
use crate::domain::result::BacktestResult;
use crate::domain::settings::{build_settings, Settings};
use crate::orchestrator::{cross_jobs, JobReport, Orchestrator, Recorded};

/// Environment variable consulted when `[notify] webhook_url` is unset.
pub const WEBHOOK_ENV: &str = "DISCORD_WEBHOOK_URL";

const DEFAULT_TICKER: &str = "SPY";

#[derive(Parser, Debug)]
#[command(name = "alphascan", about = "Strategy backtest runner and result tracker")]
pub struct Cli {
    /// INI config file; every key has a default
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
    /// Per-run timeout in seconds, overriding [runner] timeout_secs
    #[arg(long, global = true)]
    pub timeout: Option<u64>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one strategy script against one ticker
    Run {
        script: PathBuf,
        #[arg(default_value = DEFAULT_TICKER)]
        ticker: String,
    },
    /// Run every script against every ticker on a worker pool
    Batch {
        #[arg(required = true)]
        scripts: Vec<PathBuf>,
        #[arg(long, value_delimiter = ',', default_value = DEFAULT_TICKER)]
        tickers: Vec<String>,
        #[arg(short, long)]
        workers: Option<usize>,
    },
    /// Load a ticker through the cache and print it as CSV
    Fetch {
        ticker: String,
        #[arg(long)]
        years: Option<u32>,
    },
    /// Evaluate a JSON result and notify if it passes the quality gate
    Notify { json: String },
}

pub fn run(cli: Cli) -> ExitCode {
    let settings = match load_settings(cli.config.as_deref(), cli.timeout) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    match cli.command {
        Command::Run { script, ticker } => run_single(&settings, &script, &ticker),
        Command::Batch {
            scripts,
            tickers,
            workers,
        } => run_batch(&settings, &scripts, &tickers, workers),
        Command::Fetch { ticker, years } => run_fetch(&settings, &ticker, years),
        Command::Notify { json } => run_notify(&settings, &json),
    }
}

/// Build settings from the optional config file, the `--timeout` override
/// and the webhook environment fallback.
pub fn load_settings(
    config_path: Option<&Path>,
    timeout_override: Option<u64>,
) -> Result<Settings, AlphascanError> {
    let adapter = match config_path {
        Some(path) => FileConfigAdapter::from_file(path)?,
        None => FileConfigAdapter::empty(),
    };
    let mut settings = build_settings(&adapter)?;

    if let Some(secs) = timeout_override {
        if secs == 0 {
            return Err(AlphascanError::ConfigInvalid {
                section: "runner".into(),
                key: "timeout_secs".into(),
                reason: "--timeout must be positive".into(),
            });
        }
        settings.timeout = Duration::from_secs(secs);
    }
    if settings.webhook_url.is_none() {
        settings.webhook_url = std::env::var(WEBHOOK_ENV)
            .ok()
            .filter(|url| !url.trim().is_empty());
    }
    Ok(settings)
}

fn build_orchestrator(settings: &Settings) -> Result<Orchestrator, ExitCode> {
    Orchestrator::from_settings(settings).map_err(|e| {
        eprintln!("error: {e}");
        ExitCode::from(&e)
    })
}

fn script_name(script: &Path) -> String {
    script
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| script.display().to_string())
}

fn run_single(settings: &Settings, script: &Path, ticker: &str) -> ExitCode {
    let orchestrator = match build_orchestrator(settings) {
        Ok(o) => o,
        Err(code) => return code,
    };

    eprintln!("Running: {} on {}...", script_name(script), ticker);
    match orchestrator.run_one(script, ticker) {
        Ok(recorded) => {
            report_recorded(&recorded);
            ExitCode::SUCCESS
        }
        Err(e) => {
            report_failure(&e);
            ExitCode::from(1)
        }
    }
}

fn run_batch(
    settings: &Settings,
    scripts: &[PathBuf],
    tickers: &[String],
    workers: Option<usize>,
) -> ExitCode {
    let orchestrator = match build_orchestrator(settings) {
        Ok(o) => o,
        Err(code) => return code,
    };

    let tickers: Vec<String> = tickers
        .iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    if tickers.is_empty() {
        eprintln!("error: no tickers given");
        return ExitCode::from(2);
    }

    let jobs = cross_jobs(scripts, &tickers);
    let workers = workers.unwrap_or(settings.workers).max(1);
    eprintln!(
        "Running {} jobs ({} scripts x {} tickers) on {} workers...",
        jobs.len(),
        scripts.len(),
        tickers.len(),
        workers
    );

    let reports = orchestrator.run_batch(jobs, workers);
    let mut failed = 0usize;
    let mut passed = 0usize;
    for JobReport { job, outcome } in &reports {
        eprintln!("{} on {}:", script_name(&job.script), job.ticker);
        match outcome {
            Ok(recorded) => {
                if recorded.gate.verdict.passes {
                    passed += 1;
                }
                report_recorded(recorded);
            }
            Err(e) => {
                failed += 1;
                report_failure(e);
            }
        }
    }

    eprintln!(
        "Batch complete: {} recorded, {} failed, {} passed the quality gate",
        reports.len() - failed,
        failed,
        passed
    );
    eprintln!("Results: {}", orchestrator.ledger().path().display());

    if failed > 0 {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    }
}

fn run_fetch(settings: &Settings, ticker: &str, years: Option<u32>) -> ExitCode {
    let provider = CachedDataProvider::new(
        Box::new(CsvPriceSource::new(settings.source_dir.clone())),
        settings.cache_dir.clone(),
        settings.cache.clone(),
    );
    let years = years.unwrap_or_else(|| provider.default_lookback_years());
    if years == 0 {
        eprintln!("error: --years must be positive");
        return ExitCode::from(2);
    }

    let series = match provider.fetch(ticker, years) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if let Err(e) = write_bars(&mut out, series.bars()).and_then(|()| Ok(out.flush()?)) {
        eprintln!("error: {e}");
        return (&e).into();
    }

    eprintln!("Loaded {} rows for {}", series.len(), ticker);
    if let (Some(first), Some(last)) = (series.first_date(), series.last_date()) {
        eprintln!("Date range: {} to {}", first, last);
    }
    ExitCode::SUCCESS
}

fn run_notify(settings: &Settings, json: &str) -> ExitCode {
    let result = match BacktestResult::from_json_line(json) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    let notifier = match WebhookNotifier::new(settings.webhook_url.clone()) {
        Ok(n) => n,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    let gate = QualityGate::new(settings.thresholds.clone(), Box::new(notifier));
    let outcome = gate.check_and_notify(&result, None);
    report_gate(&result, &outcome);
    ExitCode::SUCCESS
}

fn report_recorded(recorded: &Recorded) {
    eprintln!("  {}", recorded.row.result.summary_line());
    report_gate(&recorded.row.result, &recorded.gate);
}

fn report_gate(result: &BacktestResult, outcome: &GateOutcome) {
    if !outcome.verdict.passes {
        eprintln!(
            "  Quality check failed for {}: [{}]",
            result.indicator_name,
            outcome.verdict.failed_names().join(", ")
        );
        return;
    }
    eprintln!("  QUALITY CHECK PASSED for {}", result.indicator_name);
    match &outcome.notification {
        Notification::Sent => eprintln!("  Notification sent for: {}", result.indicator_name),
        Notification::Failed(reason) => eprintln!("  Notification failed: {reason}"),
        Notification::Disabled => eprintln!("  {WEBHOOK_ENV} not set, skipping notification"),
        Notification::Skipped => {}
    }
}

fn report_failure(err: &AlphascanError) {
    match err {
        AlphascanError::Run(run) => eprintln!("  {}: {}", run.kind(), run),
        other => eprintln!("  ERROR: {other}"),
    }
}
