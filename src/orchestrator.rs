//! Run → record → gate pipeline, for one script or a batch.

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use crate::adapters::csv_ledger::ResultsLedger;
use crate::adapters::error_log::ErrorLog;
use crate::adapters::script_runner::StrategyRunner;
use crate::adapters::webhook_notifier::WebhookNotifier;
use crate::domain::error::AlphascanError;
use crate::domain::quality::{GateOutcome, QualityGate};
use crate::domain::result::LedgerRow;
use crate::domain::settings::Settings;

/// A result that made it into the ledger, and what the gate made of it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub row: LedgerRow,
    pub gate: GateOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub script: PathBuf,
    pub ticker: String,
}

#[derive(Debug)]
pub struct JobReport {
    pub job: Job,
    pub outcome: Result<Recorded, AlphascanError>,
}

pub struct Orchestrator {
    runner: StrategyRunner,
    ledger: ResultsLedger,
    gate: QualityGate,
    timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        runner: StrategyRunner,
        ledger: ResultsLedger,
        gate: QualityGate,
        timeout: Duration,
    ) -> Self {
        Self {
            runner,
            ledger,
            gate,
            timeout,
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, AlphascanError> {
        let runner = StrategyRunner::new(
            settings.project_root.clone(),
            settings.interpreter.clone(),
            ErrorLog::new(settings.error_log.clone()),
        );
        let notifier = WebhookNotifier::new(settings.webhook_url.clone())?;
        Ok(Self::new(
            runner,
            ResultsLedger::new(settings.results_csv.clone()),
            QualityGate::new(settings.thresholds.clone(), Box::new(notifier)),
            settings.timeout,
        ))
    }

    pub fn ledger(&self) -> &ResultsLedger {
        &self.ledger
    }

    /// Run one script against one ticker. A failed run never reaches the ledger.
    pub fn run_one(&self, script: &Path, ticker: &str) -> Result<Recorded, AlphascanError> {
        let script_path = script.display().to_string();
        let result = self.runner.run(script, ticker, self.timeout)?;
        let row = match self.ledger.append(&result, &script_path) {
            Ok(row) => row,
            Err(e) => {
                tracing::error!(ledger = %self.ledger.path().display(), error = %e, "result not recorded");
                let diagnostic = format!("Result not recorded: {e}");
                let logged = self
                    .runner
                    .error_log()
                    .record(&script_path, ticker, &diagnostic);
                if let Err(log_err) = logged {
                    tracing::error!(error = %log_err, "could not write error log");
                }
                return Err(e);
            }
        };
        let gate = self.gate.check_and_notify(&row.result, Some(&row.script_file));
        Ok(Recorded { row, gate })
    }

    /// Run every job on a pool of `workers` threads, each owning one child
    /// process at a time. Reports come back in job order; a failing job does
    /// not stop the others.
    pub fn run_batch(&self, jobs: Vec<Job>, workers: usize) -> Vec<JobReport> {
        let total = jobs.len();
        let workers = workers.clamp(1, total.max(1));

        let (job_tx, job_rx) = mpsc::channel::<(usize, Job)>();
        for indexed in jobs.into_iter().enumerate() {
            // The receiver is alive until the scope below ends.
            let _ = job_tx.send(indexed);
        }
        drop(job_tx);
        let job_rx = Mutex::new(job_rx);
        let (report_tx, report_rx) = mpsc::channel::<(usize, JobReport)>();

        thread::scope(|scope| {
            for worker in 0..workers {
                let job_rx = &job_rx;
                let report_tx = report_tx.clone();
                scope.spawn(move || {
                    loop {
                        let next = match job_rx.lock() {
                            Ok(rx) => rx.recv(),
                            Err(_) => break,
                        };
                        let Ok((idx, job)) = next else { break };
                        tracing::debug!(worker, script = %job.script.display(), ticker = %job.ticker, "job started");
                        let outcome = self.run_one(&job.script, &job.ticker);
                        if report_tx.send((idx, JobReport { job, outcome })).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        drop(report_tx);

        let mut reports: Vec<(usize, JobReport)> = report_rx.into_iter().collect();
        reports.sort_by_key(|(idx, _)| *idx);
        reports.into_iter().map(|(_, report)| report).collect()
    }
}

/// Every (script, ticker) pair, scripts outermost.
pub fn cross_jobs(scripts: &[PathBuf], tickers: &[String]) -> Vec<Job> {
    scripts
        .iter()
        .flat_map(|script| {
            tickers.iter().map(move |ticker| Job {
                script: script.clone(),
                ticker: ticker.clone(),
            })
        })
        .collect()
}
