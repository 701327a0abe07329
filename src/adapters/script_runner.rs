//! Isolated execution of strategy scripts.
//!
//! Each run spawns the script as its own child process (in a fresh process
//! group on unix) with the ticker as the only argument, drains stdout and
//! stderr on reader threads, and polls for exit until the deadline. On
//! timeout the whole group is killed.
//!
//! A script reports its result as the last line of stdout that starts with
//! `{`. It may instead write the JSON object to the path given in
//! `ALPHASCAN_RESULT_FILE`, which then takes precedence over stdout.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tempfile::NamedTempFile;

use crate::adapters::error_log::ErrorLog;
use crate::domain::error::{AlphascanError, RunError};
use crate::domain::result::BacktestResult;

pub const RESULT_FILE_ENV: &str = "ALPHASCAN_RESULT_FILE";

/// Characters of stderr kept as the diagnostic of a failed script.
pub const STDERR_TAIL_CHARS: usize = 500;

const STDOUT_PREVIEW_CHARS: usize = 300;
const POLL_INTERVAL: Duration = Duration::from_millis(20);
const DRAIN_GRACE: Duration = Duration::from_secs(2);

pub struct StrategyRunner {
    project_root: PathBuf,
    interpreter: Option<String>,
    error_log: ErrorLog,
}

impl StrategyRunner {
    pub fn new(project_root: PathBuf, interpreter: Option<String>, error_log: ErrorLog) -> Self {
        Self {
            project_root,
            interpreter,
            error_log,
        }
    }

    pub fn error_log(&self) -> &ErrorLog {
        &self.error_log
    }

    /// Run `script` against `ticker`. Failures are appended to the error log
    /// before they are returned; nothing is retried.
    pub fn run(
        &self,
        script: &Path,
        ticker: &str,
        timeout: Duration,
    ) -> Result<BacktestResult, RunError> {
        let script = std::path::absolute(script).unwrap_or_else(|_| script.to_path_buf());
        let started = Instant::now();
        let outcome = self.execute(&script, ticker, timeout);

        match &outcome {
            Ok(result) => tracing::info!(
                script = %script.display(),
                ticker,
                indicator = %result.indicator_name,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "run completed"
            ),
            Err(e) => {
                tracing::warn!(script = %script.display(), ticker, error = %e, "run failed");
                let logged = self
                    .error_log
                    .record(&script.display().to_string(), ticker, &e.to_string());
                if let Err(log_err) = logged {
                    tracing::error!(
                        log = %self.error_log.path().display(),
                        error = %log_err,
                        "could not write error log"
                    );
                }
            }
        }
        outcome
    }

    fn execute(
        &self,
        script: &Path,
        ticker: &str,
        timeout: Duration,
    ) -> Result<BacktestResult, RunError> {
        let spawn_error = |reason: String| RunError::ProcessSpawn {
            script: script.display().to_string(),
            reason,
        };

        if !script.is_file() {
            return Err(spawn_error(format!("Script not found: {}", script.display())));
        }
        let result_file = NamedTempFile::new().map_err(|e| spawn_error(e.to_string()))?;

        let mut cmd = match &self.interpreter {
            Some(interpreter) => {
                let mut cmd = Command::new(interpreter);
                cmd.arg(script);
                cmd
            }
            None => Command::new(script),
        };
        cmd.arg(ticker)
            .current_dir(&self.project_root)
            .env(RESULT_FILE_ENV, result_file.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let mut child = cmd.spawn().map_err(|e| spawn_error(e.to_string()))?;
        tracing::debug!(pid = child.id(), script = %script.display(), ticker, "spawned");

        let stdout_rx = drain(child.stdout.take());
        let stderr_rx = drain(child.stderr.take());
        // A timeout past the end of the clock means no deadline at all.
        let deadline = Instant::now().checked_add(timeout);

        let status = match wait_until(&mut child, deadline) {
            Ok(Some(status)) => status,
            Ok(None) => {
                kill_tree(&mut child);
                return Err(RunError::Timeout { after: timeout });
            }
            Err(e) => {
                kill_tree(&mut child);
                return Err(spawn_error(format!("failed to wait for process: {e}")));
            }
        };

        // A backgrounded descendant can keep the pipes open after the script
        // itself has exited.
        let grace = Instant::now() + DRAIN_GRACE;
        let (stdout, stderr) = match (receive(&stdout_rx, grace), receive(&stderr_rx, grace)) {
            (Some(out), Some(err)) => (out, err),
            (out, err) => {
                kill_group(child.id());
                let late = Instant::now() + DRAIN_GRACE;
                (
                    out.or_else(|| receive(&stdout_rx, late)).unwrap_or_default(),
                    err.or_else(|| receive(&stderr_rx, late)).unwrap_or_default(),
                )
            }
        };

        if !status.success() {
            return Err(RunError::NonZeroExit {
                code: status.code(),
                stderr_tail: stderr_tail(&stderr),
            });
        }

        let from_file = std::fs::read_to_string(result_file.path()).unwrap_or_default();
        if !from_file.trim().is_empty() {
            return decode(from_file.trim());
        }

        match find_result_line(&stdout) {
            Some(line) => decode(line),
            None => Err(RunError::Parse {
                reason: format!(
                    "No JSON output found. stdout: {}",
                    stdout.chars().take(STDOUT_PREVIEW_CHARS).collect::<String>()
                ),
            }),
        }
    }
}

fn decode(text: &str) -> Result<BacktestResult, RunError> {
    BacktestResult::from_json_line(text).map_err(|e| match e {
        AlphascanError::InvalidResult { reason } => RunError::Parse { reason },
        other => RunError::Parse {
            reason: other.to_string(),
        },
    })
}

/// The last line whose first non-whitespace character is `{`.
pub fn find_result_line(stdout: &str) -> Option<&str> {
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| line.starts_with('{'))
}

/// Last [`STDERR_TAIL_CHARS`] characters of trimmed stderr.
pub fn stderr_tail(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        return "Unknown error".to_string();
    }
    let count = trimmed.chars().count();
    trimmed
        .chars()
        .skip(count.saturating_sub(STDERR_TAIL_CHARS))
        .collect()
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
    });
    rx
}

fn receive(rx: &Receiver<String>, until: Instant) -> Option<String> {
    let wait = until.saturating_duration_since(Instant::now());
    match rx.recv_timeout(wait) {
        Ok(text) => Some(text),
        Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
    }
}

fn wait_until(
    child: &mut Child,
    deadline: Option<Instant>,
) -> std::io::Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        let pause = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return Ok(None);
                }
                POLL_INTERVAL.min(deadline - now)
            }
            None => POLL_INTERVAL,
        };
        thread::sleep(pause);
    }
}

/// SIGKILL the child's process group, then the child itself, and reap it.
fn kill_tree(child: &mut Child) {
    tracing::warn!(pid = child.id(), "killing process group");
    kill_group(child.id());
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(unix)]
fn kill_group(pgid: u32) {
    let _ = Command::new("kill")
        .args(["-s", "KILL", "--", &format!("-{pgid}")])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32) {}
