//! Append-only failure log shared by every run.
//!
//! Line format: `[2026-10-19 09:30:00] /path/to/script.py | SPY | diagnostic`.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use fs4::fs_std::FileExt;

use crate::domain::error::AlphascanError;
use crate::domain::result::TIMESTAMP_FORMAT;

#[derive(Debug, Clone)]
pub struct ErrorLog {
    path: PathBuf,
}

impl ErrorLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one line under an exclusive lock so concurrent writers, in
    /// this process or another, never interleave.
    pub fn record(&self, script: &str, ticker: &str, diagnostic: &str) -> Result<(), AlphascanError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let line = format_line(
            &Local::now().format(TIMESTAMP_FORMAT).to_string(),
            script,
            ticker,
            diagnostic,
        );

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.lock_exclusive()?;
        let written = file.write_all(line.as_bytes()).and_then(|_| file.flush());
        file.unlock()?;
        written?;
        Ok(())
    }
}

fn format_line(timestamp: &str, script: &str, ticker: &str, diagnostic: &str) -> String {
    let diagnostic = diagnostic.replace("\r\n", "\n").replace('\n', "\\n");
    format!("[{}] {} | {} | {}\n", timestamp, script, ticker, diagnostic)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn format_line_escapes_newlines() {
        let line = format_line(
            "2026-10-19 09:30:00",
            "/srv/backtests/rsi.py",
            "SPY",
            "Traceback:\n  File x\r\nValueError",
        );
        assert_eq!(
            line,
            "[2026-10-19 09:30:00] /srv/backtests/rsi.py | SPY | Traceback:\\n  File x\\nValueError\n"
        );
    }

    #[test]
    fn record_creates_parent_and_appends() {
        let dir = tempfile::TempDir::new().unwrap();
        let log = ErrorLog::new(dir.path().join("logs").join("errors.log"));
        log.record("a.py", "SPY", "first").unwrap();
        log.record("b.py", "QQQ", "second").unwrap();

        let content = fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("] a.py | SPY | first"));
        assert!(lines[1].ends_with("] b.py | QQQ | second"));
    }

    #[test]
    fn concurrent_records_stay_whole() {
        let dir = tempfile::TempDir::new().unwrap();
        let log = Arc::new(ErrorLog::new(dir.path().join("errors.log")));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let log = Arc::clone(&log);
                thread::spawn(move || {
                    for j in 0..25 {
                        log.record(&format!("s{i}.py"), "SPY", &format!("failure {i}-{j}"))
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let content = fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 200);
        assert!(lines.iter().all(|l| l.starts_with('[') && l.contains(" | SPY | failure ")));
    }
}
