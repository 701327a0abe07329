//! Append-only CSV ledger of completed runs.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{Local, Timelike};
use fs4::fs_std::FileExt;

use crate::domain::error::AlphascanError;
use crate::domain::result::{BacktestResult, LedgerRow, LEDGER_HEADER};

#[derive(Debug, Clone)]
pub struct ResultsLedger {
    path: PathBuf,
}

impl ResultsLedger {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record one completed run, stamped with the current local time.
    ///
    /// `script_file` is reduced to its base name. The header is written only
    /// when the ledger is absent or empty, checked while holding the lock.
    pub fn append(
        &self,
        result: &BacktestResult,
        script_file: &str,
    ) -> Result<LedgerRow, AlphascanError> {
        let now = Local::now().naive_local();
        let row = LedgerRow {
            result: result.clone(),
            script_file: base_name(script_file),
            recorded_at: now.with_nanosecond(0).unwrap_or(now),
        };
        self.write_row(&row)?;
        tracing::debug!(
            ledger = %self.path.display(),
            indicator = %row.result.indicator_name,
            ticker = %row.result.ticker,
            "result recorded"
        );
        Ok(row)
    }

    fn write_row(&self, row: &LedgerRow) -> Result<(), AlphascanError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.lock_exclusive()?;
        let written = Self::write_locked(&file, row);
        file.unlock()?;
        written
    }

    fn write_locked(file: &File, row: &LedgerRow) -> Result<(), AlphascanError> {
        let needs_header = file.metadata()?.len() == 0;
        let mut buf = Vec::new();
        {
            let mut wtr = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(&mut buf);
            if needs_header {
                wtr.write_record(LEDGER_HEADER)?;
            }
            wtr.write_record(row.to_record())?;
            wtr.flush()?;
        }
        // One write per append keeps the row contiguous on disk.
        let mut file = file;
        file.write_all(&buf)?;
        file.flush()?;
        Ok(())
    }

    /// Every row recorded so far, oldest first. A missing ledger is empty.
    pub fn rows(&self) -> Result<Vec<LedgerRow>, AlphascanError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };
        let mut rdr = csv::Reader::from_reader(BufReader::new(file));
        let mut rows = Vec::new();
        for record in rdr.records() {
            rows.push(LedgerRow::from_record(&record?)?);
        }
        Ok(rows)
    }
}

fn base_name(script_file: &str) -> String {
    Path::new(script_file)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| script_file.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BacktestResult {
        BacktestResult {
            indicator_name: "MACD Cross".into(),
            ticker: "QQQ".into(),
            return_pct: 31.42,
            buy_hold_return_pct: 28.0,
            max_drawdown_pct: -12.5,
            num_trades: 22,
            win_rate_pct: 54.55,
            profit_factor: 1.61,
            sharpe_ratio: 1.07,
            start_date: "2024-10-21".into(),
            end_date: "2026-10-16".into(),
        }
    }

    #[test]
    fn base_name_strips_directories() {
        assert_eq!(base_name("/srv/backtests/macd.py"), "macd.py");
        assert_eq!(base_name("macd.py"), "macd.py");
    }

    #[test]
    fn first_append_writes_header() {
        let dir = tempfile::TempDir::new().unwrap();
        let ledger = ResultsLedger::new(dir.path().join("results").join("master_results.csv"));
        let row = ledger.append(&sample(), "/srv/backtests/macd.py").unwrap();
        assert_eq!(row.script_file, "macd.py");

        let content = fs::read_to_string(ledger.path()).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next().unwrap(), LEDGER_HEADER.join(","));
        assert!(lines.next().unwrap().starts_with("MACD Cross,QQQ,31.42,28,-12.5,22,54.55,1.61,1.07,2024-10-21,2026-10-16,macd.py,"));
        assert!(lines.next().is_none());
    }

    #[test]
    fn empty_existing_file_gets_header() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("master_results.csv");
        fs::write(&path, "").unwrap();
        let ledger = ResultsLedger::new(path);
        ledger.append(&sample(), "macd.py").unwrap();
        let content = fs::read_to_string(ledger.path()).unwrap();
        assert!(content.starts_with("indicator_name,ticker,"));
    }

    #[test]
    fn rows_of_missing_ledger_is_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let ledger = ResultsLedger::new(dir.path().join("absent.csv"));
        assert!(ledger.rows().unwrap().is_empty());
    }

    #[test]
    fn names_with_commas_are_quoted() {
        let dir = tempfile::TempDir::new().unwrap();
        let ledger = ResultsLedger::new(dir.path().join("ledger.csv"));
        let result = BacktestResult {
            indicator_name: "SuperTrend, Stoch RSI".into(),
            ..sample()
        };
        ledger.append(&result, "st.py").unwrap();
        let rows = ledger.rows().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].result.indicator_name, "SuperTrend, Stoch RSI");
    }
}
