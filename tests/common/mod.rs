#![allow(dead_code)]

use alphascan::adapters::error_log::ErrorLog;
use alphascan::adapters::script_runner::StrategyRunner;
use alphascan::domain::error::AlphascanError;
use alphascan::domain::ohlcv::Bar;
use alphascan::domain::result::BacktestResult;
use alphascan::ports::notify_port::Notifier;
use alphascan::ports::price_source::PriceSource;
use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Upstream stub that serves a fixed set of bars and counts calls.
pub struct StubSource {
    pub bars: Vec<Bar>,
    pub calls: Arc<AtomicUsize>,
}

impl StubSource {
    pub fn new(bars: Vec<Bar>) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                bars,
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }
}

impl PriceSource for StubSource {
    fn fetch(
        &self,
        _ticker: &str,
        _start_date: NaiveDate,
        _end_date: NaiveDate,
    ) -> Result<Vec<Bar>, AlphascanError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.bars.clone())
    }
}

/// Notifier stub that counts calls and optionally fails every send.
pub struct RecordingNotifier {
    pub calls: Arc<AtomicUsize>,
    pub fail: bool,
}

impl RecordingNotifier {
    pub fn new(fail: bool) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                calls: Arc::clone(&calls),
                fail,
            },
            calls,
        )
    }
}

impl Notifier for RecordingNotifier {
    fn send(
        &self,
        _result: &BacktestResult,
        _script_file: Option<&str>,
    ) -> Result<(), AlphascanError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(AlphascanError::Notifier {
                reason: "webhook returned 500 Internal Server Error".into(),
            });
        }
        Ok(())
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn generate_bars(start_date: &str, count: usize, start_price: f64) -> Vec<Bar> {
    let start = NaiveDate::parse_from_str(start_date, "%Y-%m-%d").unwrap();
    (0..count)
        .map(|i| Bar {
            date: start + chrono::Duration::days(i as i64),
            open: start_price + i as f64,
            high: start_price + i as f64 + 1.5,
            low: start_price + i as f64 - 1.25,
            close: start_price + i as f64 + 0.5,
            volume: 1_000_000.0 + i as f64,
        })
        .collect()
}

pub fn passing_result() -> BacktestResult {
    BacktestResult {
        indicator_name: "RSI Oversold Bounce".into(),
        ticker: "SPY".into(),
        return_pct: 25.5,
        buy_hold_return_pct: 18.2,
        max_drawdown_pct: -12.0,
        num_trades: 31,
        win_rate_pct: 58.06,
        profit_factor: 1.92,
        sharpe_ratio: 1.12,
        start_date: "2024-10-21".into(),
        end_date: "2026-10-16".into(),
    }
}

/// The JSON line a well-behaved strategy prints for `result`.
pub fn result_json(result: &BacktestResult) -> String {
    serde_json::json!({
        "indicator_name": result.indicator_name,
        "ticker": result.ticker,
        "return_pct": result.return_pct,
        "buy_hold_return_pct": result.buy_hold_return_pct,
        "max_drawdown_pct": result.max_drawdown_pct,
        "num_trades": result.num_trades,
        "win_rate_pct": result.win_rate_pct,
        "profit_factor": result.profit_factor,
        "sharpe_ratio": result.sharpe_ratio,
        "start_date": result.start_date,
        "end_date": result.end_date,
    })
    .to_string()
}

/// Write an `sh` script body to `dir/name`. Scripts are run through the
/// `sh` interpreter, so no exec bit is needed.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    path
}

/// A runner rooted at `project_root` that logs to `project_root/logs/errors.log`.
pub fn sh_runner(project_root: &Path) -> StrategyRunner {
    StrategyRunner::new(
        project_root.to_path_buf(),
        Some("sh".to_string()),
        ErrorLog::new(error_log_path(project_root)),
    )
}

pub fn error_log_path(project_root: &Path) -> PathBuf {
    project_root.join("logs").join("errors.log")
}
