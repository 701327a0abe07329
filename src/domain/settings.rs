//! Process-wide settings built once at start and handed to each component.
//!
//! Every key is optional; an empty config yields the defaults below. Relative
//! paths resolve against `[paths] project_root`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::error::AlphascanError;
use crate::domain::quality::QualityThresholds;
use crate::ports::config_port::ConfigPort;

pub const DEFAULT_TIMEOUT_SECS: i64 = 120;
pub const DEFAULT_WORKERS: i64 = 4;
pub const DEFAULT_LOOKBACK_YEARS: i64 = 2;
pub const DEFAULT_FRESHNESS_HOURS: f64 = 24.0;
pub const DEFAULT_MIN_ROWS: i64 = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct CachePolicy {
    pub lookback_years: u32,
    pub freshness: Duration,
    /// A cached series must hold strictly more bars than this to be served.
    pub min_rows: usize,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            lookback_years: DEFAULT_LOOKBACK_YEARS as u32,
            freshness: Duration::from_secs_f64(DEFAULT_FRESHNESS_HOURS * 3600.0),
            min_rows: DEFAULT_MIN_ROWS as usize,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub project_root: PathBuf,
    pub cache_dir: PathBuf,
    pub source_dir: PathBuf,
    pub results_csv: PathBuf,
    pub error_log: PathBuf,
    pub timeout: Duration,
    pub interpreter: Option<String>,
    pub workers: usize,
    pub cache: CachePolicy,
    pub thresholds: QualityThresholds,
    pub webhook_url: Option<String>,
}

pub fn build_settings(config: &dyn ConfigPort) -> Result<Settings, AlphascanError> {
    let project_root = config
        .get_non_empty("paths", "project_root")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));

    let resolve = |key: &str, default: &str| -> PathBuf {
        let raw = config
            .get_non_empty("paths", key)
            .unwrap_or_else(|| default.to_string());
        resolve_path(&project_root, Path::new(&raw))
    };

    let settings = Settings {
        cache_dir: resolve("cache_dir", "data_cache"),
        source_dir: resolve("source_dir", "data_source"),
        results_csv: resolve("results_csv", "results/master_results.csv"),
        error_log: resolve("error_log", "logs/errors.log"),
        timeout: timeout(config)?,
        interpreter: config.get_non_empty("runner", "interpreter"),
        workers: positive_int(config, "runner", "workers", DEFAULT_WORKERS)? as usize,
        cache: cache_policy(config)?,
        thresholds: thresholds(config)?,
        webhook_url: config.get_non_empty("notify", "webhook_url"),
        project_root,
    };
    Ok(settings)
}

fn resolve_path(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

fn timeout(config: &dyn ConfigPort) -> Result<Duration, AlphascanError> {
    let secs = config.get_double("runner", "timeout_secs", DEFAULT_TIMEOUT_SECS as f64);
    if !secs.is_finite() || secs <= 0.0 {
        return Err(invalid("runner", "timeout_secs", "timeout_secs must be positive"));
    }
    Duration::try_from_secs_f64(secs)
        .map_err(|_| invalid("runner", "timeout_secs", "timeout_secs is too large"))
}

fn cache_policy(config: &dyn ConfigPort) -> Result<CachePolicy, AlphascanError> {
    let lookback_years = positive_int(config, "cache", "lookback_years", DEFAULT_LOOKBACK_YEARS)?;

    let hours = config.get_double("cache", "freshness_hours", DEFAULT_FRESHNESS_HOURS);
    if !hours.is_finite() || hours < 0.0 {
        return Err(invalid(
            "cache",
            "freshness_hours",
            "freshness_hours must be non-negative",
        ));
    }

    let min_rows = config.get_int("cache", "min_rows", DEFAULT_MIN_ROWS);
    if min_rows < 0 {
        return Err(invalid("cache", "min_rows", "min_rows must be non-negative"));
    }

    let freshness = Duration::try_from_secs_f64(hours * 3600.0)
        .map_err(|_| invalid("cache", "freshness_hours", "freshness_hours is too large"))?;

    Ok(CachePolicy {
        lookback_years: u32::try_from(lookback_years)
            .map_err(|_| invalid("cache", "lookback_years", "lookback_years is too large"))?,
        freshness,
        min_rows: min_rows as usize,
    })
}

fn thresholds(config: &dyn ConfigPort) -> Result<QualityThresholds, AlphascanError> {
    let d = QualityThresholds::default();
    let float = |key: &str, default: f64| -> Result<f64, AlphascanError> {
        let value = config.get_double("quality", key, default);
        if value.is_finite() {
            Ok(value)
        } else {
            Err(invalid("quality", key, "threshold must be a finite number"))
        }
    };

    let min_num_trades = config.get_int("quality", "num_trades", d.min_num_trades as i64);
    if min_num_trades < 0 {
        return Err(invalid("quality", "num_trades", "num_trades must be non-negative"));
    }

    Ok(QualityThresholds {
        min_return_pct: float("return_pct", d.min_return_pct)?,
        min_max_drawdown_pct: float("max_drawdown_pct", d.min_max_drawdown_pct)?,
        min_num_trades: min_num_trades as u64,
        min_win_rate_pct: float("win_rate_pct", d.min_win_rate_pct)?,
        min_profit_factor: float("profit_factor", d.min_profit_factor)?,
    })
}

fn positive_int(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
) -> Result<i64, AlphascanError> {
    let value = config.get_int(section, key, default);
    if value <= 0 {
        return Err(invalid(section, key, &format!("{key} must be positive")));
    }
    Ok(value)
}

fn invalid(section: &str, key: &str, reason: &str) -> AlphascanError {
    AlphascanError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}
