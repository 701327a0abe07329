//! Local file cache in front of a [`PriceSource`].
//!
//! One CSV file per (ticker, lookback) pair, e.g. `SPY_2y.csv`. Freshness is
//! the file's modification time. Files are replaced by writing a temp file in
//! the cache directory and renaming it over the old one, so a concurrent
//! reader sees either the old series or the new one, never a partial file.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{Local, NaiveDate};
use tempfile::NamedTempFile;

use crate::adapters::csv_source::{read_bars, write_bars};
use crate::domain::error::AlphascanError;
use crate::domain::ohlcv::Series;
use crate::domain::settings::CachePolicy;
use crate::ports::price_source::PriceSource;

pub struct CachedDataProvider {
    source: Box<dyn PriceSource + Send + Sync>,
    cache_dir: PathBuf,
    policy: CachePolicy,
}

impl CachedDataProvider {
    pub fn new(
        source: Box<dyn PriceSource + Send + Sync>,
        cache_dir: PathBuf,
        policy: CachePolicy,
    ) -> Self {
        Self {
            source,
            cache_dir,
            policy,
        }
    }

    pub fn default_lookback_years(&self) -> u32 {
        self.policy.lookback_years
    }

    pub fn cache_path(&self, ticker: &str, lookback_years: u32) -> PathBuf {
        let safe: String = ticker
            .chars()
            .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
            .collect();
        self.cache_dir.join(format!("{}_{}y.csv", safe, lookback_years))
    }

    pub fn fetch(&self, ticker: &str, lookback_years: u32) -> Result<Series, AlphascanError> {
        let path = self.cache_path(ticker, lookback_years);

        match self.read_fresh(&path) {
            Ok(Some(series)) => {
                tracing::debug!(ticker, bars = series.len(), "cache hit");
                return Ok(series);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(ticker, error = %e, "ignoring cache file"),
        }

        let (start, end) = lookback_window(Local::now().date_naive(), lookback_years);
        tracing::info!(ticker, %start, %end, "fetching from upstream");
        let series = Series::new(self.source.fetch(ticker, start, end)?);
        if series.is_empty() {
            return Err(AlphascanError::DataUnavailable {
                ticker: ticker.to_string(),
            });
        }

        self.persist(&path, &series)?;
        Ok(series)
    }

    /// `Ok(None)` for a missing, stale or undersized entry; `Err` for a file
    /// that exists but cannot be read.
    fn read_fresh(&self, path: &Path) -> Result<Option<Series>, AlphascanError> {
        let corrupt = |reason: String| AlphascanError::CacheCorrupt {
            path: path.display().to_string(),
            reason,
        };

        let meta = match fs::metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(corrupt(e.to_string())),
        };
        let age = meta
            .modified()
            .map_err(|e| corrupt(e.to_string()))?
            .elapsed()
            .unwrap_or(Duration::ZERO);
        if age >= self.policy.freshness {
            return Ok(None);
        }

        let file = File::open(path).map_err(|e| corrupt(e.to_string()))?;
        let series = Series::new(read_bars(BufReader::new(file), None).map_err(corrupt)?);
        if series.len() <= self.policy.min_rows {
            return Ok(None);
        }
        Ok(Some(series))
    }

    fn persist(&self, path: &Path, series: &Series) -> Result<(), AlphascanError> {
        fs::create_dir_all(&self.cache_dir)?;
        let tmp = NamedTempFile::new_in(&self.cache_dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            write_bars(&mut writer, series.bars())?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| AlphascanError::Io(e.error))?;
        Ok(())
    }
}

/// `[today - years * 365 days, today]`
pub fn lookback_window(today: NaiveDate, years: u32) -> (NaiveDate, NaiveDate) {
    let start = today - chrono::Duration::days(365 * i64::from(years));
    (start, today)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ohlcv::Bar;

    struct EmptySource;

    impl PriceSource for EmptySource {
        fn fetch(
            &self,
            _ticker: &str,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<Vec<Bar>, AlphascanError> {
            Ok(vec![])
        }
    }

    #[test]
    fn lookback_window_spans_365_days_per_year() {
        let today = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let (start, end) = lookback_window(today, 2);
        assert_eq!(end, today);
        assert_eq!((end - start).num_days(), 730);
    }

    #[test]
    fn cache_path_uses_ticker_and_years() {
        let provider = CachedDataProvider::new(
            Box::new(EmptySource),
            PathBuf::from("/tmp/cache"),
            CachePolicy::default(),
        );
        assert_eq!(
            provider.cache_path("SPY", 2),
            PathBuf::from("/tmp/cache/SPY_2y.csv")
        );
        assert_eq!(
            provider.cache_path("BRK/B", 5),
            PathBuf::from("/tmp/cache/BRK_B_5y.csv")
        );
    }

    #[test]
    fn empty_upstream_is_data_unavailable() {
        let dir = tempfile::TempDir::new().unwrap();
        let provider = CachedDataProvider::new(
            Box::new(EmptySource),
            dir.path().to_path_buf(),
            CachePolicy::default(),
        );
        let err = provider.fetch("NONE", 2).unwrap_err();
        assert!(matches!(err, AlphascanError::DataUnavailable { ticker } if ticker == "NONE"));
        assert!(!provider.cache_path("NONE", 2).exists());
    }
}
