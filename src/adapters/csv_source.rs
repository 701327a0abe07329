//! Vendor CSV export data source.
//!
//! Reads `<TICKER>.csv` files as dumped by common market data tools. Columns
//! are located by header name, case-insensitively; anything other than the
//! date and the five OHLCV columns (`Adj Close`, `Dividends`, ...) is ignored.

use crate::domain::error::AlphascanError;
use crate::domain::ohlcv::{parse_bar_date, Bar};
use crate::ports::price_source::PriceSource;
use chrono::NaiveDate;
use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;

pub struct CsvPriceSource {
    base_path: PathBuf,
}

struct Columns {
    date: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: usize,
}

impl Columns {
    fn locate(headers: &csv::StringRecord) -> Result<Self, String> {
        let find = |names: &[&str]| -> Result<usize, String> {
            headers
                .iter()
                .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
                .ok_or_else(|| format!("missing {} column", names[0]))
        };
        Ok(Self {
            date: find(&["date", "datetime", "timestamp"])?,
            open: find(&["open"])?,
            high: find(&["high"])?,
            low: find(&["low"])?,
            close: find(&["close"])?,
            volume: find(&["volume"])?,
        })
    }
}

impl CsvPriceSource {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, ticker: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", ticker))
    }
}

fn cell<'a>(record: &'a csv::StringRecord, idx: usize, name: &str) -> Result<&'a str, String> {
    record
        .get(idx)
        .map(str::trim)
        .ok_or_else(|| format!("missing {} value", name))
}

fn price(record: &csv::StringRecord, idx: usize, name: &str) -> Result<f64, String> {
    let raw = cell(record, idx, name)?;
    raw.parse::<f64>()
        .map_err(|e| format!("invalid {} value {:?}: {}", name, raw, e))
}

/// Read bars from CSV with a `Date,Open,High,Low,Close,Volume` style header,
/// keeping only dates inside `window` when one is given.
pub fn read_bars<R: Read>(
    reader: R,
    window: Option<(NaiveDate, NaiveDate)>,
) -> Result<Vec<Bar>, String> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = rdr.headers().map_err(|e| e.to_string())?.clone();
    let cols = Columns::locate(&headers)?;

    let mut bars = Vec::new();
    for record in rdr.records() {
        let record = record.map_err(|e| format!("CSV parse error: {}", e))?;

        let date_cell = cell(&record, cols.date, "date")?;
        let date =
            parse_bar_date(date_cell).ok_or_else(|| format!("invalid date {:?}", date_cell))?;
        if let Some((start, end)) = window {
            if date < start || date > end {
                continue;
            }
        }

        // Vendors leave holiday rows blank or NaN; those carry no bar.
        if cell(&record, cols.close, "close")?.is_empty() {
            continue;
        }
        let close = price(&record, cols.close, "close")?;
        if !close.is_finite() {
            continue;
        }

        bars.push(Bar {
            date,
            open: price(&record, cols.open, "open")?,
            high: price(&record, cols.high, "high")?,
            low: price(&record, cols.low, "low")?,
            close,
            volume: price(&record, cols.volume, "volume")?,
        });
    }
    Ok(bars)
}

/// Write bars as `Date,Open,High,Low,Close,Volume` CSV.
pub fn write_bars<W: Write>(writer: W, bars: &[Bar]) -> Result<(), AlphascanError> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["Date", "Open", "High", "Low", "Close", "Volume"])?;
    for bar in bars {
        wtr.write_record([
            bar.date.format("%Y-%m-%d").to_string(),
            bar.open.to_string(),
            bar.high.to_string(),
            bar.low.to_string(),
            bar.close.to_string(),
            bar.volume.to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

impl PriceSource for CsvPriceSource {
    fn fetch(
        &self,
        ticker: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<Bar>, AlphascanError> {
        let path = self.csv_path(ticker);
        let parsed = File::open(&path)
            .map_err(|e| e.to_string())
            .and_then(|file| read_bars(file, Some((start_date, end_date))));

        parsed.map_err(|reason| {
            tracing::warn!(ticker, path = %path.display(), %reason, "upstream read failed");
            AlphascanError::DataUnavailable {
                ticker: ticker.to_string(),
            }
        })
    }
}
