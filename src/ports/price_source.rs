//! Upstream market data port trait.

use crate::domain::error::AlphascanError;
use crate::domain::ohlcv::Bar;
use chrono::NaiveDate;

/// Source of raw daily bars for a ticker.
///
/// Implementations may return bars unsorted or with repeated dates; callers
/// normalize through [`crate::domain::ohlcv::Series::new`].
pub trait PriceSource {
    fn fetch(
        &self,
        ticker: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<Bar>, AlphascanError>;
}
