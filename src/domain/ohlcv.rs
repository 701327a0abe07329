//! OHLCV bar and series representation.

use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Chronologically ordered bars for one ticker.
///
/// Dates are strictly increasing. Construction sorts the input and keeps the
/// last bar seen for any repeated date. There is no mutable access.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Series {
    bars: Vec<Bar>,
}

impl Series {
    pub fn new(mut bars: Vec<Bar>) -> Self {
        // Stable sort keeps input order within a date, so the last one wins below.
        bars.sort_by_key(|b| b.date);
        let mut out: Vec<Bar> = Vec::with_capacity(bars.len());
        for bar in bars {
            match out.last_mut() {
                Some(prev) if prev.date == bar.date => *prev = bar,
                _ => out.push(bar),
            }
        }
        Self { bars: out }
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.bars.first().map(|b| b.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.bars.last().map(|b| b.date)
    }
}

/// Parse a vendor date cell into a timezone-naive date.
///
/// Accepts `2024-01-15`, `2024-01-15 00:00:00` and `2024-01-15 00:00:00-05:00`;
/// anything after the calendar date is discarded.
pub fn parse_bar_date(cell: &str) -> Option<NaiveDate> {
    let cell = cell.trim();
    let head = cell.get(..10).unwrap_or(cell);
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(date: &str, close: f64) -> Bar {
        Bar {
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1000.0,
        }
    }

    #[test]
    fn new_sorts_by_date() {
        let s = Series::new(vec![
            bar("2024-01-03", 3.0),
            bar("2024-01-01", 1.0),
            bar("2024-01-02", 2.0),
        ]);
        let closes: Vec<f64> = s.bars().iter().map(|b| b.close).collect();
        assert_eq!(closes, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn new_keeps_last_duplicate() {
        let s = Series::new(vec![
            bar("2024-01-01", 1.0),
            bar("2024-01-02", 2.0),
            bar("2024-01-01", 9.0),
        ]);
        assert_eq!(s.len(), 2);
        assert_eq!(s.bars()[0].close, 9.0);
    }

    #[test]
    fn empty_series() {
        let s = Series::new(vec![]);
        assert!(s.is_empty());
        assert_eq!(s.first_date(), None);
        assert_eq!(s.last_date(), None);
    }

    #[test]
    fn parse_bar_date_strips_time_and_offset() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 15);
        assert_eq!(parse_bar_date("2024-01-15"), expected);
        assert_eq!(parse_bar_date("2024-01-15 00:00:00"), expected);
        assert_eq!(parse_bar_date(" 2024-01-15 00:00:00-05:00 "), expected);
        assert_eq!(parse_bar_date("15/01/2024"), None);
        assert_eq!(parse_bar_date(""), None);
    }
}
