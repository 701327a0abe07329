//! Backtest result decoding and ledger rows.
//!
//! A strategy script reports its outcome as a single JSON object. Decoding is
//! deliberately lenient: missing keys take zero defaults, `null` and the bare
//! `NaN` / `Infinity` tokens Python's `json.dumps` emits become 0, and every
//! number is rounded to two decimals.

use chrono::NaiveDateTime;
use serde_json::{Map, Value};

use crate::domain::error::AlphascanError;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Column order of the results ledger.
pub const LEDGER_HEADER: [&str; 13] = [
    "indicator_name",
    "ticker",
    "return_pct",
    "buy_hold_return_pct",
    "max_drawdown_pct",
    "num_trades",
    "win_rate_pct",
    "profit_factor",
    "sharpe_ratio",
    "start_date",
    "end_date",
    "script_file",
    "timestamp",
];

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    pub indicator_name: String,
    pub ticker: String,
    pub return_pct: f64,
    pub buy_hold_return_pct: f64,
    pub max_drawdown_pct: f64,
    pub num_trades: u64,
    pub win_rate_pct: f64,
    pub profit_factor: f64,
    pub sharpe_ratio: f64,
    pub start_date: String,
    pub end_date: String,
}

impl Default for BacktestResult {
    fn default() -> Self {
        Self {
            indicator_name: "unknown".into(),
            ticker: "unknown".into(),
            return_pct: 0.0,
            buy_hold_return_pct: 0.0,
            max_drawdown_pct: 0.0,
            num_trades: 0,
            win_rate_pct: 0.0,
            profit_factor: 0.0,
            sharpe_ratio: 0.0,
            start_date: String::new(),
            end_date: String::new(),
        }
    }
}

impl BacktestResult {
    /// Decode one structured result line.
    pub fn from_json_line(line: &str) -> Result<Self, AlphascanError> {
        let cleaned = replace_non_finite_tokens(line.trim());
        let value: Value =
            serde_json::from_str(&cleaned).map_err(|e| AlphascanError::InvalidResult {
                reason: format!("JSON parse error: {e}"),
            })?;
        match value {
            Value::Object(map) => Ok(Self::from_map(&map)),
            other => Err(AlphascanError::InvalidResult {
                reason: format!("expected a JSON object, got {}", json_kind(&other)),
            }),
        }
    }

    fn from_map(map: &Map<String, Value>) -> Self {
        let defaults = Self::default();
        let num_trades = trade_count(map.get("num_trades"));
        let win_rate_pct = if num_trades == 0 {
            0.0
        } else {
            number(map.get("win_rate_pct"))
        };

        Self {
            indicator_name: text(map.get("indicator_name")).unwrap_or(defaults.indicator_name),
            ticker: text(map.get("ticker")).unwrap_or(defaults.ticker),
            return_pct: number(map.get("return_pct")),
            buy_hold_return_pct: number(map.get("buy_hold_return_pct")),
            max_drawdown_pct: number(map.get("max_drawdown_pct")),
            num_trades,
            win_rate_pct,
            profit_factor: number(map.get("profit_factor")),
            sharpe_ratio: number(map.get("sharpe_ratio")),
            start_date: text(map.get("start_date")).unwrap_or_default(),
            end_date: text(map.get("end_date")).unwrap_or_default(),
        }
    }

    /// One-line console summary printed after a recorded run.
    pub fn summary_line(&self) -> String {
        format!(
            "Return: {}%  |  B&H: {}%  |  MaxDD: {}%  |  Trades: {}  |  WinRate: {}%  |  PF: {}  |  Sharpe: {}",
            self.return_pct,
            self.buy_hold_return_pct,
            self.max_drawdown_pct,
            self.num_trades,
            self.win_rate_pct,
            self.profit_factor,
            self.sharpe_ratio,
        )
    }
}

/// Round to two decimals; NaN and infinities collapse to 0.
pub fn round2(x: f64) -> f64 {
    if !x.is_finite() {
        return 0.0;
    }
    let r = (x * 100.0).round() / 100.0;
    if !r.is_finite() || r == 0.0 { 0.0 } else { r }
}

fn number(value: Option<&Value>) -> f64 {
    let raw = match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        Some(Value::Bool(b)) => f64::from(u8::from(*b)),
        _ => 0.0,
    };
    round2(raw)
}

fn trade_count(value: Option<&Value>) -> u64 {
    let n = number(value).round();
    if n > 0.0 { n as u64 } else { 0 }
}

fn text(value: Option<&Value>) -> Option<String> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Rewrite bare `NaN`, `Infinity` and `-Infinity` tokens outside string
/// literals as `null` so the line is valid JSON.
fn replace_non_finite_tokens(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut rest = input;

    while let Some(c) = rest.chars().next() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            out.push(c);
            rest = &rest[c.len_utf8()..];
            continue;
        }

        let token = ["-Infinity", "Infinity", "NaN"]
            .into_iter()
            .find(|t| rest.starts_with(t));
        if let Some(token) = token {
            out.push_str("null");
            rest = &rest[token.len()..];
            continue;
        }

        if c == '"' {
            in_string = true;
        }
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }
    out
}

/// A result as persisted in the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerRow {
    pub result: BacktestResult,
    pub script_file: String,
    pub recorded_at: NaiveDateTime,
}

impl LedgerRow {
    pub fn to_record(&self) -> Vec<String> {
        let r = &self.result;
        vec![
            r.indicator_name.clone(),
            r.ticker.clone(),
            r.return_pct.to_string(),
            r.buy_hold_return_pct.to_string(),
            r.max_drawdown_pct.to_string(),
            r.num_trades.to_string(),
            r.win_rate_pct.to_string(),
            r.profit_factor.to_string(),
            r.sharpe_ratio.to_string(),
            r.start_date.clone(),
            r.end_date.clone(),
            self.script_file.clone(),
            self.recorded_at.format(TIMESTAMP_FORMAT).to_string(),
        ]
    }

    pub fn from_record(record: &csv::StringRecord) -> Result<Self, AlphascanError> {
        if record.len() != LEDGER_HEADER.len() {
            return Err(AlphascanError::InvalidResult {
                reason: format!(
                    "ledger row has {} fields, expected {}",
                    record.len(),
                    LEDGER_HEADER.len()
                ),
            });
        }
        let field = |i: usize| record.get(i).unwrap_or_default();
        let float = |i: usize| -> Result<f64, AlphascanError> {
            field(i)
                .parse::<f64>()
                .map_err(|e| AlphascanError::InvalidResult {
                    reason: format!("invalid {} value {:?}: {e}", LEDGER_HEADER[i], field(i)),
                })
        };

        let num_trades = field(5)
            .parse::<u64>()
            .map_err(|e| AlphascanError::InvalidResult {
                reason: format!("invalid num_trades value {:?}: {e}", field(5)),
            })?;
        let recorded_at = NaiveDateTime::parse_from_str(field(12), TIMESTAMP_FORMAT).map_err(
            |e| AlphascanError::InvalidResult {
                reason: format!("invalid timestamp {:?}: {e}", field(12)),
            },
        )?;

        Ok(Self {
            result: BacktestResult {
                indicator_name: field(0).to_string(),
                ticker: field(1).to_string(),
                return_pct: float(2)?,
                buy_hold_return_pct: float(3)?,
                max_drawdown_pct: float(4)?,
                num_trades,
                win_rate_pct: float(6)?,
                profit_factor: float(7)?,
                sharpe_ratio: float(8)?,
                start_date: field(9).to_string(),
                end_date: field(10).to_string(),
            },
            script_file: field(11).to_string(),
            recorded_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_LINE: &str = r#"{"indicator_name": "RSI Oversold Bounce", "ticker": "SPY", "return_pct": 12.345, "buy_hold_return_pct": 30.1, "max_drawdown_pct": -8.456, "num_trades": 14, "win_rate_pct": 57.14, "profit_factor": 1.87, "sharpe_ratio": 0.91, "start_date": "2023-01-03 00:00:00", "end_date": "2024-12-31 00:00:00"}"#;

    #[test]
    fn decodes_full_line_and_rounds() {
        let r = BacktestResult::from_json_line(FULL_LINE).unwrap();
        assert_eq!(r.indicator_name, "RSI Oversold Bounce");
        assert_eq!(r.ticker, "SPY");
        assert_eq!(r.return_pct, 12.35);
        assert_eq!(r.max_drawdown_pct, -8.46);
        assert_eq!(r.num_trades, 14);
        assert_eq!(r.win_rate_pct, 57.14);
        assert_eq!(r.start_date, "2023-01-03 00:00:00");
    }

    #[test]
    fn missing_fields_take_defaults() {
        let r = BacktestResult::from_json_line(r#"{"return_pct": 5}"#).unwrap();
        assert_eq!(r.indicator_name, "unknown");
        assert_eq!(r.ticker, "unknown");
        assert_eq!(r.return_pct, 5.0);
        assert_eq!(r.num_trades, 0);
        assert_eq!(r.profit_factor, 0.0);
        assert_eq!(r.start_date, "");
    }

    #[test]
    fn non_finite_tokens_become_zero() {
        let line = r#"{"ticker": "NaN-Infinity", "profit_factor": NaN, "sharpe_ratio": -Infinity, "return_pct": Infinity, "num_trades": 3, "win_rate_pct": null}"#;
        let r = BacktestResult::from_json_line(line).unwrap();
        assert_eq!(r.ticker, "NaN-Infinity");
        assert_eq!(r.profit_factor, 0.0);
        assert_eq!(r.sharpe_ratio, 0.0);
        assert_eq!(r.return_pct, 0.0);
        assert_eq!(r.win_rate_pct, 0.0);
    }

    #[test]
    fn zero_trades_forces_zero_win_rate() {
        let r = BacktestResult::from_json_line(r#"{"num_trades": 0, "win_rate_pct": 66.6}"#)
            .unwrap();
        assert_eq!(r.win_rate_pct, 0.0);
        assert!(r.win_rate_pct.is_finite());
    }

    #[test]
    fn negative_trade_count_clamps_to_zero() {
        let r = BacktestResult::from_json_line(r#"{"num_trades": -4}"#).unwrap();
        assert_eq!(r.num_trades, 0);
    }

    #[test]
    fn rejects_non_object() {
        let err = BacktestResult::from_json_line("[1, 2]").unwrap_err();
        assert!(err.to_string().contains("array"));
    }

    #[test]
    fn rejects_malformed_json() {
        let err = BacktestResult::from_json_line("{not json").unwrap_err();
        assert!(err.to_string().contains("JSON parse error"));
    }

    #[test]
    fn round2_normalizes() {
        assert_eq!(round2(1.005_1), 1.01);
        assert_eq!(round2(-0.001), 0.0);
        assert!(round2(-0.001).is_sign_positive());
        assert_eq!(round2(f64::NAN), 0.0);
        assert_eq!(round2(f64::NEG_INFINITY), 0.0);
        assert_eq!(round2(1e307), 0.0);
        assert_eq!(round2(-f64::MAX), 0.0);
    }

    #[test]
    fn huge_metrics_do_not_become_infinite() {
        let r = BacktestResult::from_json_line(r#"{"return_pct": 1e307, "num_trades": 3}"#).unwrap();
        assert_eq!(r.return_pct, 0.0);
        assert_eq!(r.num_trades, 3);
    }

    #[test]
    fn ledger_row_record_round_trip() {
        let row = LedgerRow {
            result: BacktestResult::from_json_line(FULL_LINE).unwrap(),
            script_file: "rsi_bounce.py".into(),
            recorded_at: NaiveDateTime::parse_from_str("2026-10-19 09:30:00", TIMESTAMP_FORMAT)
                .unwrap(),
        };
        let record = csv::StringRecord::from(row.to_record());
        assert_eq!(record.len(), LEDGER_HEADER.len());
        assert_eq!(&record[12], "2026-10-19 09:30:00");
        assert_eq!(LedgerRow::from_record(&record).unwrap(), row);
    }

    #[test]
    fn summary_line_lists_metrics() {
        let r = BacktestResult::from_json_line(FULL_LINE).unwrap();
        let line = r.summary_line();
        assert!(line.starts_with("Return: 12.35%"));
        assert!(line.ends_with("Sharpe: 0.91"));
    }
}
