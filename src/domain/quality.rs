//! Threshold-based quality gate for backtest results.

use std::collections::BTreeSet;
use std::fmt;

use crate::domain::result::BacktestResult;
use crate::ports::notify_port::Notifier;

/// A metric checked by the quality gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Metric {
    ReturnPct,
    MaxDrawdownPct,
    NumTrades,
    WinRatePct,
    ProfitFactor,
}

impl Metric {
    pub const ALL: [Metric; 5] = [
        Metric::ReturnPct,
        Metric::MaxDrawdownPct,
        Metric::NumTrades,
        Metric::WinRatePct,
        Metric::ProfitFactor,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Metric::ReturnPct => "return_pct",
            Metric::MaxDrawdownPct => "max_drawdown_pct",
            Metric::NumTrades => "num_trades",
            Metric::WinRatePct => "win_rate_pct",
            Metric::ProfitFactor => "profit_factor",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Threshold values. Comparators are fixed: `num_trades` is inclusive,
/// every other metric must be strictly greater than its threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityThresholds {
    pub min_return_pct: f64,
    pub min_max_drawdown_pct: f64,
    pub min_num_trades: u64,
    pub min_win_rate_pct: f64,
    pub min_profit_factor: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            min_return_pct: 20.0,
            min_max_drawdown_pct: -30.0,
            min_num_trades: 20,
            min_win_rate_pct: 45.0,
            min_profit_factor: 1.3,
        }
    }
}

impl QualityThresholds {
    pub fn holds(&self, metric: Metric, result: &BacktestResult) -> bool {
        match metric {
            Metric::ReturnPct => result.return_pct > self.min_return_pct,
            Metric::MaxDrawdownPct => result.max_drawdown_pct > self.min_max_drawdown_pct,
            Metric::NumTrades => result.num_trades >= self.min_num_trades,
            Metric::WinRatePct => result.win_rate_pct > self.min_win_rate_pct,
            Metric::ProfitFactor => result.profit_factor > self.min_profit_factor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub passes: bool,
    pub failed: BTreeSet<Metric>,
}

impl Verdict {
    pub fn failed_names(&self) -> Vec<&'static str> {
        self.failed.iter().map(|m| m.name()).collect()
    }
}

pub fn evaluate(thresholds: &QualityThresholds, result: &BacktestResult) -> Verdict {
    let failed: BTreeSet<Metric> = Metric::ALL
        .into_iter()
        .filter(|m| !thresholds.holds(*m, result))
        .collect();
    Verdict {
        passes: failed.is_empty(),
        failed,
    }
}

/// What happened to the notification after evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// The result failed the gate, so nothing was sent.
    Skipped,
    /// No destination is configured.
    Disabled,
    Sent,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateOutcome {
    pub verdict: Verdict,
    pub notification: Notification,
}

/// Evaluates results and notifies on the ones that pass every threshold.
pub struct QualityGate {
    thresholds: QualityThresholds,
    notifier: Box<dyn Notifier + Send + Sync>,
}

impl QualityGate {
    pub fn new(thresholds: QualityThresholds, notifier: Box<dyn Notifier + Send + Sync>) -> Self {
        Self {
            thresholds,
            notifier,
        }
    }

    pub fn evaluate(&self, result: &BacktestResult) -> Verdict {
        evaluate(&self.thresholds, result)
    }

    /// Evaluate, then notify if the result passes. A failed notification is
    /// reported in the outcome and never alters the verdict.
    pub fn check_and_notify(&self, result: &BacktestResult, script_file: Option<&str>) -> GateOutcome {
        let verdict = self.evaluate(result);
        if !verdict.passes {
            return GateOutcome {
                verdict,
                notification: Notification::Skipped,
            };
        }

        if !self.notifier.is_enabled() {
            return GateOutcome {
                verdict,
                notification: Notification::Disabled,
            };
        }

        let notification = match self.notifier.send(result, script_file) {
            Ok(()) => Notification::Sent,
            Err(e) => {
                tracing::warn!(indicator = %result.indicator_name, error = %e, "notification not delivered");
                Notification::Failed(e.to_string())
            }
        };
        GateOutcome {
            verdict,
            notification,
        }
    }
}
