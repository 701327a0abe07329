//! Outbound notification port trait.

use crate::domain::error::AlphascanError;
use crate::domain::result::BacktestResult;

pub trait Notifier {
    /// Announce a result that passed the quality gate.
    fn send(&self, result: &BacktestResult, script_file: Option<&str>)
        -> Result<(), AlphascanError>;

    /// `false` when no destination is configured; the gate then skips `send`.
    fn is_enabled(&self) -> bool {
        true
    }
}
