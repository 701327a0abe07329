//! alphascan: runs strategy backtest scripts in isolation and keeps score.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`]. [`orchestrator`] wires a run
//! through the ledger and quality gate; [`cli`] is the command-line surface.

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod orchestrator;
pub mod cli;
