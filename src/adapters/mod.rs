//! Concrete adapter implementations for ports, plus the file-backed sinks.

pub mod bar_cache;
pub mod csv_ledger;
pub mod csv_source;
pub mod error_log;
pub mod file_config_adapter;
pub mod script_runner;
pub mod webhook_notifier;
