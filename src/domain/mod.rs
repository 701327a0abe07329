//! Core domain types: price series, run results, quality gate, settings.

pub mod error;
pub mod ohlcv;
pub mod quality;
pub mod result;
pub mod settings;
