//! Core logic for EntityX Monitor.
//!
//! Wires the safe fetcher, an external [`Analyzer`], the trust ledger and the
//! history store into per-request operations, and routes URLs to analyzer
//! pipelines with [`classify`].

mod analyzer;
mod classify;
mod config;
mod monitor;

pub use analyzer::{Analysis, Analyzer, AnalyzerFut, TextAssessment};
pub use classify::{classify, is_direct_image_url};
pub use config::{ConfigError, EntityxConfig, LedgerConfig};
pub use monitor::{ImageReport, Monitor, TextReport};
