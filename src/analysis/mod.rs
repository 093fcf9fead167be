//! Analysis modules.
//!
//! Identity resolution, the run orchestrator, and aggregation of the
//! decoded submissions for reporting.

pub mod aggregator;
pub mod analyzer;
pub mod identity;

pub use aggregator::*;
pub use analyzer::{Analyzer, AnalyzerSettings};
