//! Analysis modules.
//!
//! Ranking of knowledge-base candidates and statistics over panel outcomes.

pub mod aggregator;

pub use aggregator::*;
