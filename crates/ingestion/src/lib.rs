//! Data ingestion and normalization for the signal-backtest system.
//!
//! This crate handles:
//! - Raw row validation (prices, signal range, duplicate dates)
//! - Daily bar building with previous-close derivation
//! - Feed/benchmark alignment into a trade calendar

pub mod align;
pub mod bar_builder;

pub use align::{align, overlap, Aligned};
pub use bar_builder::{BarBuilder, RawBar};
