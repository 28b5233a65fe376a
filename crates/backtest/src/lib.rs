//! Backtesting engine for the signal-backtest system.
//!
//! This crate provides:
//! - The broker position/equity state machine
//! - The simulation context and tick scheduler
//! - Runner and strategy contracts, with a signal-following strategy
//! - Run summaries and return/risk statistics

pub mod broker;
pub mod context;
pub mod engine;
pub mod performance;
pub mod scheduler;
pub mod strategy;
pub mod summary;

pub use broker::{Broker, OrderEvent};
pub use context::{Phase, SimulationContext};
pub use engine::{Backtest, BacktestResult, ReportDocument};
pub use performance::PerformanceStats;
pub use scheduler::{HookKind, RunReport, Scheduler};
pub use strategy::{Runner, SignalFollower, Strategy};
pub use summary::{DailyRecord, OrderRecord, Summary, TradeStats};
