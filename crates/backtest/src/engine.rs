//! Backtest facade.
//!
//! Aligns the feed with its benchmark, wires broker, scheduler and summary,
//! and runs a strategy over the aligned calendar.

use crate::broker::Broker;
use crate::performance::{DrawdownPeriod, PerformanceStats};
use crate::scheduler::{HookKind, RunReport, Scheduler};
use crate::strategy::{SignalFollower, Strategy};
use crate::summary::{DailyRecord, OrderRecord, Summary, TradeStats};
use serde::Serialize;
use signal_core::{Benchmark, Config, Feed, Result, TradeCalendar};
use signal_ingestion::{align, Aligned};
use tracing::info;

/// A configured backtest over aligned input series.
#[derive(Debug, Clone)]
pub struct Backtest {
    config: Config,
    data: Aligned,
}

impl Backtest {
    /// Validate `config` and align `feed` with `benchmark`.
    ///
    /// Fails with a configuration error when the two series do not overlap.
    pub fn new(feed: &Feed, benchmark: &Benchmark, config: Config) -> Result<Self> {
        config.validate()?;
        let data = align(feed, benchmark)?;
        info!(
            ticks = data.calendar.len(),
            start = %data.calendar.first(),
            end = %data.calendar.last(),
            "backtest: data aligned"
        );
        Ok(Self { config, data })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn feed(&self) -> &Feed {
        &self.data.feed
    }

    pub fn benchmark(&self) -> &Benchmark {
        &self.data.benchmark
    }

    pub fn calendar(&self) -> &TradeCalendar {
        &self.data.calendar
    }

    /// Run `strategy` over the aligned calendar with a fresh broker.
    pub fn run(&self, strategy: &mut dyn Strategy) -> Result<BacktestResult<'_>> {
        let broker = Broker::new(&self.config.broker)?;
        let mut summary = Summary::new(self.config.report.clone());

        let mut scheduler = Scheduler::new(
            &self.data.feed,
            &self.data.benchmark,
            &self.data.calendar,
            broker,
        );
        scheduler.add_strategy(strategy);
        scheduler.add_hook(&mut summary, HookKind::Post);
        let report = scheduler.run()?;

        Ok(BacktestResult { report, summary })
    }

    /// Run the feed's own signal column through [`SignalFollower`].
    pub fn run_signals(&self) -> Result<BacktestResult<'_>> {
        let mut strategy = SignalFollower::new(self.config.execution.exercise_at);
        self.run(&mut strategy)
    }
}

/// Finished run together with its summary.
#[derive(Debug)]
pub struct BacktestResult<'d> {
    report: RunReport<'d>,
    summary: Summary,
}

impl<'d> BacktestResult<'d> {
    pub fn report(&self) -> &RunReport<'d> {
        &self.report
    }

    pub fn broker(&self) -> &Broker {
        self.report.broker()
    }

    pub fn summary(&self) -> &Summary {
        &self.summary
    }

    /// Every report table in one serializable document.
    pub fn document(&self) -> Result<ReportDocument> {
        Ok(ReportDocument {
            performance: self.summary.performance()?,
            trade_stats: self.summary.trade_stats()?,
            drawdowns: self.summary.worst_drawdowns()?,
            orders: self.summary.orders()?,
            daily: self.summary.daily()?,
        })
    }

    /// [`BacktestResult::document`] rendered as pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.document()?)?)
    }
}

/// Serializable bundle of every report table.
#[derive(Debug, Clone, Serialize)]
pub struct ReportDocument {
    pub performance: PerformanceStats,
    pub trade_stats: TradeStats,
    pub drawdowns: Vec<DrawdownPeriod>,
    pub orders: Vec<OrderRecord>,
    pub daily: Vec<DailyRecord>,
}
