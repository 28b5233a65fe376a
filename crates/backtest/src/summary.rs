//! Run summary: daily ledger, order list and trade statistics.
//!
//! `Summary` is a post-hook runner. Its `finish` snapshots the broker ledger,
//! so nothing is read before the run reaches `Finished`.

use crate::context::{Phase, SimulationContext};
use crate::performance::{self, DrawdownPeriod, MonthlyReturn, PerformanceStats};
use crate::scheduler::RunReport;
use crate::strategy::Runner;
use chrono::NaiveDate;
use ordered_float::OrderedFloat;
use serde::Serialize;
use signal_core::config::ReportConfig;
use signal_core::{Error, Position, Result, TradeCalendar};
use tracing::info;

/// One row of the daily ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyRecord {
    pub date: NaiveDate,
    pub position: Position,
    pub market_value: f64,
    /// Return attributable to the day.
    pub basis_ret: f64,
    /// Benchmark start value plus cumulative returns.
    pub cum_ret: f64,
    /// Benchmark value, forward-filled onto the calendar.
    pub benchmark: Option<f64>,
}

/// One trade: an opening event paired with its close.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRecord {
    /// Signed units transacted when the trade opened.
    pub position: Position,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub open_price: f64,
    pub close_price: f64,
    /// `(close_price - open_price) * position`.
    pub holding_ret: f64,
    /// Trade-calendar steps between open and close.
    pub holding_days: i64,
    /// Still open at the end of the run (marked to the last close).
    pub is_open: bool,
}

/// Statistics for one side (long or short) of the order list.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SideStats {
    pub count: usize,
    pub max_gain: Option<f64>,
    pub max_loss: Option<f64>,
    pub gain_avg: Option<f64>,
    pub loss_avg: Option<f64>,
    pub win_rate: Option<f64>,
    pub win_loss_ratio: Option<f64>,
}

impl SideStats {
    fn from_orders<'a>(orders: impl Iterator<Item = &'a OrderRecord> + Clone) -> Self {
        let rets = || orders.clone().map(|o| o.holding_ret);
        let gains: Vec<f64> = rets().filter(|r| *r >= 0.0).collect();
        let losses: Vec<f64> = rets().filter(|r| *r < 0.0).collect();
        let count = gains.len() + losses.len();
        let gain_avg = mean(&gains);
        let loss_avg = mean(&losses);

        Self {
            count,
            max_gain: rets().map(OrderedFloat).max().map(|v| v.0),
            max_loss: rets().map(OrderedFloat).min().map(|v| v.0),
            gain_avg,
            loss_avg,
            win_rate: (count > 0).then(|| gains.len() as f64 / count as f64),
            win_loss_ratio: match (gain_avg, loss_avg) {
                (Some(g), Some(l)) if l != 0.0 => Some(g / l.abs()),
                _ => None,
            },
        }
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

/// Trade statistic sheet.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TradeStats {
    pub order_num: usize,
    pub gain_num: usize,
    pub loss_num: usize,
    pub win_rate: Option<f64>,
    /// Longest holding period, in calendar steps.
    pub max_holding_days: Option<i64>,
    /// Longest gap between a close and the next open, in calendar steps.
    pub max_empty_days: Option<i64>,
    pub max_gain: Option<f64>,
    pub max_loss: Option<f64>,
    pub gain_avg: Option<f64>,
    pub loss_avg: Option<f64>,
    pub win_loss_ratio: Option<f64>,
    /// Last over first cumulative-return value, minus one.
    pub total_return: Option<f64>,
    pub long: SideStats,
    pub short: SideStats,
}

/// Ledger copied out of a finished run.
#[derive(Debug, Clone)]
struct Snapshot {
    calendar: TradeCalendar,
    closes: Vec<f64>,
    benchmark: Vec<Option<f64>>,
    benchmark_base: f64,
    total_position: Vec<Position>,
    market_value: Vec<f64>,
    ret: Vec<f64>,
    order_position: Vec<Position>,
    open_date: Vec<NaiveDate>,
    open_price: Vec<f64>,
    close_date: Vec<NaiveDate>,
    close_price: Vec<f64>,
}

/// Report builder over a finished run.
#[derive(Debug, Clone, Default)]
pub struct Summary {
    config: ReportConfig,
    snapshot: Option<Snapshot>,
}

impl Summary {
    pub fn new(config: ReportConfig) -> Self {
        Self {
            config,
            snapshot: None,
        }
    }

    /// Summary of a report returned by the scheduler.
    pub fn from_report(report: &RunReport<'_>, config: ReportConfig) -> Result<Self> {
        let mut summary = Self::new(config);
        summary.capture(report.context())?;
        Ok(summary)
    }

    /// Whether a finished run has been captured.
    pub fn is_ready(&self) -> bool {
        self.snapshot.is_some()
    }

    fn capture(&mut self, ctx: &SimulationContext<'_>) -> Result<()> {
        if ctx.phase() != Phase::Finished {
            return Err(Error::invariant(format!(
                "summary read in phase {:?}; only finished runs can be reported",
                ctx.phase()
            )));
        }
        let calendar = ctx.calendar();
        let broker = ctx.broker();
        broker.check_ledger(calendar.len())?;

        let mut closes = Vec::with_capacity(calendar.len());
        for date in calendar.iter() {
            let bar = ctx
                .feed()
                .get(date)
                .ok_or_else(|| Error::data(format!("no feed bar for calendar date {date}")))?;
            closes.push(bar.close);
        }

        self.snapshot = Some(Snapshot {
            calendar: calendar.clone(),
            closes,
            benchmark: calendar.iter().map(|d| ctx.benchmark().value_asof(d)).collect(),
            benchmark_base: ctx.benchmark().first_value(),
            total_position: broker.total_position().to_vec(),
            market_value: broker.market_value().to_vec(),
            ret: broker.ret().to_vec(),
            order_position: broker.order_position().to_vec(),
            open_date: broker.open_date().to_vec(),
            open_price: broker.open_price().to_vec(),
            close_date: broker.close_date().to_vec(),
            close_price: broker.close_price().to_vec(),
        });
        Ok(())
    }

    fn snapshot(&self) -> Result<&Snapshot> {
        self.snapshot
            .as_ref()
            .ok_or_else(|| Error::invariant("summary has not captured a finished run"))
    }

    /// Equity curve: benchmark start value plus cumulative returns.
    pub fn equity_curve(&self) -> Result<Vec<f64>> {
        let snap = self.snapshot()?;
        let mut level = snap.benchmark_base;
        Ok(snap
            .ret
            .iter()
            .map(|r| {
                level += r;
                level
            })
            .collect())
    }

    /// Daily ledger rows, one per calendar date.
    pub fn daily(&self) -> Result<Vec<DailyRecord>> {
        let snap = self.snapshot()?;
        let equity = self.equity_curve()?;
        Ok((0..snap.calendar.len())
            .map(|i| DailyRecord {
                date: snap.calendar.dates()[i],
                position: snap.total_position[i],
                market_value: snap.market_value[i],
                basis_ret: snap.ret[i],
                cum_ret: equity[i],
                benchmark: snap.benchmark[i],
            })
            .collect())
    }

    /// Every opening event paired with its close.
    ///
    /// A closed trade without a stamped close price is valued at the close of
    /// its close date.
    pub fn orders(&self) -> Result<Vec<OrderRecord>> {
        let snap = self.snapshot()?;
        let calendar = &snap.calendar;

        let mut orders = Vec::with_capacity(snap.open_date.len());
        for i in 0..snap.open_date.len() {
            let (end_date, is_open) = match snap.close_date.get(i) {
                Some(&d) => (d, false),
                None => (calendar.last(), true),
            };
            let end = calendar.offset(end_date).ok_or_else(|| off_calendar(end_date))?;
            let holding_days = calendar
                .distance(snap.open_date[i], end_date)
                .ok_or_else(|| off_calendar(snap.open_date[i]))?;
            let close_price = match snap.close_price.get(i) {
                Some(&px) if !is_open => px,
                _ => snap.closes[end],
            };
            let position = snap.order_position[i];
            orders.push(OrderRecord {
                position,
                start_date: snap.open_date[i],
                end_date,
                open_price: snap.open_price[i],
                close_price,
                holding_ret: (close_price - snap.open_price[i]) * position as f64,
                holding_days,
                is_open,
            });
        }
        Ok(orders)
    }

    /// Longest stretch from a close to the first open on or after it.
    ///
    /// Records closed together by one backfill count once.
    fn max_empty_days(snap: &Snapshot) -> Result<Option<i64>> {
        let mut closes = snap.close_date.clone();
        closes.dedup();

        let mut longest = None;
        for close in closes {
            let next = snap.open_date.partition_point(|d| *d < close);
            let Some(&open) = snap.open_date.get(next) else {
                break;
            };
            let gap = snap
                .calendar
                .distance(close, open)
                .ok_or_else(|| off_calendar(close))?;
            longest = longest.max(Some(gap));
        }
        Ok(longest)
    }

    /// Trade statistic sheet, with long/short breakdowns.
    pub fn trade_stats(&self) -> Result<TradeStats> {
        let orders = self.orders()?;
        let equity = self.equity_curve()?;
        let all = SideStats::from_orders(orders.iter());
        let max_empty_days = Self::max_empty_days(self.snapshot()?)?;

        let total_return = match (equity.first(), equity.last()) {
            (Some(&first), Some(&last)) if first != 0.0 => Some(last / first - 1.0),
            _ => None,
        };

        Ok(TradeStats {
            order_num: orders.len(),
            gain_num: orders.iter().filter(|o| o.holding_ret >= 0.0).count(),
            loss_num: orders.iter().filter(|o| o.holding_ret < 0.0).count(),
            win_rate: all.win_rate,
            max_holding_days: orders.iter().map(|o| o.holding_days).max(),
            max_empty_days,
            max_gain: all.max_gain,
            max_loss: all.max_loss,
            gain_avg: all.gain_avg,
            loss_avg: all.loss_avg,
            win_loss_ratio: all.win_loss_ratio,
            total_return,
            long: SideStats::from_orders(orders.iter().filter(|o| o.position > 0)),
            short: SideStats::from_orders(orders.iter().filter(|o| o.position < 0)),
        })
    }

    /// Return/risk statistics of the equity curve.
    pub fn performance(&self) -> Result<PerformanceStats> {
        Ok(PerformanceStats::compute(
            &self.equity_curve()?,
            self.config.year_days,
            self.config.risk_free_rate,
        ))
    }

    /// Deepest drawdown periods of the equity curve.
    pub fn worst_drawdowns(&self) -> Result<Vec<DrawdownPeriod>> {
        let snap = self.snapshot()?;
        Ok(performance::worst_drawdowns(
            snap.calendar.dates(),
            &self.equity_curve()?,
            self.config.top_drawdowns,
        ))
    }

    /// Monthly compounded returns of the equity curve.
    pub fn monthly_returns(&self) -> Result<Vec<MonthlyReturn>> {
        let snap = self.snapshot()?;
        let returns = performance::to_returns(&self.equity_curve()?);
        Ok(performance::monthly_returns(&snap.calendar.dates()[1..], &returns))
    }
}

fn off_calendar(date: NaiveDate) -> Error {
    Error::invariant(format!("trade date {date} is not on the calendar"))
}

impl Runner for Summary {
    fn initialize(&mut self, _ctx: &SimulationContext<'_>) -> Result<()> {
        self.snapshot = None;
        Ok(())
    }

    fn finish(&mut self, ctx: &SimulationContext<'_>) -> Result<()> {
        self.capture(ctx)?;
        let snap = self.snapshot()?;
        info!(
            ticks = snap.calendar.len(),
            orders = snap.open_date.len(),
            "summary: captured run"
        );
        Ok(())
    }
}
