//! Feed/benchmark alignment and trade calendar construction.

use chrono::NaiveDate;
use signal_core::{Benchmark, Error, Feed, Result, TradeCalendar};
use tracing::info;

/// Feed and benchmark restricted to their common date range.
#[derive(Debug, Clone)]
pub struct Aligned {
    pub feed: Feed,
    pub benchmark: Benchmark,
    /// Dates of the aligned feed.
    pub calendar: TradeCalendar,
}

/// Common date range `[start, end]` of feed and benchmark.
pub fn overlap(feed: &Feed, benchmark: &Benchmark) -> Result<(NaiveDate, NaiveDate)> {
    let start = feed.first_date().max(benchmark.first_date());
    let end = feed.last_date().min(benchmark.last_date());
    if start > end {
        return Err(Error::config(format!(
            "feed {}..{} and benchmark {}..{} do not overlap",
            feed.first_date(),
            feed.last_date(),
            benchmark.first_date(),
            benchmark.last_date()
        )));
    }
    Ok((start, end))
}

/// Restrict both series to their overlap and build the trade calendar.
pub fn align(feed: &Feed, benchmark: &Benchmark) -> Result<Aligned> {
    let (start, end) = overlap(feed, benchmark)?;
    let feed = feed.between(start, end)?;
    let benchmark = benchmark.between(start, end)?;
    let calendar = TradeCalendar::from_feed(&feed)?;

    info!(
        start = %start,
        end = %end,
        ticks = calendar.len(),
        "align: built trade calendar"
    );

    Ok(Aligned {
        feed,
        benchmark,
        calendar,
    })
}
