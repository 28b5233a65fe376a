//! Core data types for the signal-backtest system.

use crate::error::{Error, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Tick identifier: one trading date.
pub type Tick = NaiveDate;

/// Signed position size in whole units.
pub type Position = i64;

/// Desired directional exposure for a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
#[repr(i8)]
pub enum Signal {
    /// Short one unit per sizing step.
    Short = -1,
    /// Flat / close out.
    Flat = 0,
    /// Long one unit per sizing step.
    Long = 1,
}

impl Signal {
    /// Get the sign as i64.
    #[inline]
    pub fn sign(self) -> i64 {
        self as i64
    }

    /// Whether the signal asks for a directional position.
    #[inline]
    pub fn is_directional(self) -> bool {
        self != Signal::Flat
    }
}

impl TryFrom<i64> for Signal {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        match value {
            -1 => Ok(Signal::Short),
            0 => Ok(Signal::Flat),
            1 => Ok(Signal::Long),
            other => Err(Error::config(format!(
                "signal must be one of -1, 0, 1, got {other}"
            ))),
        }
    }
}

impl From<Signal> for i64 {
    fn from(signal: Signal) -> Self {
        signal.sign()
    }
}

/// One daily row of the price feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Trading date.
    pub date: NaiveDate,
    /// Open price.
    pub open: f64,
    /// High price.
    pub high: f64,
    /// Low price.
    pub low: f64,
    /// Close price.
    pub close: f64,
    /// Previous session's close.
    pub preclose: f64,
    /// Strategy signal for this date.
    pub signal: Signal,
}

impl Bar {
    /// Close-to-close change.
    #[inline]
    pub fn change(&self) -> f64 {
        self.close - self.preclose
    }
}

/// Ordered, duplicate-free daily price feed.
#[derive(Debug, Clone, PartialEq)]
pub struct Feed {
    bars: Vec<Bar>,
}

impl Feed {
    /// Build a feed from bars already sorted by date.
    pub fn new(bars: Vec<Bar>) -> Result<Self> {
        if bars.is_empty() {
            return Err(Error::config("feed is empty"));
        }
        if let Some(pair) = bars.windows(2).find(|w| w[0].date >= w[1].date) {
            return Err(Error::config(format!(
                "feed dates must be strictly ascending: {} then {}",
                pair[0].date, pair[1].date
            )));
        }
        Ok(Self { bars })
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Iterate the feed's dates in order.
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.bars.iter().map(|b| b.date)
    }

    pub fn first_date(&self) -> NaiveDate {
        self.bars[0].date
    }

    pub fn last_date(&self) -> NaiveDate {
        self.bars[self.bars.len() - 1].date
    }

    /// Position of a date in the feed.
    pub fn position(&self, date: NaiveDate) -> Option<usize> {
        self.bars.binary_search_by_key(&date, |b| b.date).ok()
    }

    /// Bar for a date.
    pub fn get(&self, date: NaiveDate) -> Option<&Bar> {
        self.position(date).map(|i| &self.bars[i])
    }

    /// Sub-feed with dates in `[start, end]`.
    pub fn between(&self, start: NaiveDate, end: NaiveDate) -> Result<Feed> {
        let bars: Vec<Bar> = self
            .bars
            .iter()
            .filter(|b| b.date >= start && b.date <= end)
            .cloned()
            .collect();
        Feed::new(bars)
    }
}

/// One observation of the benchmark series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkPoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// Date-indexed benchmark price series.
#[derive(Debug, Clone, PartialEq)]
pub struct Benchmark {
    points: Vec<BenchmarkPoint>,
}

impl Benchmark {
    /// Build a benchmark from points already sorted by date.
    pub fn new(points: Vec<BenchmarkPoint>) -> Result<Self> {
        if points.is_empty() {
            return Err(Error::config("benchmark is empty"));
        }
        if let Some(pair) = points.windows(2).find(|w| w[0].date >= w[1].date) {
            return Err(Error::config(format!(
                "benchmark dates must be strictly ascending: {} then {}",
                pair[0].date, pair[1].date
            )));
        }
        if let Some(p) = points.iter().find(|p| !p.value.is_finite()) {
            return Err(Error::config(format!("benchmark value on {} is not finite", p.date)));
        }
        Ok(Self { points })
    }

    /// Build from `(date, value)` pairs.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (NaiveDate, f64)>) -> Result<Self> {
        Self::new(
            pairs
                .into_iter()
                .map(|(date, value)| BenchmarkPoint { date, value })
                .collect(),
        )
    }

    pub fn points(&self) -> &[BenchmarkPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first_date(&self) -> NaiveDate {
        self.points[0].date
    }

    pub fn last_date(&self) -> NaiveDate {
        self.points[self.points.len() - 1].date
    }

    /// First observed value.
    pub fn first_value(&self) -> f64 {
        self.points[0].value
    }

    /// Exact value for a date.
    pub fn get(&self, date: NaiveDate) -> Option<f64> {
        self.points
            .binary_search_by_key(&date, |p| p.date)
            .ok()
            .map(|i| self.points[i].value)
    }

    /// Most recent value on or before a date (forward fill).
    pub fn value_asof(&self, date: NaiveDate) -> Option<f64> {
        let idx = self.points.partition_point(|p| p.date <= date);
        idx.checked_sub(1).map(|i| self.points[i].value)
    }

    /// Sub-series with dates in `[start, end]`.
    pub fn between(&self, start: NaiveDate, end: NaiveDate) -> Result<Benchmark> {
        Benchmark::new(
            self.points
                .iter()
                .filter(|p| p.date >= start && p.date <= end)
                .copied()
                .collect(),
        )
    }
}

/// Ordered, duplicate-free sequence of simulation dates.
///
/// Source of truth for iteration order and for converting dates into
/// integer offsets (holding periods are measured in calendar offsets, not
/// in calendar days).
#[derive(Debug, Clone, PartialEq)]
pub struct TradeCalendar {
    dates: Vec<NaiveDate>,
    index: HashMap<NaiveDate, usize>,
}

impl TradeCalendar {
    pub fn new(dates: Vec<NaiveDate>) -> Result<Self> {
        if dates.is_empty() {
            return Err(Error::config("trade calendar is empty"));
        }
        if let Some(pair) = dates.windows(2).find(|w| w[0] >= w[1]) {
            return Err(Error::config(format!(
                "trade calendar must be strictly ascending: {} then {}",
                pair[0], pair[1]
            )));
        }
        let index = dates.iter().enumerate().map(|(i, d)| (*d, i)).collect();
        Ok(Self { dates, index })
    }

    /// Calendar covering every date of a feed.
    pub fn from_feed(feed: &Feed) -> Result<Self> {
        Self::new(feed.dates().collect())
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn iter(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.dates.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn first(&self) -> NaiveDate {
        self.dates[0]
    }

    pub fn last(&self) -> NaiveDate {
        self.dates[self.dates.len() - 1]
    }

    /// Offset of a date within the calendar.
    pub fn offset(&self, date: NaiveDate) -> Option<usize> {
        self.index.get(&date).copied()
    }

    /// Number of calendar steps from `from` to `to` (negative if `to` is earlier).
    pub fn distance(&self, from: NaiveDate, to: NaiveDate) -> Option<i64> {
        Some(self.offset(to)? as i64 - self.offset(from)? as i64)
    }
}
