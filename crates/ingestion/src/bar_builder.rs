//! Daily bar building from raw feed rows.
//!
//! Validates rows, derives missing previous closes and produces a `Feed`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use signal_core::{Bar, Error, Feed, Result, Signal};
use std::collections::BTreeMap;
use tracing::debug;

/// An unvalidated feed row, as handed over by whatever loaded the data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Raw signal value; must be -1, 0 or 1.
    pub signal: i64,
    /// Previous close, derived from the prior row when absent.
    #[serde(default)]
    pub preclose: Option<f64>,
}

impl RawBar {
    fn check_prices(&self) -> Result<()> {
        let prices = [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
        ];
        for (name, px) in prices {
            if !px.is_finite() || px <= 0.0 {
                return Err(Error::data(format!(
                    "{}: {name} must be a positive finite price, got {px}",
                    self.date
                )));
            }
        }
        if self.low > self.high {
            return Err(Error::data(format!(
                "{}: low {} is above high {}",
                self.date, self.low, self.high
            )));
        }
        if let Some(pc) = self.preclose {
            if !pc.is_finite() || pc <= 0.0 {
                return Err(Error::data(format!(
                    "{}: preclose must be a positive finite price, got {pc}",
                    self.date
                )));
            }
        }
        Ok(())
    }
}

/// Builder collecting raw rows into a validated daily feed.
pub struct BarBuilder {
    /// Rows keyed by date, kept in date order.
    rows: BTreeMap<NaiveDate, RawBar>,
}

impl BarBuilder {
    /// Create a new bar builder.
    pub fn new() -> Self {
        Self {
            rows: BTreeMap::new(),
        }
    }

    /// Add a raw row. Rows may arrive in any order but dates must be unique.
    pub fn add_row(&mut self, row: RawBar) -> Result<()> {
        row.check_prices()?;
        Signal::try_from(row.signal)?;
        if self.rows.contains_key(&row.date) {
            return Err(Error::config(format!("duplicate feed date {}", row.date)));
        }
        self.rows.insert(row.date, row);
        Ok(())
    }

    /// Add multiple raw rows.
    pub fn add_rows(&mut self, rows: impl IntoIterator<Item = RawBar>) -> Result<()> {
        for row in rows {
            self.add_row(row)?;
        }
        Ok(())
    }

    /// Number of rows collected so far.
    pub fn pending_row_count(&self) -> usize {
        self.rows.len()
    }

    /// Build the feed.
    ///
    /// A row without `preclose` takes the previous row's close; the first row
    /// falls back to its own open.
    pub fn build(&self) -> Result<Feed> {
        let mut bars = Vec::with_capacity(self.rows.len());
        let mut prev_close: Option<f64> = None;
        let mut derived = 0usize;

        for row in self.rows.values() {
            let preclose = match row.preclose {
                Some(pc) => pc,
                None => {
                    derived += 1;
                    prev_close.unwrap_or(row.open)
                }
            };
            bars.push(Bar {
                date: row.date,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                preclose,
                signal: Signal::try_from(row.signal)?,
            });
            prev_close = Some(row.close);
        }

        debug!(rows = bars.len(), derived_preclose = derived, "bar_builder: built feed");
        Feed::new(bars)
    }

    /// Clear all state.
    pub fn clear(&mut self) {
        self.rows.clear();
    }
}

impl Default for BarBuilder {
    fn default() -> Self {
        Self::new()
    }
}
