//! Broker: the position/equity state machine.
//!
//! Converts daily signals into position changes and keeps the per-tick
//! ledger (position, return, market value) plus the open/close trade records.
//! Position size scales with the accumulated return of the run itself.

use chrono::NaiveDate;
use signal_core::config::BrokerConfig;
use signal_core::{Bar, Error, Position, Result, Tick};
use tracing::{debug, info};

/// What a broker operation did on the current tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderEvent {
    /// A new position was opened from flat.
    Opened { units: Position },
    /// Units were added to an existing position.
    ScaledUp { units: Position },
    /// Existing position carried forward unchanged.
    Held,
    /// Position closed; `backfilled` open records received a close date.
    Closed { units: Position, backfilled: usize },
    /// Nothing held, nothing done.
    Flat,
}

/// Position ledger and sizing state machine.
#[derive(Debug, Clone)]
pub struct Broker {
    commission: f64,
    slippage: f64,
    /// Position held at the close of each tick.
    total_position: Vec<Position>,
    /// Signed units transacted per opening event (parallel to `open_date`).
    order_position: Vec<Position>,
    /// Return attributable to each tick.
    ret: Vec<f64>,
    /// |position| * close for each tick.
    market_value: Vec<f64>,
    open_date: Vec<NaiveDate>,
    open_price: Vec<f64>,
    close_date: Vec<NaiveDate>,
    close_price: Vec<f64>,
    /// Running sum of `ret`.
    cumulative_return: f64,
}

impl Broker {
    /// Create a broker with validated frictions.
    pub fn new(config: &BrokerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            commission: config.commission,
            slippage: config.slippage,
            total_position: Vec::new(),
            order_position: Vec::new(),
            ret: Vec::new(),
            market_value: Vec::new(),
            open_date: Vec::new(),
            open_price: Vec::new(),
            close_date: Vec::new(),
            close_price: Vec::new(),
            cumulative_return: 0.0,
        })
    }

    /// Per-unit cost of a position change.
    #[inline]
    fn unit_cost(&self) -> f64 {
        self.commission + self.slippage
    }

    pub fn commission(&self) -> f64 {
        self.commission
    }

    pub fn slippage(&self) -> f64 {
        self.slippage
    }

    pub fn total_position(&self) -> &[Position] {
        &self.total_position
    }

    pub fn order_position(&self) -> &[Position] {
        &self.order_position
    }

    pub fn ret(&self) -> &[f64] {
        &self.ret
    }

    pub fn market_value(&self) -> &[f64] {
        &self.market_value
    }

    pub fn open_date(&self) -> &[NaiveDate] {
        &self.open_date
    }

    pub fn open_price(&self) -> &[f64] {
        &self.open_price
    }

    pub fn close_date(&self) -> &[NaiveDate] {
        &self.close_date
    }

    pub fn close_price(&self) -> &[f64] {
        &self.close_price
    }

    /// Sum of all per-tick returns so far.
    pub fn cumulative_return(&self) -> f64 {
        self.cumulative_return
    }

    /// Number of ticks recorded in the ledger.
    pub fn ticks_processed(&self) -> usize {
        self.total_position.len()
    }

    /// Position at the close of the last processed tick.
    pub fn last_position(&self) -> Option<Position> {
        self.total_position.last().copied()
    }

    /// Open records still waiting for a close date.
    pub fn outstanding_opens(&self) -> usize {
        self.open_date.len() - self.close_date.len()
    }

    /// Verify the ledger after `ticks` ticks.
    pub fn check_ledger(&self, ticks: usize) -> Result<()> {
        let (pos, ret, mv) = (self.total_position.len(), self.ret.len(), self.market_value.len());
        if pos != ticks || ret != ticks || mv != ticks {
            return Err(Error::invariant(format!(
                "after {ticks} ticks the ledger holds {pos} positions, {ret} returns, {mv} market values"
            )));
        }
        if self.close_date.len() > self.open_date.len() {
            return Err(Error::invariant(format!(
                "{} close records for {} open records",
                self.close_date.len(),
                self.open_date.len()
            )));
        }
        Ok(())
    }

    /// Lifecycle hook run before the first tick.
    pub fn initialize(&mut self) -> Result<()> {
        if !self.total_position.is_empty() || !self.open_date.is_empty() {
            return Err(Error::invariant(
                "broker already holds a ledger from another run",
            ));
        }
        info!(
            commission = self.commission,
            slippage = self.slippage,
            "broker: initialized"
        );
        Ok(())
    }

    /// Lifecycle hook run after the last tick.
    pub fn finish(&mut self) -> Result<()> {
        info!(
            ticks = self.ticks_processed(),
            opens = self.open_date.len(),
            closes = self.close_date.len(),
            final_position = self.last_position().unwrap_or(0),
            cumulative_return = self.cumulative_return,
            "broker: finished"
        );
        Ok(())
    }

    /// Open or extend a directional position at `exercise_price`.
    ///
    /// The bar's signal gives the direction and must not be flat.
    pub fn order_open(&mut self, tick: Tick, bar: &Bar, exercise_price: f64) -> Result<OrderEvent> {
        check_exercise_price(tick, exercise_price)?;
        if !bar.signal.is_directional() {
            return Err(Error::execution(format!(
                "{tick}: order_open needs a long or short signal, bar is flat"
            )));
        }
        let signal = bar.signal.sign();
        let cost = self.unit_cost();

        let Some(prev) = self.last_position() else {
            // Bootstrap tick: one unit in the signal's direction.
            let ret = (bar.close - exercise_price) * signal as f64 - cost;
            self.record_open(tick, signal, exercise_price);
            self.push_tick(signal, ret, bar.close);
            debug!(%tick, units = signal, exercise_price, "broker: bootstrap open");
            return Ok(OrderEvent::Opened { units: signal });
        };

        if prev == 0 {
            let units = self.affordable_units(exercise_price).max(1);
            let position = units * signal;
            let ret = position as f64 * (bar.close - exercise_price) - units as f64 * cost;
            self.record_open(tick, position, exercise_price);
            self.push_tick(position, ret, bar.close);
            debug!(%tick, units = position, exercise_price, "broker: open");
            return Ok(OrderEvent::Opened { units: position });
        }

        let carry = prev as f64 * bar.change();
        let units = self.affordable_units(exercise_price) - prev.abs();
        if units > 0 {
            let added = units * signal;
            let ret = units as f64 * (signal as f64 * (bar.close - exercise_price) - cost) + carry;
            self.record_open(tick, added, exercise_price);
            self.push_tick(prev + added, ret, bar.close);
            debug!(%tick, units = added, position = prev + added, "broker: scale up");
            Ok(OrderEvent::ScaledUp { units: added })
        } else {
            self.push_tick(prev, carry, bar.close);
            Ok(OrderEvent::Held)
        }
    }

    /// Close any held position at `exercise_price`, or stay flat.
    pub fn order_close(&mut self, tick: Tick, bar: &Bar, exercise_price: f64) -> Result<OrderEvent> {
        check_exercise_price(tick, exercise_price)?;

        match self.last_position() {
            None | Some(0) => {
                self.push_tick(0, 0.0, bar.close);
                Ok(OrderEvent::Flat)
            }
            Some(prev) => {
                let backfilled = self.outstanding_opens();
                if backfilled == 0 {
                    return Err(Error::invariant(format!(
                        "{tick}: closing a position of {prev} with no outstanding open record"
                    )));
                }
                let ret = prev as f64 * (exercise_price - bar.preclose);
                self.push_tick(0, ret, bar.close);
                self.close_date.extend(std::iter::repeat(tick).take(backfilled));
                debug!(%tick, units = prev, backfilled, exercise_price, "broker: close");
                Ok(OrderEvent::Closed {
                    units: prev,
                    backfilled,
                })
            }
        }
    }

    /// Record the realized price of the trades closed on `tick`.
    ///
    /// Call on the same tick as the `order_close` that produced the close.
    /// An unstamped close from an earlier tick is an invariant violation, so
    /// no trade ever receives another tick's price. Returns how many records
    /// were stamped.
    pub fn stamp_close_price(&mut self, tick: Tick, price: f64) -> Result<usize> {
        if !price.is_finite() || price <= 0.0 {
            return Err(Error::arithmetic(format!(
                "{tick}: close price must be positive and finite, got {price}"
            )));
        }
        let pending = &self.close_date[self.close_price.len()..];
        if let Some(stale) = pending.iter().find(|d| **d != tick) {
            return Err(Error::invariant(format!(
                "{tick}: close dated {stale} was never stamped with a price"
            )));
        }
        let missing = pending.len();
        self.close_price.extend(std::iter::repeat(price).take(missing));
        Ok(missing)
    }

    /// Whole units the accumulated return can pay for at `price`.
    #[inline]
    fn affordable_units(&self, price: f64) -> Position {
        (self.cumulative_return / price).floor() as Position
    }

    fn record_open(&mut self, tick: Tick, units: Position, price: f64) {
        self.order_position.push(units);
        self.open_date.push(tick);
        self.open_price.push(price);
    }

    fn push_tick(&mut self, position: Position, ret: f64, close: f64) {
        self.total_position.push(position);
        self.ret.push(ret);
        self.market_value.push(position.abs() as f64 * close);
        self.cumulative_return += ret;
    }
}

fn check_exercise_price(tick: Tick, price: f64) -> Result<()> {
    if !price.is_finite() || price <= 0.0 {
        return Err(Error::arithmetic(format!(
            "{tick}: exercise price must be positive and finite, got {price}"
        )));
    }
    Ok(())
}
