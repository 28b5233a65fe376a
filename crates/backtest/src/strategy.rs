//! Runner and strategy contracts, plus the stock signal-following strategy.

use crate::broker::OrderEvent;
use crate::context::SimulationContext;
use signal_core::config::ExerciseAt;
use signal_core::{Bar, Result, Tick};

/// Anything the scheduler initializes before the first tick and finishes
/// after the last one.
pub trait Runner {
    fn initialize(&mut self, _ctx: &SimulationContext<'_>) -> Result<()> {
        Ok(())
    }

    fn finish(&mut self, _ctx: &SimulationContext<'_>) -> Result<()> {
        Ok(())
    }
}

/// User trading logic, called once per tick.
///
/// Each tick must end with exactly one broker operation (`order_open` or
/// `order_close`); the scheduler checks the ledger after every call.
pub trait Strategy: Runner {
    fn name(&self) -> &str {
        "strategy"
    }

    fn on_tick(&mut self, tick: Tick, ctx: &mut SimulationContext<'_>) -> Result<()>;
}

/// Trades the feed's own signal column.
///
/// Long/short signals open or extend a position, flat signals close it. A
/// signal that flips direction while a position is held closes it on that
/// tick; the new direction is opened on the next tick carrying it.
#[derive(Debug, Clone, Default)]
pub struct SignalFollower {
    exercise_at: ExerciseAt,
    events: Vec<OrderEvent>,
}

impl SignalFollower {
    pub fn new(exercise_at: ExerciseAt) -> Self {
        Self {
            exercise_at,
            events: Vec::new(),
        }
    }

    /// Broker outcome of every tick, in calendar order.
    pub fn events(&self) -> &[OrderEvent] {
        &self.events
    }

    fn exercise_price(&self, bar: &Bar) -> f64 {
        match self.exercise_at {
            ExerciseAt::Open => bar.open,
            ExerciseAt::Close => bar.close,
        }
    }
}

impl Runner for SignalFollower {
    fn initialize(&mut self, _ctx: &SimulationContext<'_>) -> Result<()> {
        self.events.clear();
        Ok(())
    }
}

impl Strategy for SignalFollower {
    fn name(&self) -> &str {
        "signal_follower"
    }

    fn on_tick(&mut self, tick: Tick, ctx: &mut SimulationContext<'_>) -> Result<()> {
        let (_, bar) = ctx.current()?;
        let price = self.exercise_price(bar);
        let held = ctx.broker().last_position().unwrap_or(0);
        let flipped = held != 0 && held.signum() != bar.signal.sign();

        let event = if bar.signal.is_directional() && !flipped {
            ctx.order_open(price)?
        } else {
            let event = ctx.order_close(price)?;
            if matches!(event, OrderEvent::Closed { .. }) {
                ctx.broker_mut().stamp_close_price(tick, price)?;
            }
            event
        };
        self.events.push(event);
        Ok(())
    }
}
