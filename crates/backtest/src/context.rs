//! Shared simulation state visible to every component during a run.

use crate::broker::{Broker, OrderEvent};
use signal_core::{Bar, Benchmark, Error, Feed, Result, Tick, TradeCalendar};

/// Lifecycle phase of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Wired, not started.
    Configured,
    /// Runners are being initialized.
    Initialized,
    /// The tick loop is in progress.
    Running,
    /// Every tick processed; runners are being (or have been) finished.
    Finished,
}

/// The one mutable state record of a run.
///
/// Input series are borrowed for the whole run; the broker is owned. The
/// current tick and bar are only ever changed together by
/// [`SimulationContext::set_current_tick`].
#[derive(Debug)]
pub struct SimulationContext<'d> {
    feed: &'d Feed,
    benchmark: &'d Benchmark,
    calendar: &'d TradeCalendar,
    broker: Broker,
    time: Option<Tick>,
    bar: Option<&'d Bar>,
    phase: Phase,
}

impl<'d> SimulationContext<'d> {
    pub fn new(
        feed: &'d Feed,
        benchmark: &'d Benchmark,
        calendar: &'d TradeCalendar,
        broker: Broker,
    ) -> Self {
        Self {
            feed,
            benchmark,
            calendar,
            broker,
            time: None,
            bar: None,
            phase: Phase::Configured,
        }
    }

    /// Move to `tick` and look up its bar.
    ///
    /// Alignment of calendar and feed is the caller's responsibility; a tick
    /// with no bar is reported as a data error and leaves the context as it was.
    pub fn set_current_tick(&mut self, tick: Tick) -> Result<()> {
        let bar = self
            .feed
            .get(tick)
            .ok_or_else(|| Error::data(format!("no feed bar for calendar date {tick}")))?;
        self.time = Some(tick);
        self.bar = Some(bar);
        Ok(())
    }

    pub fn feed(&self) -> &'d Feed {
        self.feed
    }

    pub fn benchmark(&self) -> &'d Benchmark {
        self.benchmark
    }

    pub fn calendar(&self) -> &'d TradeCalendar {
        self.calendar
    }

    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    pub fn broker_mut(&mut self) -> &mut Broker {
        &mut self.broker
    }

    /// Current tick, once the loop has started.
    pub fn time(&self) -> Option<Tick> {
        self.time
    }

    /// Bar of the current tick, once the loop has started.
    pub fn bar(&self) -> Option<&'d Bar> {
        self.bar
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub(crate) fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    /// Current tick and bar, or an error outside the tick loop.
    pub fn current(&self) -> Result<(Tick, &'d Bar)> {
        match (self.time, self.bar) {
            (Some(tick), Some(bar)) => Ok((tick, bar)),
            _ => Err(Error::invariant("no current tick: the tick loop has not started")),
        }
    }

    /// [`Broker::order_open`] on the current bar.
    pub fn order_open(&mut self, exercise_price: f64) -> Result<OrderEvent> {
        let (tick, bar) = self.current()?;
        self.broker.order_open(tick, bar, exercise_price)
    }

    /// [`Broker::order_close`] on the current bar.
    pub fn order_close(&mut self, exercise_price: f64) -> Result<OrderEvent> {
        let (tick, bar) = self.current()?;
        self.broker.order_close(tick, bar, exercise_price)
    }

    pub(crate) fn into_broker(self) -> Broker {
        self.broker
    }
}
