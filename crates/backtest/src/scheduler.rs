//! Tick scheduler.
//!
//! Owns the simulation context and drives the strategy through the trade
//! calendar: initialize runners, one strategy call per tick, finish runners.

use crate::broker::Broker;
use crate::context::{Phase, SimulationContext};
use crate::strategy::{Runner, Strategy};
use signal_core::{Benchmark, Error, Feed, Result, TradeCalendar};
use tracing::{info, trace, warn};

/// Where a hook sits in the runner order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    /// Initialized and finished before the strategy.
    Pre,
    /// Initialized and finished after the strategy and broker.
    Post,
}

/// Drives one run over the trade calendar.
///
/// Runner order for `initialize` and `finish`: pre-hooks, strategy, broker,
/// post-hooks. Hooks are not called per tick.
pub struct Scheduler<'d, 'r> {
    ctx: SimulationContext<'d>,
    strategy: Option<&'r mut dyn Strategy>,
    pre_hooks: Vec<&'r mut dyn Runner>,
    post_hooks: Vec<&'r mut dyn Runner>,
}

impl<'d, 'r> Scheduler<'d, 'r> {
    /// Create a scheduler around a freshly wired context.
    pub fn new(
        feed: &'d Feed,
        benchmark: &'d Benchmark,
        calendar: &'d TradeCalendar,
        broker: Broker,
    ) -> Self {
        Self {
            ctx: SimulationContext::new(feed, benchmark, calendar, broker),
            strategy: None,
            pre_hooks: Vec::new(),
            post_hooks: Vec::new(),
        }
    }

    /// Set the strategy, replacing any previous one.
    pub fn add_strategy(&mut self, strategy: &'r mut dyn Strategy) {
        self.strategy = Some(strategy);
    }

    /// Register a hook runner.
    pub fn add_hook(&mut self, hook: &'r mut dyn Runner, kind: HookKind) {
        match kind {
            HookKind::Pre => self.pre_hooks.push(hook),
            HookKind::Post => self.post_hooks.push(hook),
        }
    }

    pub fn context(&self) -> &SimulationContext<'d> {
        &self.ctx
    }

    /// Run every tick of the calendar.
    ///
    /// Any error from a runner, the strategy or the broker aborts the run and
    /// is returned as is; no report exists for a failed run.
    pub fn run(mut self) -> Result<RunReport<'d>> {
        let strategy = self
            .strategy
            .take()
            .ok_or_else(|| Error::config("no strategy registered with the scheduler"))?;

        match self.drive(&mut *strategy) {
            Ok(ticks) => Ok(RunReport {
                ctx: self.ctx,
                ticks,
            }),
            Err(err) => {
                warn!(
                    strategy = strategy.name(),
                    phase = ?self.ctx.phase(),
                    tick = ?self.ctx.time(),
                    error = %err,
                    "scheduler: run aborted"
                );
                Err(err)
            }
        }
    }

    fn drive(&mut self, strategy: &mut dyn Strategy) -> Result<usize> {
        let calendar = self.ctx.calendar();

        self.ctx.set_phase(Phase::Initialized);
        info!(
            strategy = strategy.name(),
            ticks = calendar.len(),
            start = %calendar.first(),
            end = %calendar.last(),
            "scheduler: initializing runners"
        );
        for hook in self.pre_hooks.iter_mut() {
            hook.initialize(&self.ctx)?;
        }
        strategy.initialize(&self.ctx)?;
        self.ctx.broker_mut().initialize()?;
        for hook in self.post_hooks.iter_mut() {
            hook.initialize(&self.ctx)?;
        }

        self.ctx.set_phase(Phase::Running);
        let mut processed = 0usize;
        for tick in calendar.iter() {
            self.ctx.set_current_tick(tick)?;
            strategy.on_tick(tick, &mut self.ctx)?;
            processed += 1;
            self.ctx.broker().check_ledger(processed)?;
            trace!(
                %tick,
                position = self.ctx.broker().last_position().unwrap_or(0),
                "scheduler: tick done"
            );
        }

        self.ctx.set_phase(Phase::Finished);
        for hook in self.pre_hooks.iter_mut() {
            hook.finish(&self.ctx)?;
        }
        strategy.finish(&self.ctx)?;
        self.ctx.broker_mut().finish()?;
        for hook in self.post_hooks.iter_mut() {
            hook.finish(&self.ctx)?;
        }

        info!(
            strategy = strategy.name(),
            ticks = processed,
            cumulative_return = self.ctx.broker().cumulative_return(),
            "scheduler: run finished"
        );
        Ok(processed)
    }
}

/// Read-only view of a finished run.
#[derive(Debug)]
pub struct RunReport<'d> {
    ctx: SimulationContext<'d>,
    ticks: usize,
}

impl<'d> RunReport<'d> {
    /// The finished context.
    pub fn context(&self) -> &SimulationContext<'d> {
        &self.ctx
    }

    pub fn broker(&self) -> &Broker {
        self.ctx.broker()
    }

    pub fn calendar(&self) -> &'d TradeCalendar {
        self.ctx.calendar()
    }

    pub fn feed(&self) -> &'d Feed {
        self.ctx.feed()
    }

    pub fn benchmark(&self) -> &'d Benchmark {
        self.ctx.benchmark()
    }

    /// Number of ticks processed.
    pub fn ticks(&self) -> usize {
        self.ticks
    }

    /// Take ownership of the broker ledger.
    pub fn into_broker(self) -> Broker {
        self.ctx.into_broker()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::OrderEvent;
    use crate::strategy::SignalFollower;
    use chrono::NaiveDate;
    use signal_core::config::{BrokerConfig, ExerciseAt};
    use signal_core::{Bar, Signal, Tick};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn make_feed(rows: &[(u32, f64, Signal)]) -> Feed {
        let mut preclose = rows[0].1;
        Feed::new(
            rows.iter()
                .map(|&(d, close, signal)| {
                    let bar = Bar {
                        date: date(d),
                        open: preclose,
                        high: close.max(preclose),
                        low: close.min(preclose),
                        close,
                        preclose,
                        signal,
                    };
                    preclose = close;
                    bar
                })
                .collect(),
        )
        .unwrap()
    }

    fn make_benchmark(feed: &Feed) -> Benchmark {
        Benchmark::from_pairs(feed.dates().map(|d| (d, 1000.0))).unwrap()
    }

    fn make_broker() -> Broker {
        Broker::new(&BrokerConfig::default()).unwrap()
    }

    /// Records what it sees and always goes flat.
    #[derive(Default)]
    struct Recorder {
        seen: Vec<(Tick, NaiveDate, f64)>,
        init_phase: Option<Phase>,
        finish_phase: Option<Phase>,
    }

    impl Runner for Recorder {
        fn initialize(&mut self, ctx: &SimulationContext<'_>) -> Result<()> {
            self.init_phase = Some(ctx.phase());
            Ok(())
        }

        fn finish(&mut self, ctx: &SimulationContext<'_>) -> Result<()> {
            self.finish_phase = Some(ctx.phase());
            Ok(())
        }
    }

    impl Strategy for Recorder {
        fn on_tick(&mut self, tick: Tick, ctx: &mut SimulationContext<'_>) -> Result<()> {
            let bar = ctx.bar().unwrap();
            self.seen.push((tick, bar.date, bar.close));
            ctx.order_close(bar.close)?;
            Ok(())
        }
    }

    /// Appends its name to a shared journal on every lifecycle call.
    struct Journal {
        name: &'static str,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl Runner for Journal {
        fn initialize(&mut self, _ctx: &SimulationContext<'_>) -> Result<()> {
            self.log.borrow_mut().push(format!("init:{}", self.name));
            Ok(())
        }

        fn finish(&mut self, _ctx: &SimulationContext<'_>) -> Result<()> {
            self.log.borrow_mut().push(format!("finish:{}", self.name));
            Ok(())
        }
    }

    #[test]
    fn test_ticks_in_calendar_order_with_matching_bar() {
        let feed = make_feed(&[
            (3, 10.0, Signal::Flat),
            (4, 11.0, Signal::Flat),
            (5, 12.0, Signal::Flat),
        ]);
        let benchmark = make_benchmark(&feed);
        let calendar = TradeCalendar::from_feed(&feed).unwrap();
        let mut recorder = Recorder::default();

        let mut scheduler = Scheduler::new(&feed, &benchmark, &calendar, make_broker());
        scheduler.add_strategy(&mut recorder);
        let report = scheduler.run().unwrap();

        assert_eq!(report.ticks(), 3);
        assert_eq!(report.context().phase(), Phase::Finished);
        assert_eq!(
            recorder.seen,
            vec![
                (date(3), date(3), 10.0),
                (date(4), date(4), 11.0),
                (date(5), date(5), 12.0),
            ]
        );
        assert_eq!(recorder.init_phase, Some(Phase::Initialized));
        assert_eq!(recorder.finish_phase, Some(Phase::Finished));
    }

    #[test]
    fn test_runner_lifecycle_order() {
        let feed = make_feed(&[(3, 10.0, Signal::Flat)]);
        let benchmark = make_benchmark(&feed);
        let calendar = TradeCalendar::from_feed(&feed).unwrap();
        let log = Rc::new(RefCell::new(Vec::new()));

        let mut pre = Journal { name: "pre", log: Rc::clone(&log) };
        let mut post_a = Journal { name: "post_a", log: Rc::clone(&log) };
        let mut post_b = Journal { name: "post_b", log: Rc::clone(&log) };
        let mut recorder = Recorder::default();

        let mut scheduler = Scheduler::new(&feed, &benchmark, &calendar, make_broker());
        scheduler.add_hook(&mut post_a, HookKind::Post);
        scheduler.add_hook(&mut pre, HookKind::Pre);
        scheduler.add_hook(&mut post_b, HookKind::Post);
        scheduler.add_strategy(&mut recorder);
        scheduler.run().unwrap();

        assert_eq!(
            *log.borrow(),
            vec![
                "init:pre",
                "init:post_a",
                "init:post_b",
                "finish:pre",
                "finish:post_a",
                "finish:post_b",
            ]
        );
    }

    #[test]
    fn test_missing_strategy_is_config_error() {
        let feed = make_feed(&[(3, 10.0, Signal::Flat)]);
        let benchmark = make_benchmark(&feed);
        let calendar = TradeCalendar::from_feed(&feed).unwrap();

        let scheduler = Scheduler::new(&feed, &benchmark, &calendar, make_broker());
        assert!(matches!(scheduler.run(), Err(Error::Config(_))));
    }

    #[test]
    fn test_strategy_error_aborts_run() {
        struct FailOnSecond {
            calls: usize,
            finished: bool,
        }
        impl Runner for FailOnSecond {
            fn finish(&mut self, _ctx: &SimulationContext<'_>) -> Result<()> {
                self.finished = true;
                Ok(())
            }
        }
        impl Strategy for FailOnSecond {
            fn on_tick(&mut self, _tick: Tick, ctx: &mut SimulationContext<'_>) -> Result<()> {
                self.calls += 1;
                if self.calls == 2 {
                    return Err(anyhow::anyhow!("model exploded").into());
                }
                let close = ctx.bar().unwrap().close;
                ctx.order_close(close)?;
                Ok(())
            }
        }

        let feed = make_feed(&[
            (3, 10.0, Signal::Flat),
            (4, 11.0, Signal::Flat),
            (5, 12.0, Signal::Flat),
        ]);
        let benchmark = make_benchmark(&feed);
        let calendar = TradeCalendar::from_feed(&feed).unwrap();
        let mut strategy = FailOnSecond { calls: 0, finished: false };

        let mut scheduler = Scheduler::new(&feed, &benchmark, &calendar, make_broker());
        scheduler.add_strategy(&mut strategy);
        let err = scheduler.run().unwrap_err();

        assert!(matches!(err, Error::Strategy(_)));
        assert_eq!(strategy.calls, 2);
        assert!(!strategy.finished);
    }

    #[test]
    fn test_skipped_broker_call_is_invariant_violation() {
        struct Idle;
        impl Runner for Idle {}
        impl Strategy for Idle {
            fn on_tick(&mut self, _tick: Tick, _ctx: &mut SimulationContext<'_>) -> Result<()> {
                Ok(())
            }
        }

        let feed = make_feed(&[(3, 10.0, Signal::Flat)]);
        let benchmark = make_benchmark(&feed);
        let calendar = TradeCalendar::from_feed(&feed).unwrap();
        let mut idle = Idle;

        let mut scheduler = Scheduler::new(&feed, &benchmark, &calendar, make_broker());
        scheduler.add_strategy(&mut idle);
        assert!(matches!(scheduler.run(), Err(Error::Invariant(_))));
    }

    #[test]
    fn test_calendar_date_missing_from_feed() {
        let feed = make_feed(&[(3, 10.0, Signal::Flat), (5, 12.0, Signal::Flat)]);
        let benchmark = make_benchmark(&feed);
        let calendar = TradeCalendar::new(vec![date(3), date(4), date(5)]).unwrap();
        let mut recorder = Recorder::default();

        let mut scheduler = Scheduler::new(&feed, &benchmark, &calendar, make_broker());
        scheduler.add_strategy(&mut recorder);

        assert!(matches!(scheduler.run(), Err(Error::Data(_))));
        assert_eq!(recorder.seen.len(), 1);
    }

    #[test]
    fn test_signal_follower_round_trip() {
        let feed = make_feed(&[
            (3, 100.0, Signal::Long),
            (4, 102.0, Signal::Long),
            (5, 101.0, Signal::Flat),
            (6, 99.0, Signal::Flat),
        ]);
        let benchmark = make_benchmark(&feed);
        let calendar = TradeCalendar::from_feed(&feed).unwrap();
        let mut strategy = SignalFollower::new(ExerciseAt::Close);

        let mut scheduler = Scheduler::new(&feed, &benchmark, &calendar, make_broker());
        scheduler.add_strategy(&mut strategy);
        let report = scheduler.run().unwrap();
        let broker = report.broker();

        assert_eq!(
            strategy.events(),
            &[
                OrderEvent::Opened { units: 1 },
                OrderEvent::Held,
                OrderEvent::Closed { units: 1, backfilled: 1 },
                OrderEvent::Flat,
            ]
        );
        assert_eq!(broker.total_position(), &[1, 1, 0, 0]);
        // bootstrap: 0 - 3; carry: 1 * 2; close at 101 vs preclose 102: -1
        assert_eq!(broker.ret(), &[-3.0, 2.0, -1.0, 0.0]);
        assert_eq!(broker.close_date(), &[date(5)]);
        assert_eq!(broker.close_price(), &[101.0]);
    }

    #[test]
    fn test_signal_follower_flip_closes_first() {
        let feed = make_feed(&[
            (3, 100.0, Signal::Long),
            (4, 98.0, Signal::Short),
            (5, 97.0, Signal::Short),
        ]);
        let benchmark = make_benchmark(&feed);
        let calendar = TradeCalendar::from_feed(&feed).unwrap();
        let mut strategy = SignalFollower::new(ExerciseAt::Close);

        let mut scheduler = Scheduler::new(&feed, &benchmark, &calendar, make_broker());
        scheduler.add_strategy(&mut strategy);
        let report = scheduler.run().unwrap();

        assert_eq!(report.broker().total_position(), &[1, 0, -1]);
        assert_eq!(report.broker().open_date(), &[date(3), date(5)]);
        assert_eq!(report.broker().close_date(), &[date(4)]);
    }
}
