/// Timer module: the drift-corrected countdown and its terminal display
use std::io::Write;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, warn};
use thiserror::Error;

use crate::duration::{Millis, format_duration};

const TICK_MS: Millis = 1000;

#[derive(Debug, Error)]
pub enum TimerError {
    #[error("clock unavailable: {0}")]
    ClockUnavailable(String),
}

/// Source of elapsed time and sleeping for a countdown.
pub trait Clock {
    /// Milliseconds since a fixed, clock-specific origin.
    fn now_ms(&self) -> Result<Millis, TimerError>;
    fn sleep_ms(&mut self, millis: Millis);
}

/// Monotonic clock backed by [`Instant`].
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> Result<Millis, TimerError> {
        Millis::try_from(self.origin.elapsed().as_millis())
            .map_err(|_| TimerError::ClockUnavailable("elapsed time out of range".to_string()))
    }

    fn sleep_ms(&mut self, millis: Millis) {
        thread::sleep(Duration::from_millis(millis));
    }
}

/// One countdown display update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tick {
    pub text: String,
    pub is_final: bool,
}

impl Tick {
    fn new(remaining_ms: Millis, is_final: bool) -> Self {
        Self {
            text: format_duration(remaining_ms),
            is_final,
        }
    }
}

/// A single countdown session toward a fixed target.
#[derive(Debug)]
pub struct Countdown {
    target: Millis,
}

impl Countdown {
    pub fn new(target: Millis) -> Self {
        Self { target }
    }

    /// Blocks until the target has elapsed, emitting a tick per second.
    ///
    /// Targets under a second are a single sleep with no ticks. Longer
    /// targets first sleep off the sub-second remainder so later ticks land
    /// on whole seconds, then measure how far the clock has drifted from the
    /// logical elapsed time on every tick and shorten the next sleep by that
    /// much. A tick that is already more than a second late does not sleep.
    ///
    /// `on_complete` runs once, after the final tick.
    pub fn run<C, T, F>(self, clock: &mut C, mut on_tick: T, on_complete: F) -> Result<(), TimerError>
    where
        C: Clock,
        T: FnMut(&Tick),
        F: FnOnce(),
    {
        if self.target < TICK_MS {
            clock.sleep_ms(self.target);
            on_complete();
            return Ok(());
        }

        on_tick(&Tick::new(self.target, false));

        let offset = self.target % TICK_MS;
        if offset > 0 {
            clock.sleep_ms(offset);
        }

        let start = clock.now_ms()?;
        let working = self.target - offset;
        let mut elapsed: Millis = 0;
        loop {
            if elapsed >= working {
                on_tick(&Tick::new(working.saturating_sub(elapsed), true));
                break;
            }

            let measured = clock.now_ms()?.saturating_sub(start);
            let drift = measured as i64 - elapsed as i64;
            // The first remaining value was already shown before the offset sleep.
            if elapsed > 0 {
                on_tick(&Tick::new(working - elapsed, false));
            }

            let sleep_time = TICK_MS as i64 - drift;
            if sleep_time > 0 {
                clock.sleep_ms(sleep_time as Millis);
            } else {
                debug!("countdown is {drift}ms behind, skipping sleep");
            }
            elapsed += TICK_MS;
        }

        on_complete();
        Ok(())
    }
}

/// Redraws the countdown on a single terminal line.
pub struct TerminalDisplay<W: Write> {
    out: W,
    prompt: String,
    bell: bool,
    started: bool,
}

impl<W: Write> TerminalDisplay<W> {
    pub fn new(out: W, prompt: impl Into<String>, bell: bool) -> Self {
        Self {
            out,
            prompt: prompt.into(),
            bell,
            started: false,
        }
    }

    pub fn render(&mut self, tick: &Tick) {
        if let Err(err) = self.write_tick(tick) {
            warn!("failed to draw countdown: {err}");
        }
    }

    fn write_tick(&mut self, tick: &Tick) -> std::io::Result<()> {
        if !self.started {
            writeln!(self.out)?;
            self.started = true;
        }
        // Clear the line and return to column 0 before redrawing.
        write!(self.out, "\x1B[2K\r{}{}", self.prompt, tick.text)?;
        if tick.is_final {
            write!(self.out, "\n\n")?;
            if self.bell {
                write!(self.out, "\x07")?;
            }
        }
        self.out.flush()
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Simulated clock: sleeping advances time by the request plus a fixed
    /// lag, with optional one-off stalls keyed by sleep index.
    struct SimClock {
        now: Millis,
        lag: Millis,
        stalls: Vec<(usize, Millis)>,
        sleeps: Vec<Millis>,
    }

    impl SimClock {
        fn new(lag: Millis) -> Self {
            Self {
                now: 0,
                lag,
                stalls: Vec::new(),
                sleeps: Vec::new(),
            }
        }

        fn stall_after(mut self, sleep_index: usize, extra: Millis) -> Self {
            self.stalls.push((sleep_index, extra));
            self
        }
    }

    impl Clock for SimClock {
        fn now_ms(&self) -> Result<Millis, TimerError> {
            Ok(self.now)
        }

        fn sleep_ms(&mut self, millis: Millis) {
            let index = self.sleeps.len();
            self.sleeps.push(millis);
            self.now += millis + self.lag;
            for (at, extra) in &self.stalls {
                if *at == index {
                    self.now += extra;
                }
            }
        }
    }

    struct BrokenClock;

    impl Clock for BrokenClock {
        fn now_ms(&self) -> Result<Millis, TimerError> {
            Err(TimerError::ClockUnavailable("no clock".to_string()))
        }

        fn sleep_ms(&mut self, _millis: Millis) {}
    }

    enum Event {
        Tick(Tick),
        Complete,
    }

    fn record(target: Millis, clock: &mut impl Clock) -> Vec<Event> {
        let events = std::cell::RefCell::new(Vec::new());
        Countdown::new(target)
            .run(
                clock,
                |tick| events.borrow_mut().push(Event::Tick(tick.clone())),
                || events.borrow_mut().push(Event::Complete),
            )
            .unwrap();
        events.into_inner()
    }

    fn ticks(events: &[Event]) -> Vec<&Tick> {
        events
            .iter()
            .filter_map(|event| match event {
                Event::Tick(tick) => Some(tick),
                Event::Complete => None,
            })
            .collect()
    }

    #[test]
    fn sub_second_target_is_a_single_sleep() {
        let mut clock = SimClock::new(0);
        let events = record(750, &mut clock);

        assert_eq!(clock.sleeps, vec![750]);
        assert!(ticks(&events).is_empty());
        assert!(matches!(events.as_slice(), [Event::Complete]));
    }

    #[test]
    fn zero_target_completes_immediately() {
        let mut clock = SimClock::new(0);
        let events = record(0, &mut clock);

        assert_eq!(clock.sleeps, vec![0]);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn emits_one_tick_per_second_plus_the_initial_one() {
        for (target, working) in [(1_000, 1_000), (3_000, 3_000), (3_500, 3_000), (61_999, 61_000)] {
            let mut clock = SimClock::new(0);
            let events = record(target, &mut clock);
            let ticks = ticks(&events);

            assert_eq!(ticks.len() as u64, working / 1000 + 1, "target {target}");
            assert!(matches!(events.last(), Some(Event::Complete)));
            let completions = events
                .iter()
                .filter(|event| matches!(event, Event::Complete))
                .count();
            assert_eq!(completions, 1);
        }
    }

    #[test]
    fn ticks_count_down_to_zero() {
        let mut clock = SimClock::new(0);
        let events = record(3_500, &mut clock);
        let texts: Vec<&str> = ticks(&events).into_iter().map(|t| t.text.as_str()).collect();

        assert_eq!(
            texts,
            vec!["0:00:00:03", "0:00:00:02", "0:00:00:01", "0:00:00:00"]
        );
        let finals: Vec<bool> = ticks(&events).into_iter().map(|t| t.is_final).collect();
        assert_eq!(finals, vec![false, false, false, true]);
    }

    #[test]
    fn sleeps_off_the_sub_second_remainder_first() {
        let mut clock = SimClock::new(0);
        record(2_250, &mut clock);

        assert_eq!(clock.sleeps, vec![250, 1_000, 1_000]);
        assert_eq!(clock.now, 2_250);
    }

    #[test]
    fn lag_does_not_accumulate_over_long_runs() {
        let hour = 3_600_000;
        let mut clock = SimClock::new(7);
        record(hour, &mut clock);

        assert!(clock.now >= hour);
        assert!(clock.now - hour <= 20, "overshot by {}ms", clock.now - hour);
        // Every sleep after the first is shortened by the lag.
        assert!(clock.sleeps[1..].iter().all(|sleep| *sleep == 993));
    }

    #[test]
    fn a_long_stall_skips_sleeps_until_caught_up() {
        let mut clock = SimClock::new(0).stall_after(2, 4_500);
        let events = record(20_000, &mut clock);

        assert_eq!(clock.now, 20_000);
        assert_eq!(ticks(&events).len(), 21);
        assert!(clock.sleeps.contains(&500));
        assert_eq!(clock.sleeps.len(), 20 - 4);
    }

    #[test]
    fn clock_failure_aborts_the_run() {
        let mut completed = false;
        let result = Countdown::new(5_000).run(&mut BrokenClock, |_| {}, || completed = true);

        assert!(matches!(result, Err(TimerError::ClockUnavailable(_))));
        assert!(!completed);
    }

    #[test]
    fn display_redraws_in_place() {
        let mut display = TerminalDisplay::new(Vec::new(), "Time remaining: ", false);
        display.render(&Tick::new(2_000, false));
        display.render(&Tick::new(1_000, false));
        display.render(&Tick::new(0, true));

        let out = String::from_utf8(display.into_inner()).unwrap();
        assert_eq!(
            out,
            "\n\x1B[2K\rTime remaining: 0:00:00:02\
             \x1B[2K\rTime remaining: 0:00:00:01\
             \x1B[2K\rTime remaining: 0:00:00:00\n\n"
        );
    }

    #[test]
    fn display_rings_the_bell_when_done() {
        let mut display = TerminalDisplay::new(Vec::new(), "", true);
        display.render(&Tick::new(0, true));

        let out = String::from_utf8(display.into_inner()).unwrap();
        assert!(out.ends_with("0:00:00:00\n\n\x07"));
    }
}
