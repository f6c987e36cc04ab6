//! # Fixed-Timestep Tick Loop
//!
//! Paces the authoritative loop at the configured tick rate and keeps
//! timing statistics. A loop that falls behind catches up by running
//! several ticks back to back, at most [`MAX_CATCH_UP`] per wake-up; any
//! backlog beyond that is dropped.

use std::time::{Duration, Instant};

/// Most ticks run back to back before the backlog is dropped.
pub const MAX_CATCH_UP: u32 = 5;

/// Tick timing statistics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickStats {
    /// Fastest tick, in microseconds.
    pub min_tick_us: u64,
    /// Slowest tick, in microseconds.
    pub max_tick_us: u64,
    /// Rolling average, in microseconds.
    pub avg_tick_us: u64,
    /// Ticks that took longer than their budget.
    pub late_ticks: u64,
    /// Ticks measured.
    pub total_ticks: u64,
    /// Ticks skipped because the loop fell too far behind.
    pub dropped_ticks: u64,
}

impl TickStats {
    fn fresh(budget: Duration) -> Self {
        Self {
            min_tick_us: u64::MAX,
            max_tick_us: 0,
            avg_tick_us: micros(budget),
            late_ticks: 0,
            total_ticks: 0,
            dropped_ticks: 0,
        }
    }
}

fn micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

/// Fixed-timestep pacing.
#[derive(Debug)]
pub struct TickLoop {
    tick_duration: Duration,
    last_poll: Instant,
    accumulator: Duration,
    tick_count: u64,
    stats: TickStats,
}

impl TickLoop {
    /// Loop running `tick_rate` ticks per second.
    #[must_use]
    pub fn new(tick_rate: u32) -> Self {
        let tick_duration = Duration::from_micros(1_000_000 / u64::from(tick_rate.max(1)));
        Self {
            tick_duration,
            last_poll: Instant::now(),
            accumulator: Duration::ZERO,
            tick_count: 0,
            stats: TickStats::fresh(tick_duration),
        }
    }

    /// Returns true while a tick is due. Call in a loop until it returns false.
    #[must_use]
    pub fn should_tick(&mut self) -> bool {
        let now = Instant::now();
        self.accumulator += now.duration_since(self.last_poll);
        self.last_poll = now;

        let limit = self.tick_duration * MAX_CATCH_UP;
        if self.accumulator > limit {
            let excess = self.accumulator - limit;
            let dropped = excess.as_nanos() / self.tick_duration.as_nanos().max(1);
            self.stats.dropped_ticks += u64::try_from(dropped).unwrap_or(u64::MAX);
            self.accumulator = limit;
            tracing::warn!(dropped = %dropped, "tick_backlog_dropped");
        }
        self.accumulator >= self.tick_duration
    }

    /// Starts a tick; pass the returned instant to [`TickLoop::end_tick`].
    #[must_use]
    pub fn begin_tick(&mut self) -> Instant {
        self.accumulator = self.accumulator.saturating_sub(self.tick_duration);
        self.tick_count += 1;
        Instant::now()
    }

    /// Records how long the tick took.
    pub fn end_tick(&mut self, start: Instant) {
        let elapsed = start.elapsed();
        let elapsed_us = micros(elapsed);

        let stats = &mut self.stats;
        stats.total_ticks += 1;
        stats.min_tick_us = stats.min_tick_us.min(elapsed_us);
        stats.max_tick_us = stats.max_tick_us.max(elapsed_us);
        stats.avg_tick_us = (stats.avg_tick_us * 15 + elapsed_us) / 16;
        if elapsed > self.tick_duration {
            stats.late_ticks += 1;
            tracing::debug!(tick = self.tick_count, elapsed_us, "tick_late");
        }
    }

    /// Sleeps until the next tick is due.
    pub fn wait_for_next_tick(&self) {
        let owed = self.tick_duration.saturating_sub(self.accumulator);
        let remaining = owed.saturating_sub(self.last_poll.elapsed());
        if !remaining.is_zero() {
            std::thread::sleep(remaining);
        }
    }

    /// Ticks started so far.
    #[must_use]
    pub const fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Timing statistics.
    #[must_use]
    pub const fn stats(&self) -> &TickStats {
        &self.stats
    }

    /// Target duration of one tick.
    #[must_use]
    pub const fn tick_duration(&self) -> Duration {
        self.tick_duration
    }

    /// Clears statistics.
    pub fn reset_stats(&mut self) {
        self.stats = TickStats::fresh(self.tick_duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_duration() {
        let tick_loop = TickLoop::new(20);
        assert_eq!(tick_loop.tick_count(), 0);
        assert_eq!(tick_loop.tick_duration(), Duration::from_millis(50));
    }

    #[test]
    fn test_tick_becomes_due() {
        let mut tick_loop = TickLoop::new(1000);
        std::thread::sleep(Duration::from_millis(3));
        assert!(tick_loop.should_tick());

        let start = tick_loop.begin_tick();
        tick_loop.end_tick(start);
        assert_eq!(tick_loop.tick_count(), 1);
        assert_eq!(tick_loop.stats().total_ticks, 1);
    }

    #[test]
    fn test_backlog_is_capped() {
        let mut tick_loop = TickLoop::new(1000);
        std::thread::sleep(Duration::from_millis(30));

        let mut ran = 0;
        while tick_loop.should_tick() {
            let start = tick_loop.begin_tick();
            tick_loop.end_tick(start);
            ran += 1;
            if ran > 100 {
                break;
            }
        }
        // A few extra ticks may become due while draining.
        assert!(ran <= MAX_CATCH_UP + 3, "ran {ran} ticks");
        assert!(tick_loop.stats().dropped_ticks > 0);
    }
}
