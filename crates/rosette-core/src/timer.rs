use std::{fmt, time::Duration};
use tokio::time::Instant;

pub(crate) type TimerCallback = Box<dyn FnMut() -> eyre::Result<()> + Send>;

/// Identifies a timer within its node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub(crate) u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A snapshot of a timer's schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerInfo {
    pub period: Duration,
    /// The instant the timer fires next. Always `created + n * period`.
    pub next_fire_time: Instant,
    pub fire_count: u64,
}

/// A periodic callback owned by a node.
///
/// Deadlines sit on a fixed grid starting at the creation instant. The next
/// deadline is derived from the previous deadline rather than from the time
/// the callback actually ran, so late firings do not accumulate skew.
pub(crate) struct Timer {
    period: Duration,
    next_deadline: Instant,
    fire_count: u64,
    callback: TimerCallback,
}

impl Timer {
    pub fn new(period: Duration, start: Instant, callback: TimerCallback) -> Self {
        Self {
            period,
            next_deadline: start + period,
            fire_count: 0,
            callback,
        }
    }

    pub fn next_deadline(&self) -> Instant {
        self.next_deadline
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.next_deadline <= now
    }

    /// Runs the callback once and moves the deadline one period forward.
    pub fn fire(&mut self) -> eyre::Result<()> {
        self.next_deadline += self.period;
        self.fire_count += 1;
        (self.callback)()
    }

    pub fn info(&self) -> TimerInfo {
        TimerInfo {
            period: self.period,
            next_fire_time: self.next_deadline,
            fire_count: self.fire_count,
        }
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("period", &self.period)
            .field("next_deadline", &self.next_deadline)
            .field("fire_count", &self.fire_count)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    fn counting_timer(period_ms: u64, start: Instant) -> (Timer, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let timer = Timer::new(
            Duration::from_millis(period_ms),
            start,
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );
        (timer, count)
    }

    #[test]
    fn test_first_deadline_one_period_after_start() {
        let start = Instant::now();
        let (timer, _) = counting_timer(100, start);

        assert_eq!(timer.next_deadline(), start + Duration::from_millis(100));
        assert!(!timer.is_due(start));
        assert!(timer.is_due(start + Duration::from_millis(100)));
    }

    #[test]
    fn test_fire_advances_on_grid() {
        let start = Instant::now();
        let (mut timer, count) = counting_timer(50, start);

        for n in 1..=10u32 {
            timer.fire().unwrap();
            assert_eq!(
                timer.next_deadline(),
                start + Duration::from_millis(50) * (n + 1)
            );
        }

        assert_eq!(count.load(Ordering::SeqCst), 10);
        assert_eq!(timer.info().fire_count, 10);
    }

    #[test]
    fn test_late_timer_stays_due_until_caught_up() {
        let start = Instant::now();
        let (mut timer, _) = counting_timer(10, start);
        let now = start + Duration::from_millis(35);

        let mut fired = 0;
        while timer.is_due(now) {
            timer.fire().unwrap();
            fired += 1;
        }

        assert_eq!(fired, 3);
        assert_eq!(timer.next_deadline(), start + Duration::from_millis(40));
    }

    #[test]
    fn test_fire_returns_callback_error() {
        let mut timer = Timer::new(
            Duration::from_millis(10),
            Instant::now(),
            Box::new(|| Err(eyre::eyre!("sensor offline"))),
        );

        assert!(timer.fire().is_err());
        assert_eq!(timer.info().fire_count, 1);
    }
}
