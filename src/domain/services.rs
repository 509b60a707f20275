//! External services for the session aggregate.
//!
//! Time is the aggregate's only external dependency. It is injected so the
//! engine can be driven deterministically in tests, and wrapped so a single
//! engine instance never observes the clock moving backward.

use crate::domain::types::TimestampUtc;
use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex, MutexGuard};

/// Source of wall-clock readings.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> TimestampUtc;
}

/// The real wall clock.
#[derive(Debug, Default)]
pub struct SystemTime;

impl TimeSource for SystemTime {
    fn now(&self) -> TimestampUtc {
        TimestampUtc::now()
    }
}

/// Hand-cranked time source for tests.
#[derive(Debug)]
pub struct ManualTime {
    now: Mutex<DateTime<Utc>>,
}

impl ManualTime {
    pub fn starting_at(start: TimestampUtc) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(start.0),
        })
    }

    /// Moves the clock forward by whole seconds.
    pub fn advance_secs(&self, secs: i64) {
        let mut now = lock_unpoisoned(&self.now);
        *now += Duration::seconds(secs);
    }

    /// Sets the clock to an absolute instant, which may be in the past.
    pub fn set(&self, at: TimestampUtc) {
        let mut now = lock_unpoisoned(&self.now);
        *now = at.0;
    }
}

impl TimeSource for ManualTime {
    fn now(&self) -> TimestampUtc {
        TimestampUtc(*lock_unpoisoned(&self.now))
    }
}

/// Monotonic-safe clock handed to the aggregate and coordinator.
///
/// Wall-clock reads are clamped so that within one clock instance `now()`
/// never returns an instant earlier than a previously returned one, keeping
/// elapsed-time folding non-negative even across an NTP step.
#[derive(Clone)]
pub struct SessionClock {
    source: Arc<dyn TimeSource>,
    floor: Arc<Mutex<DateTime<Utc>>>,
}

impl SessionClock {
    /// Clock backed by the real wall clock.
    pub fn system() -> Self {
        Self::new(Arc::new(SystemTime))
    }

    /// Clock backed by an arbitrary source (tests use [`ManualTime`]).
    pub fn new(source: Arc<dyn TimeSource>) -> Self {
        let floor = source.now().0;
        Self {
            source,
            floor: Arc::new(Mutex::new(floor)),
        }
    }

    /// Current timestamp, never earlier than any previously returned one.
    pub fn now(&self) -> TimestampUtc {
        let observed = self.source.now();
        let mut floor = lock_unpoisoned(&self.floor);
        if observed.0 < *floor {
            tracing::warn!(
                observed = %observed.0,
                floor = %*floor,
                "wall clock moved backward, clamping to last observed instant"
            );
            TimestampUtc(*floor)
        } else {
            *floor = observed.0;
            observed
        }
    }
}

impl std::fmt::Debug for SessionClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClock").finish_non_exhaustive()
    }
}

/// Services injected into the session aggregate for command handling.
#[derive(Debug, Clone)]
pub struct SessionServices {
    pub clock: SessionClock,
}

impl Default for SessionServices {
    fn default() -> Self {
        Self {
            clock: SessionClock::system(),
        }
    }
}

impl SessionServices {
    pub fn with_clock(clock: SessionClock) -> Self {
        Self { clock }
    }
}

/// A poisoned clock mutex only means another thread panicked mid-read; the
/// guarded instant is still valid.
fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_time_advances() {
        let time = ManualTime::starting_at(TimestampUtc::now());
        let t0 = time.now();
        time.advance_secs(90);
        assert_eq!(time.now().saturating_secs_since(&t0), 90);
    }

    #[test]
    fn clock_never_moves_backward() {
        let time = ManualTime::starting_at(TimestampUtc::now());
        let clock = SessionClock::new(time.clone());

        let t0 = clock.now();
        time.advance_secs(-3600);
        let t1 = clock.now();
        assert_eq!(t1, t0);

        time.advance_secs(7200);
        let t2 = clock.now();
        assert!(t2 > t1);
    }
}
