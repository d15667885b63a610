//! Announcement throttling.
//!
//! At most one instruction is spoken per interval. The gate has no timer of
//! its own: the `Ready`/`Cooling` phase is recomputed from the clock on every
//! check.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Minimum spacing between two spoken instructions.
pub const DEFAULT_ANNOUNCEMENT_INTERVAL: Duration = Duration::from_secs(6);

/// Time source for the gate, as an offset from an arbitrary session epoch.
pub trait Clock {
    fn now(&self) -> Duration;
}

/// Monotonic clock anchored at construction.
#[derive(Clone, Debug)]
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
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Hand-advanced clock for replay and tests. Clones share the same time.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    millis: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, now: Duration) {
        self.millis.store(now.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.millis.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_millis(self.millis.load(Ordering::SeqCst))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GatePhase {
    Ready,
    Cooling,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AnnouncementState {
    /// `None` until the first announcement, so the first one is immediate.
    pub last_announcement: Option<Duration>,
    pub interval: Duration,
}

impl Default for AnnouncementState {
    fn default() -> Self {
        Self {
            last_announcement: None,
            interval: DEFAULT_ANNOUNCEMENT_INTERVAL,
        }
    }
}

/// Two-state throttle over [`AnnouncementState`].
#[derive(Clone, Debug, Default)]
pub struct AnnouncementGate {
    state: AnnouncementState,
}

impl AnnouncementGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            state: AnnouncementState {
                last_announcement: None,
                interval,
            },
        }
    }

    pub fn state(&self) -> AnnouncementState {
        self.state
    }

    pub fn interval(&self) -> Duration {
        self.state.interval
    }

    /// True iff no announcement was made yet or `now - last >= interval`.
    ///
    /// A clock reading earlier than the last announcement counts as still
    /// cooling.
    pub fn should_announce(&self, now: Duration) -> bool {
        match self.state.last_announcement {
            None => true,
            Some(last) => now
                .checked_sub(last)
                .is_some_and(|elapsed| elapsed >= self.state.interval),
        }
    }

    /// Mark an announcement at `now`. Call only after the phrase was handed off.
    pub fn record(&mut self, now: Duration) {
        self.state.last_announcement = Some(now);
    }

    /// Check and record in one step.
    pub fn try_announce(&mut self, now: Duration) -> bool {
        if self.should_announce(now) {
            self.record(now);
            true
        } else {
            false
        }
    }

    pub fn phase(&self, now: Duration) -> GatePhase {
        if self.should_announce(now) {
            GatePhase::Ready
        } else {
            GatePhase::Cooling
        }
    }

    /// Time left until the gate reopens, zero when ready.
    pub fn remaining(&self, now: Duration) -> Duration {
        match self.state.last_announcement {
            None => Duration::ZERO,
            Some(last) => (last + self.state.interval).saturating_sub(now),
        }
    }
}
