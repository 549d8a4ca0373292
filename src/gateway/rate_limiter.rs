//! Per-client fixed-window rate limiting

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Source of the current time for window accounting
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock backed by `Instant::now`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock for deterministic tests and simulations
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

/// Outcome of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted { remaining: u32, reset_after: Duration },
    Rejected { retry_after: Duration },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted { .. })
    }
}

/// Quota left to a client in its current window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub limit: u32,
    pub remaining: u32,
    pub reset_after: Duration,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    start: Instant,
    count: u32,
}

/// Fixed-window request counter keyed by client identity
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    windows: DashMap<String, Window>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self::with_clock(limit, window, Arc::new(SystemClock))
    }

    pub fn with_clock(limit: u32, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            limit,
            window,
            windows: DashMap::new(),
            clock,
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// End of a window opened at `start`; `None` when it lies past the clock's range
    fn window_end(&self, start: Instant) -> Option<Instant> {
        start.checked_add(self.window)
    }

    /// Time left in a window opened at `start`
    fn reset_after(&self, start: Instant, now: Instant) -> Duration {
        self.window_end(start)
            .map_or(self.window, |end| end.saturating_duration_since(now))
    }

    fn is_open(&self, start: Instant, now: Instant) -> bool {
        self.window_end(start).map_or(true, |end| now < end)
    }

    /// Admit or reject a request from `client_id` at the limiter's current time
    pub fn check(&self, client_id: &str) -> Admission {
        self.admit(client_id, self.clock.now())
    }

    /// Count a request from `client_id` at `now`.
    ///
    /// A request landing exactly on `start + window` opens a new window.
    pub fn admit(&self, client_id: &str, now: Instant) -> Admission {
        let mut window = self
            .windows
            .entry(client_id.to_string())
            .or_insert(Window { start: now, count: 0 });

        if matches!(self.window_end(window.start), Some(end) if now >= end) {
            window.start = now;
            window.count = 0;
        }

        window.count = window.count.saturating_add(1);
        let reset_after = self.reset_after(window.start, now);

        if window.count <= self.limit {
            Admission::Admitted {
                remaining: self.limit - window.count,
                reset_after,
            }
        } else {
            debug!(client = %client_id, count = window.count, "Request over limit");
            Admission::Rejected {
                retry_after: reset_after,
            }
        }
    }

    /// Current quota for `client_id` without counting a request
    pub fn status(&self, client_id: &str, now: Instant) -> Quota {
        let full = Quota {
            limit: self.limit,
            remaining: self.limit,
            reset_after: Duration::ZERO,
        };

        match self.windows.get(client_id) {
            Some(window) if self.is_open(window.start, now) => Quota {
                limit: self.limit,
                remaining: self.limit.saturating_sub(window.count),
                reset_after: self.reset_after(window.start, now),
            },
            _ => full,
        }
    }

    /// Drop windows whose period has elapsed; returns how many were removed
    pub fn evict_expired(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, window| self.is_open(window.start, now));
        before.saturating_sub(self.windows.len())
    }

    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }

    /// Periodically evict expired windows in the background
    pub fn spawn_sweeper(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        info!(period_secs = period.as_secs(), "Started rate limit sweeper");
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let removed = self.evict_expired(self.clock.now());
                if removed > 0 {
                    debug!(removed, remaining = self.tracked_clients(), "Evicted expired rate limit windows");
                }
            }
        })
    }
}
