//! Attempt countdown.
//!
//! [`CountdownState`] is the pure `Idle → Running → Expired` machine;
//! [`Countdown`] drives it from a tokio interval task, publishes every tick
//! on a watch channel and runs the expiry callback at most once.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::clock::Clock;

/// Default spacing between ticks.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Seconds left: `duration − elapsed`, floored at zero.
pub fn remaining_seconds(started_at: DateTime<Utc>, duration_secs: u64, now: DateTime<Utc>) -> u64 {
    let elapsed_secs = (now - started_at).num_seconds().max(0) as u64;
    duration_secs.saturating_sub(elapsed_secs)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CountdownPhase {
    Idle,
    Running,
    Expired,
    /// Stopped before reaching zero, e.g. by a manual submit.
    Cancelled,
}

/// Snapshot published on every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountdownStatus {
    pub phase: CountdownPhase,
    pub remaining_secs: u64,
}

/// Result of feeding one tick to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Still running with this many seconds left.
    Remaining(u64),
    /// Reached zero on this tick. Produced exactly once.
    Expired,
    /// Not running; the tick has no effect.
    Ignored,
}

#[derive(Debug, Clone)]
pub struct CountdownState {
    phase: CountdownPhase,
    started_at: Option<DateTime<Utc>>,
    duration_secs: u64,
    remaining_secs: u64,
}

impl CountdownState {
    pub fn new() -> Self {
        Self {
            phase: CountdownPhase::Idle,
            started_at: None,
            duration_secs: 0,
            remaining_secs: 0,
        }
    }

    /// `Idle → Running`. Returns `false` in any other phase.
    pub fn start(&mut self, started_at: DateTime<Utc>, duration_secs: u64) -> bool {
        if self.phase != CountdownPhase::Idle {
            return false;
        }
        self.phase = CountdownPhase::Running;
        self.started_at = Some(started_at);
        self.duration_secs = duration_secs;
        self.remaining_secs = duration_secs;
        true
    }

    pub fn tick(&mut self, now: DateTime<Utc>) -> Tick {
        let Some(started_at) = self.started_at else {
            return Tick::Ignored;
        };
        if self.phase != CountdownPhase::Running {
            return Tick::Ignored;
        }
        self.remaining_secs = remaining_seconds(started_at, self.duration_secs, now);
        if self.remaining_secs == 0 {
            self.phase = CountdownPhase::Expired;
            Tick::Expired
        } else {
            Tick::Remaining(self.remaining_secs)
        }
    }

    /// `Running → Cancelled`. Returns `false` in any other phase.
    pub fn cancel(&mut self) -> bool {
        if self.phase != CountdownPhase::Running {
            return false;
        }
        self.phase = CountdownPhase::Cancelled;
        true
    }

    pub fn status(&self) -> CountdownStatus {
        CountdownStatus {
            phase: self.phase,
            remaining_secs: self.remaining_secs,
        }
    }
}

impl Default for CountdownState {
    fn default() -> Self {
        Self::new()
    }
}

/// A cancellable countdown task.
///
/// Dropping the countdown cancels its task.
pub struct Countdown {
    clock: Arc<dyn Clock>,
    tick_interval: Duration,
    low_time_warning_secs: Option<u64>,
    state: Arc<Mutex<CountdownState>>,
    status_tx: Arc<watch::Sender<CountdownStatus>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Countdown {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let state = CountdownState::new();
        let (status_tx, _) = watch::channel(state.status());
        Self {
            clock,
            tick_interval: DEFAULT_TICK_INTERVAL,
            low_time_warning_secs: None,
            state: Arc::new(Mutex::new(state)),
            status_tx: Arc::new(status_tx),
            task: Mutex::new(None),
        }
    }

    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    /// Log a single warning once remaining time drops to `secs`.
    pub fn with_low_time_warning(mut self, secs: u64) -> Self {
        self.low_time_warning_secs = Some(secs);
        self
    }

    /// Start ticking. `on_expire` runs once, on the tick that reaches zero.
    ///
    /// Returns `false` (and drops `on_expire` unused) if the countdown was
    /// already started. Must be called from within a tokio runtime.
    pub fn start<F>(&self, started_at: DateTime<Utc>, duration_secs: u64, on_expire: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if !state.start(started_at, duration_secs) {
                tracing::debug!("countdown already started");
                return false;
            }
            self.status_tx.send_replace(state.status());
        }

        let clock = Arc::clone(&self.clock);
        let state = Arc::clone(&self.state);
        let status_tx = Arc::clone(&self.status_tx);
        let tick_interval = self.tick_interval;
        let warn_at = self.low_time_warning_secs;

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut on_expire = Some(on_expire);
            let mut warned = false;

            loop {
                interval.tick().await;
                let (tick, status) = {
                    let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                    let tick = state.tick(clock.now());
                    (tick, state.status())
                };

                match tick {
                    Tick::Remaining(secs) => {
                        status_tx.send_replace(status);
                        if let Some(threshold) = warn_at {
                            if !warned && secs <= threshold {
                                tracing::warn!(remaining_secs = secs, "time is running out");
                                warned = true;
                            }
                        }
                    }
                    Tick::Expired => {
                        status_tx.send_replace(status);
                        tracing::info!("countdown expired");
                        if let Some(callback) = on_expire.take() {
                            callback();
                        }
                        break;
                    }
                    Tick::Ignored => break,
                }
            }
        });

        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        true
    }

    /// Stop ticking without firing the expiry callback.
    ///
    /// Returns `true` if the countdown was running.
    pub fn cancel(&self) -> bool {
        let cancelled = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let cancelled = state.cancel();
            if cancelled {
                self.status_tx.send_replace(state.status());
            }
            cancelled
        };
        if let Some(handle) = self.task.lock().unwrap_or_else(PoisonError::into_inner).take() {
            handle.abort();
        }
        if cancelled {
            tracing::debug!("countdown cancelled");
        }
        cancelled
    }

    pub fn status(&self) -> CountdownStatus {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .status()
    }

    /// Receive every published tick.
    pub fn subscribe(&self) -> watch::Receiver<CountdownStatus> {
        self.status_tx.subscribe()
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().unwrap_or_else(PoisonError::into_inner).take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MonotonicClock;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn remaining_is_floored_at_zero() {
        assert_eq!(remaining_seconds(at(0), 60, at(0)), 60);
        assert_eq!(remaining_seconds(at(0), 60, at(59)), 1);
        assert_eq!(remaining_seconds(at(0), 60, at(60)), 0);
        assert_eq!(remaining_seconds(at(0), 60, at(600)), 0);
        // A clock behind the start never grants extra time.
        assert_eq!(remaining_seconds(at(10), 60, at(0)), 60);
    }

    #[test]
    fn state_machine_expires_once() {
        let mut state = CountdownState::new();
        assert_eq!(state.tick(at(0)), Tick::Ignored);
        assert!(state.start(at(0), 60));
        assert!(!state.start(at(5), 60));

        assert_eq!(state.tick(at(30)), Tick::Remaining(30));
        assert_eq!(state.tick(at(60)), Tick::Expired);
        assert_eq!(state.tick(at(61)), Tick::Ignored);
        assert_eq!(state.status().phase, CountdownPhase::Expired);
        assert!(!state.cancel());
    }

    #[test]
    fn cancel_only_while_running() {
        let mut state = CountdownState::new();
        assert!(!state.cancel());
        state.start(at(0), 10);
        assert!(state.cancel());
        assert_eq!(state.tick(at(20)), Tick::Ignored);
        assert_eq!(state.status().phase, CountdownPhase::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn fires_expiry_exactly_once() {
        let clock = Arc::new(MonotonicClock::anchored_at(at(0)));
        let countdown = Countdown::new(clock.clone());
        let fired = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&fired);
        assert!(countdown.start(clock.now(), 3, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let mut rx = countdown.subscribe();
        rx.wait_for(|s| s.phase == CountdownPhase::Expired)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(countdown.status().remaining_secs, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_each_second() {
        let clock = Arc::new(MonotonicClock::anchored_at(at(0)));
        let countdown = Countdown::new(clock.clone());
        let mut rx = countdown.subscribe();
        countdown.start(clock.now(), 5, || {});

        let mut seen = Vec::new();
        while rx.changed().await.is_ok() {
            let status = *rx.borrow_and_update();
            seen.push(status.remaining_secs);
            if status.phase == CountdownPhase::Expired {
                break;
            }
        }
        assert_eq!(seen.first(), Some(&5));
        assert_eq!(seen.last(), Some(&0));
        assert!(seen.windows(2).all(|w| w[0] >= w[1]));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_countdown_never_fires() {
        let clock = Arc::new(MonotonicClock::anchored_at(at(0)));
        let countdown = Countdown::new(clock.clone());
        let fired = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&fired);
        countdown.start(clock.now(), 2, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(countdown.cancel());
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(countdown.status().phase, CountdownPhase::Cancelled);
        assert!(!countdown.cancel());
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_is_rejected() {
        let clock = Arc::new(MonotonicClock::anchored_at(at(0)));
        let countdown = Countdown::new(clock.clone());
        assert!(countdown.start(clock.now(), 60, || {}));
        assert!(!countdown.start(clock.now(), 60, || {}));
    }
}
