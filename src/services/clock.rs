//! Time source and sleep capability, injectable so throttling and backoff can be
//! tested without waiting on the wall clock.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::time::Instant;

#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    /// Wall-clock time in whole seconds since the Unix epoch
    fn unix_secs(&self) -> i64;

    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn unix_secs(&self) -> i64 {
        Utc::now().timestamp()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Clock that only moves when slept on or advanced. Records every sleep.
#[derive(Debug, Clone)]
pub struct ManualClock {
    start: Instant,
    start_unix_secs: i64,
    state: Arc<Mutex<ManualState>>,
}

#[derive(Debug, Default)]
struct ManualState {
    elapsed: Duration,
    sleeps: Vec<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::starting_at(Utc::now().timestamp())
    }

    /// Manual clock whose wall time starts at `unix_secs`
    pub fn starting_at(unix_secs: i64) -> Self {
        Self {
            start: Instant::now(),
            start_unix_secs: unix_secs,
            state: Arc::new(Mutex::new(ManualState::default())),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.state.lock().elapsed += by;
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.state.lock().sleeps.clone()
    }

    pub fn total_slept(&self) -> Duration {
        self.state.lock().sleeps.iter().sum()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + self.state.lock().elapsed
    }

    fn unix_secs(&self) -> i64 {
        self.start_unix_secs + self.state.lock().elapsed.as_secs() as i64
    }

    async fn sleep(&self, duration: Duration) {
        let mut state = self.state.lock();
        state.elapsed += duration;
        state.sleeps.push(duration);
    }
}
