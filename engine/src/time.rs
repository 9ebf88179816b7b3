use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Time source used by every component that reads or waits on the clock.
/// Production wires [`SystemClock`]; tests drive a [`ManualClock`].
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Suspends the caller until `at` (returns immediately when `at` is in
    /// the past).
    async fn sleep_until(&self, at: DateTime<Utc>);
}

#[derive(Clone, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep_until(&self, at: DateTime<Utc>) {
        let now = Utc::now();
        if at <= now {
            return;
        }
        match (at - now).to_std() {
            Ok(d) => tokio::time::sleep(d).await,
            Err(_) => {}
        }
    }
}

/// Test clock advanced explicitly with [`ManualClock::advance`].
pub struct ManualClock {
    now: parking_lot::Mutex<DateTime<Utc>>,
    tick: tokio::sync::Notify,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: parking_lot::Mutex::new(start),
            tick: tokio::sync::Notify::new(),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut g = self.now.lock();
        *g = *g + chrono::Duration::milliseconds(by.as_millis() as i64);
        drop(g);
        self.tick.notify_waiters();
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
        self.tick.notify_waiters();
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }

    async fn sleep_until(&self, at: DateTime<Utc>) {
        loop {
            // Register interest before the time check so an advance between
            // the check and the await is not lost.
            let notified = self.tick.notified();
            if *self.now.lock() >= at {
                return;
            }
            notified.await;
        }
    }
}

/// Millisecond epoch helpers used at the repository boundary, where all
/// timestamps persist as `BIGINT`.
pub fn to_ms(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

pub fn from_ms(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn manual_clock_releases_sleepers_on_advance() {
        let clock = std::sync::Arc::new(ManualClock::new(Utc::now()));
        let deadline = clock.now() + chrono::Duration::seconds(30);

        let waiter = {
            let clock = clock.clone();
            tokio::spawn(async move { clock.sleep_until(deadline).await })
        };

        clock.advance(Duration::from_secs(10));
        assert!(!waiter.is_finished());

        clock.advance(Duration::from_secs(25));
        waiter.await.unwrap();
    }

    #[test]
    fn ms_round_trip() {
        let now = Utc::now();
        let back = from_ms(to_ms(now)).unwrap();
        assert_eq!(to_ms(now), to_ms(back));
    }
}
