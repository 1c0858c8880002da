//! Heartbeat ping scheduling.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// What a heartbeat tick asks of the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatTick {
    /// Keep ticking
    Continue,
    /// The owner is gone; stop the loop
    Stop,
}

/// Spawn a recurring task that calls `tick` every `interval`.
///
/// The first tick fires one full interval after spawning. Aborting the
/// returned handle stops the heartbeat.
pub fn spawn_heartbeat<F>(interval: Duration, mut tick: F) -> JoinHandle<()>
where
    F: FnMut() -> HeartbeatTick + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if tick() == HeartbeatTick::Stop {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_ticks_once_per_interval() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let handle = spawn_heartbeat(Duration::from_secs(30), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            HeartbeatTick::Continue
        });

        time::sleep(Duration::from_millis(29_999)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        time::sleep(Duration::from_millis(2)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        time::sleep(Duration::from_secs(60)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_stops_ticks() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let handle = spawn_heartbeat(Duration::from_secs(1), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            HeartbeatTick::Continue
        });

        time::sleep(Duration::from_millis(1500)).await;
        handle.abort();
        time::sleep(Duration::from_secs(10)).await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_ends_the_loop() {
        let handle = spawn_heartbeat(Duration::from_secs(1), || HeartbeatTick::Stop);
        handle.await.unwrap();
    }
}
