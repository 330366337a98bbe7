//! Periodic callback scheduler.
//!
//! Each timer is a tokio task driving an async handler on a fixed interval.
//! Handlers run to completion before the next tick is honored; a slow cycle
//! delays subsequent ones instead of piling up.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Owns the timer tasks and their shutdown signal.
pub struct TimerManager {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl TimerManager {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        TimerManager {
            shutdown,
            tasks: Vec::new(),
        }
    }

    /// Register a handler fired every `interval`, starting one interval from
    /// now.
    pub fn add_timer<F, Fut>(&mut self, interval: Duration, mut handler: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let mut shutdown = self.shutdown.subscribe();
        self.tasks.push(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => handler().await,
                    _ = shutdown.changed() => break,
                }
            }
        }));
    }

    pub fn num_timers(&self) -> usize {
        self.tasks.len()
    }

    /// Signal shutdown and join every timer task.
    pub async fn stop(mut self) {
        let _ = self.shutdown.send(true);
        futures::future::join_all(self.tasks.drain(..)).await;
    }
}

impl Default for TimerManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn timer_fires_on_interval_and_stops() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut mgr = TimerManager::new();
        {
            let fired = Arc::clone(&fired);
            mgr.add_timer(Duration::from_millis(100), move || {
                let fired = Arc::clone(&fired);
                async move {
                    fired.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
        assert_eq!(mgr.num_timers(), 1);

        tokio::time::sleep(Duration::from_millis(350)).await;
        let seen = fired.load(Ordering::SeqCst);
        assert!(seen >= 3, "expected >= 3 ticks, saw {seen}");

        mgr.stop().await;
        let after_stop = fired.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(fired.load(Ordering::SeqCst), after_stop);
    }
}
