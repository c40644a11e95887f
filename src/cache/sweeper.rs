// =============================================================================
// Periodic Task -- cancellable background loop
// =============================================================================
//
// A tokio interval bound to a `watch` shutdown channel. The task stops when
// the channel flips to `true` or its sender is dropped; an in-progress tick
// always runs to completion first.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use super::market_data_cache::{MarketDataCache, DEFAULT_CLEANUP_INTERVAL};

/// Handle to a spawned periodic task. Dropping it stops the task.
pub struct PeriodicTask {
    name: &'static str,
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    /// Spawn `tick` every `period` on the current tokio runtime. The first
    /// tick fires one full period after spawning.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F>(name: &'static str, period: Duration, tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = spawn_with_shutdown(name, period, shutdown_rx, tick);
        Self {
            name,
            shutdown_tx,
            handle,
        }
    }

    /// Signal the task to stop after its current tick.
    pub fn stop(&self) {
        // Err only means the task already exited.
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Stop the task and wait for it to exit.
    pub async fn shutdown(self) {
        self.stop();
        if let Err(e) = self.handle.await {
            warn!(task = self.name, error = %e, "periodic task ended abnormally");
        }
    }
}

/// Spawn `tick` every `period` until `shutdown` reads `true` or its sender is
/// dropped. A zero period falls back to the default cleanup interval.
pub fn spawn_with_shutdown<F>(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() + Send + 'static,
{
    let period = if period.is_zero() {
        warn!(task = name, "zero period requested, using default");
        DEFAULT_CLEANUP_INTERVAL
    } else {
        period
    };

    tokio::spawn(async move {
        info!(task = name, period_ms = period.as_millis() as u64, "periodic task started");

        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = interval.tick() => tick(),
            }
        }

        info!(task = name, "periodic task stopped");
    })
}

impl MarketDataCache {
    /// Start the background sweeper: every `interval`, physically remove
    /// expired entries from all three stores.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_cleanup_task(self: &Arc<Self>, interval: Duration) -> PeriodicTask {
        let cache = Arc::clone(self);
        PeriodicTask::spawn("cache-sweeper", interval, move || {
            cache.sweep_expired();
        })
    }

    /// Like `start_cleanup_task`, but bound to a shutdown signal owned by the
    /// caller.
    pub fn start_cleanup_task_with_shutdown(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        spawn_with_shutdown("cache-sweeper", interval, shutdown, move || {
            cache.sweep_expired();
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::TickerSnapshot;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn periodic_task_ticks_until_stopped() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let task = PeriodicTask::spawn("test-ticker", Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(task.is_running());
        task.shutdown().await;

        let after_stop = count.load(Ordering::SeqCst);
        assert!(after_stop >= 2, "expected several ticks, got {after_stop}");

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(count.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test]
    async fn dropping_the_sender_stops_the_task() {
        let (tx, rx) = watch::channel(false);
        let handle = spawn_with_shutdown("drop-test", Duration::from_millis(10), rx, || {});
        drop(tx);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("task should stop once its sender is gone")
            .unwrap();
    }

    #[tokio::test]
    async fn already_cancelled_signal_never_ticks() {
        let (tx, rx) = watch::channel(true);
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let handle = spawn_with_shutdown("pre-cancelled", Duration::from_millis(5), rx, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        handle.await.unwrap();
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
        drop(tx);
    }

    #[tokio::test]
    async fn cleanup_task_reclaims_expired_entries() {
        let cache = Arc::new(MarketDataCache::new());
        cache.set_ticker_expiry(Duration::from_millis(20));
        cache.cache_ticker(TickerSnapshot::new("mexc", "BTCUSDT", 50_000.0));
        assert_eq!(cache.stats().tickers.entries, 1);

        let (tx, rx) = watch::channel(false);
        let handle = cache.start_cleanup_task_with_shutdown(Duration::from_millis(10), rx);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(cache.stats().tickers.entries, 0);

        tx.send(true).unwrap();
        handle.await.unwrap();

        // No sweeps after cancellation: expired data is hidden but stays put.
        cache.cache_ticker(TickerSnapshot::new("mexc", "ETHUSDT", 3_000.0));
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(cache.stats().tickers.entries, 1);
        assert!(cache.get_ticker("mexc", "ETHUSDT").is_none());
    }

    #[tokio::test]
    async fn zero_interval_falls_back_to_default() {
        let cache = Arc::new(MarketDataCache::new());
        let task = cache.start_cleanup_task(Duration::ZERO);
        assert!(task.is_running());
        assert_eq!(task.name(), "cache-sweeper");
        task.shutdown().await;
    }
}
