//! # Scheduler Loop
//!
//! The single long-lived loop shared by both controllers: an immediate first
//! pass, then one pass per resync period. A pass runs to completion before
//! the next tick is armed, so passes never overlap. The stop signal is
//! honored between passes; in-flight client calls run to completion.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// One-pass reconcilers driven by the scheduler loop. A pass handles its own
/// per-spec failures; the loop never sees an error.
#[async_trait]
pub trait Reconciler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn reconcile(&self);
}

/// Tick-driven runner for a [`Reconciler`].
pub struct Scheduler {
    resync_period: Duration,
    run_once: bool,
}

impl Scheduler {
    /// A scheduler firing every `resync_period`; with `run_once` it returns
    /// after the first pass instead.
    pub fn new(resync_period: Duration, run_once: bool) -> Self {
        Self { resync_period, run_once }
    }

    /// Drive the reconciler until the cancellation signal fires.
    pub async fn run(&self, reconciler: Arc<dyn Reconciler>, cancel: CancellationToken) {
        info!(
            controller = reconciler.name(),
            period_ms = self.resync_period.as_millis() as u64,
            run_once = self.run_once,
            "starting reconcile loop"
        );

        loop {
            reconciler.reconcile().await;

            if self.run_once {
                info!(controller = reconciler.name(), "single pass complete");
                return;
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(controller = reconciler.name(), "stop signal received, quitting");
                    return;
                }
                _ = tokio::time::sleep(self.resync_period) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingReconciler {
        passes: AtomicUsize,
    }

    #[async_trait]
    impl Reconciler for CountingReconciler {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn reconcile(&self) {
            self.passes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_run_once_mode_returns_after_one_pass() {
        let reconciler = Arc::new(CountingReconciler { passes: AtomicUsize::new(0) });
        let scheduler = Scheduler::new(Duration::from_millis(10), true);

        scheduler.run(reconciler.clone(), CancellationToken::new()).await;
        assert_eq!(reconciler.passes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_signal_terminates_loop() {
        let reconciler = Arc::new(CountingReconciler { passes: AtomicUsize::new(0) });
        let scheduler = Scheduler::new(Duration::from_millis(5), false);
        let cancel = CancellationToken::new();

        let stopper = cancel.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            stopper.cancel();
        });

        scheduler.run(reconciler.clone(), cancel).await;
        handle.await.unwrap();

        assert!(reconciler.passes.load(Ordering::SeqCst) >= 1);
    }
}
