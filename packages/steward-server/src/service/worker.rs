//! Background worker running one event loop per cluster.
//!
//! A `BackgroundWorker<R>` owns a tokio task that feeds queued events and
//! periodic ticks into a `BackgroundRunnable`. The runnable is moved into
//! the task and never shared, which is what lets the controller mutate its
//! registry and election state without any locking.

use async_trait::async_trait;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// BackgroundRunnable trait
// ---------------------------------------------------------------------------

/// Event handler executed by `BackgroundWorker`.
///
/// Implementors define how individual events are processed, what happens on
/// each periodic tick, and how to clean up on shutdown.
#[async_trait]
pub trait BackgroundRunnable: Send + 'static {
    /// The type of event this runnable processes.
    type Task: Send + 'static;

    /// Process a single event.
    async fn run(&mut self, task: Self::Task);

    /// Called periodically (on each tick interval). Default is a no-op.
    async fn on_tick(&mut self) {}

    /// Called once when the worker is shutting down. Default is a no-op.
    async fn shutdown(&mut self) {}
}

// ---------------------------------------------------------------------------
// BackgroundWorker
// ---------------------------------------------------------------------------

/// Single-consumer event loop around a `BackgroundRunnable`.
///
/// The spawned task:
/// 1. Listens for events on a bounded mpsc channel
/// 2. Calls `BackgroundRunnable::run()` for each event
/// 3. Periodically calls `BackgroundRunnable::on_tick()` at the configured interval
/// 4. Calls `BackgroundRunnable::shutdown()` when stopped
pub struct BackgroundWorker<R: BackgroundRunnable> {
    tx: Option<mpsc::Sender<R::Task>>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl<R: BackgroundRunnable> BackgroundWorker<R> {
    /// Starts the worker and returns it together with the event sender.
    ///
    /// The sender is what handles clone; when the queue is full, senders
    /// wait rather than the loop dropping events.
    pub fn start(
        mut runnable: R,
        tick_interval_ms: u64,
        queue_capacity: usize,
    ) -> (Self, mpsc::Sender<R::Task>) {
        let (tx, mut rx) = mpsc::channel::<R::Task>(queue_capacity);
        let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut tick_interval =
                tokio::time::interval(std::time::Duration::from_millis(tick_interval_ms));
            // Skip the first immediate tick so on_tick doesn't fire at startup.
            tick_interval.tick().await;

            loop {
                tokio::select! {
                    task = rx.recv() => {
                        match task {
                            Some(t) => runnable.run(t).await,
                            None => break, // Channel closed.
                        }
                    }
                    _ = tick_interval.tick() => {
                        runnable.on_tick().await;
                    }
                    _ = &mut shutdown_rx => {
                        break;
                    }
                }
            }

            runnable.shutdown().await;
        });

        let sender = tx.clone();
        let worker = Self {
            tx: Some(tx),
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        };
        (worker, sender)
    }

    /// Stops the worker gracefully, waiting for the loop task to complete.
    pub async fn stop(&mut self) {
        // Signal shutdown.
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        // Close the event channel.
        self.tx.take();
        // Wait for the loop task to finish.
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    struct CountingRunnable {
        run_count: Arc<AtomicU32>,
        tick_count: Arc<AtomicU32>,
        shutdown_called: Arc<AtomicU32>,
    }

    fn counting() -> (CountingRunnable, Arc<AtomicU32>, Arc<AtomicU32>, Arc<AtomicU32>) {
        let run_count = Arc::new(AtomicU32::new(0));
        let tick_count = Arc::new(AtomicU32::new(0));
        let shutdown_called = Arc::new(AtomicU32::new(0));
        let runnable = CountingRunnable {
            run_count: run_count.clone(),
            tick_count: tick_count.clone(),
            shutdown_called: shutdown_called.clone(),
        };
        (runnable, run_count, tick_count, shutdown_called)
    }

    #[async_trait]
    impl BackgroundRunnable for CountingRunnable {
        type Task = String;

        async fn run(&mut self, _task: String) {
            self.run_count.fetch_add(1, Ordering::SeqCst);
        }

        async fn on_tick(&mut self) {
            self.tick_count.fetch_add(1, Ordering::SeqCst);
        }

        async fn shutdown(&mut self) {
            self.shutdown_called.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn start_send_and_stop() {
        let (runnable, run_count, _, shutdown_called) = counting();
        let (mut worker, sender) = BackgroundWorker::start(runnable, 60_000, 16);

        sender.send("event-1".to_string()).await.unwrap();
        sender.send("event-2".to_string()).await.unwrap();
        sender.send("event-3".to_string()).await.unwrap();

        // Give the worker time to process events.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert_eq!(run_count.load(Ordering::SeqCst), 3);

        worker.stop().await;

        assert_eq!(shutdown_called.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn tick_fires_periodically() {
        let (runnable, _, tick_count, _) = counting();

        // Very short tick interval for testing.
        let (mut worker, _sender) = BackgroundWorker::start(runnable, 20, 16);

        // Wait for a few ticks.
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        worker.stop().await;

        // Should have at least 2 ticks in 100ms with a 20ms interval.
        assert!(tick_count.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn send_after_stop_returns_error() {
        let (runnable, _, _, _) = counting();
        let (mut worker, sender) = BackgroundWorker::start(runnable, 60_000, 16);
        worker.stop().await;

        let result = sender.send("late-event".to_string()).await;
        assert!(result.is_err());
    }
}
