//! # Worker Pool Module
//!
//! A fixed-size pool of client-serving coroutines. The listener hands
//! every accepted connection to the pool over an unbounded MPSC channel;
//! the workers share the receiver and load-balance automatically. Each
//! worker serves one connection to completion before taking the next.

use may::net::TcpStream;
use may::sync::mpsc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

/// Counters for monitoring the pool.
#[derive(Debug, Default)]
pub struct PoolMetrics {
    /// Total connections handed to the pool
    pub dispatched_count: AtomicU64,
    /// Total connections served to completion
    pub completed_count: AtomicU64,
    /// Current queue depth (approximate)
    pub queue_depth: AtomicUsize,
}

impl PoolMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_dispatch(&self) {
        self.dispatched_count.fetch_add(1, Ordering::Relaxed);
        self.queue_depth.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completion(&self) {
        self.completed_count.fetch_add(1, Ordering::Relaxed);
        self.queue_depth.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn get_dispatched_count(&self) -> u64 {
        self.dispatched_count.load(Ordering::Relaxed)
    }

    pub fn get_completed_count(&self) -> u64 {
        self.completed_count.load(Ordering::Relaxed)
    }

    pub fn get_queue_depth(&self) -> usize {
        self.queue_depth.load(Ordering::Relaxed)
    }
}

/// A pool of worker coroutines serving accepted client sockets.
pub struct ClientPool {
    sender: mpsc::Sender<TcpStream>,
    metrics: Arc<PoolMetrics>,
    workers: usize,
}

impl ClientPool {
    /// Spawns `workers` coroutines that pull connections off a shared
    /// channel and run `handler` on each. Handler panics are caught so a
    /// misbehaving connection cannot take a worker down.
    ///
    /// # Safety
    ///
    /// Spawning coroutines with `may::coroutine::Builder::spawn` is
    /// unsafe in the `may` runtime; the caller must make sure the runtime
    /// is initialized before the pool is created.
    pub unsafe fn new<F>(workers: usize, stack_size: usize, handler: F) -> Self
    where
        F: Fn(TcpStream) + Send + Clone + 'static,
    {
        let (tx, rx) = mpsc::channel::<TcpStream>();
        let metrics = Arc::new(PoolMetrics::new());
        let rx = Arc::new(rx);

        for worker_id in 0..workers {
            let rx = rx.clone();
            let handler = handler.clone();
            let metrics = metrics.clone();

            let spawned = may::coroutine::Builder::new()
                .stack_size(stack_size)
                .spawn(move || {
                    debug!(worker_id, "client worker started");
                    while let Ok(stream) = rx.recv() {
                        if let Err(panic) =
                            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                                handler(stream);
                            }))
                        {
                            error!(worker_id, panic_message = ?panic, "client worker panicked");
                        }
                        metrics.record_completion();
                    }
                    debug!(worker_id, "client worker exiting");
                });

            if let Err(e) = spawned {
                error!(worker_id, error = %e, "failed to spawn client worker");
            }
        }

        Self {
            sender: tx,
            metrics,
            workers,
        }
    }

    /// Queues a connection for the next free worker. The channel is
    /// unbounded; a failed send means all workers have exited, which is
    /// logged and the connection dropped.
    pub fn dispatch(&self, stream: TcpStream) {
        self.metrics.record_dispatch();
        if let Err(e) = self.sender.send(stream) {
            error!(error = %e, "client pool channel disconnected");
        }
    }

    pub fn metrics(&self) -> &Arc<PoolMetrics> {
        &self.metrics
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_counters() {
        let metrics = PoolMetrics::new();
        assert_eq!(metrics.get_dispatched_count(), 0);
        assert_eq!(metrics.get_completed_count(), 0);
        assert_eq!(metrics.get_queue_depth(), 0);

        metrics.record_dispatch();
        assert_eq!(metrics.get_dispatched_count(), 1);
        assert_eq!(metrics.get_queue_depth(), 1);

        metrics.record_completion();
        assert_eq!(metrics.get_completed_count(), 1);
        assert_eq!(metrics.get_queue_depth(), 0);
    }
}
