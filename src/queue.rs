// src/queue.rs
//! Single-worker FIFO task queue.
//!
//! Every side-effecting step of the pipeline (classification, sentiment
//! continuations, sink writes, event caching) runs as a queued task. The worker
//! drives one task to completion before taking the next, so no two tasks ever
//! overlap. Tasks may enqueue follow-up tasks; those land at the back of the queue.
//! A task that panics is reported and the worker moves on.

use metrics::{counter, gauge};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::error;

pub type TaskFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Zero-argument deferred unit of work.
pub type Task = Box<dyn FnOnce() -> TaskFuture + Send + 'static>;

struct Shared {
    /// Enqueued plus running.
    pending: AtomicUsize,
    idle: Notify,
}

/// Cloneable handle; all clones feed the same worker.
#[derive(Clone)]
pub struct TaskQueue {
    tx: mpsc::UnboundedSender<Task>,
    shared: Arc<Shared>,
}

impl TaskQueue {
    /// Create the queue and spawn its worker on the current runtime.
    pub fn start() -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<Task>();
        let shared = Arc::new(Shared {
            pending: AtomicUsize::new(0),
            idle: Notify::new(),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = tokio::spawn(async move {
            while let Some(task) = rx.recv().await {
                // Run on its own tokio task so a panic is contained; awaiting keeps it serial.
                if let Err(e) = tokio::spawn(task()).await {
                    counter!("task_panics_total").increment(1);
                    error!(target: "queue", error = %e, "task aborted");
                }
                let left = worker_shared.pending.fetch_sub(1, Ordering::SeqCst) - 1;
                gauge!("task_queue_depth").set(left as f64);
                if left == 0 {
                    worker_shared.idle.notify_waiters();
                }
            }
        });

        (Self { tx, shared }, worker)
    }

    /// Append a task. Never blocks.
    pub fn push(&self, task: Task) {
        let depth = self.shared.pending.fetch_add(1, Ordering::SeqCst) + 1;
        gauge!("task_queue_depth").set(depth as f64);
        if self.tx.send(task).is_err() {
            self.shared.pending.fetch_sub(1, Ordering::SeqCst);
            error!(target: "queue", "task queue worker is gone; task dropped");
        }
    }

    /// Convenience for pushing an async block.
    pub fn push_fn<F, Fut>(&self, f: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.push(Box::new(move || Box::pin(f()) as TaskFuture));
    }

    /// Tasks enqueued or running right now.
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::SeqCst)
    }

    /// Resolve once nothing is queued or running, including follow-ups enqueued by tasks.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    #[tokio::test]
    async fn runs_in_fifo_order() {
        let (q, _worker) = TaskQueue::start();
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..20 {
            let log = Arc::clone(&log);
            q.push_fn(move || async move {
                // Later tasks sleep less; ordering must still hold.
                tokio::time::sleep(Duration::from_millis((20 - i) as u64)).await;
                log.lock().unwrap().push(i);
            });
        }
        q.wait_idle().await;
        assert_eq!(*log.lock().unwrap(), (0..20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn tasks_never_overlap() {
        let (q, _worker) = TaskQueue::start();
        let running = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let running = Arc::clone(&running);
            let max_seen = Arc::clone(&max_seen);
            q.push_fn(move || async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::task::yield_now().await;
                tokio::time::sleep(Duration::from_millis(2)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            });
        }
        q.wait_idle().await;
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn follow_up_tasks_go_to_the_back() {
        let (q, _worker) = TaskQueue::start();
        let log = Arc::new(Mutex::new(Vec::new()));

        let (q2, log2) = (q.clone(), Arc::clone(&log));
        q.push_fn(move || async move {
            log2.lock().unwrap().push("a");
            let log3 = Arc::clone(&log2);
            q2.push_fn(move || async move {
                log3.lock().unwrap().push("a-continuation");
            });
        });
        let log4 = Arc::clone(&log);
        q.push_fn(move || async move {
            log4.lock().unwrap().push("b");
        });

        q.wait_idle().await;
        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "a-continuation"]);
    }

    #[tokio::test]
    async fn panicking_task_does_not_stop_worker() {
        let (q, _worker) = TaskQueue::start();
        let done = Arc::new(AtomicUsize::new(0));
        q.push_fn(|| async { panic!("boom") });
        let d = Arc::clone(&done);
        q.push_fn(move || async move {
            d.fetch_add(1, Ordering::SeqCst);
        });
        q.wait_idle().await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
        assert_eq!(q.pending(), 0);
    }

    #[tokio::test]
    async fn wait_idle_returns_immediately_when_empty() {
        let (q, _worker) = TaskQueue::start();
        tokio::time::timeout(Duration::from_secs(1), q.wait_idle())
            .await
            .expect("idle queue should resolve");
    }
}
