//! A dedicated thread that owns some state and runs operations on it in
//! submission order.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::bridge::{Awaitable, PendingSet};
use crate::config::WorkerConfig;
use crate::error::{Error, Result};

type Job<S> = Box<dyn FnOnce(&mut S) + Send>;

/// Serializes operations on `S` through one OS thread.
///
/// Operations run one at a time, in the order they were posted. Shutdown
/// fails whatever was submitted and not yet answered, lets the running
/// operation finish, discards the rest of the queue, and joins the thread.
pub struct WorkerActor<S: Send + 'static> {
    name: String,
    tx: Mutex<Option<mpsc::UnboundedSender<Job<S>>>>,
    stopping: Arc<AtomicBool>,
    pending: PendingSet,
    thread: Mutex<Option<JoinHandle<()>>>,
    thread_id: ThreadId,
}

impl<S: Send + 'static> WorkerActor<S> {
    /// Start the worker thread, moving `state` onto it.
    pub fn spawn(config: &WorkerConfig, state: S) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel::<Job<S>>();
        let stopping = Arc::new(AtomicBool::new(false));

        let mut builder = thread::Builder::new().name(config.thread_name.clone());
        if let Some(size) = config.stack_size {
            builder = builder.stack_size(size);
        }
        let name = config.thread_name.clone();
        let flag = stopping.clone();
        let handle = builder
            .spawn(move || run(name, state, rx, flag))
            .map_err(|e| Error::ThreadSpawn(e.to_string()))?;

        Ok(Self {
            name: config.thread_name.clone(),
            thread_id: handle.thread().id(),
            tx: Mutex::new(Some(tx)),
            stopping,
            pending: PendingSet::new(),
            thread: Mutex::new(Some(handle)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn enqueue(&self, job: Job<S>) -> std::result::Result<(), Job<S>> {
        let guard = self.tx.lock();
        match guard.as_ref() {
            Some(tx) => tx.send(job).map_err(|e| e.0),
            None => Err(job),
        }
    }

    /// Queue an operation without waiting for it.
    pub fn post(&self, op: impl FnOnce(&mut S) + Send + 'static) -> Result<()> {
        self.enqueue(Box::new(op)).map_err(|_| Error::ShuttingDown)
    }

    /// Queue an operation and get its result as an [`Awaitable`].
    ///
    /// An `Err` from `op` fails only this awaitable; so does a panic, as
    /// [`Error::Cancelled`].
    pub fn submit<T: Send + 'static>(
        &self,
        op: impl FnOnce(&mut S) -> Result<T> + Send + 'static,
    ) -> Awaitable<T> {
        let (completer, awaitable) = self.pending.pending::<T>();
        let operation = completer.operation();
        let job: Job<S> = Box::new(move |state| {
            let result = op(state);
            let _ = completer.complete(result);
        });
        if let Err(job) = self.enqueue(job) {
            if let Some(operation) = operation {
                operation.abandon(Error::ShuttingDown);
            }
            drop(job);
        }
        awaitable
    }

    /// Operations submitted and not yet answered.
    pub fn pending(&self) -> &PendingSet {
        &self.pending
    }

    pub fn is_running(&self) -> bool {
        !self.stopping.load(Ordering::Acquire)
    }

    /// Stop the worker. Idempotent.
    ///
    /// Called from the worker thread itself it cannot join; the thread then
    /// exits after the current operation.
    pub fn shutdown(&self) {
        let tx = {
            let mut guard = self.tx.lock();
            self.stopping.store(true, Ordering::Release);
            guard.take()
        };
        let Some(tx) = tx else {
            return;
        };
        drop(tx);

        let failed = self.pending.fail_all(Error::ShuttingDown);
        tracing::debug!(worker = %self.name, failed, "worker shutting down");

        let Some(handle) = self.thread.lock().take() else {
            return;
        };
        if thread::current().id() == self.thread_id {
            tracing::warn!(worker = %self.name, "shutdown requested from the worker thread; not joining");
            return;
        }
        if handle.join().is_err() {
            tracing::error!(worker = %self.name, "worker thread terminated abnormally");
        }
    }
}

fn run<S>(name: String, mut state: S, mut rx: mpsc::UnboundedReceiver<Job<S>>, stopping: Arc<AtomicBool>) {
    tracing::debug!(worker = %name, "worker started");
    while let Some(job) = rx.blocking_recv() {
        if stopping.load(Ordering::Acquire) {
            break;
        }
        if panic::catch_unwind(AssertUnwindSafe(|| job(&mut state))).is_err() {
            tracing::error!(worker = %name, "operation panicked; worker continues");
        }
    }
    let discarded = {
        rx.close();
        let mut n = 0usize;
        while rx.try_recv().is_ok() {
            n += 1;
        }
        n
    };
    tracing::debug!(worker = %name, discarded, "worker stopped");
}

impl<S: Send + 'static> Drop for WorkerActor<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<S: Send + 'static> fmt::Debug for WorkerActor<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerActor")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .field("pending", &self.pending.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc as std_mpsc;
    use std::time::{Duration, Instant};

    fn actor<S: Send + 'static>(state: S) -> WorkerActor<S> {
        WorkerActor::spawn(&WorkerConfig::named("test-worker"), state).unwrap()
    }

    fn wait_until(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not reached");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[tokio::test]
    async fn runs_in_submission_order() {
        let worker = actor(Vec::<u32>::new());
        for i in 0..100 {
            worker.post(move |log| log.push(i)).unwrap();
        }
        let log = worker.submit(|log| Ok(log.clone())).await.unwrap();
        assert_eq!(log, (0..100).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn runs_on_named_thread() {
        let worker = actor(());
        let name = worker
            .submit(|_| Ok(thread::current().name().map(String::from)))
            .await
            .unwrap();
        assert_eq!(name.as_deref(), Some("test-worker"));
    }

    #[test]
    fn failing_operation_fails_only_itself() {
        let worker = actor(0u32);
        let failed = worker.submit::<u32>(|_| Err(Error::InvalidDuration("nope".into())));
        let fine = worker.submit(|n| {
            *n += 1;
            Ok(*n)
        });
        assert!(matches!(failed.wait(), Err(Error::InvalidDuration(_))));
        assert_eq!(fine.wait(), Ok(1));
    }

    #[test]
    fn panicking_operation_is_contained() {
        let worker = actor(0u32);
        let panicked = worker.submit::<u32>(|_| panic!("boom"));
        let after = worker.submit(|n| Ok(*n + 5));
        assert_eq!(panicked.wait(), Err(Error::Cancelled));
        assert_eq!(after.wait(), Ok(5));
        assert!(worker.is_running());
    }

    #[test]
    fn shutdown_fails_pending_and_rejects_new_work() {
        let worker = Arc::new(actor(Vec::<u32>::new()));
        let (release_tx, release_rx) = std_mpsc::channel::<()>();

        worker
            .post(move |_| {
                let _ = release_rx.recv();
            })
            .unwrap();
        let queued = worker.submit(|log| {
            log.push(1);
            Ok(log.len())
        });

        let stopper = {
            let worker = worker.clone();
            thread::spawn(move || worker.shutdown())
        };
        wait_until(|| queued.is_ready());
        assert!(!worker.is_running());
        release_tx.send(()).unwrap();
        stopper.join().unwrap();

        assert_eq!(queued.wait(), Err(Error::ShuttingDown));
        assert_eq!(worker.post(|_| {}), Err(Error::ShuttingDown));
        assert_eq!(worker.submit(|_| Ok(0u8)).wait(), Err(Error::ShuttingDown));
        assert!(worker.pending().is_empty());

        worker.shutdown();
    }

    #[test]
    fn shutdown_from_worker_thread_does_not_deadlock() {
        let worker = Arc::new(actor(()));
        let inner = worker.clone();
        worker.post(move |_| inner.shutdown()).unwrap();
        wait_until(|| !worker.is_running());
        assert_eq!(worker.post(|_| {}), Err(Error::ShuttingDown));
    }

    #[test]
    fn stack_size_is_accepted() {
        let config = WorkerConfig {
            thread_name: "small-stack".into(),
            stack_size: Some(256 * 1024),
        };
        let worker = WorkerActor::spawn(&config, 1u8).unwrap();
        assert_eq!(worker.submit(|n| Ok(*n)).wait(), Ok(1));
    }
}
