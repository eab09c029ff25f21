//! Execution gate for backup operations
//!
//! Operations run on a small pool of worker threads. Anything tagged
//! [`ExecutionLock::Write`] is exclusive: while one write is queued or
//! running, further write submissions are rejected at once with
//! [`GateError::Busy`] rather than queued behind it. Reads run alongside.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::{Condvar, Mutex};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Locking requirement of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionLock {
    /// Runs concurrently with everything
    None,
    /// Reserved for config writers; currently unlocked
    WriteConfig,
    /// At most one in flight
    Write,
}

/// Shared cancellation flag handed to every operation
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Operation cancelled")]
pub struct Cancelled;

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once cancelled; call between steps
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    #[error("Another write operation is still running")]
    Busy,

    #[error("Execution gate is shut down")]
    ShutDown,

    #[error("Operation panicked")]
    Panicked,

    #[error("Timed out waiting for operation")]
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// No write was in flight when the gate closed
    Completed,
    /// The in-flight write outlived the timeout and was cancelled
    TimedOut,
}

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct WriteState {
    busy: Mutex<bool>,
    idle: Condvar,
}

/// Marks the write slot taken until dropped
struct WriteGuard(Arc<WriteState>);

impl WriteGuard {
    fn claim(state: &Arc<WriteState>) -> Result<Self, GateError> {
        let mut busy = state.busy.lock();
        if *busy {
            return Err(GateError::Busy);
        }
        *busy = true;
        Ok(Self(Arc::clone(state)))
    }
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        *self.0.busy.lock() = false;
        self.0.idle.notify_all();
    }
}

/// Result of a submitted operation
pub struct OperationHandle<T> {
    rx: Receiver<T>,
}

impl<T> OperationHandle<T> {
    /// Block until the operation finishes
    pub fn wait(self) -> Result<T, GateError> {
        self.rx.recv().map_err(|_| GateError::Panicked)
    }

    /// Block for at most `timeout`
    pub fn wait_timeout(&self, timeout: Duration) -> Result<T, GateError> {
        self.rx.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => GateError::Timeout,
            RecvTimeoutError::Disconnected => GateError::Panicked,
        })
    }
}

/// Fixed pool of workers fed through a channel
pub struct ExecutionGate {
    sender: Mutex<Option<Sender<Job>>>,
    write: Arc<WriteState>,
    accepting: AtomicBool,
    cancel: CancelToken,
    workers: usize,
}

impl ExecutionGate {
    /// Start a gate with `workers` threads (at least one)
    pub fn new(workers: usize) -> std::io::Result<Self> {
        let workers = workers.max(1);
        let (tx, rx) = crossbeam_channel::unbounded::<Job>();

        for i in 0..workers {
            let rx = rx.clone();
            std::thread::Builder::new()
                .name(format!("wsnap-worker-{}", i))
                .spawn(move || {
                    // Exits once every sender is gone
                    for job in rx.iter() {
                        job();
                    }
                })?;
        }
        tracing::debug!("Execution gate started with {} worker(s)", workers);

        Ok(Self {
            sender: Mutex::new(Some(tx)),
            write: Arc::new(WriteState::default()),
            accepting: AtomicBool::new(true),
            cancel: CancelToken::new(),
            workers,
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// True while a write is queued or running
    pub fn is_write_busy(&self) -> bool {
        *self.write.busy.lock()
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Queue `op` under `lock`
    pub fn submit<T, F>(&self, lock: ExecutionLock, op: F) -> Result<OperationHandle<T>, GateError>
    where
        T: Send + 'static,
        F: FnOnce(&CancelToken) -> T + Send + 'static,
    {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(GateError::ShutDown);
        }

        let guard = match lock {
            ExecutionLock::Write => Some(WriteGuard::claim(&self.write)?),
            ExecutionLock::None | ExecutionLock::WriteConfig => None,
        };

        let (tx, rx) = crossbeam_channel::bounded(1);
        let cancel = self.cancel.clone();
        let job: Job = Box::new(move || {
            let result = catch_unwind(AssertUnwindSafe(|| op(&cancel)));
            // Free the slot before the result is visible to waiters
            drop(guard);
            match result {
                Ok(value) => {
                    let _ = tx.send(value);
                }
                Err(_) => tracing::error!("Operation panicked"),
            }
        });

        let sender = self.sender.lock();
        match sender.as_ref() {
            Some(sender) => sender.send(job).map_err(|_| GateError::ShutDown)?,
            None => return Err(GateError::ShutDown),
        }

        Ok(OperationHandle { rx })
    }

    /// Stop accepting work and wait up to `timeout` for the in-flight write
    ///
    /// On timeout the shared cancel token is set so the write can stop at
    /// its next step boundary.
    pub fn shutdown(&self, timeout: Duration) -> ShutdownOutcome {
        self.accepting.store(false, Ordering::SeqCst);
        let deadline = Instant::now() + timeout;

        let completed = {
            let mut busy = self.write.busy.lock();
            while *busy {
                if self.write.idle.wait_until(&mut busy, deadline).timed_out() {
                    break;
                }
            }
            !*busy
        };

        // Workers drain what is queued, then exit
        drop(self.sender.lock().take());

        if completed {
            tracing::debug!("Execution gate shut down");
            ShutdownOutcome::Completed
        } else {
            tracing::warn!("Write still running after {:?}, cancelling", timeout);
            self.cancel.cancel();
            ShutdownOutcome::TimedOut
        }
    }
}

impl Drop for ExecutionGate {
    fn drop(&mut self) {
        self.accepting.store(false, Ordering::SeqCst);
        drop(self.sender.lock().take());
    }
}
