//! Deferred single-shot values.
//!
//! [`IdleValue`] wraps a zero-argument producer that runs at most once:
//! either when the runtime gets idle, or earlier when somebody forces it
//! with [`IdleValue::get_value`]. Success and failure are both memoised.
//!
//! "Idle" maps onto Tokio: with a current runtime the deferred run is a
//! spawned task that yields once before executing. Without a runtime there
//! is no host scheduler, so the value only runs when forced.
//!
//! Forcing a value from inside its own executor fails with an approximate
//! [`ContainerError::CircularDependency`]. Other threads wait for the run.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, ThreadId};

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{trace, warn};

use crate::error::{CircularDependencyError, ContainerError, Result};
use crate::trail;

/// Handle to a task scheduled with [`run_when_idle`].
pub struct IdleCallback {
    cancelled: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl IdleCallback {
    /// Prevents the task from running if it has not started yet.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        if let Some(task) = &self.task {
            task.abort();
        }
    }

    /// Returns `true` if a runtime accepted the task.
    pub fn is_scheduled(&self) -> bool {
        self.task.is_some()
    }
}

/// Schedules `task` to run once the current runtime is idle.
///
/// Outside a Tokio runtime nothing is scheduled and the returned callback
/// only serves as a cancellation token.
pub fn run_when_idle(task: impl FnOnce() + Send + 'static) -> IdleCallback {
    let cancelled = Arc::new(AtomicBool::new(false));

    let task = match Handle::try_current() {
        Ok(runtime) => {
            let flag = Arc::clone(&cancelled);
            Some(runtime.spawn(async move {
                tokio::task::yield_now().await;
                if !flag.load(Ordering::Acquire) {
                    task();
                }
            }))
        }
        Err(_) => {
            trace!("No runtime available, deferred task runs on first access");
            None
        }
    };

    IdleCallback { cancelled, task }
}

type Executor<T> = Box<dyn FnOnce() -> Result<T> + Send>;

/// A lazily evaluated value that executes at most once.
///
/// # Examples
/// ```
/// use warren_container::idle::IdleValue;
///
/// let value = IdleValue::new(|| Ok(21 * 2));
/// assert!(!value.has_run());
/// assert_eq!(value.get_value().unwrap(), 42);
/// assert!(value.has_run());
/// ```
pub struct IdleValue<T> {
    executor: Mutex<Option<Executor<T>>>,
    value: OnceCell<Result<T>>,
    callback: Mutex<Option<IdleCallback>>,
    running: Mutex<Option<ThreadId>>,
}

/// Marks the executing thread until dropped.
struct Running<'a>(&'a Mutex<Option<ThreadId>>);

impl<'a> Running<'a> {
    fn enter(slot: &'a Mutex<Option<ThreadId>>) -> Self {
        *slot.lock() = Some(thread::current().id());
        Running(slot)
    }
}

impl Drop for Running<'_> {
    fn drop(&mut self) {
        self.0.lock().take();
    }
}

impl<T> IdleValue<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Wraps `executor` and schedules its deferred run.
    pub fn new(executor: impl FnOnce() -> Result<T> + Send + 'static) -> Arc<Self> {
        let idle = Arc::new(Self {
            executor: Mutex::new(Some(Box::new(executor))),
            value: OnceCell::new(),
            callback: Mutex::new(None),
            running: Mutex::new(None),
        });

        let weak = Arc::downgrade(&idle);
        let callback = run_when_idle(move || {
            if let Some(idle) = weak.upgrade() {
                let _ = idle.run();
            }
        });
        *idle.callback.lock() = Some(callback);

        idle
    }

    /// Forces the value, running the executor now if it has not run yet.
    ///
    /// A memoised error is returned again on every call.
    pub fn get_value(&self) -> Result<T> {
        self.cancel_callback();
        self.run()
    }

    /// Returns `true` once the executor ran (or the value was cancelled and
    /// then accessed).
    pub fn has_run(&self) -> bool {
        self.value.get().is_some()
    }

    /// Cancels a pending run. If the executor never ran it never will.
    pub fn dispose(&self) {
        self.cancel_callback();
        self.executor.lock().take();
    }

    fn run(&self) -> Result<T> {
        if let Some(value) = self.value.get() {
            return value.clone();
        }

        if *self.running.lock() == Some(thread::current().id()) {
            let chain = trail::snapshot();
            warn!(depth = chain.len(), "Deferred value forced while it is being built");
            return Err(ContainerError::CircularDependency(CircularDependencyError {
                chain,
                exact: false,
            }));
        }

        self.value
            .get_or_init(|| {
                let _running = Running::enter(&self.running);
                // Taken out first so the lock is not held while user code runs.
                let executor = self.executor.lock().take();
                match executor {
                    Some(executor) => executor(),
                    None => Err(ContainerError::DeferredCancelled),
                }
            })
            .clone()
    }

    fn cancel_callback(&self) {
        if let Some(callback) = self.callback.lock().take() {
            callback.cancel();
        }
    }
}

impl<T> fmt::Debug for IdleValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdleValue")
            .field("has_run", &self.value.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting(counter: &Arc<AtomicUsize>) -> Arc<IdleValue<usize>> {
        let counter = Arc::clone(counter);
        IdleValue::new(move || Ok(counter.fetch_add(1, Ordering::SeqCst) + 1))
    }

    #[test]
    fn runs_once_when_forced() {
        let counter = Arc::new(AtomicUsize::new(0));
        let value = counting(&counter);

        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(value.get_value().unwrap(), 1);
        assert_eq!(value.get_value().unwrap(), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn memoises_errors() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let value: Arc<IdleValue<u8>> = IdleValue::new(move || {
            seen.fetch_add(1, Ordering::SeqCst);
            Err(ContainerError::ScopeDisposed)
        });

        assert!(matches!(value.get_value(), Err(ContainerError::ScopeDisposed)));
        assert!(matches!(value.get_value(), Err(ContainerError::ScopeDisposed)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dispose_before_run_cancels_forever() {
        let counter = Arc::new(AtomicUsize::new(0));
        let value = counting(&counter);

        value.dispose();
        assert!(matches!(value.get_value(), Err(ContainerError::DeferredCancelled)));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn nothing_scheduled_without_runtime() {
        let callback = run_when_idle(|| {});
        assert!(!callback.is_scheduled());
    }

    #[test]
    fn forcing_from_own_executor_fails() {
        let slot: Arc<Mutex<Option<Arc<IdleValue<u8>>>>> = Arc::new(Mutex::new(None));
        let inner = Arc::clone(&slot);
        let value = IdleValue::new(move || {
            let this = inner.lock().clone().ok_or(ContainerError::DeferredCancelled)?;
            this.get_value()
        });
        *slot.lock() = Some(Arc::clone(&value));

        match value.get_value() {
            Err(ContainerError::CircularDependency(err)) => assert!(!err.exact),
            other => panic!("Expected CircularDependency, got: {other:?}"),
        }
        assert!(value.has_run());
        slot.lock().take();
    }

    #[test]
    fn other_threads_wait_for_the_run() {
        let (started_tx, started_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let value = IdleValue::new(move || {
            let _ = started_tx.send(());
            let _ = release_rx.recv();
            Ok(7u8)
        });

        let builder = {
            let value = Arc::clone(&value);
            thread::spawn(move || value.get_value())
        };
        started_rx.recv().unwrap();

        let waiter = {
            let value = Arc::clone(&value);
            thread::spawn(move || value.get_value())
        };
        release_tx.send(()).unwrap();

        assert_eq!(builder.join().unwrap().unwrap(), 7);
        assert_eq!(waiter.join().unwrap().unwrap(), 7);
    }

    #[tokio::test]
    async fn runs_when_runtime_is_idle() {
        let counter = Arc::new(AtomicUsize::new(0));
        let value = counting(&counter);

        for _ in 0..10 {
            if value.has_run() {
                break;
            }
            tokio::task::yield_now().await;
        }

        assert!(value.has_run());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(value.get_value().unwrap(), 1);
    }

    #[tokio::test]
    async fn cancelled_callback_never_runs() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let callback = run_when_idle(move || flag.store(true, Ordering::SeqCst));
        callback.cancel();

        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert!(!ran.load(Ordering::SeqCst));
    }
}
