//! Explicit task handles with cooperative stop and bounded join.

use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Default bound on how long shutdown waits for one task.
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Receiving side of a stop request, checked at every wait point.
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    /// Whether stop has been requested (or the handle is gone).
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Sleep for `duration`, waking early on stop.
    ///
    /// Returns `true` when the task should exit.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        if self.is_stopped() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => self.is_stopped(),
            changed = self.rx.changed() => changed.is_err() || *self.rx.borrow(),
        }
    }

    /// Resolve once stop is requested.
    pub async fn stopped(&mut self) {
        while !self.is_stopped() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// How a join attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Finished,
    /// The task panicked; the panic stayed inside the task.
    Panicked,
    /// The task did not reach a stop check in time and was left detached.
    TimedOut,
}

/// Handle to one long-lived background task.
#[derive(Debug)]
pub struct TaskHandle {
    name: String,
    stop_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl TaskHandle {
    /// Spawn `body` on the runtime, handing it the stop signal.
    pub fn spawn<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: FnOnce(StopSignal) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let (stop_tx, rx) = watch::channel(false);
        let join = tokio::spawn(body(StopSignal { rx }));
        debug!("Started task {}", name);
        Self {
            name,
            stop_tx,
            join,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Ask the task to stop at its next check.
    pub fn signal_stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Signal stop and wait at most `timeout` for the task to end.
    ///
    /// A task that overruns is not aborted; it keeps running detached until it
    /// reaches its next stop check.
    pub async fn stop(self, timeout: Duration) -> JoinOutcome {
        self.signal_stop();
        self.join(timeout).await
    }

    /// Wait at most `timeout` for the task to end on its own.
    pub async fn join(mut self, timeout: Duration) -> JoinOutcome {
        // `stop_tx` lives until here so the task sees `true`, not a hang-up.
        self.wait(timeout).await
    }

    /// Like [`join`](Self::join), but keeps the handle when the task overruns
    /// so the caller can go on treating it as alive.
    ///
    /// Must not be called again after it returned anything but `TimedOut`.
    pub async fn wait(&mut self, timeout: Duration) -> JoinOutcome {
        match tokio::time::timeout(timeout, &mut self.join).await {
            Ok(Ok(())) => JoinOutcome::Finished,
            Ok(Err(e)) => {
                warn!("Task {} ended abnormally: {}", self.name, e);
                JoinOutcome::Panicked
            }
            Err(_) => {
                warn!("Task {} did not stop within {:?}", self.name, timeout);
                JoinOutcome::TimedOut
            }
        }
    }
}

/// Stop the task held in `slot`.
///
/// A task that overruns `timeout` is put back, so a later start sees it as
/// still running instead of spawning a second copy beside it.
pub async fn stop_slot(slot: &Mutex<Option<TaskHandle>>, timeout: Duration) -> Option<JoinOutcome> {
    let mut task = slot.lock().unwrap_or_else(PoisonError::into_inner).take()?;
    task.signal_stop();
    let outcome = task.wait(timeout).await;
    if outcome == JoinOutcome::TimedOut {
        let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(task);
        }
    }
    Some(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_stop_wakes_sleeping_task() {
        let handle = TaskHandle::spawn("sleeper", |mut stop| async move {
            while !stop.sleep(Duration::from_secs(3600)).await {}
        });
        assert_eq!(handle.stop(JOIN_TIMEOUT).await, JoinOutcome::Finished);
    }

    #[tokio::test]
    async fn test_loop_runs_until_stopped() {
        let ticks = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&ticks);
        let handle = TaskHandle::spawn("ticker", move |mut stop| async move {
            loop {
                counter.fetch_add(1, Ordering::SeqCst);
                if stop.sleep(Duration::from_millis(5)).await {
                    break;
                }
            }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(handle.stop(JOIN_TIMEOUT).await, JoinOutcome::Finished);
        assert!(ticks.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test]
    async fn test_stuck_task_times_out() {
        let handle = TaskHandle::spawn("stuck", |_stop| async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });
        let outcome = handle.stop(Duration::from_millis(20)).await;
        assert_eq!(outcome, JoinOutcome::TimedOut);
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let handle = TaskHandle::spawn("panics", |_stop| async move {
            panic!("render exploded");
        });
        assert_eq!(handle.join(JOIN_TIMEOUT).await, JoinOutcome::Panicked);
    }

    #[tokio::test]
    async fn test_overrunning_task_stays_in_slot() {
        let slot = Mutex::new(Some(TaskHandle::spawn("slow", |mut stop| async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            stop.stopped().await;
        })));

        let outcome = stop_slot(&slot, Duration::from_millis(20)).await;
        assert_eq!(outcome, Some(JoinOutcome::TimedOut));
        {
            let held = slot.lock().unwrap();
            let task = held.as_ref().expect("timed-out task is kept");
            assert!(!task.is_finished());
        }

        // Once it does finish, stopping the slot again joins it cleanly.
        assert_eq!(stop_slot(&slot, JOIN_TIMEOUT).await, Some(JoinOutcome::Finished));
        assert!(slot.lock().unwrap().is_none());
        assert_eq!(stop_slot(&slot, JOIN_TIMEOUT).await, None);
    }
}
