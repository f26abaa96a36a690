//! Session scheduling.
//!
//! A `TransferSession` owns an ordered queue of tasks and runs them strictly
//! one at a time, in insertion order, on a single background thread. The
//! queue can only be edited while no run is active.

use crate::cancel::CancellationToken;
use crate::config::{EngineConfig, FailurePolicy};
use crate::error::TransferError;
use crate::model::{Mode, Task, TaskId, TaskStatus};
use crate::progress::TransferObserver;
use crate::transfer::{run_task, TaskContext};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use tracing::{info, info_span, warn};
use uuid::Uuid;

#[derive(Debug, Default)]
struct SharedState {
    tasks: Vec<Task>,
    current: Option<usize>,
}

/// Final state of a session run, grouped by task status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionReport {
    /// Identifier of the run (None if the session never started)
    pub session_id: Option<Uuid>,
    pub succeeded: Vec<TaskId>,
    /// Failed tasks with their failure message
    pub failed: Vec<(TaskId, String)>,
    pub cancelled: Vec<TaskId>,
    /// Tasks that never started (halted queue or stop request)
    pub pending: Vec<TaskId>,
}

impl SessionReport {
    fn from_tasks(session_id: Option<Uuid>, tasks: &[Task]) -> Self {
        let mut report = SessionReport {
            session_id,
            ..Default::default()
        };
        for task in tasks {
            match task.status {
                TaskStatus::Succeeded => report.succeeded.push(task.id),
                TaskStatus::Failed => report.failed.push((task.id, task.status_message.clone())),
                TaskStatus::Cancelled => report.cancelled.push(task.id),
                TaskStatus::Pending | TaskStatus::Running => report.pending.push(task.id),
            }
        }
        report
    }

    /// True if every task succeeded.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.cancelled.is_empty() && self.pending.is_empty()
    }

    /// One-line summary for status displays.
    pub fn summary(&self) -> String {
        format!(
            "{} succeeded, {} failed, {} cancelled, {} not run",
            self.succeeded.len(),
            self.failed.len(),
            self.cancelled.len(),
            self.pending.len()
        )
    }
}

/// An ordered queue of transfer tasks with start/stop control.
pub struct TransferSession {
    config: EngineConfig,
    shared: Arc<Mutex<SharedState>>,
    token: CancellationToken,
    worker: Option<JoinHandle<()>>,
    session_id: Option<Uuid>,
}

impl TransferSession {
    pub fn new(config: EngineConfig) -> Self {
        TransferSession {
            config,
            shared: Arc::new(Mutex::new(SharedState::default())),
            token: CancellationToken::new(),
            worker: None,
            session_id: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Append a task to the queue and return its id.
    ///
    /// # Errors
    /// `AlreadyRunning` while a run is active; `InvalidTask` if either path is empty.
    pub fn add_task(
        &mut self,
        source: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
        mode: Mode,
    ) -> Result<TaskId, TransferError> {
        self.ensure_idle()?;
        let source = source.into();
        let destination = destination.into();
        if source.as_os_str().is_empty() || destination.as_os_str().is_empty() {
            return Err(TransferError::InvalidTask {
                reason: "Both source and destination must be given".to_string(),
            });
        }

        let mut shared = lock(&self.shared);
        let id = TaskId(shared.tasks.len());
        shared.tasks.push(Task::new(id, source, destination, mode));
        Ok(id)
    }

    /// Remove a task; later tasks move up one position.
    ///
    /// # Errors
    /// `AlreadyRunning` while a run is active; `InvalidTask` for an unknown id.
    pub fn remove_task(&mut self, id: TaskId) -> Result<Task, TransferError> {
        self.ensure_idle()?;
        let mut shared = lock(&self.shared);
        if id.0 >= shared.tasks.len() {
            return Err(TransferError::InvalidTask {
                reason: format!("No task {}", id),
            });
        }
        let removed = shared.tasks.remove(id.0);
        for (index, task) in shared.tasks.iter_mut().enumerate() {
            task.id = TaskId(index);
        }
        Ok(removed)
    }

    /// Drop every task.
    ///
    /// # Errors
    /// `AlreadyRunning` while a run is active.
    pub fn clear_tasks(&mut self) -> Result<(), TransferError> {
        self.ensure_idle()?;
        lock(&self.shared).tasks.clear();
        Ok(())
    }

    /// Change the throughput ceiling for the next run (0 = fallback ceiling).
    ///
    /// # Errors
    /// `AlreadyRunning` while a run is active.
    pub fn set_throughput_ceiling(&mut self, bps: u64) -> Result<(), TransferError> {
        self.ensure_idle()?;
        self.config.throughput_ceiling_bps = bps;
        Ok(())
    }

    /// Snapshot of the queue with current statuses.
    pub fn tasks(&self) -> Vec<Task> {
        lock(&self.shared).tasks.clone()
    }

    /// Task currently executing, if any.
    pub fn current_task(&self) -> Option<TaskId> {
        lock(&self.shared).current.map(TaskId)
    }

    /// True while the worker thread is processing the queue.
    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Token of the active (or most recent) run, for stop requests from
    /// other threads.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Begin processing the queue on a background thread.
    ///
    /// Every task is reset to `Pending` and a fresh cancellation token is
    /// issued. Events are delivered to `observer` from the worker thread.
    ///
    /// # Errors
    /// `AlreadyRunning` if a run is active; `InvalidTask` if the queue is empty.
    pub fn start(
        &mut self,
        observer: Option<Arc<dyn TransferObserver>>,
    ) -> Result<Uuid, TransferError> {
        if self.is_running() {
            warn!("start requested while a run is active");
            return Err(TransferError::AlreadyRunning);
        }
        self.reap_worker();

        {
            let mut shared = lock(&self.shared);
            if shared.tasks.is_empty() {
                return Err(TransferError::InvalidTask {
                    reason: "Please add at least one task".to_string(),
                });
            }
            for task in shared.tasks.iter_mut() {
                task.reset();
            }
            shared.current = None;
        }

        let session_id = Uuid::new_v4();
        self.session_id = Some(session_id);
        self.token = CancellationToken::new();

        let shared = Arc::clone(&self.shared);
        let config = self.config.clone();
        let token = self.token.clone();
        self.worker = Some(thread::spawn(move || {
            let span = info_span!("session", id = %session_id);
            let _enter = span.enter();
            run_queue(&shared, &config, &token, observer.as_deref());
        }));

        info!(%session_id, "session started");
        Ok(session_id)
    }

    /// Ask the running task to stop at its next suspension point.
    ///
    /// Tasks that have not started keep status `Pending`. No-op when idle.
    pub fn request_stop(&self) {
        if self.is_running() {
            info!("stop requested");
            self.token.request_stop();
        }
    }

    /// Block until the current run ends and return its report.
    ///
    /// When idle this reports the state left by the last run.
    pub fn wait(&mut self) -> SessionReport {
        self.reap_worker();
        SessionReport::from_tasks(self.session_id, &lock(&self.shared).tasks)
    }

    fn reap_worker(&mut self) {
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                warn!("worker thread panicked");
                lock(&self.shared).current = None;
            }
        }
    }

    fn ensure_idle(&self) -> Result<(), TransferError> {
        if self.is_running() {
            Err(TransferError::AlreadyRunning)
        } else {
            Ok(())
        }
    }
}

impl Default for TransferSession {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Drop for TransferSession {
    fn drop(&mut self) {
        // Never leave a detached thread writing files.
        self.token.request_stop();
        self.reap_worker();
    }
}

fn lock(shared: &Mutex<SharedState>) -> MutexGuard<'_, SharedState> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Run the queue to the end, a stop request, or a halting failure.
fn run_queue(
    shared: &Mutex<SharedState>,
    config: &EngineConfig,
    token: &CancellationToken,
    observer: Option<&dyn TransferObserver>,
) {
    let status = |message: &str| {
        if let Some(observer) = observer {
            observer.on_status(message);
        }
    };

    let task_count = lock(shared).tasks.len();
    status("Starting batch operation.");

    for index in 0..task_count {
        if !token.is_running() {
            break;
        }

        let task = {
            let mut state = lock(shared);
            state.current = Some(index);
            let task = &mut state.tasks[index];
            task.status = TaskStatus::Running;
            task.started_at = Some(Utc::now());
            task.clone()
        };
        status(&format!("Task {} - {}", task.id, task.label()));

        let ctx = TaskContext {
            config,
            token,
            observer,
        };
        let outcome = run_task(&task, &ctx);

        {
            let mut state = lock(shared);
            let entry = &mut state.tasks[index];
            entry.status = outcome.status;
            entry.status_message = outcome.message.clone();
            entry.finished_at = Some(Utc::now());
            state.current = None;
        }

        if let Some(observer) = observer {
            observer.on_task_finished(task.id, outcome.is_success(), &outcome.message);
        }

        match outcome.status {
            TaskStatus::Cancelled => {
                status("Stopped by user.");
                break;
            }
            TaskStatus::Failed if config.failure_policy == FailurePolicy::Halt => {
                status("Batch halted after a failed task.");
                break;
            }
            _ => {}
        }
    }

    let report = SessionReport::from_tasks(None, &lock(shared).tasks);
    info!(summary = %report.summary(), "session finished");
    if report.is_success() {
        status("Batch Operation Complete!");
    } else {
        status(&format!("Batch Operation Finished: {}", report.summary()));
    }
}
