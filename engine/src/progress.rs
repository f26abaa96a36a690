//! Progress reporting.
//!
//! This module defines the TransferObserver trait, which decouples the
//! transfer engine from any specific presentation layer (CLI, GUI, etc.).
//! The engine only produces events; it never renders them and keeps no
//! event history.

use crate::model::{Phase, TaskId};
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};

/// Trait for receiving events from a running session.
///
/// All methods are called synchronously on the session's worker thread, in
/// the order the events are produced. A task's `on_task_finished` always
/// follows every file-level event of that task.
pub trait TransferObserver: Send + Sync {
    /// A file of a task entered a new phase; `percent` is task progress.
    fn on_progress(&self, task_id: TaskId, file_name: &str, phase: Phase, percent: u8);

    /// Average throughput of the current task so far, in MiB/s.
    fn on_throughput_sample(&self, mbps: f64);

    /// Free-form status line.
    fn on_status(&self, message: &str);

    /// A task reached a terminal state.
    fn on_task_finished(&self, task_id: TaskId, success: bool, message: &str);
}

/// One observer callback, as a value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TransferEvent {
    Progress {
        task_id: TaskId,
        file_name: String,
        phase: Phase,
        percent: u8,
    },
    Throughput {
        mbps: f64,
    },
    Status {
        message: String,
    },
    TaskFinished {
        task_id: TaskId,
        success: bool,
        message: String,
    },
}

/// Forwards every callback as a [`TransferEvent`] over a channel.
///
/// Send errors (receiver dropped) are ignored: a front end that stops
/// listening must not disturb the transfer.
pub struct ChannelObserver {
    sender: Sender<TransferEvent>,
}

impl ChannelObserver {
    pub fn new(sender: Sender<TransferEvent>) -> Self {
        ChannelObserver { sender }
    }
}

impl TransferObserver for ChannelObserver {
    fn on_progress(&self, task_id: TaskId, file_name: &str, phase: Phase, percent: u8) {
        let _ = self.sender.send(TransferEvent::Progress {
            task_id,
            file_name: file_name.to_string(),
            phase,
            percent,
        });
    }

    fn on_throughput_sample(&self, mbps: f64) {
        let _ = self.sender.send(TransferEvent::Throughput { mbps });
    }

    fn on_status(&self, message: &str) {
        let _ = self.sender.send(TransferEvent::Status {
            message: message.to_string(),
        });
    }

    fn on_task_finished(&self, task_id: TaskId, success: bool, message: &str) {
        let _ = self.sender.send(TransferEvent::TaskFinished {
            task_id,
            success,
            message: message.to_string(),
        });
    }
}

/// Percentage of `done` out of `total`, clamped to 0..=100. An empty total is complete.
pub(crate) fn percent_of(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done.min(total) as u128 * 100) / total as u128) as u8
}
