//! Core data model for transfer sessions.
//!
//! This module defines the main data structures:
//! - Task: one source -> destination transfer with a mode
//! - FileUnit: a single file derived while walking a task's source tree
//! - Mode, TaskStatus, Phase: enums controlling and describing behavior
//! - TaskOutcome: what the worker reports back for one task run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Identity of a task within its session: its queue position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub usize);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Shown 1-based, matching how queues are numbered for people.
        write!(f, "#{}", self.0 + 1)
    }
}

/// A single queued transfer.
///
/// Only `status`, `status_message` and the timestamps change after the task
/// is added to a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Queue position
    pub id: TaskId,

    /// Source directory (or single source file)
    pub source_path: PathBuf,

    /// Destination directory (or destination file for a single-file source)
    pub destination_path: PathBuf,

    /// What to do with the source once copied
    pub mode: Mode,

    /// Current lifecycle state
    pub status: TaskStatus,

    /// Human-readable detail for the current status
    pub status_message: String,

    /// When the current/last run of this task began
    pub started_at: Option<DateTime<Utc>>,

    /// When the last run of this task ended
    pub finished_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(id: TaskId, source_path: PathBuf, destination_path: PathBuf, mode: Mode) -> Self {
        Task {
            id,
            source_path,
            destination_path,
            mode,
            status: TaskStatus::Pending,
            status_message: String::new(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Short label in the form "Op: mode | From: a | To: b".
    pub fn label(&self) -> String {
        let base = |p: &PathBuf| {
            p.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| p.display().to_string())
        };
        format!(
            "Op: {} | From: {} | To: {}",
            self.mode,
            base(&self.source_path),
            base(&self.destination_path)
        )
    }

    pub(crate) fn reset(&mut self) {
        self.status = TaskStatus::Pending;
        self.status_message.clear();
        self.started_at = None;
        self.finished_at = None;
    }
}

/// The operation mode for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// Copy and verify; source remains unchanged
    Copy,
    /// Copy, verify, delete each source file, then prune emptied source subdirectories
    Move,
    /// Copy, verify, delete each source file; directory structure is left in place
    VerifyAndDelete,
}

impl Mode {
    /// True if this mode removes source files after verification.
    pub fn deletes_source(&self) -> bool {
        matches!(self, Mode::Move | Mode::VerifyAndDelete)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Copy => write!(f, "copy"),
            Mode::Move => write!(f, "move"),
            Mode::VerifyAndDelete => write!(f, "verify_and_delete"),
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "copy" => Ok(Mode::Copy),
            "move" => Ok(Mode::Move),
            "verify_and_delete" | "verify" => Ok(Mode::VerifyAndDelete),
            _ => Err(format!(
                "Invalid mode '{}'. Must be 'copy', 'move' or 'verify-and-delete'",
                s
            )),
        }
    }
}

/// The state of a task within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Not yet started (or never reached)
    Pending,
    /// Currently executing
    Running,
    /// All files copied, verified and (if applicable) removed from source
    Succeeded,
    /// Stopped by an error
    Failed,
    /// Stopped by a caller request
    Cancelled,
}

impl TaskStatus {
    /// Returns true if this state is terminal (no further changes expected).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "Pending",
            TaskStatus::Running => "Running",
            TaskStatus::Succeeded => "Succeeded",
            TaskStatus::Failed => "Failed",
            TaskStatus::Cancelled => "Cancelled",
        };
        f.write_str(s)
    }
}

/// Per-file step reported in progress events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Copying,
    Verifying,
    Deleting,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Copying => write!(f, "Copying..."),
            Phase::Verifying => write!(f, "Verifying..."),
            Phase::Deleting => write!(f, "Deleting Source..."),
        }
    }
}

/// A single file found while walking a task's source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUnit {
    /// Full source path
    pub source_path: PathBuf,

    /// Path relative to the task's source root
    pub relative_path: PathBuf,

    /// Full destination path
    pub destination_path: PathBuf,

    /// Size in bytes at walk time
    pub file_size: u64,
}

impl FileUnit {
    /// Final path component, used in events and messages.
    pub fn file_name(&self) -> String {
        self.source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.relative_path.display().to_string())
    }
}

/// Result of one worker run over a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    /// Terminal status (Succeeded, Failed or Cancelled)
    pub status: TaskStatus,

    /// Human-readable summary or failure reason
    pub message: String,

    /// Files found during the walk
    pub files_total: usize,

    /// Files fully processed (copied, verified, and removed if required)
    pub files_completed: usize,

    /// Bytes written to destination files that were kept
    pub bytes_copied: u64,
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Succeeded
    }
}
