//! Error types for the transfer engine.
//!
//! `TransferError` covers everything that can end a task early. Errors are
//! resolved at task granularity: the worker turns them into a `Failed` or
//! `Cancelled` task status with a human-readable message, and the session
//! only surfaces `AlreadyRunning` directly to the caller.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while executing a transfer task or driving a session.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Source path does not exist at task start
    #[error("Source directory not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    /// Failed to read from a source file
    #[error("Failed to read file: {}", path.display())]
    ReadError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to write to a destination file
    #[error("Failed to write file: {}", path.display())]
    WriteError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to remove a source file after verification
    #[error("Failed to delete source file: {}", path.display())]
    DeleteError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to enumerate a source directory
    #[error("Failed to enumerate directory: {}", path.display())]
    EnumerationFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to create a destination directory
    #[error("Failed to create directory: {}", path.display())]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Source and destination digests disagree, or one could not be computed
    #[error("Checksum mismatch for {file_name}; source left untouched")]
    IntegrityMismatch { file_name: String },

    /// The caller requested a stop while the task was running
    #[error("Operation cancelled by caller")]
    CancelledByCaller,

    /// A session run is already in progress
    #[error("Operations are already in progress")]
    AlreadyRunning,

    /// Task definition is unusable (empty paths, unknown index)
    #[error("Invalid task: {reason}")]
    InvalidTask { reason: String },
}

/// Coarse classification of [`TransferError`], used by front ends to decide
/// how to present a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    SourceNotFound,
    IoFailure,
    IntegrityMismatch,
    CancelledByCaller,
    AlreadyRunning,
}

impl TransferError {
    /// Map this error onto the engine's error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SourceNotFound { .. } => ErrorKind::SourceNotFound,
            Self::ReadError { .. }
            | Self::WriteError { .. }
            | Self::DeleteError { .. }
            | Self::EnumerationFailed { .. }
            | Self::DirectoryCreationFailed { .. }
            | Self::InvalidTask { .. } => ErrorKind::IoFailure,
            Self::IntegrityMismatch { .. } => ErrorKind::IntegrityMismatch,
            Self::CancelledByCaller => ErrorKind::CancelledByCaller,
            Self::AlreadyRunning => ErrorKind::AlreadyRunning,
        }
    }

    /// Message shown in task status and completion events.
    ///
    /// Includes the underlying I/O cause, which `Display` leaves to the
    /// error chain.
    pub fn status_message(&self) -> String {
        match self {
            Self::ReadError { source, .. }
            | Self::WriteError { source, .. }
            | Self::DeleteError { source, .. }
            | Self::EnumerationFailed { source, .. }
            | Self::DirectoryCreationFailed { source, .. } => format!("{self} ({source})"),
            _ => self.to_string(),
        }
    }
}
