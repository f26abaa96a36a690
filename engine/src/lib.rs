//! # FreeSync Engine - Verified Batch Transfer Library
//!
//! A headless, throttled file transfer engine that verifies every copy
//! before it deletes anything. Designed as the foundation for multiple
//! front ends (CLI, GUI, automation).
//!
//! ## Overview
//!
//! A session holds an ordered queue of tasks, each moving one directory tree
//! (or one file) to a destination in one of three modes:
//! - `Copy`: copy and verify, keep the source
//! - `VerifyAndDelete`: copy, verify, then delete each source file
//! - `Move`: as `VerifyAndDelete`, then prune emptied source directories
//!
//! Tasks run strictly one after another on a background thread. Each file is
//! streamed in chunks through a rate limiter, digest-verified against its
//! source, and only then (if the mode asks for it) removed from the source.
//! A stop request is honored between files and between chunks; the
//! in-flight partial file is removed.
//!
//! ## Basic Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use freesync_engine::{ChannelObserver, EngineConfig, Mode, TransferSession};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::default().with_ceiling_mbps(20);
//! let mut session = TransferSession::new(config);
//! session.add_task("/data/camera", "/backup/camera", Mode::VerifyAndDelete)?;
//! session.add_task("/data/docs", "/backup/docs", Mode::Copy)?;
//!
//! let (tx, rx) = crossbeam_channel::unbounded();
//! session.start(Some(Arc::new(ChannelObserver::new(tx))))?;
//! for event in rx {
//!     println!("{:?}", event);
//! }
//!
//! let report = session.wait();
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **model**: Core data structures (Task, FileUnit, enums)
//! - **error**: Error types and taxonomy
//! - **config**: Session configuration
//! - **checksums**: Streaming file digests for verification
//! - **throttle**: Per-chunk rate limiting
//! - **cancel**: Cooperative cancellation token
//! - **fs_ops**: Low-level filesystem operations
//! - **transfer**: Single-task execution
//! - **session**: Sequential task scheduling
//! - **progress**: Observer trait and channel-backed events

pub mod cancel;
pub mod checksums;
pub mod config;
pub mod error;
pub mod fs_ops;
pub mod model;
pub mod progress;
pub mod session;
pub mod throttle;
pub mod transfer;

// Re-export main types and functions
pub use cancel::CancellationToken;
pub use checksums::{compute_file_checksum, digest, ChecksumAlgorithm, ChecksumValue, FileDigest};
pub use config::{EngineConfig, FailurePolicy};
pub use error::{ErrorKind, TransferError};
pub use model::{FileUnit, Mode, Phase, Task, TaskId, TaskOutcome, TaskStatus};
pub use progress::{ChannelObserver, TransferEvent, TransferObserver};
pub use session::{SessionReport, TransferSession};
pub use throttle::{RateLimiter, CHUNK_SIZE, FALLBACK_CEILING_BPS};
pub use transfer::{run_task, TaskContext};
