//! Task execution.
//!
//! `run_task` drives one task through its states:
//! walking the source, then for each file copying, verifying and (for
//! `Move`/`VerifyAndDelete`) deleting the source, and finally reporting a
//! terminal `TaskOutcome`. A source file is only ever deleted after its
//! destination digest matched.

use crate::cancel::CancellationToken;
use crate::checksums;
use crate::config::EngineConfig;
use crate::error::TransferError;
use crate::fs_ops::{self, CopyOutcome};
use crate::model::{FileUnit, Mode, Phase, Task, TaskOutcome, TaskStatus};
use crate::progress::{percent_of, TransferObserver};
use crate::throttle::RateLimiter;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, info, info_span, warn};

/// Everything a task run needs besides the task itself.
pub struct TaskContext<'a> {
    pub config: &'a EngineConfig,
    pub token: &'a CancellationToken,
    pub observer: Option<&'a dyn TransferObserver>,
}

/// Files to process and whether the task is a single-file transfer.
struct Plan {
    units: Vec<FileUnit>,
    single_file: bool,
}

#[derive(Default)]
struct Counters {
    files_total: usize,
    files_completed: usize,
    bytes_copied: u64,
    partial_removed: bool,
}

/// Execute one task to completion, failure or cancellation.
///
/// Never returns an error: every failure is folded into the outcome's
/// status and message. The observer receives progress events but not the
/// final `on_task_finished`, which is the session's job.
pub fn run_task(task: &Task, ctx: &TaskContext<'_>) -> TaskOutcome {
    let span = info_span!("task", id = %task.id, mode = %task.mode);
    let _enter = span.enter();

    info!(
        source = %task.source_path.display(),
        destination = %task.destination_path.display(),
        "task started"
    );

    let mut counters = Counters::default();
    let result = execute(task, ctx, &mut counters);

    let (status, message) = match result {
        Ok(message) => (TaskStatus::Succeeded, message),
        Err(TransferError::CancelledByCaller) => {
            let mut message = format!(
                "Operation cancelled after {} of {} file(s).",
                counters.files_completed, counters.files_total
            );
            if counters.partial_removed {
                message.push_str(" Partial file removed.");
            }
            (TaskStatus::Cancelled, message)
        }
        Err(e) => {
            warn!(error = %e.status_message(), kind = ?e.kind(), "task failed");
            (TaskStatus::Failed, e.status_message())
        }
    };

    info!(%status, files = counters.files_completed, bytes = counters.bytes_copied, "task finished");

    TaskOutcome {
        status,
        message,
        files_total: counters.files_total,
        files_completed: counters.files_completed,
        bytes_copied: counters.bytes_copied,
    }
}

fn execute(
    task: &Task,
    ctx: &TaskContext<'_>,
    counters: &mut Counters,
) -> Result<String, TransferError> {
    let plan = plan_task(task)?;
    counters.files_total = plan.units.len();

    if plan.units.is_empty() {
        return Ok("Source directory is empty. Operation successful.".to_string());
    }

    let mut limiter = RateLimiter::new(ctx.config.throughput_ceiling_bps);
    let total = plan.units.len();

    for (index, unit) in plan.units.iter().enumerate() {
        if !ctx.token.is_running() {
            return Err(TransferError::CancelledByCaller);
        }

        let file_name = unit.file_name();
        let base_percent = percent_of(index as u64, total as u64);
        notify(ctx, task, &file_name, Phase::Copying, base_percent);
        debug!(file = %unit.relative_path.display(), size = unit.file_size, "copying");

        let outcome = fs_ops::copy_file_throttled(
            &unit.source_path,
            &unit.destination_path,
            &mut limiter,
            ctx.config.chunk_size,
            ctx.token,
            |bytes, mbps| {
                if let Some(observer) = ctx.observer {
                    observer.on_throughput_sample(mbps);
                    if plan.single_file {
                        let percent = percent_of(bytes, unit.file_size);
                        observer.on_progress(task.id, &file_name, Phase::Copying, percent);
                    }
                }
            },
        )?;

        let bytes = match outcome {
            CopyOutcome::Completed { bytes } => bytes,
            CopyOutcome::Cancelled => {
                counters.partial_removed = true;
                return Err(TransferError::CancelledByCaller);
            }
        };

        notify(ctx, task, &file_name, Phase::Verifying, base_percent);
        let source_digest = checksums::digest(&unit.source_path, ctx.config.checksum_algorithm);
        let dest_digest = checksums::digest(&unit.destination_path, ctx.config.checksum_algorithm);
        if !source_digest.matches(&dest_digest) {
            warn!(
                file = %unit.relative_path.display(),
                source = ?source_digest.hex(),
                destination = ?dest_digest.hex(),
                "checksum mismatch"
            );
            return Err(TransferError::IntegrityMismatch {
                file_name: unit.relative_path.display().to_string(),
            });
        }

        let last_phase = if task.mode.deletes_source() {
            notify(ctx, task, &file_name, Phase::Deleting, base_percent);
            fs::remove_file(&unit.source_path).map_err(|e| TransferError::DeleteError {
                path: unit.source_path.clone(),
                source: e,
            })?;
            Phase::Deleting
        } else {
            Phase::Verifying
        };

        counters.files_completed += 1;
        counters.bytes_copied += bytes;
        notify(
            ctx,
            task,
            &file_name,
            last_phase,
            percent_of(counters.files_completed as u64, total as u64),
        );
    }

    if task.mode == Mode::Move && !plan.single_file {
        let removed = fs_ops::prune_empty_dirs(&task.source_path);
        debug!(count = removed.len(), "pruned emptied source directories");
    }

    Ok(format!(
        "Operation {} successful: {} file(s) transferred.",
        task.mode, counters.files_completed
    ))
}

/// Walk the task's source. Nothing is written except the destination root.
///
/// A destination that resolves to the source itself, or (for directory
/// sources) to a path inside the source tree, is rejected before anything
/// is written.
fn plan_task(task: &Task) -> Result<Plan, TransferError> {
    let source = &task.source_path;
    let metadata = fs::metadata(source).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            TransferError::SourceNotFound {
                path: source.clone(),
            }
        } else {
            TransferError::ReadError {
                path: source.clone(),
                source: e,
            }
        }
    })?;

    let source_root = fs_ops::resolve_path(source);
    let destination_root = fs_ops::resolve_path(&task.destination_path);
    if source_root == destination_root {
        return Err(TransferError::InvalidTask {
            reason: format!(
                "Source and destination are the same path: {}",
                source.display()
            ),
        });
    }

    if metadata.is_file() {
        let relative_path = source
            .file_name()
            .map(Path::new)
            .unwrap_or(source.as_path())
            .to_path_buf();
        fs_ops::ensure_parent_dir_exists(&task.destination_path)?;
        return Ok(Plan {
            units: vec![FileUnit {
                source_path: source.clone(),
                relative_path,
                destination_path: task.destination_path.clone(),
                file_size: metadata.len(),
            }],
            single_file: true,
        });
    }

    if destination_root.starts_with(&source_root) {
        return Err(TransferError::InvalidTask {
            reason: format!(
                "Destination {} lies inside the source directory",
                task.destination_path.display()
            ),
        });
    }

    let units = fs_ops::enumerate_files(source, &task.destination_path)?;
    fs_ops::ensure_dir_exists(&task.destination_path)?;
    Ok(Plan {
        units,
        single_file: false,
    })
}

fn notify(ctx: &TaskContext<'_>, task: &Task, file_name: &str, phase: Phase, percent: u8) {
    if let Some(observer) = ctx.observer {
        observer.on_progress(task.id, file_name, phase, percent);
    }
}
