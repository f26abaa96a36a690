//! Filesystem operations module.
//!
//! This module provides low-level operations for:
//! - Enumerating directory trees into `FileUnit`s
//! - Chunked, paced, cancellable file copies with metadata preservation
//! - Creating directories recursively
//! - Pruning source directories emptied by a move

use crate::cancel::CancellationToken;
use crate::error::TransferError;
use crate::model::FileUnit;
use crate::throttle::RateLimiter;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, warn};

/// Enumerate all regular files under `source`, mapping each to its place
/// under `destination_root`.
///
/// Entries are visited in name order so a task always processes files in
/// the same sequence. Symlinks to files are followed; symlinks to
/// directories are not descended into.
///
/// # Errors
/// Returns `TransferError::EnumerationFailed` if any directory cannot be read.
pub fn enumerate_files(
    source: &Path,
    destination_root: &Path,
) -> Result<Vec<FileUnit>, TransferError> {
    let mut units = Vec::new();

    fn recurse(
        dir: &Path,
        rel_dir: &Path,
        destination_root: &Path,
        units: &mut Vec<FileUnit>,
    ) -> Result<(), TransferError> {
        let enum_err = |e| TransferError::EnumerationFailed {
            path: dir.to_path_buf(),
            source: e,
        };

        let mut entries = fs::read_dir(dir)
            .map_err(enum_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(enum_err)?;
        entries.sort_by_key(|e| e.file_name());

        for entry in entries {
            let entry_path = entry.path();
            let relative_path = rel_dir.join(entry.file_name());
            let file_type = entry.file_type().map_err(enum_err)?;

            if file_type.is_dir() {
                recurse(&entry_path, &relative_path, destination_root, units)?;
                continue;
            }

            let metadata = if file_type.is_symlink() {
                match fs::metadata(&entry_path) {
                    Ok(m) => m,
                    Err(e) => {
                        warn!(path = %entry_path.display(), error = %e, "skipping dangling symlink");
                        continue;
                    }
                }
            } else {
                entry.metadata().map_err(enum_err)?
            };

            if !metadata.is_file() {
                continue;
            }

            units.push(FileUnit {
                destination_path: destination_root.join(&relative_path),
                source_path: entry_path,
                relative_path,
                file_size: metadata.len(),
            });
        }
        Ok(())
    }

    recurse(source, Path::new(""), destination_root, &mut units)?;
    Ok(units)
}

/// Result of a chunked copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    /// All bytes written and metadata applied
    Completed { bytes: u64 },
    /// Stopped by the token; the partial destination was removed
    Cancelled,
}

/// Copy `src` to `dst` chunk by chunk through `limiter`.
///
/// The token is polled before every chunk, including after the final one,
/// so a stop requested at any point during the copy yields `Cancelled`.
/// On cancellation or on an I/O error the partially written destination is
/// removed. `on_chunk` receives the bytes copied so far and the limiter's
/// throughput sample after each chunk.
///
/// Modification and access times, and permissions, are copied from the
/// source where the platform allows.
///
/// # Errors
/// Returns `ReadError`/`WriteError` for I/O failures, and `InvalidTask`
/// when `dst` already names the same file as `src` (nothing is written).
pub fn copy_file_throttled(
    src: &Path,
    dst: &Path,
    limiter: &mut RateLimiter,
    chunk_size: usize,
    token: &CancellationToken,
    mut on_chunk: impl FnMut(u64, f64),
) -> Result<CopyOutcome, TransferError> {
    // Creating dst would truncate src before a single byte is read.
    if is_same_file(src, dst) {
        return Err(TransferError::InvalidTask {
            reason: format!(
                "Source and destination are the same file: {}",
                src.display()
            ),
        });
    }
    ensure_parent_dir_exists(dst)?;

    let mut src_file = fs::File::open(src).map_err(|e| TransferError::ReadError {
        path: src.to_path_buf(),
        source: e,
    })?;
    let src_metadata = src_file.metadata().map_err(|e| TransferError::ReadError {
        path: src.to_path_buf(),
        source: e,
    })?;

    let dst_file = fs::File::create(dst).map_err(|e| TransferError::WriteError {
        path: dst.to_path_buf(),
        source: e,
    })?;

    let result = copy_chunks(
        &mut src_file,
        dst_file,
        src,
        dst,
        limiter,
        chunk_size.max(1),
        token,
        &mut on_chunk,
    );

    match result {
        Ok(CopyOutcome::Completed { bytes }) => {
            apply_metadata(&src_metadata, dst);
            Ok(CopyOutcome::Completed { bytes })
        }
        Ok(CopyOutcome::Cancelled) => {
            remove_partial(dst);
            Ok(CopyOutcome::Cancelled)
        }
        Err(e) => {
            remove_partial(dst);
            Err(e)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn copy_chunks(
    src_file: &mut fs::File,
    mut dst_file: fs::File,
    src: &Path,
    dst: &Path,
    limiter: &mut RateLimiter,
    chunk_size: usize,
    token: &CancellationToken,
    on_chunk: &mut dyn FnMut(u64, f64),
) -> Result<CopyOutcome, TransferError> {
    let mut buffer = vec![0u8; chunk_size];
    let mut copied: u64 = 0;

    while token.is_running() {
        let chunk_started = Instant::now();

        let n = match src_file.read(&mut buffer) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(TransferError::ReadError {
                    path: src.to_path_buf(),
                    source: e,
                })
            }
        };
        if n == 0 {
            dst_file.flush().map_err(|e| TransferError::WriteError {
                path: dst.to_path_buf(),
                source: e,
            })?;
            return Ok(CopyOutcome::Completed { bytes: copied });
        }

        dst_file
            .write_all(&buffer[..n])
            .map_err(|e| TransferError::WriteError {
                path: dst.to_path_buf(),
                source: e,
            })?;
        copied += n as u64;

        let mbps = limiter.pace(n, chunk_started);
        on_chunk(copied, mbps);
    }

    Ok(CopyOutcome::Cancelled)
}

fn apply_metadata(src_metadata: &fs::Metadata, dst: &Path) {
    if let Err(e) = fs::set_permissions(dst, src_metadata.permissions()) {
        debug!(path = %dst.display(), error = %e, "could not copy permissions");
    }
    let mtime = filetime::FileTime::from_last_modification_time(src_metadata);
    let atime = filetime::FileTime::from_last_access_time(src_metadata);
    if let Err(e) = filetime::set_file_times(dst, atime, mtime) {
        debug!(path = %dst.display(), error = %e, "could not preserve timestamps");
    }
}

/// True if both paths exist and refer to the same file, through symlinks
/// or (on unix) hard links.
pub fn is_same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) if a == b => true,
        (Ok(_), Ok(_)) => same_inode(a, b),
        _ => false,
    }
}

#[cfg(unix)]
fn same_inode(a: &Path, b: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;
    match (fs::metadata(a), fs::metadata(b)) {
        (Ok(a), Ok(b)) => a.dev() == b.dev() && a.ino() == b.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn same_inode(_a: &Path, _b: &Path) -> bool {
    false
}

/// Absolute, symlink-free form of `path`, which need not exist yet.
///
/// The deepest existing ancestor is canonicalized and the missing
/// components are appended to it unchanged. Falls back to `path` itself
/// when no ancestor can be resolved.
pub fn resolve_path(path: &Path) -> PathBuf {
    let mut existing = path;
    let mut missing = Vec::new();
    loop {
        if let Ok(canonical) = fs::canonicalize(existing) {
            return missing
                .iter()
                .rev()
                .fold(canonical, |resolved, name| resolved.join(name));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = if parent.as_os_str().is_empty() {
                    Path::new(".")
                } else {
                    parent
                };
            }
            _ => return path.to_path_buf(),
        }
    }
}

/// Remove a partially written destination file, if present.
pub fn remove_partial(dst: &Path) {
    match fs::remove_file(dst) {
        Ok(()) => debug!(path = %dst.display(), "removed partial destination"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %dst.display(), error = %e, "failed to remove partial destination"),
    }
}

/// Ensure the parent directory of a path exists, creating it if necessary.
///
/// # Errors
/// Returns `TransferError::DirectoryCreationFailed` if the parent cannot be
/// created or exists as something other than a directory.
pub fn ensure_parent_dir_exists(path: &Path) -> Result<(), TransferError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => ensure_dir_exists(parent),
        _ => Ok(()),
    }
}

/// `mkdir -p` for `dir`.
///
/// # Errors
/// Returns `TransferError::DirectoryCreationFailed` on failure, including
/// when `dir` exists but is not a directory.
pub fn ensure_dir_exists(dir: &Path) -> Result<(), TransferError> {
    match fs::metadata(dir) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(TransferError::DirectoryCreationFailed {
            path: dir.to_path_buf(),
            source: io::Error::new(
                io::ErrorKind::InvalidInput,
                "Path exists but is not a directory",
            ),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(dir).map_err(|e| TransferError::DirectoryCreationFailed {
                path: dir.to_path_buf(),
                source: e,
            })
        }
        Err(e) => Err(TransferError::DirectoryCreationFailed {
            path: dir.to_path_buf(),
            source: e,
        }),
    }
}

/// Remove empty directories below `root`, deepest first. `root` itself is kept.
///
/// Returns the removed directories. Directories that cannot be read or
/// removed are left in place.
pub fn prune_empty_dirs(root: &Path) -> Vec<PathBuf> {
    fn recurse(dir: &Path, removed: &mut Vec<PathBuf>) -> bool {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(_) => return false,
        };

        let mut empty = true;
        for entry in entries {
            let Ok(entry) = entry else {
                empty = false;
                continue;
            };
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if is_dir {
                let path = entry.path();
                if recurse(&path, removed) && fs::remove_dir(&path).is_ok() {
                    removed.push(path);
                    continue;
                }
            }
            empty = false;
        }
        empty
    }

    let mut removed = Vec::new();
    recurse(root, &mut removed);
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, data: &[u8]) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent");
        }
        fs::write(path, data).expect("Failed to write file");
    }

    #[test]
    fn test_enumerate_flat_directory() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        write(&src.join("file2.txt"), b"test data 2");
        write(&src.join("file1.txt"), b"test data 1");
        let dst = temp_dir.path().join("dst");

        let units = enumerate_files(&src, &dst).expect("Failed to enumerate");

        assert_eq!(units.len(), 2);
        assert_eq!(units[0].relative_path, PathBuf::from("file1.txt"));
        assert_eq!(units[1].relative_path, PathBuf::from("file2.txt"));
        assert_eq!(units[0].destination_path, dst.join("file1.txt"));
        let total_size: u64 = units.iter().map(|u| u.file_size).sum();
        assert_eq!(total_size, 22);
    }

    #[test]
    fn test_enumerate_nested_directory_skips_dirs() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        write(&src.join("file1.txt"), b"data1");
        write(&src.join("subdir").join("file2.txt"), b"data2");
        fs::create_dir_all(src.join("empty")).expect("Failed to create empty dir");
        let dst = temp_dir.path().join("dst");

        let units = enumerate_files(&src, &dst).expect("Failed to enumerate");

        assert_eq!(units.len(), 2);
        let nested = units
            .iter()
            .find(|u| u.file_name() == "file2.txt")
            .expect("nested file missing");
        assert_eq!(nested.relative_path, Path::new("subdir").join("file2.txt"));
        assert_eq!(nested.destination_path, dst.join("subdir").join("file2.txt"));
    }

    #[test]
    fn test_enumerate_nonexistent_source() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let result = enumerate_files(&temp_dir.path().join("nonexistent"), temp_dir.path());
        assert!(matches!(result, Err(TransferError::EnumerationFailed { .. })));
    }

    #[test]
    fn test_copy_file_throttled_copies_and_reports() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("source.bin");
        let dst = temp_dir.path().join("out").join("dest.bin");
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 256) as u8).collect();
        write(&src, &data);

        let mut limiter = RateLimiter::new(0);
        let token = CancellationToken::new();
        let mut reports = Vec::new();
        let outcome = copy_file_throttled(&src, &dst, &mut limiter, 4096, &token, |bytes, _| {
            reports.push(bytes)
        })
        .expect("Failed to copy");

        assert_eq!(outcome, CopyOutcome::Completed { bytes: 10_000 });
        assert_eq!(reports, vec![4096, 8192, 10_000]);
        assert_eq!(fs::read(&dst).expect("Failed to read dest"), data);
    }

    #[test]
    fn test_copy_preserves_mtime() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("source.txt");
        let dst = temp_dir.path().join("dest.txt");
        write(&src, b"test content");
        let old = filetime::FileTime::from_unix_time(1_000_000_000, 0);
        filetime::set_file_mtime(&src, old).expect("Failed to set mtime");

        let mut limiter = RateLimiter::new(0);
        copy_file_throttled(&src, &dst, &mut limiter, 1024, &CancellationToken::new(), |_, _| {})
            .expect("Failed to copy");

        let meta = fs::metadata(&dst).expect("Failed to stat dest");
        assert_eq!(filetime::FileTime::from_last_modification_time(&meta), old);
    }

    #[test]
    fn test_copy_cancelled_mid_file_removes_partial() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("source.bin");
        let dst = temp_dir.path().join("dest.bin");
        write(&src, &vec![7u8; 8192]);

        let mut limiter = RateLimiter::new(0);
        let token = CancellationToken::new();
        let stopper = token.clone();
        let outcome = copy_file_throttled(&src, &dst, &mut limiter, 1024, &token, |bytes, _| {
            if bytes >= 2048 {
                stopper.request_stop();
            }
        })
        .expect("Cancellation is not an error");

        assert_eq!(outcome, CopyOutcome::Cancelled);
        assert!(!dst.exists(), "partial destination must be removed");
        assert!(src.exists());
    }

    #[test]
    fn test_copy_with_stopped_token_writes_nothing() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("source.txt");
        let dst = temp_dir.path().join("dest.txt");
        write(&src, b"abc");

        let token = CancellationToken::new();
        token.request_stop();
        let mut limiter = RateLimiter::new(0);
        let outcome = copy_file_throttled(&src, &dst, &mut limiter, 1024, &token, |_, _| {})
            .expect("Cancellation is not an error");

        assert_eq!(outcome, CopyOutcome::Cancelled);
        assert!(!dst.exists());
    }

    #[test]
    fn test_copy_missing_source_is_read_error() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut limiter = RateLimiter::new(0);
        let result = copy_file_throttled(
            &temp_dir.path().join("missing"),
            &temp_dir.path().join("dst"),
            &mut limiter,
            1024,
            &CancellationToken::new(),
            |_, _| {},
        );
        assert!(matches!(result, Err(TransferError::ReadError { .. })));
    }

    #[test]
    fn test_copy_onto_itself_is_refused_untouched() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("only.txt");
        write(&src, b"precious data");
        let alias = temp_dir.path().join(".").join("only.txt");

        let mut limiter = RateLimiter::new(0);
        let result = copy_file_throttled(
            &src,
            &alias,
            &mut limiter,
            4,
            &CancellationToken::new(),
            |_, _| {},
        );

        assert!(matches!(result, Err(TransferError::InvalidTask { .. })));
        assert_eq!(fs::read(&src).unwrap(), b"precious data");
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_onto_hard_link_is_refused() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("a").join("data.bin");
        write(&src, b"linked twice");
        let link = temp_dir.path().join("b").join("data.bin");
        fs::create_dir_all(link.parent().unwrap()).unwrap();
        fs::hard_link(&src, &link).expect("Failed to hard link");

        assert!(is_same_file(&src, &link));
        let mut limiter = RateLimiter::new(0);
        let result = copy_file_throttled(
            &src,
            &link,
            &mut limiter,
            4,
            &CancellationToken::new(),
            |_, _| {},
        );

        assert!(matches!(result, Err(TransferError::InvalidTask { .. })));
        assert_eq!(fs::read(&src).unwrap(), b"linked twice");
    }

    #[test]
    fn test_read_error_removes_partial_destination() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        // A directory opens fine but fails on the first read.
        let src = temp_dir.path().join("not_a_file");
        fs::create_dir(&src).expect("mkdir");
        let dst = temp_dir.path().join("out").join("dest.bin");

        let mut limiter = RateLimiter::new(0);
        let result = copy_file_throttled(
            &src,
            &dst,
            &mut limiter,
            1024,
            &CancellationToken::new(),
            |_, _| {},
        );

        assert!(matches!(result, Err(TransferError::ReadError { .. })));
        assert!(!dst.exists(), "partial destination must be removed");
    }

    #[test]
    fn test_resolve_path_handles_missing_tail() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = fs::canonicalize(temp_dir.path()).unwrap();

        let missing = temp_dir.path().join("new").join("deeper");
        assert_eq!(resolve_path(&missing), root.join("new").join("deeper"));

        fs::create_dir(temp_dir.path().join("real")).unwrap();
        let dotted = temp_dir.path().join("real").join("..").join("real");
        assert_eq!(resolve_path(&dotted), root.join("real"));
    }

    #[test]
    fn test_is_same_file() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let a = temp_dir.path().join("a.txt");
        let b = temp_dir.path().join("b.txt");
        write(&a, b"same bytes");
        write(&b, b"same bytes");

        assert!(is_same_file(&a, &a));
        assert!(!is_same_file(&a, &b));
        assert!(!is_same_file(&a, &temp_dir.path().join("missing")));
    }

    #[test]
    fn test_ensure_parent_dir_exists() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("a").join("b").join("file.txt");

        ensure_parent_dir_exists(&path).expect("Failed to create parent");
        assert!(temp_dir.path().join("a").join("b").is_dir());
    }

    #[test]
    fn test_ensure_dir_exists_rejects_file() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let file = temp_dir.path().join("file.txt");
        write(&file, b"x");
        assert!(matches!(
            ensure_dir_exists(&file),
            Err(TransferError::DirectoryCreationFailed { .. })
        ));
    }

    #[test]
    fn test_prune_empty_dirs_keeps_root_and_nonempty() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = temp_dir.path().join("root");
        fs::create_dir_all(root.join("a").join("b")).expect("mkdir");
        write(&root.join("keep").join("file.txt"), b"x");

        let removed = prune_empty_dirs(&root);

        assert_eq!(removed.len(), 2);
        assert!(root.is_dir());
        assert!(!root.join("a").exists());
        assert!(root.join("keep").join("file.txt").exists());
    }
}
