//! FreeSync - Command-line interface for the verified transfer engine.
//!
//! Queues one task from `--src/--dst/--mode` and/or many from a task-list
//! file, runs them through a `TransferSession`, and reports progress to
//! stderr. Ctrl-C asks the running task to stop cleanly.

use clap::Parser;
use freesync_engine::{
    CancellationToken, ChecksumAlgorithm, EngineConfig, FailurePolicy, Mode, Phase,
    SessionReport, TaskId, TransferObserver, TransferSession,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// FreeSync - throttled, checksum-verified batch copy and move
#[derive(Parser, Debug)]
#[command(name = "freesync")]
#[command(version = "0.1.0")]
#[command(about = "Copy or move directory trees, verifying every file before deleting anything")]
struct Args {
    /// Source directory (or single file)
    #[arg(long, value_name = "PATH", requires = "dst")]
    src: Option<PathBuf>,

    /// Destination directory (or file, for a single-file source)
    #[arg(long, value_name = "PATH", requires = "src")]
    dst: Option<PathBuf>,

    /// Operation mode for --src/--dst: copy, move or verify-and-delete
    #[arg(long, value_name = "MODE", default_value = "copy")]
    mode: String,

    /// Task list file, one `MODE SRC DST` per line
    #[arg(long, value_name = "FILE")]
    tasks: Option<PathBuf>,

    /// Throughput ceiling in MB/s (0 = no explicit limit)
    #[arg(long, value_name = "MBPS", default_value_t = 0)]
    limit_mbps: u64,

    /// Checksum algorithm for verification: md5, sha256, blake3
    #[arg(long, value_name = "ALGORITHM", default_value = "blake3")]
    hash: String,

    /// Keep running queued tasks after one fails
    #[arg(long)]
    continue_on_failure: bool,

    /// Enable verbose output
    #[arg(long)]
    verbose: bool,
}

/// One line of a task list.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TaskLine {
    mode: Mode,
    source: PathBuf,
    destination: PathBuf,
}

/// CLI implementation of TransferObserver for displaying transfer progress
struct CliProgress {
    verbose: bool,
    last_progress_update: Mutex<Instant>,
    last_mbps: Mutex<f64>,
}

impl CliProgress {
    fn new(verbose: bool) -> Self {
        CliProgress {
            verbose,
            last_progress_update: Mutex::new(Instant::now()),
            last_mbps: Mutex::new(0.0),
        }
    }

    fn format_duration(elapsed: Duration) -> String {
        let secs = elapsed.as_secs();
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        let secs = secs % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, mins, secs)
        } else if mins > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}s", secs)
        }
    }

    fn print_progress_bar(percent: u8) -> String {
        let percent = percent.min(100) as usize;
        let filled = percent / 5;
        let empty = 20 - filled;
        format!("[{}{}] {:3}%", "=".repeat(filled), " ".repeat(empty), percent)
    }
}

impl TransferObserver for CliProgress {
    fn on_progress(&self, task_id: TaskId, file_name: &str, phase: Phase, percent: u8) {
        if self.verbose {
            eprintln!("{} [{:3}%] {} {}", task_id, percent, phase, file_name);
            return;
        }

        // Throttle redraws to avoid spam (max once per 200ms), but always show 100%
        let mut last = self
            .last_progress_update
            .lock()
            .unwrap_or_else(|p| p.into_inner());
        if percent < 100 && last.elapsed() < Duration::from_millis(200) {
            return;
        }
        *last = Instant::now();

        let mbps = *self.last_mbps.lock().unwrap_or_else(|p| p.into_inner());
        eprint!(
            "\r{} {} {:>8.2} MB/s | {:<18} {:<40}",
            task_id,
            Self::print_progress_bar(percent),
            mbps,
            phase.to_string(),
            file_name
        );
        let _ = std::io::Write::flush(&mut std::io::stderr());
    }

    fn on_throughput_sample(&self, mbps: f64) {
        *self.last_mbps.lock().unwrap_or_else(|p| p.into_inner()) = mbps;
    }

    fn on_status(&self, message: &str) {
        if !self.verbose {
            eprintln!();
        }
        eprintln!("{}", message);
    }

    fn on_task_finished(&self, task_id: TaskId, success: bool, message: &str) {
        if !self.verbose {
            eprintln!();
        }
        let verdict = if success { "done" } else { "FAILED" };
        eprintln!("Task {} {}: {}", task_id, verdict, message);
    }
}

/// Parse arguments, run the queue and map the result to an exit code
fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    // Exit code tracking: 0 all succeeded, 1 a task failed or was cancelled, 2 setup error
    let exit_code = match run_cli(&args, spawn_ctrl_c_watcher) {
        Ok(report) if report.is_success() => 0,
        Ok(_) => 1,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            2
        }
    };

    std::process::exit(exit_code);
}

fn init_logging(verbose: bool) {
    let default_directives = if verbose {
        "warn,freesync_engine=debug,freesync=debug"
    } else {
        "warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directives));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Request a cooperative stop on Ctrl-C.
///
/// Runs on its own thread with a current-thread runtime; the session itself
/// stays synchronous.
fn spawn_ctrl_c_watcher(token: CancellationToken) {
    let spawned = thread::Builder::new()
        .name("ctrl-c".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    warn!(error = %e, "could not start signal runtime; Ctrl-C will not stop cleanly");
                    return;
                }
            };
            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    eprintln!();
                    eprintln!("Stop requested, removing partial file...");
                    token.request_stop();
                }
            });
        });
    if let Err(e) = spawned {
        warn!(error = %e, "could not spawn Ctrl-C watcher");
    }
}

/// Main CLI logic - separated for testability
///
/// `on_started` receives the run's cancellation token once the session is
/// running.
fn run_cli(
    args: &Args,
    on_started: impl FnOnce(CancellationToken),
) -> Result<SessionReport, String> {
    let algorithm: ChecksumAlgorithm = args.hash.parse()?;
    let policy = if args.continue_on_failure {
        FailurePolicy::Continue
    } else {
        FailurePolicy::Halt
    };
    let config = EngineConfig::default()
        .with_ceiling_mbps(args.limit_mbps)
        .with_checksum_algorithm(algorithm)
        .with_failure_policy(policy);

    let mut lines = Vec::new();
    if let Some(ref tasks_file) = args.tasks {
        lines.extend(parse_task_file(tasks_file)?);
    }
    if let (Some(src), Some(dst)) = (&args.src, &args.dst) {
        lines.push(TaskLine {
            mode: args.mode.parse()?,
            source: src.clone(),
            destination: dst.clone(),
        });
    }
    if lines.is_empty() {
        return Err("Please add at least one task (--src/--dst or --tasks)".to_string());
    }

    let mut session = TransferSession::new(config);
    for line in lines {
        let id = session
            .add_task(line.source, line.destination, line.mode)
            .map_err(|e| format!("Could not queue task: {}", e))?;
        debug!(task = %id, "queued");
    }

    for task in session.tasks() {
        eprintln!("{} {}", task.id, task.label());
    }
    eprintln!();

    let started = Instant::now();
    let progress = Arc::new(CliProgress::new(args.verbose));
    let session_id = session
        .start(Some(progress))
        .map_err(|e| format!("Could not start session: {}", e))?;
    info!(%session_id, "running");
    on_started(session.cancellation_token());

    let report = session.wait();

    eprintln!();
    eprintln!("Summary: {}", report.summary());
    eprintln!("Elapsed: {}", CliProgress::format_duration(started.elapsed()));
    if !report.failed.is_empty() {
        eprintln!();
        eprintln!("Failed tasks:");
        for (id, message) in &report.failed {
            eprintln!("  {}: {}", id, message);
        }
    }

    Ok(report)
}

fn parse_task_file(path: &Path) -> Result<Vec<TaskLine>, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Cannot read task file {}: {}", path.display(), e))?;

    let mut lines = Vec::new();
    for (index, raw) in content.lines().enumerate() {
        if let Some(line) = parse_task_line(raw)
            .map_err(|e| format!("{}:{}: {}", path.display(), index + 1, e))?
        {
            lines.push(line);
        }
    }
    Ok(lines)
}

/// Parse `MODE SRC DST`. Blank lines and `;`/`#` comments yield `None`.
fn parse_task_line(raw: &str) -> Result<Option<TaskLine>, String> {
    let line = raw.trim();
    if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
        return Ok(None);
    }

    let fields: Vec<&str> = line.split_whitespace().collect();
    match fields.as_slice() {
        [mode, source, destination] => Ok(Some(TaskLine {
            mode: mode.parse()?,
            source: PathBuf::from(source),
            destination: PathBuf::from(destination),
        })),
        _ => Err(format!(
            "expected `MODE SRC DST`, found {} field(s)",
            fields.len()
        )),
    }
}
