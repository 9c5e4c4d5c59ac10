//! Supervisor — restarts the gateway server when it exits non-zero.
//!
//! Spawns the gateway binary as a child, waits on exit, and respawns it
//! with exponential backoff on crash. A run that stays up past the
//! healthy-run threshold resets the backoff to its initial value.

mod backoff;
mod crashlog;
mod state;

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use backoff::Backoff;
use state::SupervisorState;

/// A run shorter than this is treated as a crash loop, not a healthy
/// restart — the backoff keeps climbing instead of resetting.
const HEALTHY_RUN_THRESHOLD: Duration = Duration::from_secs(60);

/// Lines of combined stdout/stderr kept per crash log entry.
const CRASH_LOG_TAIL_LINES: usize = 50;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let data_dir = std::env::var("SA_STATE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data/state"));
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating state dir {}", data_dir.display()))?;

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let child_bin = if args.is_empty() {
        "personal-agent-gateway".to_string()
    } else {
        args.remove(0)
    };
    let child_args = if args.is_empty() {
        vec!["serve".to_string()]
    } else {
        args
    };

    tracing::info!(bin = %child_bin, args = ?child_args, "supervisor starting");

    let state_path = data_dir.join("supervisor.json");
    let crash_log_path = data_dir.join("crash.log");
    let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(5 * 60));
    let mut crash_count: u64 = 0;

    loop {
        let started_at = chrono::Utc::now();
        let mut child = Command::new(&child_bin)
            .args(&child_args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("spawning child process {child_bin}"))?;

        let child_pid = child.id().unwrap_or(0);
        SupervisorState {
            parent_pid: std::process::id(),
            child_pid,
            started_at,
            crash_count,
        }
        .persist(&state_path)?;

        tracing::info!(child_pid, "child started");

        let stdout = child.stdout.take().expect("piped stdout");
        let stderr = child.stderr.take().expect("piped stderr");
        let tail = crashlog::TailBuffer::new(CRASH_LOG_TAIL_LINES);
        let out_tail = tail.clone();
        let err_tail = tail.clone();

        let out_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                out_tail.push(line);
            }
        });
        let err_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                err_tail.push(line);
            }
        });

        let run_start = Instant::now();
        let status = child.wait().await.context("waiting on child process")?;
        let _ = out_task.await;
        let _ = err_task.await;
        let ran_for = run_start.elapsed();

        if status.success() {
            tracing::info!(child_pid, "child exited cleanly, supervisor stopping");
            let _ = std::fs::remove_file(&state_path);
            return Ok(());
        }

        crash_count += 1;
        let exit_code = status.code();
        tracing::warn!(child_pid, ?exit_code, ran_for_secs = ran_for.as_secs(), crash_count, "child exited non-zero");

        crashlog::append_crash(&crash_log_path, exit_code, ran_for, tail.lines())?;

        if ran_for >= HEALTHY_RUN_THRESHOLD {
            backoff.reset();
        }

        let wait = backoff.next();
        tracing::info!(wait_secs = wait.as_secs(), "backing off before restart");
        tokio::time::sleep(wait).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn healthy_run_threshold_is_less_than_initial_cap() {
        assert!(HEALTHY_RUN_THRESHOLD < Duration::from_secs(5 * 60));
    }
}
