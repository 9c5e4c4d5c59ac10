//! Crash log — one JSONL entry per child exit, carrying the last lines
//! of its combined stdout/stderr.

use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use serde::Serialize;

/// A fixed-capacity ring buffer of output lines, shared between the
/// stdout and stderr reader tasks so both feed the same tail.
#[derive(Clone)]
pub struct TailBuffer {
    inner: Arc<Mutex<VecDeque<String>>>,
    capacity: usize,
}

impl TailBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub fn push(&self, line: String) {
        let mut buf = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if buf.len() == self.capacity {
            buf.pop_front();
        }
        buf.push_back(line);
    }

    pub fn lines(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }
}

#[derive(Serialize)]
struct CrashEntry {
    timestamp: chrono::DateTime<chrono::Utc>,
    exit_code: Option<i32>,
    ran_for_secs: u64,
    output_tail: Vec<String>,
}

pub fn append_crash(
    path: &Path,
    exit_code: Option<i32>,
    ran_for: Duration,
    output_tail: Vec<String>,
) -> anyhow::Result<()> {
    let entry = CrashEntry {
        timestamp: chrono::Utc::now(),
        exit_code,
        ran_for_secs: ran_for.as_secs(),
        output_tail,
    };
    let line = serde_json::to_string(&entry)?;

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening crash log {}", path.display()))?;
    writeln!(file, "{line}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_buffer_drops_oldest_past_capacity() {
        let tail = TailBuffer::new(3);
        for i in 0..5 {
            tail.push(format!("line {i}"));
        }
        assert_eq!(tail.lines(), vec!["line 2", "line 3", "line 4"]);
    }

    #[test]
    fn append_crash_writes_one_jsonl_line_per_call() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crash.log");

        append_crash(&path, Some(1), Duration::from_secs(5), vec!["boom".to_string()]).unwrap();
        append_crash(&path, None, Duration::from_secs(2), vec![]).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["exit_code"], 1);
        assert_eq!(first["output_tail"][0], "boom");
    }
}
