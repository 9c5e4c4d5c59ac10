//! Persisted supervisor state — parent/child PIDs and crash count.
//!
//! Written atomically (temp file + rename) the same way
//! `gw_tools::file_ops::file_write` persists tool output, so a reader
//! never observes a half-written file.

use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorState {
    pub parent_pid: u32,
    pub child_pid: u32,
    pub started_at: DateTime<Utc>,
    pub crash_count: u64,
}

impl SupervisorState {
    pub fn persist(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let tmp_name = format!(
            ".{}.{}.tmp",
            path.file_name().unwrap_or_default().to_string_lossy(),
            uuid::Uuid::new_v4().as_simple()
        );
        let tmp_path = path.with_file_name(tmp_name);

        std::fs::write(&tmp_path, json)
            .with_context(|| format!("writing {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("renaming into {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persist_writes_readable_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("supervisor.json");

        let state = SupervisorState {
            parent_pid: 100,
            child_pid: 200,
            started_at: Utc::now(),
            crash_count: 3,
        };
        state.persist(&path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let loaded: SupervisorState = serde_json::from_str(&raw).unwrap();
        assert_eq!(loaded.child_pid, 200);
        assert_eq!(loaded.crash_count, 3);
    }

    #[test]
    fn persist_overwrites_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("supervisor.json");

        SupervisorState {
            parent_pid: 1,
            child_pid: 2,
            started_at: Utc::now(),
            crash_count: 0,
        }
        .persist(&path)
        .unwrap();

        SupervisorState {
            parent_pid: 1,
            child_pid: 3,
            started_at: Utc::now(),
            crash_count: 1,
        }
        .persist(&path)
        .unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let loaded: SupervisorState = serde_json::from_str(&raw).unwrap();
        assert_eq!(loaded.child_pid, 3);
        assert_eq!(loaded.crash_count, 1);
    }
}
