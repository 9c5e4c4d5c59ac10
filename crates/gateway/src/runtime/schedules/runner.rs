//! Ticker that fires due schedules by injecting a user turn.
//!
//! Polls [`ScheduleStore::due_schedules`] every 30 seconds. For each due
//! schedule it builds the prompt to inject, respects `missed_policy` /
//! `timeout_ms` / `max_catchup_runs`, and records the outcome back onto
//! the store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::model::{MissedPolicy, Schedule};
use super::store::ScheduleStore;

const TICK_INTERVAL: Duration = Duration::from_secs(30);

/// What firing a schedule actually does. Implemented by the agent runtime
/// once it exists — kept as a trait so the runner doesn't depend on the
/// concrete turn/session machinery.
#[async_trait]
pub trait TurnInjector: Send + Sync {
    /// Inject `prompt` as a user turn against `session_key`. Returns the
    /// token usage on success.
    async fn inject(
        &self,
        session_key: &str,
        prompt: &str,
    ) -> Result<InjectedUsage, String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InjectedUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

pub struct ScheduleRunner {
    store: Arc<ScheduleStore>,
    injector: Arc<dyn TurnInjector>,
}

impl ScheduleRunner {
    pub fn new(store: Arc<ScheduleStore>, injector: Arc<dyn TurnInjector>) -> Self {
        Self { store, injector }
    }

    /// Run the ticker loop forever (intended to be spawned as a task).
    pub async fn run(self) {
        let mut interval = tokio::time::interval(TICK_INTERVAL);
        loop {
            interval.tick().await;
            self.tick().await;
        }
    }

    /// One polling pass: fire every currently-due schedule.
    pub async fn tick(&self) {
        for schedule in self.store.due_schedules().await {
            self.fire(&schedule).await;
        }
    }

    async fn fire(&self, schedule: &Schedule) {
        let runs = match schedule.missed_policy {
            MissedPolicy::Skip | MissedPolicy::RunOnce => 1,
            MissedPolicy::CatchUp => schedule.max_catchup_runs.max(1),
        };

        self.store.record_run(&schedule.id).await;

        for _ in 0..runs {
            let run_fut = self.injector.inject(&schedule.session_key, &schedule.prompt);
            let outcome = if schedule.timeout_ms > 0 {
                match tokio::time::timeout(Duration::from_millis(schedule.timeout_ms), run_fut).await {
                    Ok(result) => result,
                    Err(_) => Err(format!("schedule '{}' timed out after {}ms", schedule.name, schedule.timeout_ms)),
                }
            } else {
                run_fut.await
            };

            match outcome {
                Ok(usage) => {
                    self.store.record_success(&schedule.id).await;
                    self.store
                        .add_usage(&schedule.id, usage.input_tokens, usage.output_tokens)
                        .await;
                }
                Err(err) => {
                    tracing::warn!(schedule = %schedule.name, error = %err, "schedule run failed");
                    self.store.record_failure(&schedule.id, &err).await;
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::schedules::model::Schedule;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use uuid::Uuid;

    struct CountingInjector {
        calls: AtomicUsize,
        fail_first: bool,
    }

    #[async_trait]
    impl TurnInjector for CountingInjector {
        async fn inject(&self, _session_key: &str, _prompt: &str) -> Result<InjectedUsage, String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_first && n == 0 {
                Err("boom".into())
            } else {
                Ok(InjectedUsage { input_tokens: 10, output_tokens: 5 })
            }
        }
    }

    fn due_schedule(missed_policy: MissedPolicy) -> Schedule {
        let now = Utc::now();
        Schedule {
            id: Uuid::new_v4(),
            name: "test".into(),
            cron: "* * * * *".into(),
            timezone: "UTC".into(),
            enabled: true,
            session_key: "primary".into(),
            prompt: "heartbeat".into(),
            created_at: now,
            updated_at: now,
            last_run_at: None,
            next_run_at: Some(now - chrono::Duration::seconds(1)),
            missed_policy,
            timeout_ms: 0,
            max_catchup_runs: 3,
            last_error: None,
            last_error_at: None,
            consecutive_failures: 0,
            cooldown_until: None,
            total_input_tokens: 0,
            total_output_tokens: 0,
            total_runs: 0,
        }
    }

    #[tokio::test]
    async fn fires_once_for_run_once_policy() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(ScheduleStore::new(dir.path()));
        let schedule = store.insert(due_schedule(MissedPolicy::RunOnce)).await;
        let injector = Arc::new(CountingInjector { calls: AtomicUsize::new(0), fail_first: false });
        let runner = ScheduleRunner::new(store.clone(), injector.clone());

        runner.fire(&schedule).await;

        assert_eq!(injector.calls.load(Ordering::SeqCst), 1);
        let updated = store.get(&schedule.id).await.unwrap();
        assert_eq!(updated.total_runs, 1);
        assert_eq!(updated.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn catchup_policy_fires_max_catchup_runs_times() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(ScheduleStore::new(dir.path()));
        let schedule = store.insert(due_schedule(MissedPolicy::CatchUp)).await;
        let injector = Arc::new(CountingInjector { calls: AtomicUsize::new(0), fail_first: false });
        let runner = ScheduleRunner::new(store.clone(), injector.clone());

        runner.fire(&schedule).await;

        assert_eq!(injector.calls.load(Ordering::SeqCst), schedule.max_catchup_runs);
    }

    #[tokio::test]
    async fn failure_stops_catchup_loop_and_records_cooldown() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(ScheduleStore::new(dir.path()));
        let schedule = store.insert(due_schedule(MissedPolicy::CatchUp)).await;
        let injector = Arc::new(CountingInjector { calls: AtomicUsize::new(0), fail_first: true });
        let runner = ScheduleRunner::new(store.clone(), injector.clone());

        runner.fire(&schedule).await;

        assert_eq!(injector.calls.load(Ordering::SeqCst), 1);
        let updated = store.get(&schedule.id).await.unwrap();
        assert_eq!(updated.consecutive_failures, 1);
        assert!(updated.cooldown_until.is_some());
    }
}
