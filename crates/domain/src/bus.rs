//! The in-process event/command bus.
//!
//! A thin wrapper over [`tokio::sync::broadcast`] that lets independent
//! components (the agent runtime, cron/heartbeat, the supervisor's health
//! reporter, channel adapters) observe gateway-wide lifecycle events without
//! being wired directly to each other.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Broadcast events describing gateway lifecycle and turn activity.
/// Lossy by design: a slow subscriber that falls behind the channel
/// capacity misses the oldest events rather than blocking producers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GatewayEvent {
    #[serde(rename = "turn_started")]
    TurnStarted { session_key: String },
    #[serde(rename = "turn_finished")]
    TurnFinished { session_key: String, ok: bool },
    #[serde(rename = "compaction_run")]
    CompactionRun { session_key: String, turns_compacted: usize },
    #[serde(rename = "provider_cooldown")]
    ProviderCooldown { provider: String, until_secs: i64 },
    #[serde(rename = "heartbeat_fired")]
    HeartbeatFired { schedule_id: String },
    #[serde(rename = "shutdown_requested")]
    ShutdownRequested,
}

/// A command injected out-of-band into a running session (e.g. from the
/// supervisor, an admin CLI invocation, or a channel adapter's `/cancel`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GatewayCommand {
    #[serde(rename = "cancel_turn")]
    CancelTurn { session_key: String },
    #[serde(rename = "reload_config")]
    ReloadConfig,
    #[serde(rename = "shutdown")]
    Shutdown,
}

/// Shared publish handle for both channels. Cloning is cheap (it clones
/// the underlying `Sender`s, which are `Arc`-backed).
#[derive(Clone)]
pub struct EventBus {
    events: broadcast::Sender<GatewayEvent>,
    commands: broadcast::Sender<GatewayCommand>,
}

/// Default ring buffer depth for both channels. Sized generously above
/// the handful of concurrent sessions a personal gateway expects to run.
const DEFAULT_CAPACITY: usize = 256;

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity);
        let (commands, _) = broadcast::channel(capacity);
        Self { events, commands }
    }

    pub fn publish_event(&self, event: GatewayEvent) {
        // No active subscribers is a normal state (e.g. no CLI attached);
        // broadcast::send only errors when there are zero receivers.
        let _ = self.events.send(event);
    }

    pub fn publish_command(&self, command: GatewayCommand) {
        let _ = self.commands.send(command);
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<GatewayEvent> {
        self.events.subscribe()
    }

    pub fn subscribe_commands(&self) -> broadcast::Receiver<GatewayCommand> {
        self.commands.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn published_event_reaches_subscriber() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe_events();
        bus.publish_event(GatewayEvent::TurnStarted {
            session_key: "s1".into(),
        });
        let got = rx.recv().await.unwrap();
        assert!(matches!(got, GatewayEvent::TurnStarted { session_key } if session_key == "s1"));
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::new();
        bus.publish_event(GatewayEvent::ShutdownRequested);
    }

    #[tokio::test]
    async fn commands_are_independent_of_events() {
        let bus = EventBus::new();
        let mut cmd_rx = bus.subscribe_commands();
        bus.publish_command(GatewayCommand::CancelTurn {
            session_key: "s1".into(),
        });
        let got = cmd_rx.recv().await.unwrap();
        assert!(matches!(got, GatewayCommand::CancelTurn { .. }));
    }

    #[tokio::test]
    async fn multiple_subscribers_each_get_the_event() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe_events();
        let mut rx2 = bus.subscribe_events();
        bus.publish_event(GatewayEvent::HeartbeatFired {
            schedule_id: "daily".into(),
        });
        assert!(rx1.recv().await.is_ok());
        assert!(rx2.recv().await.is_ok());
    }
}
