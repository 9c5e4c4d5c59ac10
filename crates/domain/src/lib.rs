//! Shared types for the gateway: config schema, provider-agnostic LLM
//! wire types, the session record log, the in-process event bus, and
//! the error type every other gateway crate propagates through.

pub mod bus;
pub mod capability;
pub mod config;
pub mod cooldown;
pub mod error;
pub mod record;
pub mod stream;
pub mod tool;
pub mod trace;

pub use bus::{EventBus, GatewayCommand, GatewayEvent};
pub use capability::{LlmCapabilities, Purpose, ToolSupport};
pub use config::Config;
pub use cooldown::{cooldown_minutes, CooldownState};
pub use error::{Error, Result};
pub use record::{ContentBlock, RecordBody, RecordId, SessionRecord};
pub use stream::{BoxStream, StreamEvent, Usage};
pub use tool::{ContentPart, Message, MessageContent, Role, ToolCall, ToolDefinition};
pub use trace::TraceEvent;
