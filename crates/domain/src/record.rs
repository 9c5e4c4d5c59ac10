//! The session record log data model.
//!
//! Every session is an append-only sequence of [`SessionRecord`]s, each
//! stamped with a monotonically increasing [`RecordId`]. Records are the
//! unit of persistence for the Session Store (see `gw_sessions`); the
//! Agent Runtime reads them back and converts them into provider messages.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// RecordId
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A monotonically increasing record identifier, unique within a single
/// process run. Encodes the millisecond timestamp in the high bits and a
/// per-process counter in the low bits, so ids sort chronologically even
/// when generated faster than the clock's resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(u64);

static COUNTER: AtomicU64 = AtomicU64::new(0);

impl RecordId {
    /// Mint a new id from the current wall-clock time.
    pub fn new() -> Self {
        let millis = Utc::now().timestamp_millis().max(0) as u64;
        Self::from_parts(millis)
    }

    /// Build an id deterministically from a millisecond timestamp; used by
    /// tests and by replay/import paths that need reproducible ids.
    pub fn from_parts(millis: u64) -> Self {
        let seq = COUNTER.fetch_add(1, Ordering::Relaxed) & 0xFFF;
        Self((millis << 12) | seq)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }

    pub fn timestamp_millis(self) -> u64 {
        self.0 >> 12
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ContentBlock
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A single piece of message content as persisted in a record. Richer
/// than the wire-level `tool::ContentPart` -- it also carries the model's
/// interleaved reasoning and references to externally stored media.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "thinking")]
    Thinking { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        call_id: String,
        tool_name: String,
        arguments: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        call_id: String,
        content: String,
        is_error: bool,
    },
    #[serde(rename = "media")]
    Media {
        media_id: String,
        mime_type: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SessionRecord
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One entry in a session's append-only record log.
///
/// Tagged by `kind`, with a forward-compatible `Custom` fallback: records
/// written by a newer binary version that this one doesn't recognise are
/// preserved verbatim (as raw JSON) rather than rejected, so an older
/// gateway build can still load and replay a transcript written by a
/// newer one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: RecordId,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub body: RecordBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum RecordBody {
    #[serde(rename = "user_message")]
    UserMessage { content: Vec<ContentBlock> },
    #[serde(rename = "assistant_message")]
    AssistantMessage { content: Vec<ContentBlock> },
    #[serde(rename = "tool_invocation")]
    ToolInvocation {
        call_id: String,
        tool_name: String,
        arguments: serde_json::Value,
        result: String,
        is_error: bool,
        duration_ms: u64,
    },
    #[serde(rename = "checkpoint")]
    Checkpoint {
        summary: String,
        covers_through: RecordId,
    },
    #[serde(rename = "compaction")]
    Compaction {
        summary: String,
        covers_through: RecordId,
        turns_compacted: usize,
    },
    #[serde(rename = "system_note")]
    SystemNote { text: String },
    /// Forward-compatible catch-all for record kinds this build doesn't
    /// know about. `serde`'s internally tagged enums have no literal
    /// wildcard arm, so this is reconstructed via a two-phase envelope
    /// deserialize (see [`SessionRecord::from_json_line`]).
    #[serde(other)]
    Custom,
}

/// Envelope used to recover the raw JSON of a record whose `kind` this
/// build does not recognise, instead of failing to deserialize entirely.
#[derive(Debug, Clone, Deserialize)]
struct Envelope {
    kind: String,
}

impl SessionRecord {
    pub fn new(body: RecordBody) -> Self {
        Self {
            id: RecordId::new(),
            at: Utc::now(),
            body,
        }
    }

    const KNOWN_KINDS: &'static [&'static str] = &[
        "user_message",
        "assistant_message",
        "tool_invocation",
        "checkpoint",
        "compaction",
        "system_note",
    ];

    /// Deserialize a single JSONL line, preserving unknown record kinds as
    /// [`RecordBody::Custom`] plus the raw line rather than erroring.
    ///
    /// Returns `(record, raw_if_custom)`: callers that must round-trip an
    /// unrecognised record verbatim (rather than lose its payload on
    /// `Custom`) should keep `raw_if_custom` alongside it.
    pub fn from_json_line(line: &str) -> Result<(Self, Option<String>), serde_json::Error> {
        let envelope: Envelope = serde_json::from_str(line)?;
        if Self::KNOWN_KINDS.contains(&envelope.kind.as_str()) {
            let record: Self = serde_json::from_str(line)?;
            Ok((record, None))
        } else {
            let partial: PartialRecord = serde_json::from_str(line)?;
            Ok((
                Self {
                    id: partial.id,
                    at: partial.at,
                    body: RecordBody::Custom,
                },
                Some(line.to_string()),
            ))
        }
    }
}

#[derive(Debug, Deserialize)]
struct PartialRecord {
    id: RecordId,
    at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_id_monotonic_within_same_millisecond() {
        let a = RecordId::new();
        let b = RecordId::new();
        assert!(b > a);
    }

    #[test]
    fn record_id_display_is_fixed_width_hex() {
        let id = RecordId::from_parts(12345);
        assert_eq!(RecordId::from_parts(12345).to_string().len(), 16);
        let _ = id;
    }

    #[test]
    fn round_trip_user_message() {
        let rec = SessionRecord::new(RecordBody::UserMessage {
            content: vec![ContentBlock::Text { text: "hi".into() }],
        });
        let json = serde_json::to_string(&rec).unwrap();
        let (back, raw) = SessionRecord::from_json_line(&json).unwrap();
        assert!(raw.is_none());
        assert!(matches!(back.body, RecordBody::UserMessage { .. }));
    }

    #[test]
    fn unknown_kind_falls_back_to_custom_without_erroring() {
        let line = r#"{"id":1,"at":"2026-01-01T00:00:00Z","kind":"future_record_kind","payload":{"x":1}}"#;
        let (rec, raw) = SessionRecord::from_json_line(line).unwrap();
        assert!(matches!(rec.body, RecordBody::Custom));
        assert_eq!(raw.unwrap(), line);
    }

    #[test]
    fn checkpoint_round_trips() {
        let rec = SessionRecord::new(RecordBody::Checkpoint {
            summary: "user asked about X".into(),
            covers_through: RecordId::from_parts(999),
        });
        let json = serde_json::to_string(&rec).unwrap();
        let (back, _) = SessionRecord::from_json_line(&json).unwrap();
        assert!(matches!(back.body, RecordBody::Checkpoint { .. }));
    }
}
