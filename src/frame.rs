//! Frame — the realtime channel wire message.
//!
//! ARCHITECTURE
//! ============
//! The hosted realtime service speaks the Phoenix channel protocol: every
//! websocket text message is a JSON object with `topic`, `event`,
//! `payload`, `ref` and `join_ref`. Outbound frames are built with the
//! constructors below; inbound frames are decoded and then classified into
//! an [`Inbound`] so the connection loop never pokes at raw JSON.
//!
//! DESIGN
//! ======
//! - `payload` stays a `serde_json::Value`; only the fields we act on are
//!   pulled out during classification.
//! - Replies correlate to requests via `ref`.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

// =============================================================================
// EVENT CONSTANTS
// =============================================================================

pub const EVENT_JOIN: &str = "phx_join";
pub const EVENT_LEAVE: &str = "phx_leave";
pub const EVENT_REPLY: &str = "phx_reply";
pub const EVENT_ERROR: &str = "phx_error";
pub const EVENT_CLOSE: &str = "phx_close";
pub const EVENT_HEARTBEAT: &str = "heartbeat";
pub const EVENT_BROADCAST: &str = "broadcast";
pub const EVENT_POSTGRES_CHANGES: &str = "postgres_changes";

/// Topic used for connection-level heartbeats.
pub const TOPIC_PHOENIX: &str = "phoenix";

/// Change type we subscribe to.
pub const CHANGE_INSERT: &str = "INSERT";

// =============================================================================
// TYPES
// =============================================================================

/// Error returned by [`Frame::decode`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("failed to decode realtime frame: {0}")]
    Decode(#[from] serde_json::Error),
}

/// One message on the realtime socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

/// What the connection loop needs to know about an inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Reply to one of our requests.
    Reply { reference: Option<String>, ok: bool, response: Value },
    /// A row inserted into the subscribed table.
    Insert { record: Value },
    /// A named broadcast event from another client.
    Broadcast { event: String },
    /// The server dropped the channel.
    Closed { reason: String },
    /// Anything else (system notices, other change types, presence).
    Ignored,
}

/// Channel topic for a broadcast channel name.
#[must_use]
pub fn channel_topic(channel: &str) -> String {
    format!("realtime:{channel}")
}

// =============================================================================
// CONSTRUCTORS
// =============================================================================

impl Frame {
    fn new(topic: impl Into<String>, event: &str, payload: Value, reference: impl Into<String>) -> Self {
        Self { topic: topic.into(), event: event.to_string(), payload, reference: Some(reference.into()), join_ref: None }
    }

    /// Join a channel. `table` enables the insert change feed for that table.
    #[must_use]
    pub fn join(topic: &str, table: Option<&str>, access_token: &str, reference: &str) -> Self {
        let postgres_changes: Vec<Value> = table
            .map(|t| vec![json!({ "event": CHANGE_INSERT, "schema": "public", "table": t })])
            .unwrap_or_default();
        let payload = json!({
            "config": {
                "broadcast": { "ack": false, "self": false },
                "presence": { "key": "" },
                "postgres_changes": postgres_changes,
                "private": false
            },
            "access_token": access_token
        });
        let mut frame = Self::new(topic, EVENT_JOIN, payload, reference);
        frame.join_ref = Some(reference.to_string());
        frame
    }

    /// Leave a previously joined channel.
    #[must_use]
    pub fn leave(topic: &str, reference: &str, join_ref: &str) -> Self {
        let mut frame = Self::new(topic, EVENT_LEAVE, json!({}), reference);
        frame.join_ref = Some(join_ref.to_string());
        frame
    }

    /// Connection keep-alive.
    #[must_use]
    pub fn heartbeat(reference: &str) -> Self {
        Self::new(TOPIC_PHOENIX, EVENT_HEARTBEAT, json!({}), reference)
    }

    /// Broadcast a payload-less named event to the channel.
    #[must_use]
    pub fn broadcast(topic: &str, event: &str, reference: &str, join_ref: &str) -> Self {
        let payload = json!({ "type": EVENT_BROADCAST, "event": event, "payload": {} });
        let mut frame = Self::new(topic, EVENT_BROADCAST, payload, reference);
        frame.join_ref = Some(join_ref.to_string());
        frame
    }
}

// =============================================================================
// CODEC
// =============================================================================

impl Frame {
    /// Decode one websocket text message.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Decode`] if the text is not a frame object.
    pub fn decode(text: &str) -> Result<Self, CodecError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Encode for sending as a websocket text message.
    #[must_use]
    pub fn encode(&self) -> String {
        // Frame holds only strings and JSON values, so this cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Classify an inbound frame.
    #[must_use]
    pub fn classify(&self) -> Inbound {
        match self.event.as_str() {
            EVENT_REPLY => Inbound::Reply {
                reference: self.reference.clone(),
                ok: self.payload.get("status").and_then(Value::as_str) == Some("ok"),
                response: self.payload.get("response").cloned().unwrap_or(Value::Null),
            },
            EVENT_POSTGRES_CHANGES => {
                let data = &self.payload["data"];
                if data.get("type").and_then(Value::as_str) != Some(CHANGE_INSERT) {
                    return Inbound::Ignored;
                }
                match data.get("record") {
                    Some(record) => Inbound::Insert { record: record.clone() },
                    None => Inbound::Ignored,
                }
            }
            EVENT_BROADCAST => match self.payload.get("event").and_then(Value::as_str) {
                Some(event) => Inbound::Broadcast { event: event.to_string() },
                None => Inbound::Ignored,
            },
            EVENT_ERROR | EVENT_CLOSE => Inbound::Closed { reason: self.event.clone() },
            _ => Inbound::Ignored,
        }
    }
}

#[cfg(test)]
#[path = "frame_test.rs"]
mod tests;
