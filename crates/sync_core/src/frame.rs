//! Frames of the chunked action-result exchange.
//!
//! The response body is newline-delimited JSON; lines may carry an SSE
//! `data:` prefix. Zero or more `chunk` frames are followed by exactly one
//! `final` frame, or by an `{error}` frame that ends the exchange.

use crate::actor::ActorPatch;
use crate::protocol::FrameError;
use crate::room::RoomSnapshot;
use crate::types::{ActorId, RoomId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of the request that starts one exchange.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    pub action: String,
    pub player_id: ActorId,
    pub room_id: RoomId,
}

/// State delta carried by the terminal frame.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionUpdates {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<ActorPatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<RoomSnapshot>,
}

impl ActionUpdates {
    pub fn next_room(&self) -> Option<&RoomId> {
        self.actor.as_ref().and_then(|a| a.current_room.as_ref())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ActionFrame {
    Chunk {
        content: String,
    },
    Final {
        content: String,
        updates: ActionUpdates,
    },
    Error {
        message: String,
    },
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TaggedFrame {
    Chunk {
        content: String,
    },
    Final {
        content: String,
        #[serde(default)]
        updates: ActionUpdates,
    },
}

impl ActionFrame {
    /// Parse one line. Blank lines and SSE comments yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, FrameError> {
        let line = line.trim();
        let line = line.strip_prefix("data:").map(str::trim).unwrap_or(line);
        if line.is_empty() || line.starts_with(':') {
            return Ok(None);
        }

        let value: Value = serde_json::from_str(line).map_err(|e| FrameError::Json(e.to_string()))?;
        if let Some(error) = value.get("error") {
            let message = match error {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            return Ok(Some(ActionFrame::Error { message }));
        }

        let frame_type = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(FrameError::MissingType)?
            .to_string();
        if frame_type != "chunk" && frame_type != "final" {
            return Err(FrameError::UnknownType(frame_type));
        }

        let tagged: TaggedFrame = serde_json::from_value(value).map_err(|e| FrameError::Malformed {
            frame_type,
            reason: e.to_string(),
        })?;
        Ok(Some(match tagged {
            TaggedFrame::Chunk { content } => ActionFrame::Chunk { content },
            TaggedFrame::Final { content, updates } => ActionFrame::Final { content, updates },
        }))
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ActionFrame::Chunk { .. })
    }
}
