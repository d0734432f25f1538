//! Push-channel wire protocol.
//!
//! Every frame is a JSON object tagged by `type`. Field names are camelCase;
//! duel payloads are shared between the inbound and outbound directions.

use crate::actor::{Actor, RemovalReason};
use crate::room::RoomSnapshot;
use crate::types::{ActorId, RoomId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A frame that could not be turned into a typed message.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame is not valid JSON: {0}")]
    Json(String),
    #[error("frame has no `type` tag")]
    MissingType,
    #[error("unknown frame type `{0}`")]
    UnknownType(String),
    #[error("malformed `{frame_type}` frame: {reason}")]
    Malformed { frame_type: String, reason: String },
}

impl FrameError {
    /// The frame's declared type, when it had a recognizable one.
    pub fn frame_type(&self) -> Option<&str> {
        match self {
            FrameError::Malformed { frame_type, .. } => Some(frame_type),
            FrameError::UnknownType(kind) => Some(kind),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    Joined,
    Left,
    Updated,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuelChallenge {
    pub challenger_id: ActorId,
    pub target_id: ActorId,
}

/// Accept or decline of a challenge. `p1` is always the challenger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuelResponse {
    pub challenger_id: ActorId,
    pub responder_id: ActorId,
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_monster_duel: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monster_name: Option<String>,
    pub p1_max_health: i32,
    pub p2_max_health: i32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuelMove {
    pub player_id: ActorId,
    #[serde(rename = "move")]
    pub choice: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_monster_move: Option<bool>,
}

/// Authoritative outcome of one duel round.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuelRoundResult {
    pub round: u32,
    pub p1_id: ActorId,
    pub p2_id: ActorId,
    #[serde(default)]
    pub p1_move: String,
    #[serde(default)]
    pub p2_move: String,
    pub p1_health: i32,
    pub p2_health: i32,
    #[serde(default)]
    pub p1_advantage: i32,
    #[serde(default)]
    pub p2_advantage: i32,
    #[serde(default)]
    pub description: String,
    pub combat_ends: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuelCancel {
    pub player_id: ActorId,
    pub opponent_id: ActorId,
}

/// Server → client frames on the push channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushMessage {
    #[serde(rename_all = "camelCase")]
    Presence {
        actor_id: ActorId,
        status: PresenceStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        actor_data: Option<Actor>,
    },
    RoomUpdate {
        room: RoomSnapshot,
    },
    ActorUpdate {
        actor: Actor,
    },
    #[serde(rename_all = "camelCase")]
    ActorRemoved {
        actor_id: ActorId,
        reason: RemovalReason,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        relocation: Option<RoomId>,
    },
    DuelChallenge(DuelChallenge),
    DuelResponse(DuelResponse),
    DuelMove(DuelMove),
    DuelRoundResult(DuelRoundResult),
    DuelCancel(DuelCancel),
    QuestChunk {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    Chat {
        actor_id: ActorId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        actor_name: Option<String>,
        text: String,
    },
    System {
        text: String,
    },
    Ping,
    Pong,
}

impl PushMessage {
    pub const KNOWN_TYPES: &'static [&'static str] = &[
        "presence",
        "room_update",
        "actor_update",
        "actor_removed",
        "duel_challenge",
        "duel_response",
        "duel_move",
        "duel_round_result",
        "duel_cancel",
        "quest_chunk",
        "chat",
        "system",
        "ping",
        "pong",
    ];

    /// Parse one text frame, separating unknown types from malformed ones.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        parse_tagged(text, Self::KNOWN_TYPES)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            PushMessage::Presence { .. } => "presence",
            PushMessage::RoomUpdate { .. } => "room_update",
            PushMessage::ActorUpdate { .. } => "actor_update",
            PushMessage::ActorRemoved { .. } => "actor_removed",
            PushMessage::DuelChallenge(_) => "duel_challenge",
            PushMessage::DuelResponse(_) => "duel_response",
            PushMessage::DuelMove(_) => "duel_move",
            PushMessage::DuelRoundResult(_) => "duel_round_result",
            PushMessage::DuelCancel(_) => "duel_cancel",
            PushMessage::QuestChunk { .. } => "quest_chunk",
            PushMessage::Chat { .. } => "chat",
            PushMessage::System { .. } => "system",
            PushMessage::Ping => "ping",
            PushMessage::Pong => "pong",
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Client → server frames on the push channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping,
    Pong,
    Chat { text: String },
    DuelChallenge(DuelChallenge),
    DuelResponse(DuelResponse),
    DuelMove(DuelMove),
    DuelCancel(DuelCancel),
}

impl ClientMessage {
    pub const KNOWN_TYPES: &'static [&'static str] = &[
        "ping",
        "pong",
        "chat",
        "duel_challenge",
        "duel_response",
        "duel_move",
        "duel_cancel",
    ];

    pub fn parse(text: &str) -> Result<Self, FrameError> {
        parse_tagged(text, Self::KNOWN_TYPES)
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

fn parse_tagged<T: serde::de::DeserializeOwned>(
    text: &str,
    known: &[&str],
) -> Result<T, FrameError> {
    let value: Value = serde_json::from_str(text).map_err(|e| FrameError::Json(e.to_string()))?;
    let frame_type = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(FrameError::MissingType)?
        .to_string();
    if !known.contains(&frame_type.as_str()) {
        return Err(FrameError::UnknownType(frame_type));
    }
    serde_json::from_value(value).map_err(|e| FrameError::Malformed {
        frame_type,
        reason: e.to_string(),
    })
}
