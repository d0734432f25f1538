use crate::types::{ActorId, RoomId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An entity payload that is missing or corrupts a required field.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ShapeError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("invalid `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorKind {
    #[default]
    Player,
    Npc,
    Monster,
}

/// A resolved actor record.
///
/// Health and inventory are optional because pushes routinely omit them;
/// absence means "unchanged", never "empty".
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub id: ActorId,
    pub name: String,
    #[serde(default)]
    pub kind: ActorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_room: Option<RoomId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_health: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Server-side revision of the record, when the server tracks one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<u64>,
}

impl Actor {
    pub fn new(id: impl Into<ActorId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: ActorKind::Player,
            current_room: None,
            health: None,
            max_health: None,
            inventory: None,
            description: None,
            revision: None,
        }
    }

    pub fn with_kind(mut self, kind: ActorKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn in_room(mut self, room_id: impl Into<RoomId>) -> Self {
        self.current_room = Some(room_id.into());
        self
    }

    /// Checks the fields every consumer relies on before the record is used.
    pub fn validate(&self) -> Result<(), ShapeError> {
        if self.id.trim().is_empty() {
            return Err(ShapeError::MissingField("id"));
        }
        if self.name.trim().is_empty() {
            return Err(ShapeError::MissingField("name"));
        }
        if let (Some(health), Some(max)) = (self.health, self.max_health) {
            if max <= 0 {
                return Err(ShapeError::Invalid {
                    field: "maxHealth",
                    reason: "must be positive",
                });
            }
            if health > max {
                return Err(ShapeError::Invalid {
                    field: "health",
                    reason: "exceeds maxHealth",
                });
            }
        }
        Ok(())
    }

    pub fn patch(&self) -> ActorPatch {
        ActorPatch {
            id: Some(self.id.clone()),
            name: Some(self.name.clone()),
            current_room: self.current_room.clone(),
            health: self.health,
            max_health: self.max_health,
            inventory: self.inventory.clone(),
            revision: self.revision,
        }
    }
}

/// A partial actor record, as carried by action-stream deltas.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ActorId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_room: Option<RoomId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_health: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<u64>,
}

/// Why an actor disappeared from a room.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalReason {
    Death,
    Teleport,
    #[serde(other)]
    Other,
}
