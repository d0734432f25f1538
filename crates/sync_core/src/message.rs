use crate::types::{ActionId, ActorId, MessageId, RoomId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What produced a transcript entry, with the fields specific to that source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageKind {
    /// AI narration for one player action; grows while chunks arrive.
    Narration { action_id: ActionId, complete: bool },
    RoomDescription,
    Chat { actor_name: String },
    System,
    /// Coalesced quest narration.
    Quest,
    DuelRound { round: u32 },
    /// The synthetic entry shown when an action could not be completed.
    ActionFailed { action_id: ActionId },
    Diagnostic { close_code: Option<u16> },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub actor_id: Option<ActorId>,
    pub room_id: Option<RoomId>,
    pub text: String,
    pub kind: MessageKind,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// A new entry; the id is assigned when it is appended to a transcript.
    pub fn new(kind: MessageKind, text: impl Into<String>) -> Self {
        Self {
            id: 0,
            actor_id: None,
            room_id: None,
            text: text.into(),
            kind,
            timestamp: Utc::now(),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(MessageKind::System, text)
    }

    pub fn from_actor(mut self, actor_id: impl Into<ActorId>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    pub fn in_room(mut self, room_id: Option<RoomId>) -> Self {
        self.room_id = room_id;
        self
    }

    /// False only for narration still receiving chunks.
    pub fn is_settled(&self) -> bool {
        !matches!(self.kind, MessageKind::Narration { complete: false, .. })
    }
}
