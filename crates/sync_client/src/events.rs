use crate::connection::PushLink;
use crate::duel::DuelState;
use crate::errors::TransportError;
use sync_core::{ActionId, ActionUpdates, Actor, CloseDiagnosis, MessageId, RoomId};
use tokio::sync::mpsc;

/// Everything the client reacts to. Background tasks (socket readers, action
/// streams, roster lookups) post these; the client handles them one at a time.
pub enum ClientEvent {
    LinkOpened {
        generation: u64,
        link: Box<dyn PushLink>,
    },
    LinkFailed {
        generation: u64,
        error: TransportError,
    },
    Frame {
        generation: u64,
        text: String,
    },
    LinkClosed {
        generation: u64,
        code: Option<u16>,
        reason: String,
    },
    Action {
        action_id: ActionId,
        event: ActionEvent,
    },
    RosterResolved {
        room_id: RoomId,
        actors: Vec<Actor>,
    },
}

impl std::fmt::Debug for ClientEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientEvent::LinkOpened { generation, .. } => {
                write!(f, "LinkOpened({generation})")
            }
            ClientEvent::LinkFailed { generation, error } => {
                write!(f, "LinkFailed({generation}, {error})")
            }
            ClientEvent::Frame { generation, text } => write!(f, "Frame({generation}, {text})"),
            ClientEvent::LinkClosed {
                generation, code, ..
            } => write!(f, "LinkClosed({generation}, {code:?})"),
            ClientEvent::Action { action_id, event } => {
                write!(f, "Action({action_id}, {event:?})")
            }
            ClientEvent::RosterResolved { room_id, actors } => {
                write!(f, "RosterResolved({room_id}, {})", actors.len())
            }
        }
    }
}

/// Progress of one action exchange.
#[derive(Clone, Debug, PartialEq)]
pub enum ActionEvent {
    Chunk(String),
    Final {
        content: String,
        updates: ActionUpdates,
    },
    Failed(String),
}

pub type EventSender = mpsc::UnboundedSender<ClientEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<ClientEvent>;

/// Notifications for front-ends, broadcast after the state they describe has
/// been written to the store.
#[derive(Clone, Debug, PartialEq)]
pub enum Notice {
    Connected { room_id: RoomId },
    Disconnected { diagnosis: CloseDiagnosis },
    RoomEntered { room_id: RoomId },
    RosterChanged,
    DuelChanged { state: DuelState },
    ActionCompleted {
        action_id: ActionId,
        next_room: Option<RoomId>,
    },
    ActionFailed { action_id: ActionId },
    TranscriptUpdated { last_id: MessageId },
    Diagnostic { message: String },
}
