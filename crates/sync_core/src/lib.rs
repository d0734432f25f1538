pub mod actor;
pub mod close;
pub mod coords;
pub mod frame;
pub mod message;
pub mod protocol;
pub mod room;
pub mod types;

pub use actor::{Actor, ActorKind, ActorPatch, RemovalReason, ShapeError};
pub use close::{describe_close, CloseCategory, CloseDiagnosis};
pub use coords::{Coordinates, Direction};
pub use frame::{ActionFrame, ActionRequest, ActionUpdates};
pub use message::{Message, MessageKind};
pub use protocol::{
    ClientMessage, DuelCancel, DuelChallenge, DuelMove, DuelResponse, DuelRoundResult, FrameError,
    PresenceStatus, PushMessage,
};
pub use room::{GenerationStatus, RoomSnapshot};
pub use types::{ActionId, ActorId, MessageId, RoomId};
