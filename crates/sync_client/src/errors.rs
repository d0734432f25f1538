use sync_core::ActorId;
use thiserror::Error;

/// Failure of the push connection or of an HTTP exchange.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("not connected")]
    NotConnected,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("server returned status {0}")]
    Status(u16),
    #[error("stream read failed: {0}")]
    Stream(String),
    #[error("failed to encode message: {0}")]
    Encode(String),
}

/// Failure to resolve one occupant id into an actor record.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("actor {0} not found")]
    NotFound(ActorId),
    #[error("lookup of actor {0} timed out")]
    Timeout(ActorId),
    #[error("actor {id} has an invalid record: {reason}")]
    Invalid { id: ActorId, reason: String },
    #[error("lookup transport failed: {0}")]
    Transport(String),
}

/// A local duel operation that is not legal in the current state.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DuelError {
    #[error("already in a duel")]
    Busy,
    #[error("no challenge is waiting for an answer")]
    NoChallenge,
    #[error("no duel is active")]
    NotActive,
    #[error("a move was already submitted this round")]
    MoveAlreadySubmitted,
    #[error("a move cannot be empty")]
    EmptyMove,
    #[error("{0} is not here")]
    UnknownTarget(ActorId),
    #[error("you cannot duel yourself")]
    SelfChallenge,
    #[error("cannot verify opponent {0}")]
    UnverifiedOpponent(ActorId),
}

/// Errors returned by the client's command methods.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("not in a room yet")]
    NoRoom,
    #[error("nothing to send")]
    EmptyInput,
    #[error(transparent)]
    Duel(#[from] DuelError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}
