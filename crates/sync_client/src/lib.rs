pub mod action_stream;
pub mod client;
pub mod config;
pub mod connection;
pub mod duel;
pub mod errors;
pub mod events;
pub mod quest;
pub mod roster;
pub mod store;
pub mod transcript;
pub mod transport;

pub use action_stream::{ActionOutcome, ActionStreamClient, ActionTransport, LineStream};
pub use client::{SyncClient, Transports};
pub use config::ClientConfig;
pub use connection::{ConnectionCoordinator, Endpoint, LinkSink, PushLink, PushTransport};
pub use duel::{DuelClock, DuelCoordinator, DuelSession, DuelState, Opponent, RoundOutcome};
pub use errors::{ClientError, DuelError, LookupError, TransportError};
pub use events::{ActionEvent, ClientEvent, Notice};
pub use roster::{ActorDirectory, RosterBatch, RosterReconciler};
pub use store::{LocalPlayer, PendingTransition, RoomApplied, Session, Store};
pub use transcript::{Transcript, TranscriptCursor};
