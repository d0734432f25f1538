//! One chunked request/response exchange per player action.

use crate::connection::ConnectionCoordinator;
use crate::errors::{ClientError, TransportError};
use crate::events::{ActionEvent, ClientEvent, EventSender};
use crate::store::Store;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use sync_core::{ActionFrame, ActionId, ActionRequest, ActionUpdates, Message, MessageId, MessageKind, RoomId};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const ACTION_FAILED_TEXT: &str = "Action failed, try again.";

/// Stream of response lines for one action.
pub type LineStream = BoxStream<'static, Result<String, TransportError>>;

#[async_trait]
pub trait ActionTransport: Send + Sync {
    async fn open(&self, request: &ActionRequest) -> Result<LineStream, TransportError>;
}

struct InFlight {
    entry_id: MessageId,
    room_id: RoomId,
    task: JoinHandle<()>,
}

/// Terminal result of a finished action.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionOutcome {
    pub action_id: ActionId,
    pub entry_id: MessageId,
    /// The room the player moved to, already armed as the pending transition.
    pub next_room: Option<RoomId>,
}

pub struct ActionStreamClient {
    transport: Arc<dyn ActionTransport>,
    events: EventSender,
    next_action_id: ActionId,
    in_flight: HashMap<ActionId, InFlight>,
}

impl ActionStreamClient {
    pub fn new(transport: Arc<dyn ActionTransport>, events: EventSender) -> Self {
        Self {
            transport,
            events,
            next_action_id: 1,
            in_flight: HashMap::new(),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Start an exchange. The transcript entry is created empty right away and
    /// grows as chunks arrive.
    pub fn submit(&mut self, store: &mut Store, action: &str) -> Result<ActionId, ClientError> {
        let action = action.trim();
        if action.is_empty() {
            return Err(ClientError::EmptyInput);
        }
        let room_id = store
            .current_room_id()
            .ok_or(ClientError::NoRoom)?
            .to_string();

        let action_id = self.next_action_id;
        self.next_action_id += 1;
        let player_id = store.player_id().to_string();
        let entry_id = store.push_message(
            Message::new(
                MessageKind::Narration {
                    action_id,
                    complete: false,
                },
                "",
            )
            .from_actor(player_id.clone())
            .in_room(Some(room_id.clone())),
        );

        let request = ActionRequest {
            action: action.to_string(),
            player_id,
            room_id: room_id.clone(),
        };
        info!(action_id, room_id = %room_id, action, "submitting action");
        let task = tokio::spawn(pump(
            self.transport.clone(),
            request,
            action_id,
            self.events.clone(),
        ));
        self.in_flight.insert(
            action_id,
            InFlight {
                entry_id,
                room_id,
                task,
            },
        );
        Ok(action_id)
    }

    pub fn on_chunk(&mut self, store: &mut Store, action_id: ActionId, text: &str) -> Option<MessageId> {
        let flight = self.in_flight.get(&action_id)?;
        store
            .transcript_mut()
            .append_text(flight.entry_id, text)
            .then_some(flight.entry_id)
    }

    /// Finish an action with its authoritative text and delta.
    ///
    /// A room change in the delta arms the pending transition here, before the
    /// caller notifies anyone that the action completed.
    pub fn on_final(
        &mut self,
        store: &mut Store,
        connection: &mut ConnectionCoordinator,
        action_id: ActionId,
        content: String,
        updates: ActionUpdates,
    ) -> Option<ActionOutcome> {
        let flight = self.in_flight.remove(&action_id)?;
        let transcript = store.transcript_mut();
        transcript.replace_text(flight.entry_id, content);
        transcript.set_kind(
            flight.entry_id,
            MessageKind::Narration {
                action_id,
                complete: true,
            },
        );

        if let Some(patch) = &updates.actor {
            store.merge_local_player(patch);
        }

        let next_room = updates
            .next_room()
            .filter(|room| **room != flight.room_id && store.current_room_id() != Some(room.as_str()))
            .cloned();
        match (&next_room, updates.room) {
            (Some(room), snapshot) => {
                connection.set_next_room(store, room.clone());
                if let Some(snapshot) = snapshot {
                    store.buffer_snapshot(snapshot);
                }
            }
            (None, Some(snapshot)) => {
                connection.apply_room_push(store, snapshot);
            }
            (None, None) => {}
        }

        debug!(action_id, ?next_room, "action complete");
        Some(ActionOutcome {
            action_id,
            entry_id: flight.entry_id,
            next_room,
        })
    }

    /// Replace the action's entry with the single failure message.
    pub fn on_failed(&mut self, store: &mut Store, action_id: ActionId, reason: &str) -> Option<MessageId> {
        let flight = self.in_flight.remove(&action_id)?;
        warn!(action_id, reason, "action failed");
        let transcript = store.transcript_mut();
        transcript.replace_text(flight.entry_id, ACTION_FAILED_TEXT);
        transcript.set_kind(flight.entry_id, MessageKind::ActionFailed { action_id });
        Some(flight.entry_id)
    }
}

impl Drop for ActionStreamClient {
    fn drop(&mut self) {
        for (_, flight) in self.in_flight.drain() {
            flight.task.abort();
        }
    }
}

async fn pump(
    transport: Arc<dyn ActionTransport>,
    request: ActionRequest,
    action_id: ActionId,
    events: EventSender,
) {
    let event = match transport.open(&request).await {
        Ok(mut lines) => read_frames(&mut lines, action_id, &events).await,
        Err(error) => ActionEvent::Failed(error.to_string()),
    };
    let _ = events.send(ClientEvent::Action { action_id, event });
}

/// Forward chunks and return the terminal event. Exactly one terminal event
/// comes out of every exchange.
async fn read_frames(lines: &mut LineStream, action_id: ActionId, events: &EventSender) -> ActionEvent {
    while let Some(line) = lines.next().await {
        let line = match line {
            Ok(line) => line,
            Err(error) => return ActionEvent::Failed(error.to_string()),
        };
        match ActionFrame::parse(&line) {
            Ok(None) => {}
            Ok(Some(ActionFrame::Chunk { content })) => {
                let chunk = ClientEvent::Action {
                    action_id,
                    event: ActionEvent::Chunk(content),
                };
                if events.send(chunk).is_err() {
                    return ActionEvent::Failed("client stopped".to_string());
                }
            }
            Ok(Some(ActionFrame::Final { content, updates })) => {
                return ActionEvent::Final { content, updates };
            }
            Ok(Some(ActionFrame::Error { message })) => return ActionEvent::Failed(message),
            Err(error) if error.frame_type() == Some("final") => {
                return ActionEvent::Failed(error.to_string());
            }
            Err(error) => {
                warn!(action_id, %error, "dropping malformed action frame");
            }
        }
    }
    ActionEvent::Failed("stream ended without a final frame".to_string())
}
