//! The client event loop.
//!
//! `SyncClient` owns the store and every coordinator. Commands run directly
//! on it; everything else (socket traffic, action streams, roster lookups,
//! timers) arrives through one queue and is handled by [`SyncClient::step`],
//! one event at a time.

use crate::action_stream::{ActionStreamClient, ActionTransport};
use crate::config::ClientConfig;
use crate::connection::{ConnectionCoordinator, PushTransport};
use crate::duel::{DuelCoordinator, DuelReaction};
use crate::errors::{ClientError, TransportError};
use crate::events::{ActionEvent, ClientEvent, EventReceiver, EventSender, Notice};
use crate::quest::ChunkCoalescer;
use crate::roster::{apply_resolved, ActorDirectory, RosterReconciler};
use crate::store::{RoomApplied, Store};
use crate::transport::{HttpActionTransport, HttpActorDirectory, WsPushTransport};
use std::sync::Arc;
use sync_core::{
    ActionId, Actor, ActorId, ClientMessage, FrameError, Message, MessageKind, PresenceStatus,
    PushMessage, RemovalReason, RoomId, RoomSnapshot,
};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

/// The three outside collaborators a client talks to.
#[derive(Clone)]
pub struct Transports {
    pub push: Arc<dyn PushTransport>,
    pub actions: Arc<dyn ActionTransport>,
    pub directory: Arc<dyn ActorDirectory>,
}

impl Transports {
    /// WebSocket push links plus the HTTP API, at the configured URLs.
    pub fn network(config: &ClientConfig) -> Self {
        Self {
            push: Arc::new(WsPushTransport::new(config.push_url.clone())),
            actions: Arc::new(HttpActionTransport::new(&config.api_url)),
            directory: Arc::new(HttpActorDirectory::new(&config.api_url)),
        }
    }
}

pub struct SyncClient {
    store: Store,
    connection: ConnectionCoordinator,
    actions: ActionStreamClient,
    duel: DuelCoordinator,
    roster: RosterReconciler,
    quest: ChunkCoalescer,
    directory: Arc<dyn ActorDirectory>,
    events_tx: EventSender,
    events_rx: EventReceiver,
    notices: broadcast::Sender<Notice>,
}

impl SyncClient {
    pub fn new(config: ClientConfig, player_id: impl Into<ActorId>, transports: Transports) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (notices, _) = broadcast::channel(config.notice_capacity.max(1));
        Self {
            store: Store::new(player_id, config.duel_max_health, config.transcript_capacity),
            connection: ConnectionCoordinator::new(
                transports.push,
                events_tx.clone(),
                config.heartbeat_interval,
                config.pong_timeout,
            ),
            actions: ActionStreamClient::new(transports.actions, events_tx.clone()),
            duel: DuelCoordinator::new(config.duel_max_health, config.allow_unverified_opponent),
            roster: RosterReconciler::new(config.roster_debounce, config.roster_lookup_timeout),
            quest: ChunkCoalescer::new(config.quest_chunk_window),
            directory: transports.directory,
            events_tx,
            events_rx,
            notices,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_live()
    }

    /// Room of the live link, if any.
    pub fn connected_room(&self) -> Option<&str> {
        self.connection.live_room()
    }

    pub fn actions_in_flight(&self) -> usize {
        self.actions.in_flight()
    }

    fn notify(&self, notice: Notice) {
        let _ = self.notices.send(notice);
    }

    /// Run `f`, then announce a transcript change if it made one.
    fn tracked<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let before = self.store.transcript().revision();
        let result = f(self);
        if self.store.transcript().revision() != before {
            let last_id = self.store.transcript().last().map_or(0, |m| m.id);
            self.notify(Notice::TranscriptUpdated { last_id });
        }
        result
    }

    // --- commands -------------------------------------------------------------

    /// Join `room_id`.
    pub fn connect(&mut self, room_id: impl Into<RoomId>) {
        let player_id = self.store.player_id().to_string();
        self.connection.connect(&mut self.store, room_id, player_id);
    }

    pub fn disconnect(&mut self) {
        self.connection.disconnect(&mut self.store);
    }

    /// Move the push link to `room_id`, arming the transition first so pushes
    /// for the new room are recognized during the handoff.
    pub fn change_room(&mut self, room_id: impl Into<RoomId>) {
        let room_id = room_id.into();
        self.connection.set_next_room(&mut self.store, room_id.clone());
        self.connection.disconnect(&mut self.store);
        self.connect(room_id);
    }

    pub fn submit_action(&mut self, action: &str) -> Result<ActionId, ClientError> {
        self.tracked(|client| client.actions.submit(&mut client.store, action))
    }

    pub fn say(&mut self, text: &str) -> Result<(), ClientError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ClientError::EmptyInput);
        }
        self.connection.send(&ClientMessage::Chat {
            text: text.to_string(),
        })?;
        Ok(())
    }

    pub fn challenge(&mut self, target_id: &str) -> Result<(), ClientError> {
        self.require_live()?;
        self.tracked(|client| {
            let message = client.duel.challenge(&mut client.store, target_id)?;
            client.send_duel(message)
        })
    }

    pub fn accept_duel(&mut self) -> Result<(), ClientError> {
        self.require_live()?;
        self.tracked(|client| {
            let message = client.duel.accept(&mut client.store)?;
            client.send_duel(message)
        })
    }

    pub fn decline_duel(&mut self) -> Result<(), ClientError> {
        self.require_live()?;
        self.tracked(|client| {
            let message = client.duel.decline(&mut client.store)?;
            client.send_duel(message)
        })
    }

    pub fn submit_move(&mut self, choice: &str) -> Result<(), ClientError> {
        self.require_live()?;
        let message = self.duel.submit_move(&mut self.store, choice)?;
        self.send_duel(message)
    }

    pub fn cancel_duel(&mut self) -> Result<(), ClientError> {
        self.require_live()?;
        self.tracked(|client| {
            let message = client.duel.cancel(&mut client.store)?;
            client.send_duel(message)
        })
    }

    fn require_live(&self) -> Result<(), ClientError> {
        if self.connection.is_live() {
            Ok(())
        } else {
            Err(TransportError::NotConnected.into())
        }
    }

    fn send_duel(&mut self, message: ClientMessage) -> Result<(), ClientError> {
        self.connection.send(&message)?;
        self.notify(Notice::DuelChanged {
            state: self.store.duel().state(),
        });
        Ok(())
    }

    // --- event loop -------------------------------------------------------------

    /// Wait for and handle the next event or timer.
    pub async fn step(&mut self) {
        let roster_due = self.roster.deadline();
        let quest_due = self.quest.deadline();
        tokio::select! {
            Some(event) = self.events_rx.recv() => self.handle(event),
            _ = self.connection.heartbeat_due() => self.on_heartbeat(),
            _ = sleep_until_some(roster_due) => self.flush_roster(),
            _ = sleep_until_some(quest_due) => self.flush_quest(),
        }
    }

    /// Handle every event already queued, without waiting.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle(event);
            handled += 1;
        }
        handled
    }

    pub fn handle(&mut self, event: ClientEvent) {
        self.tracked(|client| client.handle_event(event));
    }

    fn handle_event(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::LinkOpened { generation, link } => {
                let Some(opened) = self.connection.on_opened(&mut self.store, generation, link) else {
                    return;
                };
                self.notify(Notice::Connected {
                    room_id: opened.room_id,
                });
                if let Some(applied) = opened.applied {
                    self.after_room_applied(applied);
                }
            }
            ClientEvent::LinkFailed { generation, error } => {
                if let Some(message) = self.connection.on_open_failed(&mut self.store, generation, &error) {
                    self.notify(Notice::Diagnostic { message });
                }
            }
            ClientEvent::Frame { generation, text } => {
                if !self.connection.is_current(generation) {
                    debug!(generation, "dropping frame from superseded link");
                    return;
                }
                self.on_frame(&text);
            }
            ClientEvent::LinkClosed {
                generation,
                code,
                reason,
            } => {
                if let Some(diagnosis) = self.connection.on_closed(&mut self.store, generation, code, &reason) {
                    self.notify(Notice::Disconnected { diagnosis });
                }
            }
            ClientEvent::Action { action_id, event } => self.on_action_event(action_id, event),
            ClientEvent::RosterResolved { room_id, actors } => {
                if apply_resolved(&mut self.store, &room_id, actors) > 0 {
                    self.notify(Notice::RosterChanged);
                }
            }
        }
    }

    fn on_action_event(&mut self, action_id: ActionId, event: ActionEvent) {
        match event {
            ActionEvent::Chunk(text) => {
                self.actions.on_chunk(&mut self.store, action_id, &text);
            }
            ActionEvent::Final { content, updates } => {
                let Some(outcome) =
                    self.actions
                        .on_final(&mut self.store, &mut self.connection, action_id, content, updates)
                else {
                    return;
                };
                // The transition is already armed; move the link before anyone hears about it.
                // A room push may have moved it there first.
                if let Some(room_id) = &outcome.next_room {
                    if !self.link_targets(room_id) {
                        self.connection.disconnect(&mut self.store);
                        self.connect(room_id.clone());
                    }
                }
                self.notify(Notice::ActionCompleted {
                    action_id,
                    next_room: outcome.next_room,
                });
            }
            ActionEvent::Failed(reason) => {
                if self.actions.on_failed(&mut self.store, action_id, &reason).is_some() {
                    self.notify(Notice::ActionFailed { action_id });
                }
            }
        }
    }

    fn on_frame(&mut self, text: &str) {
        match PushMessage::parse(text) {
            Ok(message) => self.dispatch(message),
            Err(FrameError::UnknownType(kind)) => warn!(%kind, "ignoring unknown push type"),
            Err(error) => warn!(%error, "dropping malformed push"),
        }
    }

    fn dispatch(&mut self, message: PushMessage) {
        debug!(kind = message.type_name(), "push");
        match message {
            PushMessage::Presence {
                actor_id,
                status,
                actor_data,
            } => self.on_presence(actor_id, status, actor_data),
            PushMessage::RoomUpdate { room } => self.on_room_update(room),
            PushMessage::ActorUpdate { actor } => self.on_actor_update(actor),
            PushMessage::ActorRemoved {
                actor_id,
                reason,
                relocation,
            } => self.on_actor_removed(actor_id, reason, relocation),
            PushMessage::DuelChallenge(challenge) => {
                let reaction = self.duel.on_challenge(&mut self.store, challenge);
                self.after_duel(reaction);
            }
            PushMessage::DuelResponse(response) => {
                let reaction = self.duel.on_response(&mut self.store, response);
                self.after_duel(reaction);
            }
            PushMessage::DuelMove(duel_move) => {
                let reaction = self.duel.on_move(&mut self.store, duel_move);
                self.after_duel(reaction);
            }
            PushMessage::DuelRoundResult(result) => {
                if self.duel.on_round_result(&mut self.store, result).is_some() {
                    self.notify(Notice::DuelChanged {
                        state: self.store.duel().state(),
                    });
                }
            }
            PushMessage::DuelCancel(cancel) => {
                let reaction = self.duel.on_cancel(&mut self.store, cancel);
                self.after_duel(reaction);
            }
            PushMessage::QuestChunk { text } => self.quest.push(text, Instant::now()),
            PushMessage::Chat {
                actor_id,
                actor_name,
                text,
            } => {
                let actor_name = actor_name
                    .or_else(|| self.store.roster_actor(&actor_id).map(|a| a.name.clone()))
                    .unwrap_or_else(|| actor_id.clone());
                let room = self.store.current_room_id().map(str::to_string);
                self.store.push_message(
                    Message::new(MessageKind::Chat { actor_name }, text)
                        .from_actor(actor_id)
                        .in_room(room),
                );
            }
            PushMessage::System { text } => {
                self.store.push_system(text);
            }
            PushMessage::Ping => self.connection.on_ping(),
            PushMessage::Pong => self.connection.on_pong(),
        }
    }

    fn after_duel(&mut self, reaction: DuelReaction) {
        if let Some(message) = reaction.outbound {
            if let Err(error) = self.connection.send(&message) {
                warn!(%error, "failed to send duel reply");
            }
        }
        if reaction.changed {
            self.notify(Notice::DuelChanged {
                state: self.store.duel().state(),
            });
        }
    }

    fn diagnose(&mut self, message: String) {
        self.store.push_system(message.clone());
        self.notify(Notice::Diagnostic { message });
    }

    fn on_room_update(&mut self, room: RoomSnapshot) {
        if let Err(error) = room.validate() {
            warn!(%error, "dropping invalid room snapshot");
            self.diagnose(format!("Ignored an invalid room update: {error}"));
            return;
        }
        if let Some(applied) = self.connection.apply_room_push(&mut self.store, room) {
            self.after_room_applied(applied);
        }
    }

    fn after_room_applied(&mut self, applied: RoomApplied) {
        let Some(room) = self.store.room() else {
            return;
        };
        let room_id = room.room_id.clone();
        let occupants = room.occupant_ids.clone();
        let mark = self.store.roster_mark();
        match applied {
            RoomApplied::Entered => {
                info!(room_id = %room_id, "entered room");
                if let Some(text) = self.quest.flush() {
                    self.push_quest(text);
                }
                self.roster.queue(&room_id, occupants, mark, Instant::now());
                self.notify(Notice::RoomEntered { room_id });
                self.notify(Notice::RosterChanged);
            }
            RoomApplied::Refreshed => self.roster.queue(&room_id, occupants, mark, Instant::now()),
            RoomApplied::Unchanged => {}
        }
    }

    fn on_presence(&mut self, actor_id: ActorId, status: PresenceStatus, actor_data: Option<Actor>) {
        if self.store.is_me(&actor_id) {
            return;
        }
        match (status, actor_data) {
            (PresenceStatus::Left, _) => {
                if self.store.remove_actor(&actor_id).is_some() {
                    self.notify(Notice::RosterChanged);
                }
            }
            (_, Some(actor)) if actor.id == actor_id => match actor.validate() {
                Ok(()) => {
                    if self.store.upsert_actor(actor) {
                        self.notify(Notice::RosterChanged);
                    }
                }
                Err(error) => {
                    warn!(%actor_id, %error, "dropping invalid presence");
                    self.diagnose(format!("Ignored an invalid update for {actor_id}: {error}"));
                }
            },
            (status, actor_data) => {
                warn!(%actor_id, ?status, has_data = actor_data.is_some(), "presence without matching actor data");
            }
        }
    }

    fn on_actor_update(&mut self, actor: Actor) {
        if let Err(error) = actor.validate() {
            warn!(actor_id = %actor.id, %error, "dropping invalid actor update");
            self.diagnose(format!("Ignored an invalid update for {}: {error}", actor.id));
            return;
        }

        if self.store.is_me(&actor.id) {
            self.store.merge_local_player(&actor.patch());
            if let Some(room_id) = actor.current_room {
                if self.is_new_destination(&room_id) {
                    info!(room_id = %room_id, "server moved the local player");
                    self.change_room(room_id);
                }
            }
            return;
        }

        let elsewhere = actor
            .current_room
            .as_deref()
            .is_some_and(|room| Some(room) != self.store.current_room_id());
        let changed = if elsewhere {
            self.store.remove_actor(&actor.id).is_some()
        } else {
            self.store.upsert_actor(actor)
        };
        if changed {
            self.notify(Notice::RosterChanged);
        }
    }

    fn on_actor_removed(&mut self, actor_id: ActorId, reason: RemovalReason, relocation: Option<RoomId>) {
        if self.store.is_me(&actor_id) {
            let text = match reason {
                RemovalReason::Death => "You have fallen.",
                RemovalReason::Teleport => "The world lurches and you are elsewhere.",
                RemovalReason::Other => "You have been moved out of the room.",
            };
            self.store.push_system(text);
            if let Some(room_id) = relocation.filter(|room| self.is_new_destination(room)) {
                self.change_room(room_id);
            }
            return;
        }

        if let Some(actor) = self.store.remove_actor(&actor_id) {
            let text = match reason {
                RemovalReason::Death => format!("{} has fallen.", actor.name),
                RemovalReason::Teleport => format!("{} vanishes.", actor.name),
                RemovalReason::Other => format!("{} is gone.", actor.name),
            };
            self.store.push_system(text);
            self.notify(Notice::RosterChanged);
        }
    }

    /// A room we are neither in nor already heading to.
    fn is_new_destination(&self, room_id: &str) -> bool {
        self.store.current_room_id() != Some(room_id)
            && self.store.pending_target() != Some(room_id)
            && self.connection.connecting_room() != Some(room_id)
    }

    /// The link is open or opening to `room_id`.
    fn link_targets(&self, room_id: &str) -> bool {
        self.connection.connecting_room() == Some(room_id) || self.connection.live_room() == Some(room_id)
    }

    fn on_heartbeat(&mut self) {
        let diagnosis = self.tracked(|client| client.connection.on_heartbeat(&mut client.store));
        if let Some(diagnosis) = diagnosis {
            self.notify(Notice::Disconnected { diagnosis });
        }
    }

    fn flush_roster(&mut self) {
        let Some(batch) = self.roster.take_due(Instant::now()) else {
            return;
        };
        let removed = self.roster.reconcile(
            &mut self.store,
            batch,
            self.directory.clone(),
            self.events_tx.clone(),
        );
        if removed {
            self.notify(Notice::RosterChanged);
        }
    }

    fn flush_quest(&mut self) {
        if let Some(text) = self.quest.take_due(Instant::now()) {
            self.tracked(|client| client.push_quest(text));
        }
    }

    fn push_quest(&mut self, text: String) {
        let room = self.store.current_room_id().map(str::to_string);
        self.store
            .push_message(Message::new(MessageKind::Quest, text).in_room(room));
    }
}

async fn sleep_until_some(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}
