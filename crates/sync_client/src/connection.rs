//! Push connection lifecycle and room-transition handoff.
//!
//! At most one link is live at a time. Every link is tagged with the
//! generation it was opened under; open and close events from an older
//! generation are ignored, so a socket torn down during a room change can
//! never clobber its replacement.

use crate::errors::TransportError;
use crate::events::{ClientEvent, EventSender};
use crate::store::{ConnectionHandle, RoomApplied, Store};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use sync_core::{
    describe_close, ActorId, ClientMessage, CloseCategory, CloseDiagnosis, Message, MessageKind,
    RoomId, RoomSnapshot,
};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Address of a push link.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub room_id: RoomId,
    pub player_id: ActorId,
}

/// Opens push links. The returned link writes; inbound frames and the close
/// event are delivered through the sink.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn open(
        &self,
        endpoint: &Endpoint,
        sink: LinkSink,
    ) -> Result<Box<dyn PushLink>, TransportError>;
}

/// Write half of an open push link.
pub trait PushLink: Send {
    fn send(&mut self, text: String) -> Result<(), TransportError>;
    fn close(&mut self);
}

/// Where a transport reports inbound traffic for one link.
#[derive(Clone, Debug)]
pub struct LinkSink {
    generation: u64,
    events: EventSender,
}

impl LinkSink {
    /// A sink tagged with the link `generation` it reports for.
    pub fn new(generation: u64, events: EventSender) -> Self {
        Self { generation, events }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Deliver one text frame. Returns false once the client is gone.
    pub fn frame(&self, text: String) -> bool {
        self.events
            .send(ClientEvent::Frame {
                generation: self.generation,
                text,
            })
            .is_ok()
    }

    /// Report that the link closed, with the close code when one was sent.
    pub fn closed(&self, code: Option<u16>, reason: impl Into<String>) {
        let _ = self.events.send(ClientEvent::LinkClosed {
            generation: self.generation,
            code,
            reason: reason.into(),
        });
    }
}

struct LiveLink {
    endpoint: Endpoint,
    link: Box<dyn PushLink>,
    heartbeat: Interval,
    awaiting_pong_since: Option<Instant>,
}

/// A link that finished opening.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Opened {
    pub room_id: RoomId,
    /// Set when a buffered snapshot for this room was applied on open.
    pub applied: Option<RoomApplied>,
}

pub struct ConnectionCoordinator {
    transport: Arc<dyn PushTransport>,
    events: EventSender,
    generation: u64,
    connecting: Option<Endpoint>,
    open_task: Option<JoinHandle<()>>,
    live: Option<LiveLink>,
    heartbeat_every: Duration,
    pong_timeout: Option<Duration>,
}

impl ConnectionCoordinator {
    /// A coordinator with no link. `pong_timeout` of `None` keeps links
    /// open regardless of missing pongs.
    pub fn new(
        transport: Arc<dyn PushTransport>,
        events: EventSender,
        heartbeat_every: Duration,
        pong_timeout: Option<Duration>,
    ) -> Self {
        Self {
            transport,
            events,
            generation: 0,
            connecting: None,
            open_task: None,
            live: None,
            heartbeat_every,
            pong_timeout,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// A link finished opening and has not closed since.
    pub fn is_live(&self) -> bool {
        self.live.is_some()
    }

    /// The room of the link still opening.
    pub fn connecting_room(&self) -> Option<&str> {
        self.connecting.as_ref().map(|e| e.room_id.as_str())
    }

    /// The room of the open link.
    pub fn live_room(&self) -> Option<&str> {
        self.live.as_ref().map(|l| l.endpoint.room_id.as_str())
    }

    /// Open a link to `(room_id, player_id)`, closing any existing one. An
    /// armed pending transition is left untouched.
    pub fn connect(&mut self, store: &mut Store, room_id: impl Into<RoomId>, player_id: impl Into<ActorId>) {
        self.teardown(store);

        let endpoint = Endpoint {
            room_id: room_id.into(),
            player_id: player_id.into(),
        };
        let generation = self.generation;
        info!(generation, room_id = %endpoint.room_id, "connecting push link");
        self.connecting = Some(endpoint.clone());

        let transport = self.transport.clone();
        let events = self.events.clone();
        let sink = LinkSink::new(generation, events.clone());
        self.open_task = Some(tokio::spawn(async move {
            let event = match transport.open(&endpoint, sink).await {
                Ok(link) => ClientEvent::LinkOpened { generation, link },
                Err(error) => ClientEvent::LinkFailed { generation, error },
            };
            let _ = events.send(event);
        }));
    }

    /// Close the live link and stop the heartbeat. The pending transition
    /// survives so the following `connect` can still consume it.
    pub fn disconnect(&mut self, store: &mut Store) {
        self.teardown(store);
    }

    fn teardown(&mut self, store: &mut Store) {
        if let Some(task) = self.open_task.take() {
            task.abort();
        }
        self.connecting = None;
        if let Some(mut live) = self.live.take() {
            info!(room_id = %live.endpoint.room_id, "closing push link");
            live.link.close();
        }
        store.set_connection(None);
        self.generation += 1;
    }

    /// Arm the transition to `room_id` so pushes for it are recognized while
    /// the link is being replaced.
    pub fn set_next_room(&mut self, store: &mut Store, room_id: impl Into<RoomId>) {
        let room_id = room_id.into();
        info!(room_id = %room_id, "next room armed");
        store.arm_pending(room_id);
    }

    /// Events from any other generation are stale.
    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
    }

    /// A link finished opening. A superseded link is closed and ignored;
    /// otherwise it goes live and any snapshot buffered for its room is applied.
    pub fn on_opened(
        &mut self,
        store: &mut Store,
        generation: u64,
        mut link: Box<dyn PushLink>,
    ) -> Option<Opened> {
        if !self.is_current(generation) {
            debug!(generation, current = self.generation, "closing superseded link");
            link.close();
            return None;
        }
        self.open_task = None;
        let Some(endpoint) = self.connecting.take() else {
            debug!(generation, "link opened after it was closed");
            link.close();
            return None;
        };

        let mut heartbeat = interval_at(
            Instant::now() + self.heartbeat_every,
            self.heartbeat_every,
        );
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let room_id = endpoint.room_id.clone();
        store.set_connection(Some(ConnectionHandle {
            generation,
            room_id: room_id.clone(),
        }));
        self.live = Some(LiveLink {
            endpoint,
            link,
            heartbeat,
            awaiting_pong_since: None,
        });
        info!(generation, room_id = %room_id, "push link open");

        let applied = store
            .take_buffered_for(&room_id)
            .map(|snapshot| store.apply_room_snapshot(snapshot));
        if applied.is_some() {
            debug!(room_id = %room_id, "applied buffered snapshot on open");
        }
        Some(Opened { room_id, applied })
    }

    /// A link failed to open. Returns the message shown to the player.
    pub fn on_open_failed(
        &mut self,
        store: &mut Store,
        generation: u64,
        error: &TransportError,
    ) -> Option<String> {
        if !self.is_current(generation) {
            return None;
        }
        self.open_task = None;
        let endpoint = self.connecting.take()?;
        warn!(room_id = %endpoint.room_id, %error, "push link failed to open");
        let message = format!("Could not connect to {}: {error}", endpoint.room_id);
        store.push_message(
            Message::new(MessageKind::Diagnostic { close_code: None }, message.clone())
                .in_room(Some(endpoint.room_id)),
        );
        Some(message)
    }

    /// The current link closed. No reconnect is attempted here.
    pub fn on_closed(
        &mut self,
        store: &mut Store,
        generation: u64,
        code: Option<u16>,
        reason: &str,
    ) -> Option<CloseDiagnosis> {
        if !self.is_current(generation) {
            debug!(generation, ?code, "ignoring close of superseded link");
            return None;
        }
        let room_id = self
            .live
            .take()
            .map(|l| l.endpoint.room_id)
            .or_else(|| self.connecting.take().map(|e| e.room_id));
        if let Some(task) = self.open_task.take() {
            task.abort();
        }
        store.set_connection(None);
        self.generation += 1;

        let diagnosis = describe_close(code);
        if diagnosis.is_clean() {
            info!(?room_id, "push link closed");
        } else {
            warn!(?room_id, ?code, reason, "push link closed abnormally");
            store.push_message(
                Message::new(MessageKind::Diagnostic { close_code: code }, diagnosis.message.clone())
                    .in_room(room_id),
            );
        }
        Some(diagnosis)
    }

    /// A room snapshot is accepted only for the current room, the room being
    /// connected to, or the armed transition target.
    pub fn accepts_room(&self, store: &Store, room_id: &str) -> bool {
        store.current_room_id() == Some(room_id)
            || self.connecting_room() == Some(room_id)
            || self.live_room() == Some(room_id)
            || store.pending_target() == Some(room_id)
    }

    /// Apply a pushed snapshot through the room guard, consuming the pending
    /// transition if it targets this room.
    pub fn apply_room_push(&mut self, store: &mut Store, snapshot: RoomSnapshot) -> Option<RoomApplied> {
        if !self.accepts_room(store, &snapshot.room_id) {
            warn!(
                room_id = %snapshot.room_id,
                current = ?store.current_room_id(),
                "dropping push for a room we are not in"
            );
            return None;
        }
        if store.take_pending_for(&snapshot.room_id).is_some() {
            debug!(room_id = %snapshot.room_id, "pending transition consumed by push");
        }
        Some(store.apply_room_snapshot(snapshot))
    }

    /// Encode and write one message on the open link.
    pub fn send(&mut self, message: &ClientMessage) -> Result<(), TransportError> {
        let live = self.live.as_mut().ok_or(TransportError::NotConnected)?;
        let text = message
            .encode()
            .map_err(|e| TransportError::Encode(e.to_string()))?;
        live.link.send(text)
    }

    /// Resolves at the next heartbeat tick; never resolves while no link is
    /// live.
    pub async fn heartbeat_due(&mut self) {
        match self.live.as_mut() {
            Some(live) => {
                live.heartbeat.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }

    /// Send a keep-alive ping. With a pong timeout configured, a ping left
    /// unanswered past the timeout drops the link instead.
    pub fn on_heartbeat(&mut self, store: &mut Store) -> Option<CloseDiagnosis> {
        let live = self.live.as_mut()?;
        if let (Some(timeout), Some(since)) = (self.pong_timeout, live.awaiting_pong_since) {
            if since.elapsed() >= timeout {
                return Some(self.drop_unresponsive(store));
            }
        }

        debug!(room_id = %live.endpoint.room_id, "heartbeat ping");
        if live.awaiting_pong_since.is_none() {
            live.awaiting_pong_since = Some(Instant::now());
        }
        if let Err(error) = self.send(&ClientMessage::Ping) {
            warn!(%error, "failed to send heartbeat");
        }
        None
    }

    fn drop_unresponsive(&mut self, store: &mut Store) -> CloseDiagnosis {
        let room_id = self.live.take().map(|mut live| {
            live.link.close();
            live.endpoint.room_id
        });
        store.set_connection(None);
        self.generation += 1;
        warn!(?room_id, "no heartbeat reply, treating link as lost");

        let diagnosis = CloseDiagnosis {
            code: None,
            category: CloseCategory::NetworkLost,
            message: "The server stopped answering. Connection treated as lost.".to_string(),
        };
        store.push_message(
            Message::new(MessageKind::Diagnostic { close_code: None }, diagnosis.message.clone())
                .in_room(room_id),
        );
        diagnosis
    }

    /// The server answered; clears the outstanding ping.
    pub fn on_pong(&mut self) {
        if let Some(live) = self.live.as_mut() {
            debug!(room_id = %live.endpoint.room_id, "heartbeat pong");
            live.awaiting_pong_since = None;
        }
    }

    /// Answer a server ping.
    pub fn on_ping(&mut self) {
        if let Err(error) = self.send(&ClientMessage::Pong) {
            debug!(%error, "could not answer ping");
        }
    }
}

impl Drop for ConnectionCoordinator {
    fn drop(&mut self) {
        if let Some(task) = self.open_task.take() {
            task.abort();
        }
        if let Some(mut live) = self.live.take() {
            live.link.close();
        }
    }
}
