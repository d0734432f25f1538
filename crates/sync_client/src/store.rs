//! Central state store.
//!
//! One `Store` exists per running client and is the only holder of session,
//! room, roster, duel and transcript state. Components receive it by `&mut`
//! while handling an event and mutate it only through the methods here.

use crate::duel::DuelSession;
use crate::transcript::Transcript;
use std::collections::BTreeMap;
use sync_core::{Actor, ActorId, ActorPatch, Message, MessageId, MessageKind, RoomId, RoomSnapshot};
use tracing::debug;

/// Identity of the live push connection. Written only by the connection
/// coordinator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionHandle {
    pub generation: u64,
    pub room_id: RoomId,
}

#[derive(Clone, Debug)]
pub struct Session {
    player_id: ActorId,
    current_room_id: Option<RoomId>,
    connection: Option<ConnectionHandle>,
}

impl Session {
    /// Id of the local player.
    pub fn player_id(&self) -> &str {
        &self.player_id
    }

    /// Room the store currently displays.
    pub fn current_room_id(&self) -> Option<&str> {
        self.current_room_id.as_deref()
    }

    /// Whether a push link is live.
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }
}

/// Target room of a room change that has been decided but not yet applied.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingTransition {
    pub target_room_id: RoomId,
    pub buffered_snapshot: Option<RoomSnapshot>,
}

/// Session-critical state of the local player.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LocalPlayer {
    pub name: Option<String>,
    pub health: Option<i32>,
    pub max_health: Option<i32>,
    pub inventory: Option<Vec<String>>,
    pub revision: Option<u64>,
}

/// Result of applying a room snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoomApplied {
    /// The current room changed.
    Entered,
    /// Same room, different content.
    Refreshed,
    /// Identical to what is already displayed.
    Unchanged,
}

pub struct Store {
    session: Session,
    room: Option<RoomSnapshot>,
    pending: Option<PendingTransition>,
    roster: BTreeMap<ActorId, Actor>,
    /// Roster mark at which each entry was last written.
    roster_stamps: BTreeMap<ActorId, u64>,
    roster_mark: u64,
    local_player: LocalPlayer,
    duel: DuelSession,
    transcript: Transcript,
    room_entries: u64,
}

impl Store {
    /// An empty store for `player_id`, not yet in any room.
    pub fn new(player_id: impl Into<ActorId>, duel_max_health: i32, transcript_capacity: usize) -> Self {
        Self {
            session: Session {
                player_id: player_id.into(),
                current_room_id: None,
                connection: None,
            },
            room: None,
            pending: None,
            roster: BTreeMap::new(),
            roster_stamps: BTreeMap::new(),
            roster_mark: 0,
            local_player: LocalPlayer::default(),
            duel: DuelSession::new(duel_max_health),
            transcript: Transcript::new(transcript_capacity),
            room_entries: 0,
        }
    }

    /// Player identity and connection state.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Shorthand for `session().player_id()`.
    pub fn player_id(&self) -> &str {
        &self.session.player_id
    }

    /// Whether `actor_id` is the local player.
    pub fn is_me(&self, actor_id: &str) -> bool {
        self.session.player_id == actor_id
    }

    /// Shorthand for `session().current_room_id()`.
    pub fn current_room_id(&self) -> Option<&str> {
        self.session.current_room_id.as_deref()
    }

    /// Latest applied snapshot of the current room.
    pub fn room(&self) -> Option<&RoomSnapshot> {
        self.room.as_ref()
    }

    /// How many times the current room has changed.
    pub fn room_entries(&self) -> u64 {
        self.room_entries
    }

    /// Handle of the live push link, if any.
    pub(crate) fn connection(&self) -> Option<&ConnectionHandle> {
        self.session.connection.as_ref()
    }

    pub(crate) fn set_connection(&mut self, handle: Option<ConnectionHandle>) {
        self.session.connection = handle;
    }

    // --- room ---------------------------------------------------------------

    /// Apply an authoritative room snapshot. Entering a new room clears the
    /// roster and writes the room description; re-applying the displayed
    /// snapshot is a no-op.
    pub fn apply_room_snapshot(&mut self, snapshot: RoomSnapshot) -> RoomApplied {
        let entered = self.session.current_room_id.as_deref() != Some(snapshot.room_id.as_str());
        if entered {
            self.session.current_room_id = Some(snapshot.room_id.clone());
            self.room_entries += 1;
            self.roster.clear();
            self.roster_stamps.clear();
            self.transcript.push(
                Message::new(MessageKind::RoomDescription, snapshot.describe())
                    .in_room(Some(snapshot.room_id.clone())),
            );
            self.room = Some(snapshot);
            return RoomApplied::Entered;
        }

        if self.room.as_ref() == Some(&snapshot) {
            return RoomApplied::Unchanged;
        }

        let narration_changed = self
            .room
            .as_ref()
            .map_or(true, |room| room.narrative_text != snapshot.narrative_text);
        if narration_changed && !snapshot.narrative_text.is_empty() {
            self.transcript.push(
                Message::new(MessageKind::RoomDescription, snapshot.narrative_text.clone())
                    .in_room(Some(snapshot.room_id.clone())),
            );
        }
        self.room = Some(snapshot);
        RoomApplied::Refreshed
    }

    // --- pending transition -------------------------------------------------

    /// The armed room transition, if any.
    pub fn pending(&self) -> Option<&PendingTransition> {
        self.pending.as_ref()
    }

    /// Room the armed transition leads to.
    pub fn pending_target(&self) -> Option<&str> {
        self.pending.as_ref().map(|p| p.target_room_id.as_str())
    }

    /// Arm a transition to `room_id`. Re-arming the same target keeps any
    /// snapshot already buffered for it; a different target replaces it.
    pub fn arm_pending(&mut self, room_id: impl Into<RoomId>) {
        let room_id = room_id.into();
        if self.pending_target() == Some(room_id.as_str()) {
            return;
        }
        self.pending = Some(PendingTransition {
            target_room_id: room_id,
            buffered_snapshot: None,
        });
    }

    /// Buffer a snapshot for the armed transition. Snapshots for any other
    /// room are discarded.
    pub fn buffer_snapshot(&mut self, snapshot: RoomSnapshot) -> bool {
        match self.pending.as_mut() {
            Some(pending) if pending.target_room_id == snapshot.room_id => {
                pending.buffered_snapshot = Some(snapshot);
                true
            }
            _ => {
                debug!(room_id = %snapshot.room_id, "discarding snapshot with no matching transition");
                false
            }
        }
    }

    /// Consume the transition for `room_id` if it holds a buffered snapshot.
    pub fn take_buffered_for(&mut self, room_id: &str) -> Option<RoomSnapshot> {
        let ready = matches!(
            &self.pending,
            Some(p) if p.target_room_id == room_id && p.buffered_snapshot.is_some()
        );
        if !ready {
            return None;
        }
        self.pending.take().and_then(|p| p.buffered_snapshot)
    }

    /// Consume the transition for `room_id`, buffered snapshot or not.
    pub fn take_pending_for(&mut self, room_id: &str) -> Option<PendingTransition> {
        if self.pending_target() == Some(room_id) {
            self.pending.take()
        } else {
            None
        }
    }

    // --- roster -------------------------------------------------------------

    /// Resolved co-located actors, ordered by id.
    pub fn roster(&self) -> impl Iterator<Item = &Actor> {
        self.roster.values()
    }

    /// Number of resolved co-located actors.
    pub fn roster_len(&self) -> usize {
        self.roster.len()
    }

    /// A resolved co-located actor by id.
    pub fn roster_actor(&self, actor_id: &str) -> Option<&Actor> {
        self.roster.get(actor_id)
    }

    /// Occupant ids of the displayed room, from its latest snapshot.
    pub fn occupant_ids(&self) -> &[ActorId] {
        self.room.as_ref().map_or(&[], |room| room.occupant_ids.as_slice())
    }

    /// Insert or replace a co-located actor. The local player is never added.
    pub fn upsert_actor(&mut self, actor: Actor) -> bool {
        if self.is_me(&actor.id) {
            return false;
        }
        self.roster_mark += 1;
        self.roster_stamps.insert(actor.id.clone(), self.roster_mark);
        self.roster.insert(actor.id.clone(), actor);
        true
    }

    /// Remove a co-located actor, returning its record if it was present.
    pub fn remove_actor(&mut self, actor_id: &str) -> Option<Actor> {
        self.roster_stamps.remove(actor_id);
        self.roster.remove(actor_id)
    }

    /// Advances with every roster write. An occupant list taken at one mark
    /// says nothing about entries written after it.
    pub fn roster_mark(&self) -> u64 {
        self.roster_mark
    }

    /// Drop entries missing from `occupants` that were last written at or
    /// before `mark`. Returns how many were removed.
    pub fn retain_roster(&mut self, occupants: &[ActorId], mark: u64) -> usize {
        let stamps = &self.roster_stamps;
        let before = self.roster.len();
        self.roster.retain(|id, _| {
            occupants.contains(id) || stamps.get(id).is_some_and(|&stamp| stamp > mark)
        });
        self.roster_stamps.retain(|id, _| self.roster.contains_key(id));
        before - self.roster.len()
    }

    // --- local player -------------------------------------------------------

    /// What is known about the local player's own record.
    pub fn local_player(&self) -> &LocalPlayer {
        &self.local_player
    }

    /// Merge a payload about the local player.
    ///
    /// Health and inventory are kept unless the payload carries them, and a
    /// payload whose revision is older than ours changes nothing.
    pub fn merge_local_player(&mut self, patch: &ActorPatch) -> bool {
        let local = &mut self.local_player;
        if let (Some(theirs), Some(mine)) = (patch.revision, local.revision) {
            if theirs < mine {
                debug!(theirs, mine, "ignoring stale local player payload");
                return false;
            }
        }

        let before = local.clone();
        if let Some(name) = &patch.name {
            local.name = Some(name.clone());
        }
        if let Some(health) = patch.health {
            local.health = Some(health);
        }
        if let Some(max_health) = patch.max_health {
            local.max_health = Some(max_health);
        }
        if let Some(inventory) = &patch.inventory {
            local.inventory = Some(inventory.clone());
        }
        if let Some(revision) = patch.revision {
            local.revision = Some(revision);
        }
        *local != before
    }

    // --- duel ---------------------------------------------------------------

    /// Current duel session; written only by the duel coordinator.
    pub fn duel(&self) -> &DuelSession {
        &self.duel
    }

    pub(crate) fn duel_mut(&mut self) -> &mut DuelSession {
        &mut self.duel
    }

    // --- transcript ---------------------------------------------------------

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Append a transcript entry and return its id.
    pub fn push_message(&mut self, message: Message) -> MessageId {
        self.transcript.push(message)
    }

    /// Append a system entry tagged with the current room.
    pub fn push_system(&mut self, text: impl Into<String>) -> MessageId {
        let room = self.session.current_room_id.clone();
        self.transcript.push(Message::system(text).in_room(room))
    }

    pub(crate) fn transcript_mut(&mut self) -> &mut Transcript {
        &mut self.transcript
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_core::{Coordinates, GenerationStatus};

    fn snapshot(room_id: &str, text: &str, occupants: &[&str]) -> RoomSnapshot {
        RoomSnapshot {
            room_id: room_id.into(),
            coordinates: Coordinates::new(0, 0),
            biome: "forest".into(),
            narrative_text: text.into(),
            occupant_ids: occupants.iter().map(|s| s.to_string()).collect(),
            generation_status: GenerationStatus::Complete,
        }
    }

    #[test]
    fn same_snapshot_twice_adds_one_entry() {
        let mut store = Store::new("me", 10, 50);
        assert_eq!(store.apply_room_snapshot(snapshot("A", "A glade.", &[])), RoomApplied::Entered);
        assert_eq!(store.apply_room_snapshot(snapshot("A", "A glade.", &[])), RoomApplied::Unchanged);
        assert_eq!(store.transcript().len(), 1);
        assert_eq!(store.room_entries(), 1);
    }

    #[test]
    fn regenerated_narration_is_appended() {
        let mut store = Store::new("me", 10, 50);
        store.apply_room_snapshot(snapshot("A", "", &[]));
        let applied = store.apply_room_snapshot(snapshot("A", "Mist rolls in.", &[]));
        assert_eq!(applied, RoomApplied::Refreshed);
        assert_eq!(store.transcript().last().unwrap().text, "Mist rolls in.");
        assert_eq!(store.room_entries(), 1);
    }

    #[test]
    fn roster_never_holds_local_player() {
        let mut store = Store::new("me", 10, 50);
        assert!(!store.upsert_actor(Actor::new("me", "Me")));
        assert!(store.upsert_actor(Actor::new("you", "You")));
        assert_eq!(store.roster_len(), 1);
    }

    #[test]
    fn pending_buffer_only_for_target() {
        let mut store = Store::new("me", 10, 50);
        assert!(!store.buffer_snapshot(snapshot("B", "", &[])));
        store.arm_pending("B");
        assert!(!store.buffer_snapshot(snapshot("C", "", &[])));
        assert!(store.buffer_snapshot(snapshot("B", "", &[])));

        store.arm_pending("B");
        assert!(store.pending().unwrap().buffered_snapshot.is_some());

        assert!(store.take_buffered_for("C").is_none());
        assert!(store.take_buffered_for("B").is_some());
        assert!(store.pending().is_none());
        assert!(store.take_buffered_for("B").is_none());
    }

    #[test]
    fn local_player_keeps_fields_the_payload_omits() {
        let mut store = Store::new("me", 10, 50);
        store.merge_local_player(&ActorPatch {
            health: Some(7),
            inventory: Some(vec!["torch".into()]),
            revision: Some(3),
            ..Default::default()
        });

        // A room push that only knows the name.
        store.merge_local_player(&ActorPatch {
            name: Some("Ash".into()),
            ..Default::default()
        });
        assert_eq!(store.local_player().health, Some(7));
        assert_eq!(store.local_player().inventory.as_deref(), Some(&["torch".to_string()][..]));

        // An older revision cannot roll health back.
        let changed = store.merge_local_player(&ActorPatch {
            health: Some(10),
            revision: Some(2),
            ..Default::default()
        });
        assert!(!changed);
        assert_eq!(store.local_player().health, Some(7));

        store.merge_local_player(&ActorPatch {
            health: Some(4),
            revision: Some(4),
            ..Default::default()
        });
        assert_eq!(store.local_player().health, Some(4));
    }

    #[test]
    fn pruning_spares_actors_written_after_the_list() {
        let mut store = Store::new("me", 10, 50);
        store.upsert_actor(Actor::new("old", "Old"));
        let mark = store.roster_mark();
        store.upsert_actor(Actor::new("new", "New"));

        assert_eq!(store.retain_roster(&[], mark), 1);
        assert!(store.roster_actor("old").is_none());
        assert!(store.roster_actor("new").is_some());

        assert_eq!(store.retain_roster(&[], store.roster_mark()), 1);
        assert_eq!(store.roster_len(), 0);
    }
}
