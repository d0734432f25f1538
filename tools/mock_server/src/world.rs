//! In-memory world: a grid of rooms, actor records and running duels.
//!
//! Rooms are created on first visit and addressed as `room_{x}_{y}`.

use crate::duel::DuelTable;
use serde_json::{json, Value};
use std::collections::HashMap;
use sync_core::{
    ActionRequest, ActionUpdates, Actor, ActorId, ActorKind, ActorPatch, Coordinates, Direction,
    DuelResponse, DuelRoundResult, GenerationStatus, PushMessage, RoomId, RoomSnapshot,
};

const PLAYER_MAX_HEALTH: i32 = 10;
const WORDS_PER_CHUNK: usize = 3;

const BIOMES: [&str; 4] = ["forest", "marsh", "ruins", "hills"];

const QUEST_TEXT: [&str; 4] = [
    "A voice rolls across the ground. ",
    "Seek the bell that does not ring, ",
    "beyond the marsh ",
    "where the old road ends.",
];

pub fn room_id_for(coordinates: Coordinates) -> RoomId {
    format!("room_{}_{}", coordinates.x, coordinates.y)
}

pub fn coordinates_of(room_id: &str) -> Option<Coordinates> {
    let rest = room_id.strip_prefix("room_")?;
    let (x, y) = rest.split_once('_')?;
    Some(Coordinates::new(x.parse().ok()?, y.parse().ok()?))
}

/// What a player's socket session got on joining.
pub struct Joined {
    pub session: u64,
    pub actor: Actor,
    pub room: RoomSnapshot,
}

/// Lines to stream back for one action, plus pushes it causes.
#[derive(Default)]
pub struct ActionScript {
    pub lines: Vec<Value>,
    pub room_pushes: Vec<(RoomId, PushMessage)>,
}

impl ActionScript {
    fn narrate(content: String, updates: ActionUpdates) -> Self {
        let words: Vec<&str> = content.split_inclusive(' ').collect();
        let mut lines: Vec<Value> = words
            .chunks(WORDS_PER_CHUNK)
            .map(|piece| json!({ "type": "chunk", "content": piece.concat() }))
            .collect();
        lines.push(json!({ "type": "final", "content": content, "updates": updates }));
        Self {
            lines,
            room_pushes: Vec::new(),
        }
    }

    fn failure(message: &str) -> Self {
        Self {
            lines: vec![json!({ "error": message })],
            room_pushes: Vec::new(),
        }
    }
}

#[derive(Default)]
pub struct World {
    rooms: HashMap<Coordinates, RoomSnapshot>,
    actors: HashMap<ActorId, Actor>,
    sessions: HashMap<ActorId, u64>,
    next_session: u64,
    duels: Vec<DuelTable>,
}

impl World {
    /// A world with a keeper waiting at the origin.
    pub fn seeded() -> Self {
        let mut world = Self::default();
        let origin = Coordinates::new(0, 0);
        let keeper = Actor::new("keeper", "Old Keeper")
            .with_kind(ActorKind::Npc)
            .in_room(room_id_for(origin));
        world.room_at(origin).occupant_ids.push(keeper.id.clone());
        world.actors.insert(keeper.id.clone(), keeper);
        world
    }

    fn room_at(&mut self, coordinates: Coordinates) -> &mut RoomSnapshot {
        self.rooms.entry(coordinates).or_insert_with(|| {
            let index = (coordinates.x + coordinates.y).rem_euclid(BIOMES.len() as i32) as usize;
            let biome = BIOMES[index];
            RoomSnapshot {
                room_id: room_id_for(coordinates),
                coordinates,
                biome: biome.to_string(),
                narrative_text: format!("You stand in the {biome} at {coordinates}."),
                occupant_ids: Vec::new(),
                generation_status: GenerationStatus::Complete,
            }
        })
    }

    pub fn actor(&self, actor_id: &str) -> Option<&Actor> {
        self.actors.get(actor_id)
    }

    pub fn room(&self, room_id: &str) -> Option<&RoomSnapshot> {
        self.rooms.get(&coordinates_of(room_id)?)
    }

    /// Places the player in `room_id`, taking them out of every other room.
    pub fn join(&mut self, player_id: &str, room_id: &str) -> Option<Joined> {
        let coordinates = coordinates_of(room_id)?;
        for room in self.rooms.values_mut() {
            room.occupant_ids.retain(|id| id != player_id);
        }
        let room = self.room_at(coordinates);
        room.occupant_ids.push(player_id.to_string());
        let room = room.clone();

        let actor = self
            .actors
            .entry(player_id.to_string())
            .or_insert_with(|| Actor {
                health: Some(PLAYER_MAX_HEALTH),
                max_health: Some(PLAYER_MAX_HEALTH),
                inventory: Some(Vec::new()),
                revision: Some(0),
                ..Actor::new(player_id, format!("Wanderer {player_id}"))
            });
        actor.current_room = Some(room.room_id.clone());
        let actor = actor.clone();

        self.next_session += 1;
        self.sessions.insert(player_id.to_string(), self.next_session);
        Some(Joined {
            session: self.next_session,
            actor,
            room,
        })
    }

    /// Ends a socket session. Returns the room snapshot when the player was
    /// removed from it; a session replaced by a newer one changes nothing.
    pub fn leave(&mut self, player_id: &str, room_id: &str, session: u64) -> Option<RoomSnapshot> {
        if self.sessions.get(player_id) != Some(&session) {
            return None;
        }
        self.sessions.remove(player_id);
        let room = self.rooms.get_mut(&coordinates_of(room_id)?)?;
        let before = room.occupant_ids.len();
        room.occupant_ids.retain(|id| id != player_id);
        (room.occupant_ids.len() != before).then(|| room.clone())
    }

    pub fn perform(&mut self, request: &ActionRequest) -> ActionScript {
        let Some(actor) = self.actors.get(&request.player_id) else {
            return ActionScript::failure("Unknown player.");
        };
        let here = actor
            .current_room
            .as_deref()
            .and_then(coordinates_of)
            .or_else(|| coordinates_of(&request.room_id))
            .unwrap_or_default();

        let action = request.action.trim().to_ascii_lowercase();
        if let Ok(direction) = action.parse::<Direction>() {
            return self.travel(&request.player_id, here, direction);
        }
        match action.as_str() {
            "look" => {
                let room = self.room_at(here).clone();
                let content = room.describe();
                ActionScript::narrate(
                    content,
                    ActionUpdates {
                        actor: None,
                        room: Some(room),
                    },
                )
            }
            "rest" => self.rest(&request.player_id),
            "listen" => {
                let mut script = ActionScript::narrate(
                    "You close your eyes and listen.".to_string(),
                    ActionUpdates::default(),
                );
                let room_id = room_id_for(here);
                script.room_pushes = QUEST_TEXT
                    .iter()
                    .map(|text| {
                        (
                            room_id.clone(),
                            PushMessage::QuestChunk {
                                text: text.to_string(),
                            },
                        )
                    })
                    .collect();
                script
            }
            _ => ActionScript::narrate(
                format!("You {action}. Nothing much happens."),
                ActionUpdates::default(),
            ),
        }
    }

    fn travel(&mut self, player_id: &str, from: Coordinates, direction: Direction) -> ActionScript {
        let target = from.step(direction);
        let room = self.room_at(target).clone();
        let mut patch = ActorPatch {
            id: Some(player_id.to_string()),
            current_room: Some(room.room_id.clone()),
            ..ActorPatch::default()
        };
        if let Some(actor) = self.actors.get_mut(player_id) {
            actor.current_room = Some(room.room_id.clone());
            actor.revision = Some(actor.revision.unwrap_or(0) + 1);
            patch.revision = actor.revision;
        }
        ActionScript::narrate(
            format!("You head {}. {}", direction.name(), room.describe()),
            ActionUpdates {
                actor: Some(patch),
                room: Some(room),
            },
        )
    }

    fn rest(&mut self, player_id: &str) -> ActionScript {
        let Some(actor) = self.actors.get_mut(player_id) else {
            return ActionScript::failure("Unknown player.");
        };
        actor.health = actor.max_health;
        actor.revision = Some(actor.revision.unwrap_or(0) + 1);
        let patch = ActorPatch {
            id: Some(actor.id.clone()),
            health: actor.health,
            revision: actor.revision,
            ..ActorPatch::default()
        };
        ActionScript::narrate(
            "You rest a while and feel whole again.".to_string(),
            ActionUpdates {
                actor: Some(patch),
                room: None,
            },
        )
    }

    pub fn start_duel(&mut self, response: &DuelResponse) {
        self.duels
            .retain(|d| !d.involves(&response.challenger_id) && !d.involves(&response.responder_id));
        self.duels.push(DuelTable::new(response));
    }

    /// Applies a move; a finished duel is dropped.
    pub fn duel_move(&mut self, player_id: &str, choice: &str) -> Option<DuelRoundResult> {
        let index = self.duels.iter().position(|d| d.involves(player_id))?;
        let result = self.duels[index].submit(player_id, choice)?;
        if result.combat_ends {
            self.duels.swap_remove(index);
        }
        Some(result)
    }

    /// Drops the player's duel and returns the opponent, if one was running.
    pub fn cancel_duel(&mut self, player_id: &str) -> Option<ActorId> {
        let index = self.duels.iter().position(|d| d.involves(player_id))?;
        let duel = self.duels.swap_remove(index);
        duel.opponent_of(player_id).map(str::to_string)
    }
}
