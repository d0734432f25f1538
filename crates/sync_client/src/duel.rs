//! Simultaneous-move duel protocol.
//!
//! Both moves of a round are held in [`DuelSession`] as soon as they are
//! known, but they reach the transcript only when the server's round result
//! arrives, and then together. Clock values come from the round result
//! alone.

use crate::errors::DuelError;
use crate::store::Store;
use sync_core::{
    ActorId, ClientMessage, DuelCancel, DuelChallenge, DuelMove, DuelResponse, DuelRoundResult,
    Message, MessageKind,
};
use tracing::{debug, info, warn};

const PLACEHOLDER_OPPONENT: &str = "Unknown challenger";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DuelState {
    #[default]
    Idle,
    ChallengePending,
    Active,
    RoundResolving,
    Ended,
}

impl DuelState {
    /// A challenge is open or a duel is running.
    pub fn is_engaged(self) -> bool {
        matches!(
            self,
            DuelState::ChallengePending | DuelState::Active | DuelState::RoundResolving
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DuelClock {
    pub health: i32,
    pub advantage: i32,
    pub max_health: i32,
}

impl DuelClock {
    pub fn full(max_health: i32) -> Self {
        Self {
            health: max_health,
            advantage: 0,
            max_health,
        }
    }

}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Opponent {
    pub id: ActorId,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Challenge {
    Incoming { challenger: Opponent },
    Outgoing { target: Opponent },
}

#[derive(Clone, Debug)]
pub struct DuelSession {
    state: DuelState,
    challenge: Option<Challenge>,
    opponent: Option<Opponent>,
    round: u32,
    my_move: Option<String>,
    opponent_move: Option<String>,
    both_submitted: bool,
    my_clock: DuelClock,
    opponent_clock: DuelClock,
    is_monster_duel: bool,
    /// Configured maximum; clocks return to it between duels.
    max_health: i32,
}

impl DuelSession {
    pub fn new(max_health: i32) -> Self {
        Self {
            max_health,
            state: DuelState::Idle,
            challenge: None,
            opponent: None,
            round: 0,
            my_move: None,
            opponent_move: None,
            both_submitted: false,
            my_clock: DuelClock::full(max_health),
            opponent_clock: DuelClock::full(max_health),
            is_monster_duel: false,
        }
    }

    pub fn state(&self) -> DuelState {
        self.state
    }

    pub fn opponent(&self) -> Option<&Opponent> {
        self.opponent.as_ref()
    }

    /// Who challenged us, while a challenge waits for an answer.
    pub fn challenger(&self) -> Option<&Opponent> {
        match &self.challenge {
            Some(Challenge::Incoming { challenger }) => Some(challenger),
            _ => None,
        }
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn my_move(&self) -> Option<&str> {
        self.my_move.as_deref()
    }

    /// Whether the opponent has committed a move this round. The move itself
    /// stays private until the round resolves.
    pub fn has_opponent_move(&self) -> bool {
        self.opponent_move.is_some()
    }

    pub fn both_submitted(&self) -> bool {
        self.both_submitted
    }

    pub fn my_clock(&self) -> DuelClock {
        self.my_clock
    }

    pub fn opponent_clock(&self) -> DuelClock {
        self.opponent_clock
    }

    pub fn is_monster_duel(&self) -> bool {
        self.is_monster_duel
    }

    fn start(&mut self, opponent: Opponent, my_max: i32, opponent_max: i32, monster: bool) {
        self.state = DuelState::Active;
        self.challenge = None;
        self.opponent = Some(opponent);
        self.round = 1;
        self.my_move = None;
        self.opponent_move = None;
        self.both_submitted = false;
        self.my_clock = DuelClock::full(my_max);
        self.opponent_clock = DuelClock::full(opponent_max);
        self.is_monster_duel = monster;
    }

    /// Close the duel: clocks back to the configured maximum, opponent and
    /// moves gone. Per-duel maxima from the response do not carry over.
    fn end(&mut self) {
        self.state = DuelState::Ended;
        self.challenge = None;
        self.opponent = None;
        self.my_move = None;
        self.opponent_move = None;
        self.both_submitted = false;
        self.my_clock = DuelClock::full(self.max_health);
        self.opponent_clock = DuelClock::full(self.max_health);
        self.is_monster_duel = false;
    }

    fn clear_challenge(&mut self) {
        self.challenge = None;
        if self.state == DuelState::ChallengePending {
            self.state = DuelState::Idle;
        }
    }
}

/// What a pushed duel message led to.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DuelReaction {
    pub outbound: Option<ClientMessage>,
    pub changed: bool,
}

impl DuelReaction {
    fn changed() -> Self {
        Self {
            outbound: None,
            changed: true,
        }
    }

    fn unchanged() -> Self {
        Self::default()
    }

    fn send(message: ClientMessage) -> Self {
        Self {
            outbound: Some(message),
            changed: true,
        }
    }
}

struct Side<'a> {
    health: i32,
    advantage: i32,
    wire_move: &'a str,
}

fn revealed(wire_move: &str, held: Option<String>) -> String {
    if wire_move.trim().is_empty() {
        held.unwrap_or_default()
    } else {
        wire_move.to_string()
    }
}

/// Where a round result left the duel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoundOutcome {
    NextRound(u32),
    Ended,
}

/// The only writer of [`DuelSession`].
pub struct DuelCoordinator {
    max_health: i32,
    allow_unverified_opponent: bool,
}

impl DuelCoordinator {
    pub fn new(max_health: i32, allow_unverified_opponent: bool) -> Self {
        Self {
            max_health,
            allow_unverified_opponent,
        }
    }

    // --- local operations ---------------------------------------------------

    pub fn challenge(&self, store: &mut Store, target_id: &str) -> Result<ClientMessage, DuelError> {
        if store.is_me(target_id) {
            return Err(DuelError::SelfChallenge);
        }
        if store.duel().state().is_engaged() {
            return Err(DuelError::Busy);
        }
        let target = store
            .roster_actor(target_id)
            .map(|actor| Opponent {
                id: actor.id.clone(),
                name: actor.name.clone(),
            })
            .ok_or_else(|| DuelError::UnknownTarget(target_id.to_string()))?;

        info!(target = %target.id, "challenging");
        let message = ClientMessage::DuelChallenge(DuelChallenge {
            challenger_id: store.player_id().to_string(),
            target_id: target.id.clone(),
        });
        let text = format!("You challenge {} to a duel.", target.name);
        let duel = store.duel_mut();
        duel.state = DuelState::ChallengePending;
        duel.challenge = Some(Challenge::Outgoing { target });
        store.push_system(text);
        Ok(message)
    }

    /// Accept the waiting challenge. The challenger must be resolvable from
    /// the roster unless unverified opponents are allowed.
    pub fn accept(&self, store: &mut Store) -> Result<ClientMessage, DuelError> {
        let challenger_id = match (&store.duel().state, &store.duel().challenge) {
            (DuelState::ChallengePending, Some(Challenge::Incoming { challenger })) => {
                challenger.id.clone()
            }
            _ => return Err(DuelError::NoChallenge),
        };

        let opponent = match store.roster_actor(&challenger_id) {
            Some(actor) => Opponent {
                id: actor.id.clone(),
                name: actor.name.clone(),
            },
            None if self.allow_unverified_opponent => {
                warn!(challenger = %challenger_id, "accepting duel with unresolved opponent");
                Opponent {
                    id: challenger_id.clone(),
                    name: PLACEHOLDER_OPPONENT.to_string(),
                }
            }
            None => return Err(DuelError::UnverifiedOpponent(challenger_id)),
        };

        let response = DuelResponse {
            challenger_id: challenger_id.clone(),
            responder_id: store.player_id().to_string(),
            accepted: true,
            is_monster_duel: None,
            monster_name: None,
            p1_max_health: self.max_health,
            p2_max_health: self.max_health,
        };
        let text = format!("You accept the duel with {}. Round 1: choose your move.", opponent.name);
        info!(opponent = %opponent.id, "duel accepted");
        store
            .duel_mut()
            .start(opponent, self.max_health, self.max_health, false);
        store.push_system(text);
        Ok(ClientMessage::DuelResponse(response))
    }

    pub fn decline(&self, store: &mut Store) -> Result<ClientMessage, DuelError> {
        let challenger = store.duel().challenger().cloned().ok_or(DuelError::NoChallenge)?;
        let response = DuelResponse {
            challenger_id: challenger.id.clone(),
            responder_id: store.player_id().to_string(),
            accepted: false,
            is_monster_duel: None,
            monster_name: None,
            p1_max_health: self.max_health,
            p2_max_health: self.max_health,
        };
        store.duel_mut().clear_challenge();
        store.push_system(format!("You decline {}'s challenge.", challenger.name));
        Ok(ClientMessage::DuelResponse(response))
    }

    /// Commit this round's move. Nothing is written to the transcript.
    pub fn submit_move(&self, store: &mut Store, choice: &str) -> Result<ClientMessage, DuelError> {
        let choice = choice.trim();
        if choice.is_empty() {
            return Err(DuelError::EmptyMove);
        }
        let player_id = store.player_id().to_string();
        let duel = store.duel_mut();
        if duel.state != DuelState::Active {
            return Err(DuelError::NotActive);
        }
        if duel.my_move.is_some() {
            return Err(DuelError::MoveAlreadySubmitted);
        }
        duel.my_move = Some(choice.to_string());
        duel.both_submitted = duel.opponent_move.is_some();
        debug!(round = duel.round, both = duel.both_submitted, "move committed");
        Ok(ClientMessage::DuelMove(DuelMove {
            player_id,
            choice: choice.to_string(),
            is_monster_move: None,
        }))
    }

    /// Withdraw a challenge or leave a running duel.
    pub fn cancel(&self, store: &mut Store) -> Result<ClientMessage, DuelError> {
        let duel = store.duel();
        let opponent_id = match (&duel.challenge, &duel.opponent) {
            (Some(Challenge::Outgoing { target }), _) => target.id.clone(),
            (Some(Challenge::Incoming { challenger }), _) => challenger.id.clone(),
            (None, Some(opponent)) if duel.state.is_engaged() => opponent.id.clone(),
            _ => return Err(DuelError::NotActive),
        };
        let message = ClientMessage::DuelCancel(DuelCancel {
            player_id: store.player_id().to_string(),
            opponent_id,
        });
        self.finish_cancelled(store, "You leave the duel.");
        Ok(message)
    }

    fn finish_cancelled(&self, store: &mut Store, text: &str) {
        let duel = store.duel_mut();
        if duel.state == DuelState::ChallengePending {
            duel.clear_challenge();
        } else {
            duel.end();
        }
        store.push_system(text);
    }

    // --- pushes ---------------------------------------------------------------

    pub fn on_challenge(&self, store: &mut Store, challenge: DuelChallenge) -> DuelReaction {
        if store.is_me(&challenge.challenger_id) || !store.is_me(&challenge.target_id) {
            return DuelReaction::unchanged();
        }

        if store.duel().state().is_engaged() {
            info!(challenger = %challenge.challenger_id, "busy, declining challenge");
            return DuelReaction {
                outbound: Some(ClientMessage::DuelResponse(DuelResponse {
                    challenger_id: challenge.challenger_id,
                    responder_id: challenge.target_id,
                    accepted: false,
                    is_monster_duel: None,
                    monster_name: None,
                    p1_max_health: self.max_health,
                    p2_max_health: self.max_health,
                })),
                changed: false,
            };
        }

        let name = store
            .roster_actor(&challenge.challenger_id)
            .map(|a| a.name.clone())
            .unwrap_or_else(|| challenge.challenger_id.clone());
        let duel = store.duel_mut();
        duel.state = DuelState::ChallengePending;
        duel.challenge = Some(Challenge::Incoming {
            challenger: Opponent {
                id: challenge.challenger_id,
                name: name.clone(),
            },
        });
        store.push_system(format!("{name} challenges you to a duel. Accept or decline."));
        DuelReaction::changed()
    }

    pub fn on_response(&self, store: &mut Store, response: DuelResponse) -> DuelReaction {
        if !store.is_me(&response.challenger_id) {
            return DuelReaction::unchanged();
        }
        let monster = response.is_monster_duel.unwrap_or(false);

        let target = match &store.duel().challenge {
            Some(Challenge::Outgoing { target }) if target.id == response.responder_id => {
                Some(target.clone())
            }
            _ => None,
        };
        if target.is_none() && !(monster && !store.duel().state().is_engaged()) {
            debug!(responder = %response.responder_id, "response to no open challenge");
            return DuelReaction::unchanged();
        }

        if !response.accepted {
            let name = target.map_or(response.responder_id.clone(), |t| t.name);
            store.duel_mut().clear_challenge();
            store.push_system(format!("{name} declined your challenge."));
            return DuelReaction::changed();
        }

        let name = response
            .monster_name
            .clone()
            .or(target.map(|t| t.name))
            .or_else(|| store.roster_actor(&response.responder_id).map(|a| a.name.clone()))
            .unwrap_or_else(|| response.responder_id.clone());
        info!(opponent = %response.responder_id, monster, "duel started");
        store.duel_mut().start(
            Opponent {
                id: response.responder_id,
                name: name.clone(),
            },
            response.p1_max_health,
            response.p2_max_health,
            monster,
        );
        store.push_system(format!("The duel with {name} begins. Round 1: choose your move."));
        DuelReaction::changed()
    }

    /// Store the opponent's move without showing it.
    pub fn on_move(&self, store: &mut Store, duel_move: DuelMove) -> DuelReaction {
        if store.is_me(&duel_move.player_id) {
            return DuelReaction::unchanged();
        }
        let duel = store.duel_mut();
        let from_opponent = duel
            .opponent
            .as_ref()
            .is_some_and(|o| o.id == duel_move.player_id);
        if duel.state != DuelState::Active || !from_opponent {
            warn!(player = %duel_move.player_id, state = ?duel.state, "ignoring move outside our duel");
            return DuelReaction::unchanged();
        }
        if duel.opponent_move.is_some() {
            debug!(round = duel.round, "duplicate opponent move");
            return DuelReaction::unchanged();
        }
        duel.opponent_move = Some(duel_move.choice);
        duel.both_submitted = duel.my_move.is_some();
        debug!(round = duel.round, both = duel.both_submitted, "opponent committed");
        DuelReaction::changed()
    }

    /// Resolve a round from the server's result. Leaves the duel either in
    /// the next round or ended.
    pub fn on_round_result(&self, store: &mut Store, result: DuelRoundResult) -> Option<RoundOutcome> {
        if result.p1_id.trim().is_empty() || result.p2_id.trim().is_empty() || result.p1_id == result.p2_id {
            warn!(round = result.round, "dropping round result with invalid duelists");
            store.push_system("Received an invalid duel result; it was ignored.");
            return None;
        }
        let i_am_p1 = if store.is_me(&result.p1_id) {
            true
        } else if store.is_me(&result.p2_id) {
            false
        } else {
            return None;
        };
        let p1 = Side {
            health: result.p1_health,
            advantage: result.p1_advantage,
            wire_move: &result.p1_move,
        };
        let p2 = Side {
            health: result.p2_health,
            advantage: result.p2_advantage,
            wire_move: &result.p2_move,
        };
        let (their_id, me, them) = if i_am_p1 {
            (&result.p2_id, p1, p2)
        } else {
            (&result.p1_id, p2, p1)
        };

        let duel = store.duel_mut();
        let ours = duel
            .opponent
            .as_ref()
            .is_some_and(|o| &o.id == their_id);
        if !ours || !matches!(duel.state, DuelState::Active | DuelState::RoundResolving) {
            warn!(round = result.round, state = ?duel.state, "round result for a duel we are not in");
            return None;
        }
        if result.round != duel.round {
            debug!(expected = duel.round, got = result.round, "round number mismatch");
        }

        duel.state = DuelState::RoundResolving;
        // The result's moves are authoritative; held moves fill in blanks.
        let mine = revealed(me.wire_move, duel.my_move.take());
        let theirs = revealed(them.wire_move, duel.opponent_move.take());
        let name = duel
            .opponent
            .as_ref()
            .map_or_else(String::new, |o| o.name.clone());
        duel.my_clock.health = me.health;
        duel.my_clock.advantage = me.advantage;
        duel.opponent_clock.health = them.health;
        duel.opponent_clock.advantage = them.advantage;
        duel.both_submitted = false;

        let mut text = format!("Round {}: you {mine}, {name} {theirs}.", result.round);
        if !result.description.is_empty() {
            text.push(' ');
            text.push_str(&result.description);
        }
        let round_entry = Message::new(MessageKind::DuelRound { round: result.round }, text)
            .in_room(store.current_room_id().map(str::to_string));
        store.push_message(round_entry);

        if result.combat_ends {
            let verdict = if me.health <= 0 && them.health > 0 {
                format!("{name} defeats you.")
            } else if them.health <= 0 && me.health > 0 {
                format!("You defeat {name}.")
            } else {
                format!("The duel with {name} is over.")
            };
            store.duel_mut().end();
            store.push_system(verdict);
            info!(round = result.round, "duel ended");
            Some(RoundOutcome::Ended)
        } else {
            let duel = store.duel_mut();
            duel.round = result.round + 1;
            duel.state = DuelState::Active;
            Some(RoundOutcome::NextRound(duel.round))
        }
    }

    /// A cancel naming the opponent ends our duel. A cancel carrying our own
    /// id is a local request and is forwarded to the opponent.
    pub fn on_cancel(&self, store: &mut Store, cancel: DuelCancel) -> DuelReaction {
        let duel = store.duel();
        let counterpart = match (&duel.challenge, &duel.opponent) {
            (Some(Challenge::Outgoing { target }), _) => Some(target.clone()),
            (Some(Challenge::Incoming { challenger }), _) => Some(challenger.clone()),
            (None, Some(opponent)) if duel.state.is_engaged() => Some(opponent.clone()),
            _ => None,
        };
        let Some(counterpart) = counterpart else {
            return DuelReaction::unchanged();
        };

        if store.is_me(&cancel.player_id) {
            let forward = ClientMessage::DuelCancel(DuelCancel {
                player_id: cancel.player_id,
                opponent_id: counterpart.id,
            });
            self.finish_cancelled(store, "You leave the duel.");
            return DuelReaction::send(forward);
        }

        if cancel.player_id == counterpart.id && store.is_me(&cancel.opponent_id) {
            self.finish_cancelled(store, &format!("{} left the duel.", counterpart.name));
            return DuelReaction::changed();
        }
        DuelReaction::unchanged()
    }
}
