//! Scripted duel resolution.
//!
//! Strike beats feint, feint beats guard, guard beats strike. A winning
//! strike or feint deals damage plus any banked advantage; a winning guard
//! deals one point and banks one advantage.

use sync_core::{ActorId, DuelResponse, DuelRoundResult};

const BASE_DAMAGE: i32 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stance {
    Strike,
    Guard,
    Feint,
}

impl Stance {
    /// Unknown moves fall back to guarding.
    fn parse(choice: &str) -> Self {
        match choice.trim().to_ascii_lowercase().as_str() {
            "strike" | "attack" => Stance::Strike,
            "feint" => Stance::Feint,
            _ => Stance::Guard,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Stance::Strike => "strike",
            Stance::Guard => "guard",
            Stance::Feint => "feint",
        }
    }

    fn beats(self, other: Stance) -> bool {
        matches!(
            (self, other),
            (Stance::Strike, Stance::Feint)
                | (Stance::Feint, Stance::Guard)
                | (Stance::Guard, Stance::Strike)
        )
    }
}

#[derive(Debug)]
struct Fighter {
    id: ActorId,
    health: i32,
    advantage: i32,
    pending: Option<Stance>,
}

impl Fighter {
    fn new(id: ActorId, health: i32) -> Self {
        Self {
            id,
            health,
            advantage: 0,
            pending: None,
        }
    }
}

/// One accepted duel between a challenger (`p1`) and a responder (`p2`).
#[derive(Debug)]
pub struct DuelTable {
    round: u32,
    fighters: [Fighter; 2],
}

impl DuelTable {
    pub fn new(response: &DuelResponse) -> Self {
        Self {
            round: 1,
            fighters: [
                Fighter::new(response.challenger_id.clone(), response.p1_max_health),
                Fighter::new(response.responder_id.clone(), response.p2_max_health),
            ],
        }
    }

    pub fn involves(&self, actor_id: &str) -> bool {
        self.fighters.iter().any(|f| f.id == actor_id)
    }

    pub fn opponent_of(&self, actor_id: &str) -> Option<&str> {
        match self.fighters.iter().position(|f| f.id == actor_id)? {
            0 => Some(self.fighters[1].id.as_str()),
            _ => Some(self.fighters[0].id.as_str()),
        }
    }

    /// Records a move. Returns the round result once both sides have moved;
    /// a second move from the same side replaces the first.
    pub fn submit(&mut self, actor_id: &str, choice: &str) -> Option<DuelRoundResult> {
        let fighter = self.fighters.iter_mut().find(|f| f.id == actor_id)?;
        fighter.pending = Some(Stance::parse(choice));
        let (a, b) = (self.fighters[0].pending?, self.fighters[1].pending?);
        Some(self.resolve(a, b))
    }

    fn resolve(&mut self, a: Stance, b: Stance) -> DuelRoundResult {
        let description = if a.beats(b) {
            self.land(0, a)
        } else if b.beats(a) {
            self.land(1, b)
        } else if a == Stance::Strike {
            for fighter in &mut self.fighters {
                fighter.health = (fighter.health - 1).max(0);
            }
            "Both blades connect.".to_string()
        } else {
            "Neither side gives ground.".to_string()
        };

        let [p1, p2] = &mut self.fighters;
        p1.pending = None;
        p2.pending = None;
        let result = DuelRoundResult {
            round: self.round,
            p1_id: p1.id.clone(),
            p2_id: p2.id.clone(),
            p1_move: a.name().to_string(),
            p2_move: b.name().to_string(),
            p1_health: p1.health,
            p2_health: p2.health,
            p1_advantage: p1.advantage,
            p2_advantage: p2.advantage,
            description,
            combat_ends: p1.health <= 0 || p2.health <= 0,
        };
        self.round += 1;
        result
    }

    fn land(&mut self, winner: usize, stance: Stance) -> String {
        let loser = 1 - winner;
        let damage = if stance == Stance::Guard {
            self.fighters[winner].advantage += 1;
            1
        } else {
            BASE_DAMAGE + std::mem::take(&mut self.fighters[winner].advantage)
        };
        let target = &mut self.fighters[loser];
        target.health = (target.health - damage).max(0);
        format!(
            "{}'s {} beats {}'s {} for {} damage.",
            self.fighters[winner].id,
            stance.name(),
            self.fighters[loser].id,
            self.fighters[loser].pending.map_or("move", Stance::name),
            damage
        )
    }
}
