use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Grid position of a room.
///
/// Used directly as a map key; rooms are never addressed by a formatted
/// `"x,y"` string.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Coordinates {
    pub x: i32,
    pub y: i32,
}

impl Coordinates {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The neighbouring position one step in `direction`.
    /// North increases `y`.
    pub const fn step(self, direction: Direction) -> Self {
        let (dx, dy) = direction.delta();
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    North,
    South,
    East,
    West,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::South,
        Direction::East,
        Direction::West,
    ];

    pub const fn delta(self) -> (i32, i32) {
        match self {
            Direction::North => (0, 1),
            Direction::South => (0, -1),
            Direction::East => (1, 0),
            Direction::West => (-1, 0),
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Direction::North => "north",
            Direction::South => "south",
            Direction::East => "east",
            Direction::West => "west",
        }
    }
}

impl FromStr for Direction {
    type Err = ();

    /// Accepts full names, single-letter abbreviations and a leading "go".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let word = s.trim().to_ascii_lowercase();
        let word = word.strip_prefix("go ").unwrap_or(&word).trim();
        match word {
            "north" | "n" => Ok(Direction::North),
            "south" | "s" => Ok(Direction::South),
            "east" | "e" => Ok(Direction::East),
            "west" | "w" => Ok(Direction::West),
            _ => Err(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn step_moves_one_cell() {
        let origin = Coordinates::new(0, 0);
        assert_eq!(origin.step(Direction::North), Coordinates::new(0, 1));
        assert_eq!(origin.step(Direction::West), Coordinates::new(-1, 0));
        assert_eq!(
            origin.step(Direction::East).step(Direction::South),
            Coordinates::new(1, -1)
        );
    }

    #[test]
    fn coordinates_work_as_map_keys() {
        let mut rooms = HashMap::new();
        rooms.insert(Coordinates::new(2, -3), "cavern");
        assert_eq!(rooms.get(&Coordinates::new(2, -3)), Some(&"cavern"));
        assert_eq!(rooms.get(&Coordinates::new(-3, 2)), None);
    }

    #[test]
    fn direction_parsing() {
        assert_eq!("north".parse(), Ok(Direction::North));
        assert_eq!("Go West".parse(), Ok(Direction::West));
        assert_eq!(" e ".parse(), Ok(Direction::East));
        assert_eq!("up".parse::<Direction>(), Err(()));
    }

    #[test]
    fn coordinates_serialize_as_object() {
        let json = serde_json::to_value(Coordinates::new(4, 5)).unwrap();
        assert_eq!(json, serde_json::json!({"x": 4, "y": 5}));
    }
}
