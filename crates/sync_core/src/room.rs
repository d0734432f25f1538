use crate::actor::ShapeError;
use crate::coords::Coordinates;
use crate::types::{ActorId, RoomId};
use serde::{Deserialize, Serialize};

/// Progress of the server-side generator that writes room narration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    Pending,
    Generating,
    #[default]
    Complete,
    Failed,
}

/// Authoritative description of one room as pushed by the server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    pub coordinates: Coordinates,
    #[serde(default)]
    pub biome: String,
    #[serde(default)]
    pub narrative_text: String,
    #[serde(default)]
    pub occupant_ids: Vec<ActorId>,
    #[serde(default)]
    pub generation_status: GenerationStatus,
}

impl RoomSnapshot {
    pub fn validate(&self) -> Result<(), ShapeError> {
        if self.room_id.trim().is_empty() {
            return Err(ShapeError::MissingField("roomId"));
        }
        if self.occupant_ids.iter().any(|id| id.trim().is_empty()) {
            return Err(ShapeError::Invalid {
                field: "occupantIds",
                reason: "contains an empty id",
            });
        }
        Ok(())
    }

    /// Text shown when the player enters or the narration is regenerated.
    pub fn describe(&self) -> String {
        match self.generation_status {
            GenerationStatus::Pending | GenerationStatus::Generating
                if self.narrative_text.is_empty() =>
            {
                format!("You arrive at {}. The area is still taking shape...", self.coordinates)
            }
            _ if self.narrative_text.is_empty() => {
                format!("You arrive at {} ({}).", self.coordinates, self.biome)
            }
            _ => self.narrative_text.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wire_shape_with_defaults() {
        let room: RoomSnapshot = serde_json::from_value(serde_json::json!({
            "roomId": "r1",
            "coordinates": {"x": 1, "y": 2},
            "biome": "forest",
            "narrativeText": "Tall pines.",
            "occupantIds": ["a", "b"],
            "generationStatus": "generating"
        }))
        .unwrap();
        assert_eq!(room.coordinates, Coordinates::new(1, 2));
        assert_eq!(room.occupant_ids, vec!["a", "b"]);
        assert_eq!(room.generation_status, GenerationStatus::Generating);

        let bare: RoomSnapshot = serde_json::from_value(serde_json::json!({
            "roomId": "r2",
            "coordinates": {"x": 0, "y": 0}
        }))
        .unwrap();
        assert!(bare.occupant_ids.is_empty());
        assert_eq!(bare.generation_status, GenerationStatus::Complete);
    }

    #[test]
    fn validate_rejects_blank_ids() {
        let mut room: RoomSnapshot = serde_json::from_value(serde_json::json!({
            "roomId": " ",
            "coordinates": {"x": 0, "y": 0}
        }))
        .unwrap();
        assert_eq!(room.validate(), Err(ShapeError::MissingField("roomId")));

        room.room_id = "ok".into();
        room.occupant_ids = vec!["".into()];
        assert!(room.validate().is_err());
    }

    #[test]
    fn describe_falls_back_while_generating() {
        let room = RoomSnapshot {
            room_id: "r".into(),
            coordinates: Coordinates::new(3, 4),
            biome: "swamp".into(),
            narrative_text: String::new(),
            occupant_ids: vec![],
            generation_status: GenerationStatus::Pending,
        };
        assert!(room.describe().contains("still taking shape"));
    }
}
