/// Server-assigned identifier of a player, NPC or monster.
pub type ActorId = String;

/// Server-assigned identifier of a room.
pub type RoomId = String;

/// Stable identifier of a transcript entry.
pub type MessageId = u64;

/// Client-local identifier of one submitted player action.
pub type ActionId = u64;
