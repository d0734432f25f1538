use std::time::Duration;

/// Configuration for a synchronization client.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Base URL of the push channel (`ws://` or `wss://`).
    pub push_url: String,
    /// Base URL of the HTTP API (action exchange and actor lookups).
    pub api_url: String,
    /// Interval between keep-alive pings while connected.
    pub heartbeat_interval: Duration,
    /// When set, a ping left unanswered this long is treated as a lost link.
    pub pong_timeout: Option<Duration>,
    /// Window over which bursts of occupant-id pushes are merged.
    pub roster_debounce: Duration,
    /// Upper bound on a single actor lookup.
    pub roster_lookup_timeout: Duration,
    /// Window over which quest narration chunks are joined into one entry.
    pub quest_chunk_window: Duration,
    /// Maximum duel health offered when accepting a challenge.
    pub duel_max_health: i32,
    /// Accept duels whose opponent cannot be resolved from the roster, using
    /// a placeholder name.
    pub allow_unverified_opponent: bool,
    /// Number of transcript entries retained.
    pub transcript_capacity: usize,
    /// Capacity of the notice broadcast channel.
    pub notice_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            push_url: "ws://127.0.0.1:8080".to_string(),
            api_url: "http://127.0.0.1:8080".to_string(),
            heartbeat_interval: Duration::from_secs(25),
            pong_timeout: None,
            roster_debounce: Duration::from_millis(250),
            roster_lookup_timeout: Duration::from_secs(5),
            quest_chunk_window: Duration::from_millis(300),
            duel_max_health: 10,
            allow_unverified_opponent: false,
            transcript_capacity: 500,
            notice_capacity: 64,
        }
    }
}
