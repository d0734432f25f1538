//! WebSocket close-code taxonomy surfaced to the player.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseCategory {
    Clean,
    NetworkLost,
    ServerError,
    PolicyOrOverload,
    Unknown,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseDiagnosis {
    pub code: Option<u16>,
    pub category: CloseCategory,
    pub message: String,
}

impl CloseDiagnosis {
    pub fn is_clean(&self) -> bool {
        self.category == CloseCategory::Clean
    }
}

/// Map a close code to a player-facing diagnostic. A missing code is treated
/// as an abnormal close.
pub fn describe_close(code: Option<u16>) -> CloseDiagnosis {
    let (category, message) = match code.unwrap_or(1006) {
        1000 => (CloseCategory::Clean, "Connection closed normally.".to_string()),
        1001 => (
            CloseCategory::ServerError,
            "The server is going away; it may be restarting.".to_string(),
        ),
        1002 => (
            CloseCategory::ServerError,
            "Connection closed after a protocol error.".to_string(),
        ),
        1005 | 1006 => (
            CloseCategory::NetworkLost,
            "Connection lost. Check your network and try again.".to_string(),
        ),
        1008 => (
            CloseCategory::PolicyOrOverload,
            "Connection closed by server policy.".to_string(),
        ),
        1009 => (
            CloseCategory::PolicyOrOverload,
            "Connection closed: a message was too large.".to_string(),
        ),
        1011 => (
            CloseCategory::ServerError,
            "The server hit an internal error.".to_string(),
        ),
        1012 => (
            CloseCategory::ServerError,
            "The server is restarting. Try again shortly.".to_string(),
        ),
        1013 => (
            CloseCategory::PolicyOrOverload,
            "The server is overloaded. Try again later.".to_string(),
        ),
        1015 => (
            CloseCategory::NetworkLost,
            "Secure connection (TLS) failed.".to_string(),
        ),
        other => (
            CloseCategory::Unknown,
            format!("Connection closed with code {other}."),
        ),
    };
    CloseDiagnosis {
        code,
        category,
        message,
    }
}
