use std::time::Duration;
use tokio::time::Instant;

/// Joins quest narration chunks that arrive within a short window into one
/// block of text.
pub struct ChunkCoalescer {
    window: Duration,
    parts: Vec<String>,
    deadline: Option<Instant>,
}

impl ChunkCoalescer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            parts: Vec::new(),
            deadline: None,
        }
    }

    pub fn push(&mut self, text: String, now: Instant) {
        if self.deadline.is_none() {
            self.deadline = Some(now + self.window);
        }
        self.parts.push(text);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn take_due(&mut self, now: Instant) -> Option<String> {
        if self.deadline? > now {
            return None;
        }
        self.flush()
    }

    /// Everything collected so far, regardless of the window.
    pub fn flush(&mut self) -> Option<String> {
        self.deadline = None;
        if self.parts.is_empty() {
            return None;
        }
        Some(self.parts.drain(..).collect())
    }
}
