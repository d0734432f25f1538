use std::collections::VecDeque;
use sync_core::{Message, MessageId, MessageKind};

/// Read position in a transcript: the id of the next entry to return.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TranscriptCursor(pub MessageId);

impl Default for TranscriptCursor {
    fn default() -> Self {
        TranscriptCursor(1)
    }
}

/// Append-only, bounded log of messages shown to the player.
///
/// Ids are assigned in order starting at 1 and stay contiguous, so an entry
/// is located by offset from the oldest retained id. The only in-place edits
/// are the text/kind updates used to grow chunked narration.
pub struct Transcript {
    entries: VecDeque<Message>,
    capacity: usize,
    next_id: MessageId,
    revision: u64,
}

impl Transcript {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            next_id: 1,
            revision: 0,
        }
    }

    /// Append a message, assigning its id. Evicts the oldest entry when full.
    pub fn push(&mut self, mut message: Message) -> MessageId {
        let id = self.next_id;
        self.next_id += 1;
        self.revision += 1;
        message.id = id;

        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(message);
        id
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        let index = self.index_of(id)?;
        self.entries.get(index)
    }

    fn get_mut(&mut self, id: MessageId) -> Option<&mut Message> {
        let index = self.index_of(id)?;
        self.revision += 1;
        self.entries.get_mut(index)
    }

    fn index_of(&self, id: MessageId) -> Option<usize> {
        let oldest = self.entries.front()?.id;
        if id < oldest {
            return None;
        }
        let index = (id - oldest) as usize;
        (index < self.entries.len()).then_some(index)
    }

    pub fn append_text(&mut self, id: MessageId, chunk: &str) -> bool {
        match self.get_mut(id) {
            Some(entry) => {
                entry.text.push_str(chunk);
                true
            }
            None => false,
        }
    }

    pub fn replace_text(&mut self, id: MessageId, text: impl Into<String>) -> bool {
        match self.get_mut(id) {
            Some(entry) => {
                entry.text = text.into();
                true
            }
            None => false,
        }
    }

    pub fn set_kind(&mut self, id: MessageId, kind: MessageKind) -> bool {
        match self.get_mut(id) {
            Some(entry) => {
                entry.kind = kind;
                true
            }
            None => false,
        }
    }

    /// Entries from `cursor` onward and the cursor past the last one.
    /// Entries already evicted are skipped.
    pub fn since(&self, cursor: TranscriptCursor) -> (Vec<&Message>, TranscriptCursor) {
        let entries = self.entries.iter().filter(|m| m.id >= cursor.0).collect();
        (entries, TranscriptCursor(self.next_id))
    }

    /// Bumped by every append and every in-place edit.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter()
    }

    pub fn last(&self) -> Option<&Message> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
