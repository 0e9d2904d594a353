//! Shared conversation history, one transcript per text channel.
//!
//! Voice turns and typed turns land in the same transcript, so the dialogue
//! model sees one interleaved conversation regardless of how each line
//! arrived. A fixed turn cap prevents unbounded context growth.

use crate::pipeline::messages::ChannelId;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Who produced a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// A human participant (spoken or typed).
    User,
    /// The dialogue model.
    Model,
}

/// One committed turn in a channel's conversation. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    /// Originator of the turn.
    pub role: Role,
    /// Turn text.
    pub text: String,
}

impl ConversationTurn {
    /// A user turn.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    /// A model turn.
    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

/// Bounded per-channel conversation store.
///
/// Histories are created lazily on first push and live for the process
/// lifetime — they are deliberately not tied to voice sessions, so a
/// rejoin continues the same conversation.
pub struct ConversationStore {
    channels: Mutex<HashMap<ChannelId, VecDeque<ConversationTurn>>>,
    max_turns: usize,
}

impl ConversationStore {
    /// Create a store retaining at most `max_turns` turns per channel.
    #[must_use]
    pub fn new(max_turns: usize) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            max_turns: max_turns.max(1),
        }
    }

    /// Append a turn, evicting the channel's oldest if at capacity.
    pub fn push(&self, channel: ChannelId, turn: ConversationTurn) {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        let turns = channels.entry(channel).or_default();

        if turns.len() >= self.max_turns {
            turns.pop_front();
        }
        turns.push_back(turn);
    }

    /// Snapshot a channel's turns, oldest first.
    #[must_use]
    pub fn snapshot(&self, channel: ChannelId) -> Vec<ConversationTurn> {
        let channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels
            .get(&channel)
            .map(|turns| turns.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of turns currently stored for a channel.
    #[must_use]
    pub fn len(&self, channel: ChannelId) -> usize {
        let channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels.get(&channel).map_or(0, VecDeque::len)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn push_and_snapshot_preserve_order() {
        let store = ConversationStore::new(10);

        store.push(1, ConversationTurn::user("alice: hello"));
        store.push(1, ConversationTurn::model("hi alice"));
        store.push(1, ConversationTurn::user("bob: what's up"));

        let turns = store.snapshot(1);
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[0].text, "alice: hello");
        assert_eq!(turns[1].role, Role::Model);
        assert_eq!(turns[2].text, "bob: what's up");
    }

    #[test]
    fn capacity_evicts_oldest_first() {
        let store = ConversationStore::new(3);

        store.push(1, ConversationTurn::user("one"));
        store.push(1, ConversationTurn::user("two"));
        store.push(1, ConversationTurn::user("three"));
        store.push(1, ConversationTurn::user("four"));

        let turns = store.snapshot(1);
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0].text, "two");
        assert_eq!(turns[2].text, "four");
    }

    #[test]
    fn default_bound_holds_forty_turns() {
        let store = ConversationStore::new(40);

        for i in 0..41 {
            store.push(1, ConversationTurn::user(format!("turn {i}")));
        }

        assert_eq!(store.len(1), 40);
        let turns = store.snapshot(1);
        assert_eq!(turns[0].text, "turn 1");
        assert_eq!(turns[39].text, "turn 40");
    }

    #[test]
    fn channels_are_independent() {
        let store = ConversationStore::new(10);

        store.push(1, ConversationTurn::user("channel one"));
        store.push(2, ConversationTurn::user("channel two"));

        assert_eq!(store.len(1), 1);
        assert_eq!(store.len(2), 1);
        assert_eq!(store.snapshot(1)[0].text, "channel one");
        assert_eq!(store.snapshot(2)[0].text, "channel two");
    }

    #[test]
    fn snapshot_of_unknown_channel_is_empty() {
        let store = ConversationStore::new(10);
        assert!(store.snapshot(99).is_empty());
        assert_eq!(store.len(99), 0);
    }
}
