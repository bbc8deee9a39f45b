//! Conversation log and the hand-off between a bot reply and the typing
//! reveal.
//!
//! ## Lifecycle of a bot reply
//! 1. `receive_response` parks the reply as the pending message.
//! 2. The caller feeds the pending text to a [`TypingEngine`](crate::typing::TypingEngine).
//! 3. Once the reveal is complete, `commit_if_revealed` appends the reply to
//!    the permanent log and clears the pending slot; the caller resets the
//!    engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::typing::RevealState;

/// Shown in place of an empty bot reply.
pub const EMPTY_RESPONSE_FALLBACK: &str = "No response from bot";

/// Starter prompts offered while the log is empty.
pub const SUGGESTIONS: [&str; 4] = [
    "Design a home office setup for remote work under $500.",
    "How can I level up my web development expertise in 2025?",
    "Suggest some useful tools for debugging JavaScript code.",
    "Create a React JS component for the simple todo list app.",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Bot,
}

impl std::fmt::Display for Speaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Speaker::User => write!(f, "user"),
            Speaker::Bot => write!(f, "bot"),
        }
    }
}

/// One message in the conversation, in the backend's `/api/history` shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatEntry {
    pub sender: Speaker,
    pub message: String,
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Utc>,
}

impl ChatEntry {
    pub fn now(sender: Speaker, message: impl Into<String>) -> Self {
        Self {
            sender,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// The backend stores naive UTC datetimes (`2025-01-31T09:15:02.123456`);
/// locally created entries carry an offset. Accept both.
mod timestamp {
    use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }

    pub fn parse(raw: &str) -> Result<DateTime<Utc>, String> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Ok(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(|e| format!("invalid timestamp {raw:?}: {e}"))
    }
}

/// The permanent log plus at most one reply waiting to be revealed.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    entries: Vec<ChatEntry>,
    pending: Option<String>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_history(entries: Vec<ChatEntry>) -> Self {
        Self {
            entries,
            pending: None,
        }
    }

    pub fn entries(&self) -> &[ChatEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn show_suggestions(&self) -> bool {
        self.entries.is_empty() && self.pending.is_none()
    }

    pub fn push_user(&mut self, message: impl Into<String>) -> &ChatEntry {
        self.entries.push(ChatEntry::now(Speaker::User, message));
        &self.entries[self.entries.len() - 1]
    }

    /// Park a bot reply for revealing and return the text to hand to the
    /// engine. Replaces any reply still pending.
    pub fn receive_response(&mut self, text: impl Into<String>) -> &str {
        let mut text = text.into();
        if text.is_empty() {
            text = EMPTY_RESPONSE_FALLBACK.to_string();
        }
        self.pending.insert(text).as_str()
    }

    pub fn pending(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    /// Move the pending reply into the log if `state` shows it fully revealed.
    ///
    /// Returns the committed entry. A state for some other text, or one still
    /// revealing, commits nothing, so calling this on every state change is
    /// safe.
    pub fn commit_if_revealed(&mut self, state: &RevealState) -> Option<&ChatEntry> {
        let pending = self.pending.as_deref()?;
        if !state.is_complete() || state.source() != pending {
            return None;
        }
        let message = self.pending.take()?;
        self.entries.push(ChatEntry::now(Speaker::Bot, message));
        self.entries.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use rstest::rstest;

    fn revealed(text: &str) -> RevealState {
        let mut s = RevealState::new();
        s.start(text, true);
        s
    }

    #[test]
    fn new_conversation_shows_suggestions() {
        let c = Conversation::new();
        assert!(c.show_suggestions());
        assert_eq!(SUGGESTIONS.len(), 4);
    }

    #[test]
    fn pending_reply_hides_suggestions() {
        let mut c = Conversation::new();
        c.receive_response("hi");
        assert!(!c.show_suggestions());
    }

    #[test]
    fn empty_response_uses_fallback() {
        let mut c = Conversation::new();
        assert_eq!(c.receive_response(""), EMPTY_RESPONSE_FALLBACK);
    }

    #[test]
    fn commit_requires_complete_reveal() {
        let mut c = Conversation::new();
        c.receive_response("Hello");
        let mut s = RevealState::new();
        s.start("Hello", false);
        assert!(c.commit_if_revealed(&s).is_none());
        assert_eq!(c.pending(), Some("Hello"));

        s.interrupt();
        let entry = c.commit_if_revealed(&s).cloned().unwrap();
        assert_eq!(entry.sender, Speaker::Bot);
        assert_eq!(entry.message, "Hello");
        assert!(c.pending().is_none());
    }

    #[test]
    fn commit_happens_once() {
        let mut c = Conversation::new();
        c.receive_response("Hello");
        let s = revealed("Hello");
        assert!(c.commit_if_revealed(&s).is_some());
        assert!(c.commit_if_revealed(&s).is_none());
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn commit_ignores_state_for_other_text() {
        let mut c = Conversation::new();
        c.receive_response("Hello");
        assert!(c.commit_if_revealed(&revealed("Bye")).is_none());
        assert!(c.is_empty());
    }

    #[test]
    fn commit_without_pending_is_none() {
        let mut c = Conversation::new();
        assert!(c.commit_if_revealed(&revealed("x")).is_none());
    }

    #[test]
    fn push_user_appends_in_order() {
        let mut c = Conversation::new();
        c.push_user("first");
        c.receive_response("reply");
        c.commit_if_revealed(&revealed("reply"));
        c.push_user("second");
        let senders: Vec<Speaker> = c.entries().iter().map(|e| e.sender).collect();
        assert_eq!(senders, vec![Speaker::User, Speaker::Bot, Speaker::User]);
    }

    #[rstest]
    #[case("2025-01-31T09:15:02.123456", 9, 15)]
    #[case("2025-01-31T09:15:02", 9, 15)]
    #[case("2025-01-31T09:15:02.000Z", 9, 15)]
    #[case("2025-01-31T11:15:02+02:00", 9, 15)]
    fn history_timestamps_parse(#[case] raw: &str, #[case] hour: u32, #[case] minute: u32) {
        let json = format!(r#"{{"sender":"bot","message":"m","timestamp":"{raw}"}}"#);
        let entry: ChatEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(entry.timestamp.year(), 2025);
        assert_eq!(entry.timestamp.hour(), hour);
        assert_eq!(entry.timestamp.minute(), minute);
    }

    #[test]
    fn bad_timestamp_is_rejected() {
        let json = r#"{"sender":"user","message":"m","timestamp":"yesterday"}"#;
        assert!(serde_json::from_str::<ChatEntry>(json).is_err());
    }

    #[test]
    fn unknown_sender_is_rejected() {
        let json = r#"{"sender":"system","message":"m","timestamp":"2025-01-31T09:15:02"}"#;
        assert!(serde_json::from_str::<ChatEntry>(json).is_err());
    }

    #[test]
    fn entry_serializes_lowercase_sender_and_utc() {
        let entry = ChatEntry {
            sender: Speaker::User,
            message: "hi".to_string(),
            timestamp: timestamp::parse("2025-01-31T09:15:02").unwrap(),
        };
        let v: serde_json::Value = serde_json::to_value(&entry).unwrap();
        assert_eq!(v["sender"], "user");
        assert_eq!(v["timestamp"], "2025-01-31T09:15:02.000Z");
    }
}
