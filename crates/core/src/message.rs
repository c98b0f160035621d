//! Persisted transcript messages.
//!
//! A [`Message`] is one row of a session's transcript: immutable once
//! persisted, ordered by creation time, and the sole source of
//! conversational history for the snapshot builder.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    /// The interviewed candidate
    Candidate,
    /// The language model
    Model,
    /// The orchestration engine itself (warnings, sandbox results, status)
    System,
    /// A dispatched tool call and its result
    Tool,
}

impl std::fmt::Display for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Candidate => "candidate",
            Self::Model => "model",
            Self::System => "system",
            Self::Tool => "tool",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Sender {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "candidate" => Ok(Self::Candidate),
            "model" => Ok(Self::Model),
            "system" => Ok(Self::System),
            "tool" => Ok(Self::Tool),
            other => Err(format!("unknown sender: {other}")),
        }
    }
}

/// A single transcript message. Append-only: the store never updates or
/// reorders persisted messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Store-assigned row id (0 until persisted)
    #[serde(default)]
    pub id: i64,

    /// Owning session
    pub session_id: String,

    /// Who sent this message
    pub sender: Sender,

    /// The text content
    pub text: String,

    /// Timestamp
    pub created_at: DateTime<Utc>,

    /// Task this message relates to, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

impl Message {
    fn new(session_id: impl Into<String>, sender: Sender, text: impl Into<String>) -> Self {
        Self {
            id: 0,
            session_id: session_id.into(),
            sender,
            text: text.into(),
            created_at: Utc::now(),
            task_id: None,
        }
    }

    /// Create a new candidate message.
    pub fn candidate(session_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(session_id, Sender::Candidate, text)
    }

    /// Create a new model message.
    pub fn model(session_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(session_id, Sender::Model, text)
    }

    /// Create a new system message.
    pub fn system(session_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(session_id, Sender::System, text)
    }

    /// Create a new tool transcript message.
    pub fn tool(session_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(session_id, Sender::Tool, text)
    }

    /// Attach the related task id.
    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_candidate_message() {
        let msg = Message::candidate("s1", "Здравствуйте!");
        assert_eq!(msg.sender, Sender::Candidate);
        assert_eq!(msg.text, "Здравствуйте!");
        assert!(msg.task_id.is_none());
    }

    #[test]
    fn with_task_sets_task_id() {
        let msg = Message::system("s1", "Code execution result").with_task("C1");
        assert_eq!(msg.task_id.as_deref(), Some("C1"));
    }

    #[test]
    fn sender_roundtrip() {
        for s in ["candidate", "model", "system", "tool"] {
            let parsed: Sender = s.parse().unwrap();
            assert_eq!(parsed.to_string(), s);
        }
        assert!("judge".parse::<Sender>().is_err());
    }

    #[test]
    fn message_serialization_roundtrip() {
        let msg = Message::model("s1", "Начнём с первого задания.");
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.text, msg.text);
        assert_eq!(back.sender, Sender::Model);
    }
}
