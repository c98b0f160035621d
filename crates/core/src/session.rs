//! Session lifecycle and the score ledger.
//!
//! A [`Session`] is owned exclusively by the orchestration engine and mutated
//! only through the state machine. Its `scores` map is a derived cache over
//! the append-only [`ScoreEntry`] ledger: the map always reflects the most
//! recent entry per task id, earlier entries are retained for audit only.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session lifecycle. The only transition is `Active → Completed`, once,
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Active,
    Completed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

impl std::str::FromStr for SessionState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            other => Err(format!("unknown session state: {other}")),
        }
    }
}

/// One interview session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub scenario_id: i64,
    pub role_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate_id: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub state: SessionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task_id: Option<String>,
    /// Derived cache: latest points per task id
    #[serde(default)]
    pub scores: HashMap<String, f64>,
}

impl Session {
    /// Create a fresh active session.
    pub fn new(scenario_id: i64, role_id: i64, candidate_id: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            scenario_id,
            role_id,
            candidate_id,
            started_at: Utc::now(),
            finished_at: None,
            state: SessionState::Active,
            current_task_id: None,
            scores: HashMap::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }
}

/// One immutable audit record of points awarded for a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreEntry {
    /// Store-assigned row id (0 until persisted)
    #[serde(default)]
    pub id: i64,
    pub session_id: String,
    pub task_id: String,
    pub points: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ScoreEntry {
    pub fn new(
        session_id: impl Into<String>,
        task_id: impl Into<String>,
        points: f64,
        comment: Option<String>,
    ) -> Self {
        Self {
            id: 0,
            session_id: session_id.into(),
            task_id: task_id.into(),
            points,
            comment,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_is_active() {
        let session = Session::new(1, 2, Some("cand-1".into()));
        assert!(session.is_active());
        assert!(session.current_task_id.is_none());
        assert!(session.scores.is_empty());
        assert!(session.finished_at.is_none());
    }

    #[test]
    fn state_roundtrip() {
        assert_eq!("active".parse::<SessionState>().unwrap(), SessionState::Active);
        assert_eq!(SessionState::Completed.to_string(), "completed");
        assert!("paused".parse::<SessionState>().is_err());
    }

    #[test]
    fn score_entry_keeps_comment() {
        let entry = ScoreEntry::new("s1", "T1", 4.0, Some("хороший ответ".into()));
        assert_eq!(entry.points, 4.0);
        assert_eq!(entry.comment.as_deref(), Some("хороший ответ"));
    }
}
