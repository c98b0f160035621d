//! Memory snapshot builder.
//!
//! Derives three artifacts from the session and its persisted transcript:
//! control state (intro done, active task, scored-task map), semantic memory
//! (strengths and weaknesses from score ratios), and a bounded episodic
//! window of tool and result events. The rendered snapshot is re-derived
//! every turn and handed to the model as an auxiliary system message so it
//! does not repeat greetings or re-ask answered questions.

use std::collections::{BTreeMap, BTreeSet};

use intervet_core::{Message, Scenario, Sender, Session};
use serde::Serialize;

const EPISODIC_SCAN: usize = 60;
const EPISODIC_KEEP: usize = 30;
const EVENT_CHARS: usize = 120;
const LAST_MESSAGE_CHARS: usize = 200;

/// Score ratio at or above this marks the task's topics as strengths.
const STRENGTH_RATIO: f64 = 0.8;
/// Score ratio at or below this marks the task's topics as weaknesses.
const WEAKNESS_RATIO: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct ControlState {
    pub intro_done: bool,
    pub current_task_id: String,
    pub task_status: BTreeMap<String, String>,
    pub awaiting_next_click: bool,
}

/// Derive the control state from the session and transcript. The active
/// task defaults to the scenario's first task when the session has not set
/// one yet.
pub fn control_state(session: &Session, scenario: &Scenario, history: &[Message]) -> ControlState {
    let intro_done = history.iter().any(|m| m.sender == Sender::Model);
    let task_status: BTreeMap<String, String> = session
        .scores
        .keys()
        .map(|tid| (tid.clone(), "scored".to_string()))
        .collect();
    let current_task_id = session
        .current_task_id
        .clone()
        .or_else(|| scenario.first_task().map(|t| t.id().to_string()))
        .unwrap_or_else(|| "нет".to_string());
    let awaiting_next_click = task_status.contains_key(&current_task_id);
    ControlState {
        intro_done,
        current_task_id,
        task_status,
        awaiting_next_click,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Issue {
    pub key: String,
    pub text: String,
}

#[derive(Debug, Clone, Default)]
pub struct SemanticMemory {
    pub strengths: BTreeSet<String>,
    pub weaknesses: BTreeSet<String>,
    pub issues: Vec<Issue>,
}

/// Classify scored tasks into strengths and weaknesses by score ratio.
/// Tasks strictly between the two thresholds land in neither bucket.
pub fn semantic_memory(session: &Session, scenario: &Scenario) -> SemanticMemory {
    let mut memory = SemanticMemory::default();
    for task in &scenario.tasks {
        let Some(&points) = session.scores.get(task.id()) else {
            continue;
        };
        let max_points = if task.max_points() > 0.0 {
            task.max_points()
        } else {
            1.0
        };
        let ratio = points / max_points;
        let topics = task.related_topics();
        if ratio >= STRENGTH_RATIO {
            memory.strengths.extend(topics.iter().cloned());
        } else if ratio <= WEAKNESS_RATIO {
            memory.weaknesses.extend(topics.iter().cloned());
            for topic in topics {
                memory.issues.push(Issue {
                    key: format!("weak_{topic}"),
                    text: format!("Низкий балл по теме {topic}"),
                });
            }
        }
    }
    memory
}

/// Keep tool events and result-bearing system events from the recent
/// transcript, newest window last.
pub fn episodic_memory(history: &[Message]) -> Vec<String> {
    let start = history.len().saturating_sub(EPISODIC_SCAN);
    let mut events: Vec<String> = history[start..]
        .iter()
        .filter_map(|m| match m.sender {
            Sender::Tool => Some(format!("tool:{}", truncate_chars(&m.text, EVENT_CHARS))),
            Sender::System if m.text.contains("result") => {
                Some(format!("system:{}", truncate_chars(&m.text, EVENT_CHARS)))
            }
            _ => None,
        })
        .collect();
    let keep_from = events.len().saturating_sub(EPISODIC_KEEP);
    events.drain(..keep_from);
    events
}

/// Render the full snapshot block passed to the model alongside the policy.
pub fn conversation_snapshot(
    session: &Session,
    scenario: &Scenario,
    history: &[Message],
) -> String {
    let control = control_state(session, scenario, history);
    let memory = semantic_memory(session, scenario);
    let episodic = episodic_memory(history);

    let last_user = history
        .iter()
        .rev()
        .find(|m| m.sender == Sender::Candidate)
        .map(|m| truncate_chars(&m.text, LAST_MESSAGE_CHARS))
        .unwrap_or_else(|| "нет последних вопросов".to_string());
    let last_model = history
        .iter()
        .rev()
        .find(|m| m.sender == Sender::Model)
        .map(|m| truncate_chars(&m.text, LAST_MESSAGE_CHARS))
        .unwrap_or_else(|| "нет".to_string());

    let task_status = serde_json::to_string(&control.task_status).unwrap_or_else(|_| "{}".into());
    let issues = serde_json::to_string(&memory.issues).unwrap_or_else(|_| "[]".into());
    let episodic = serde_json::to_string(&episodic).unwrap_or_else(|_| "[]".into());
    let strengths: Vec<&str> = memory.strengths.iter().map(String::as_str).collect();
    let weaknesses: Vec<&str> = memory.weaknesses.iter().map(String::as_str).collect();

    format!(
        "<CONTROL_STATE>\
         <INTRO_DONE>{intro_done}</INTRO_DONE>\
         <CURRENT_TASK_ID>{current_task}</CURRENT_TASK_ID>\
         <AWAITING_NEXT_CLICK>{awaiting_next}</AWAITING_NEXT_CLICK>\
         <TASK_STATUS>{task_status}</TASK_STATUS>\
         <HINT_COUNT>{{}}</HINT_COUNT>\
         <CODE_SUBMITTED>{{}}</CODE_SUBMITTED>\
         <SQL_SUBMITTED>{{}}</SQL_SUBMITTED>\
         </CONTROL_STATE>\
         <SEMANTIC_MEMORY>\
         <STRENGTHS>{strengths}</STRENGTHS>\
         <WEAKNESSES>{weaknesses}</WEAKNESSES>\
         <ISSUES>{issues}</ISSUES>\
         </SEMANTIC_MEMORY>\
         <EPISODIC_MEMORY>{episodic}</EPISODIC_MEMORY>\
         <LAST_USER>{last_user}</LAST_USER>\
         <LAST_MODEL>{last_model}</LAST_MODEL>\
         Не повторяй уже сказанное; продолжай диалог логично и не начинай новую задачу без явного перехода.",
        intro_done = control.intro_done,
        current_task = control.current_task_id,
        awaiting_next = control.awaiting_next_click,
        task_status = task_status,
        strengths = strengths.join(", "),
        weaknesses = weaknesses.join(", "),
        issues = issues,
        episodic = episodic,
        last_user = last_user,
        last_model = last_model,
    )
}

fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}
