//! Stream assembly: client events, reasoning-delimiter filtering, and text
//! post-processing.
//!
//! Model output may interleave a `<think>...</think>` deliberation block
//! with the narrative. The block must never reach the client, and delimiter
//! text can arrive split across arbitrary fragment boundaries, so filtering
//! is a small buffering state machine rather than string surgery on the
//! finished text.

use serde::{Deserialize, Serialize};
use serde_json::Value;

const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";

/// Chunk size for re-emitting a blocking reply as token events.
pub const TOKEN_CHUNK_CHARS: usize = 120;

/// Leading phrases that mark a repeated introduction.
const INTRO_PATTERNS: &[&str] = &[
    "привет",
    "добрый день",
    "здравствуйте",
    "я проведу собеседование",
    "формат состоит",
    "сегодня мы пройдём",
    "мы проведём",
    "давайте приступим",
    "начнём с теории",
];

/// One event on the client-facing turn stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TurnEvent {
    /// An incremental piece of the reply
    Token { content: String },
    /// The full final text; terminal
    Done { content: String },
    /// A failure detail; may be followed by a terminal `Done` with fallback
    Error { detail: String },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum FilterState {
    Emitting,
    Hidden,
}

/// Strips `<think>` blocks from a fragment stream.
///
/// Fragments are accumulated in a small buffer; text is released only once
/// it can no longer be the start of a delimiter, so a delimiter split across
/// fragments (`"<th"` + `"ink>"`) is still caught.
#[derive(Debug)]
pub struct ThinkFilter {
    state: FilterState,
    buffer: String,
}

impl Default for ThinkFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl ThinkFilter {
    pub fn new() -> Self {
        Self {
            state: FilterState::Emitting,
            buffer: String::new(),
        }
    }

    /// Feed one fragment; returns the text safe to emit now.
    pub fn push(&mut self, fragment: &str) -> String {
        self.buffer.push_str(fragment);
        let mut out = String::new();
        loop {
            match self.state {
                FilterState::Emitting => {
                    if let Some(idx) = self.buffer.find(THINK_OPEN) {
                        out.push_str(&self.buffer[..idx]);
                        self.buffer.drain(..idx + THINK_OPEN.len());
                        self.state = FilterState::Hidden;
                    } else {
                        let hold = partial_suffix_len(&self.buffer, THINK_OPEN);
                        let release = self.buffer.len() - hold;
                        out.push_str(&self.buffer[..release]);
                        self.buffer.drain(..release);
                        return out;
                    }
                }
                FilterState::Hidden => {
                    if let Some(idx) = self.buffer.find(THINK_CLOSE) {
                        self.buffer.drain(..idx + THINK_CLOSE.len());
                        self.state = FilterState::Emitting;
                    } else {
                        let hold = partial_suffix_len(&self.buffer, THINK_CLOSE);
                        let discard = self.buffer.len() - hold;
                        self.buffer.drain(..discard);
                        return out;
                    }
                }
            }
        }
    }

    /// Flush any held-back text at stream end. An unterminated hidden block
    /// is discarded.
    pub fn finish(&mut self) -> String {
        if self.state == FilterState::Emitting {
            std::mem::take(&mut self.buffer)
        } else {
            self.buffer.clear();
            String::new()
        }
    }
}

/// Longest suffix of `buffer` that is a proper prefix of `delimiter`, in
/// bytes. The delimiter is ASCII, so the returned length is always a char
/// boundary in `buffer`.
fn partial_suffix_len(buffer: &str, delimiter: &str) -> usize {
    let max = delimiter.len().saturating_sub(1).min(buffer.len());
    (1..=max)
        .rev()
        .find(|&n| buffer.ends_with(&delimiter[..n]))
        .unwrap_or(0)
}

/// Remove a leading think block from a complete (non-streamed) reply.
pub fn strip_think(content: &str) -> String {
    if let Some((_, after)) = content.split_once(THINK_CLOSE) {
        after.trim().to_string()
    } else {
        content.replace(THINK_OPEN, "").trim().to_string()
    }
}

/// Cut a repeated greeting once the introduction has already been delivered:
/// when the text opens with a known greeting phrase, its first line goes.
pub fn strip_intro(text: &str, intro_done: bool) -> String {
    if !intro_done || text.is_empty() {
        return text.to_string();
    }
    let lowered = text.to_lowercase();
    if INTRO_PATTERNS.iter().any(|p| lowered.starts_with(p)) {
        match text.split_once('\n') {
            Some((_, rest)) => rest.to_string(),
            None => String::new(),
        }
    } else {
        text.to_string()
    }
}

/// Split a reply into fixed-size pieces for token events.
pub fn chunk_text(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(size)
        .map(|piece| piece.iter().collect())
        .collect()
}

/// Deterministic feedback sentence for a turn where the model scored a task
/// but produced no narrative.
pub fn score_feedback(result: &Value) -> String {
    let task_id = result
        .get("task_id")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let comment = result
        .get("comment")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let points_text = match result.get("points").and_then(Value::as_f64) {
        Some(points) => format!("{points} балл(ов)"),
        None => "оценка выставлена".to_string(),
    };
    format!(
        "Оценка сохранена: {points_text} за {task_id}. Комментарий: {comment}. \
         Нажмите «Следующее», чтобы перейти далее."
    )
}
