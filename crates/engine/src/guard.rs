//! Candidate message guard.
//!
//! A pre-filter, not a scorer: it classifies the incoming candidate text
//! before any model call. Any raised flag short-circuits the turn with a
//! fixed warning so the model never sees placeholder answers or pasted
//! code.

/// Minimum meaningful answer length in characters, unless the text carries
/// recognizable domain tokens.
const SHORT_THRESHOLD: usize = 40;

/// Canned "pretend it is correct" phrases the guard rejects outright.
const PLACEHOLDER_PHRASES: &[&str] = &[
    "(отвечает правильно)",
    "(правильный ответ)",
    "код верный",
    "решение корректное",
    "ответ правильный",
    "(пишет правильный код)",
    "(solution)",
];

const ROLEPLAY_PHRASES: &[&str] = &["представим", "я бот", "как модель", "как ассистент", "роль"];

/// Short answers containing these tokens are still considered substantive.
const DOMAIN_TOKENS: &[&str] = &["регресс", "join", "select"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardFlag {
    Empty,
    Placeholder,
    TooShort,
    Roleplay,
    CodeInChat,
    SqlInChat,
}

/// Classify a candidate message into zero or more policy flags.
pub fn analyze(text: &str) -> Vec<GuardFlag> {
    let mut flags = Vec::new();
    let t = text.trim().to_lowercase();
    if t.is_empty() {
        flags.push(GuardFlag::Empty);
    }
    if PLACEHOLDER_PHRASES.iter().any(|p| t.contains(p)) {
        flags.push(GuardFlag::Placeholder);
    }
    if t.chars().count() < SHORT_THRESHOLD && !DOMAIN_TOKENS.iter().any(|d| t.contains(d)) {
        flags.push(GuardFlag::TooShort);
    }
    if ROLEPLAY_PHRASES.iter().any(|p| t.contains(p)) {
        flags.push(GuardFlag::Roleplay);
    }
    if t.contains("def ") || t.contains("print(") || t.contains("import ") {
        flags.push(GuardFlag::CodeInChat);
    }
    if t.contains("select ") || t.contains("from ") {
        flags.push(GuardFlag::SqlInChat);
    }
    flags
}

/// The fixed warning persisted and returned when the guard trips.
pub fn warning(flags: &[GuardFlag]) -> &'static str {
    if flags.contains(&GuardFlag::CodeInChat) || flags.contains(&GuardFlag::SqlInChat) {
        "Не вставляйте код/SQL в чат. Введите решение в редактор ниже и нажмите Submit."
    } else {
        "Ответ не принят: дайте содержательный ответ по сути вопроса."
    }
}
