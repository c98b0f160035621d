//! Tool schema exposed to the model.
//!
//! The engine declares exactly three functions — `rag_search`, `web_search`
//! and `score_task` — and dispatches requested calls through a closed
//! tagged-union in `intervet-tools`. This module carries the wire shapes:
//! the JSON-schema definitions sent with every model call and the tool-call
//! requests coming back in assistant messages.

use serde::{Deserialize, Serialize};

/// A tool definition sent to the model so it knows what it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// A tool call requested by the model inside an assistant message.
/// `arguments` is the raw JSON string exactly as the model produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Unique call ID (matches the model's tool_call.id)
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as a JSON string
    pub arguments: String,
}

/// The fixed tool schema declared on every model call: document search,
/// web search, and score submission.
pub fn interview_tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "rag_search".into(),
            description: "Поиск по загруженной документации сценария.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string" },
                    "top_k": { "type": "integer" }
                },
                "required": ["query"]
            }),
        },
        ToolDefinition {
            name: "web_search".into(),
            description: "Поиск в интернете для валидации ответа кандидата.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string" },
                    "top_k": { "type": "integer" }
                },
                "required": ["query"]
            }),
        },
        ToolDefinition {
            name: "score_task".into(),
            description: "Поставить баллы за задание кандидату.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "task_id": { "type": "string" },
                    "points": { "type": "number" },
                    "comment": { "type": "string" }
                },
                "required": ["task_id", "points"]
            }),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_tools_declared() {
        let defs = interview_tool_definitions();
        let names: Vec<&str> = defs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["rag_search", "web_search", "score_task"]);
    }

    #[test]
    fn score_task_requires_task_id_and_points() {
        let defs = interview_tool_definitions();
        let score = defs.iter().find(|d| d.name == "score_task").unwrap();
        let required = score.parameters["required"].as_array().unwrap();
        assert!(required.contains(&serde_json::json!("task_id")));
        assert!(required.contains(&serde_json::json!("points")));
    }

    #[test]
    fn search_tools_require_query() {
        let defs = interview_tool_definitions();
        for name in ["rag_search", "web_search"] {
            let def = defs.iter().find(|d| d.name == name).unwrap();
            assert_eq!(def.parameters["required"], serde_json::json!(["query"]));
        }
    }
}
