//! Tool dispatch.
//!
//! The model's tool calls are parsed into a closed [`ToolInvocation`] union
//! and executed here. Dispatch never fails the turn: every failure mode
//! (unknown tool, bad arguments, missing corpus, rejected score) comes back
//! as an error payload the model reads as tool output.

use intervet_core::{Scenario, ScoreEntry, Session, ToolCallRequest, ToolError};
use intervet_store::SqliteStore;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::rag::{self, DEFAULT_TOP_K};
use crate::web::WebSearchClient;

/// A parsed, validated-by-shape tool call. Unknown tool names never reach
/// execution.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolInvocation {
    RagSearch {
        query: String,
        top_k: usize,
    },
    WebSearch {
        query: String,
        top_k: usize,
    },
    ScoreTask {
        task_id: String,
        points: f64,
        comment: Option<String>,
    },
}

impl ToolInvocation {
    /// Parse a tool name and raw argument JSON. Missing fields fall back to
    /// defaults (empty query, `top_k` of 3, zero points); malformed JSON is
    /// treated as an empty argument object.
    pub fn parse(name: &str, arguments: &str) -> Result<Self, ToolError> {
        let args: Value = serde_json::from_str(arguments).unwrap_or_else(|_| json!({}));
        let query = || {
            args.get("query")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let top_k = args
            .get("top_k")
            .and_then(Value::as_u64)
            .map(|k| k as usize)
            .unwrap_or(DEFAULT_TOP_K);

        match name {
            "rag_search" => Ok(Self::RagSearch {
                query: query(),
                top_k,
            }),
            "web_search" => Ok(Self::WebSearch {
                query: query(),
                top_k,
            }),
            "score_task" => Ok(Self::ScoreTask {
                task_id: args
                    .get("task_id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                points: args.get("points").and_then(Value::as_f64).unwrap_or(0.0),
                comment: args
                    .get("comment")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            }),
            other => Err(ToolError::Unsupported(other.to_string())),
        }
    }
}

/// Executes tool invocations against the store and the web-search client.
#[derive(Clone)]
pub struct Dispatcher {
    store: SqliteStore,
    web: WebSearchClient,
}

impl Dispatcher {
    pub fn new(store: SqliteStore, web: WebSearchClient) -> Self {
        Self { store, web }
    }

    /// Execute one tool call for the given session. The returned JSON is fed
    /// back to the model verbatim as the tool result.
    pub async fn dispatch(
        &self,
        session: &Session,
        scenario: &Scenario,
        call: &ToolCallRequest,
    ) -> Value {
        let invocation = match ToolInvocation::parse(&call.name, &call.arguments) {
            Ok(inv) => inv,
            Err(ToolError::Unsupported(name)) => {
                warn!(tool = %name, "model requested unsupported tool");
                return json!({ "error": format!("Unsupported tool {name}") });
            }
            Err(e) => return json!({ "error": e.to_string() }),
        };
        debug!(session_id = %session.id, ?invocation, "dispatching tool call");

        match invocation {
            ToolInvocation::RagSearch { query, top_k } => {
                self.rag_search(scenario, &query, top_k).await
            }
            ToolInvocation::WebSearch { query, top_k } => {
                let results = self.web.search(&query, top_k).await;
                json!({ "results": results })
            }
            ToolInvocation::ScoreTask {
                task_id,
                points,
                comment,
            } => self.score_task(session, scenario, &task_id, points, comment).await,
        }
    }

    async fn rag_search(&self, scenario: &Scenario, query: &str, top_k: usize) -> Value {
        let Some(corpus_id) = scenario.rag_corpus_id else {
            return json!({
                "error": "No RAG corpus configured for this scenario. Use web_search instead."
            });
        };
        let docs = match self.store.list_documents(corpus_id).await {
            Ok(docs) => docs,
            Err(e) => return json!({ "error": e.to_string() }),
        };
        if docs.is_empty() {
            return json!({ "error": "No RAG documents available. Use web_search instead." });
        }
        let results = rag::search_documents(&docs, query, top_k);
        json!({ "results": results })
    }

    /// Validate and persist a score. Out-of-range points and unknown task ids
    /// are rejected without touching the ledger.
    async fn score_task(
        &self,
        session: &Session,
        scenario: &Scenario,
        task_id: &str,
        points: f64,
        comment: Option<String>,
    ) -> Value {
        let Some(task) = scenario.task(task_id) else {
            return json!({ "error": format!("Task {task_id} not found in scenario") });
        };
        let max_points = task.max_points();
        if points < 0.0 || points > max_points {
            return json!({ "error": format!("Points should be within [0, {max_points}]") });
        }
        let entry = ScoreEntry::new(&session.id, task_id, points, comment.clone());
        if let Err(e) = self.store.record_score(entry).await {
            return json!({ "error": e.to_string() });
        }
        json!({ "ok": true, "task_id": task_id, "points": points, "comment": comment })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use intervet_config::WebSearchConfig;
    use intervet_core::Role;

    fn call(name: &str, arguments: &str) -> ToolCallRequest {
        ToolCallRequest {
            id: "call_1".into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    async fn fixture() -> (Dispatcher, Session, Scenario) {
        let store = SqliteStore::new("sqlite::memory:").await.unwrap();
        let role = store
            .create_role(Role {
                id: 0,
                name: "DS".into(),
                slug: "ds".into(),
                description: None,
            })
            .await
            .unwrap();

        let corpus = store
            .create_corpus(intervet_core::RagCorpus {
                id: 0,
                name: "ml".into(),
                description: None,
            })
            .await
            .unwrap();
        store
            .add_document(intervet_core::Document {
                id: 0,
                rag_corpus_id: corpus.id,
                filename: "reg.md".into(),
                content: "Регуляризация ограничивает веса модели".into(),
                metadata: None,
            })
            .await
            .unwrap();

        let tasks = Scenario::parse_tasks(&serde_json::json!([
            { "id": "T1", "type": "theory", "title": "Регуляризация", "max_points": 5 }
        ]))
        .unwrap();
        let scenario = store
            .create_scenario(Scenario {
                id: 0,
                role_id: role.id,
                name: "Junior".into(),
                slug: "junior".into(),
                description: None,
                difficulty: None,
                tasks,
                rag_corpus_id: Some(corpus.id),
                sql_scenario_id: None,
                config: None,
            })
            .await
            .unwrap();

        let session = Session::new(scenario.id, role.id, None);
        store.insert_session(&session).await.unwrap();

        let web = WebSearchClient::new(&WebSearchConfig::default());
        (Dispatcher::new(store, web), session, scenario)
    }

    #[test]
    fn parse_rag_search_defaults() {
        let inv = ToolInvocation::parse("rag_search", "{}").unwrap();
        assert_eq!(
            inv,
            ToolInvocation::RagSearch {
                query: String::new(),
                top_k: 3
            }
        );
    }

    #[test]
    fn parse_malformed_arguments_as_empty() {
        let inv = ToolInvocation::parse("web_search", "not json at all").unwrap();
        assert_eq!(
            inv,
            ToolInvocation::WebSearch {
                query: String::new(),
                top_k: 3
            }
        );
    }

    #[test]
    fn parse_score_task_arguments() {
        let inv = ToolInvocation::parse(
            "score_task",
            r#"{"task_id": "T1", "points": 4.5, "comment": "хорошо"}"#,
        )
        .unwrap();
        assert_eq!(
            inv,
            ToolInvocation::ScoreTask {
                task_id: "T1".into(),
                points: 4.5,
                comment: Some("хорошо".into())
            }
        );
    }

    #[test]
    fn parse_unknown_tool_rejected() {
        let err = ToolInvocation::parse("run_shell", "{}").unwrap_err();
        assert!(matches!(err, ToolError::Unsupported(_)));
    }

    #[tokio::test]
    async fn unsupported_tool_returns_error_payload() {
        let (dispatcher, session, scenario) = fixture().await;
        let result = dispatcher
            .dispatch(&session, &scenario, &call("run_shell", "{}"))
            .await;
        assert_eq!(result["error"], "Unsupported tool run_shell");
    }

    #[tokio::test]
    async fn rag_search_returns_hits() {
        let (dispatcher, session, scenario) = fixture().await;
        let result = dispatcher
            .dispatch(
                &session,
                &scenario,
                &call("rag_search", r#"{"query": "регуляризация"}"#),
            )
            .await;
        let results = result["results"].as_array().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["filename"], "reg.md");
    }

    #[tokio::test]
    async fn rag_search_without_corpus_suggests_web_search() {
        let (dispatcher, session, mut scenario) = fixture().await;
        scenario.rag_corpus_id = None;
        let result = dispatcher
            .dispatch(&session, &scenario, &call("rag_search", r#"{"query": "x"}"#))
            .await;
        assert_eq!(
            result["error"],
            "No RAG corpus configured for this scenario. Use web_search instead."
        );
    }

    #[tokio::test]
    async fn score_task_persists_points() {
        let (dispatcher, session, scenario) = fixture().await;
        let result = dispatcher
            .dispatch(
                &session,
                &scenario,
                &call(
                    "score_task",
                    r#"{"task_id": "T1", "points": 4, "comment": "верно"}"#,
                ),
            )
            .await;
        assert_eq!(result["ok"], true);
        assert_eq!(result["points"], 4.0);
    }

    #[tokio::test]
    async fn score_above_max_rejected() {
        let (dispatcher, session, scenario) = fixture().await;
        let result = dispatcher
            .dispatch(
                &session,
                &scenario,
                &call("score_task", r#"{"task_id": "T1", "points": 6}"#),
            )
            .await;
        assert_eq!(result["error"], "Points should be within [0, 5]");
    }

    #[tokio::test]
    async fn negative_score_rejected() {
        let (dispatcher, session, scenario) = fixture().await;
        let result = dispatcher
            .dispatch(
                &session,
                &scenario,
                &call("score_task", r#"{"task_id": "T1", "points": -1}"#),
            )
            .await;
        assert_eq!(result["error"], "Points should be within [0, 5]");
    }

    #[tokio::test]
    async fn score_for_unknown_task_rejected() {
        let (dispatcher, session, scenario) = fixture().await;
        let result = dispatcher
            .dispatch(
                &session,
                &scenario,
                &call("score_task", r#"{"task_id": "T9", "points": 1}"#),
            )
            .await;
        assert_eq!(result["error"], "Task T9 not found in scenario");
    }
}
