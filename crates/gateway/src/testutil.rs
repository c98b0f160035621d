//! Shared fixtures for gateway handler tests: an in-memory store seeded
//! with one role and scenario, and a scripted model backend.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use intervet_config::{SandboxConfig, WebSearchConfig};
use intervet_core::{
    ChatBackend, ChatChunk, ChatMessage, ChatResponse, GatewayError, Role, Scenario, ToolDefinition,
};
use intervet_engine::TurnRunner;
use intervet_sandbox::SandboxClient;
use intervet_store::SqliteStore;
use intervet_tools::{Dispatcher, WebSearchClient};

use crate::{AppState, SharedState};

/// A backend that replays scripted completions in order.
pub(crate) struct ScriptedBackend {
    completions: Mutex<VecDeque<ChatResponse>>,
    fragments: Vec<String>,
}

impl ScriptedBackend {
    pub(crate) fn new(completions: Vec<ChatResponse>) -> Self {
        Self {
            completions: Mutex::new(completions.into()),
            fragments: Vec::new(),
        }
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn complete(
        &self,
        _messages: &[ChatMessage],
        _tools: &[ToolDefinition],
    ) -> Result<ChatResponse, GatewayError> {
        self.completions
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| GatewayError::MalformedResponse("no scripted response".into()))
    }

    async fn stream(
        &self,
        _messages: &[ChatMessage],
        _tools: &[ToolDefinition],
    ) -> Result<mpsc::Receiver<Result<ChatChunk, GatewayError>>, GatewayError> {
        let (tx, rx) = mpsc::channel(16);
        let fragments = self.fragments.clone();
        tokio::spawn(async move {
            for fragment in fragments {
                let _ = tx
                    .send(Ok(ChatChunk {
                        content: Some(fragment),
                        done: false,
                    }))
                    .await;
            }
            let _ = tx
                .send(Ok(ChatChunk {
                    content: None,
                    done: true,
                }))
                .await;
        });
        Ok(rx)
    }
}

/// In-memory state seeded with one role and a two-task scenario
/// (`T1` theory, max 5; `SQL1` sql, max 8). Sandbox endpoints point at a
/// closed port so submissions exercise the degradation path.
pub(crate) async fn seeded_state(backend: ScriptedBackend) -> (SharedState, i64, i64) {
    let store = SqliteStore::new("sqlite::memory:").await.unwrap();
    let role = store
        .create_role(Role {
            id: 0,
            name: "Data Scientist".into(),
            slug: "ds".into(),
            description: None,
        })
        .await
        .unwrap();
    let tasks = Scenario::parse_tasks(&serde_json::json!([
        { "id": "T1", "type": "theory", "title": "Регуляризация", "max_points": 5,
          "related_topics": ["regularization"] },
        { "id": "SQL1", "type": "sql", "title": "Агрегация", "max_points": 8,
          "sql_scenario_id": "ecommerce_basic" }
    ]))
    .unwrap();
    let scenario = store
        .create_scenario(Scenario {
            id: 0,
            role_id: role.id,
            name: "Junior DS".into(),
            slug: "junior".into(),
            description: None,
            difficulty: Some("junior".into()),
            tasks,
            rag_corpus_id: None,
            sql_scenario_id: None,
            config: None,
        })
        .await
        .unwrap();

    let web = WebSearchClient::new(&WebSearchConfig::default());
    let dispatcher = Dispatcher::new(store.clone(), web.clone());
    let runner = TurnRunner::new(store.clone(), Arc::new(backend), dispatcher);
    let sandbox = SandboxClient::new(&SandboxConfig {
        code_url: "http://127.0.0.1:1/run_code".into(),
        sql_url: "http://127.0.0.1:1/run_sql".into(),
        timeout_secs: 1,
    });

    let state = Arc::new(AppState {
        store,
        runner,
        sandbox,
        web,
    });
    (state, scenario.id, role.id)
}
