//! The session state machine: one sequential pipeline per turn.
//!
//! A turn runs guard, snapshot, first model call, sequential tool dispatch,
//! then either a second blocking call (tool flow) or the incremental stream
//! (direct flow), and finally persistence. Turns and score/advance/complete
//! mutations against the same session are serialized through a per-session
//! async lock; different sessions run concurrently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use chrono::Utc;
use intervet_core::{
    interview_tool_definitions, ChatBackend, ChatMessage, Error, Message, Result, Scenario,
    ScoreEntry, Sender, Session, SessionState, ToolCallRequest,
};
use intervet_store::SqliteStore;
use intervet_tools::{Dispatcher, ToolInvocation};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::stream::{self, ThinkFilter, TurnEvent, TOKEN_CHUNK_CHARS};
use crate::{guard, prompt, snapshot};

/// Orchestrates interview turns for all sessions.
pub struct TurnRunner {
    store: SqliteStore,
    backend: Arc<dyn ChatBackend>,
    dispatcher: Dispatcher,
    locks: StdMutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

/// Everything a turn needs once the session is loaded.
struct TurnContext {
    session: Session,
    scenario: Scenario,
    history: Vec<Message>,
    intro_done: bool,
    messages: Vec<ChatMessage>,
}

/// Accumulated results of dispatching one batch of tool calls.
#[derive(Default)]
struct ToolOutcome {
    /// Unpersisted transcript messages, one per dispatched call
    transcript: Vec<Message>,
    /// Tool-role messages appended to the wire conversation
    wire: Vec<ChatMessage>,
    /// Status lines already persisted, to be replayed as token events
    status_texts: Vec<String>,
    /// The last score_task result, for synthesized feedback
    score_result: Option<Value>,
}

impl TurnRunner {
    pub fn new(store: SqliteStore, backend: Arc<dyn ChatBackend>, dispatcher: Dispatcher) -> Self {
        Self {
            store,
            backend,
            dispatcher,
            locks: StdMutex::new(HashMap::new()),
        }
    }

    fn session_lock(&self, session_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Load the session and build the model payload: policy, snapshot, then
    /// the transcript mapped onto wire roles.
    async fn prepare(&self, session_id: &str) -> Result<TurnContext> {
        let session = self.store.get_session(session_id).await?;
        if !session.is_active() {
            return Err(Error::validation("Session is already completed"));
        }
        let scenario = self.store.get_scenario(session.scenario_id).await?;
        let role = self.store.get_role(session.role_id).await?;
        let history = self.store.list_messages(session_id).await?;
        let rag_available = match scenario.rag_corpus_id {
            Some(corpus_id) => !self.store.list_documents(corpus_id).await?.is_empty(),
            None => false,
        };

        let intro_done = history.iter().any(|m| m.sender == Sender::Model);
        let mut messages = vec![
            ChatMessage::system(prompt::build_system_prompt(&role, &scenario, rag_available)),
            ChatMessage::system(snapshot::conversation_snapshot(&session, &scenario, &history)),
        ];
        messages.extend(history.iter().map(|m| match m.sender {
            Sender::Candidate => ChatMessage::user(&m.text),
            Sender::Model => ChatMessage::assistant(&m.text),
            _ => ChatMessage::system(&m.text),
        }));

        Ok(TurnContext {
            session,
            scenario,
            history,
            intro_done,
            messages,
        })
    }

    /// Dispatch the model's tool calls one at a time, in request order.
    /// `announce_web_search` persists and queues a status line before each
    /// web lookup so the streaming client sees progress.
    async fn run_tools(
        &self,
        session: &Session,
        scenario: &Scenario,
        calls: &[ToolCallRequest],
        announce_web_search: bool,
    ) -> Result<ToolOutcome> {
        let mut outcome = ToolOutcome::default();
        for call in calls {
            let invocation = ToolInvocation::parse(&call.name, &call.arguments).ok();

            if announce_web_search {
                if let Some(ToolInvocation::WebSearch { query, .. }) = &invocation {
                    let status = format!("Ищем в интернете: {query}");
                    self.store
                        .append_message(Message::system(&session.id, &status))
                        .await?;
                    outcome.status_texts.push(status);
                }
            }

            let result = self.dispatcher.dispatch(session, scenario, call).await;
            if call.name == "score_task" {
                outcome.score_result = Some(result.clone());
            }

            let mut transcript = Message::tool(
                &session.id,
                format!("{}({}) -> {}", call.name, call.arguments, result),
            );
            if let Some(ToolInvocation::ScoreTask { task_id, .. }) = &invocation {
                transcript = transcript.with_task(task_id.clone());
            }
            outcome.transcript.push(transcript);

            outcome.wire.push(ChatMessage::tool_result(
                &call.id,
                serde_json::to_string(&result)?,
            ));
        }
        Ok(outcome)
    }

    /// Non-streaming turn: returns the final reply text.
    pub async fn run_chat(&self, session_id: &str) -> Result<String> {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;

        let ctx = self.prepare(session_id).await?;
        let tools = interview_tool_definitions();
        let first = self.backend.complete(&ctx.messages, &tools).await?;

        let mut outcome = ToolOutcome::default();
        let final_text = if first.has_tool_calls() {
            let mut messages = ctx.messages.clone();
            messages.push(
                ChatMessage::assistant(&first.content).with_tool_calls(first.tool_calls.clone()),
            );
            outcome = self
                .run_tools(&ctx.session, &ctx.scenario, &first.tool_calls, false)
                .await?;
            messages.extend(outcome.wire.iter().cloned());

            let second = self.backend.complete(&messages, &[]).await?;
            let mut text = stream::strip_think(&second.content);
            if text.is_empty() {
                if let Some(score) = &outcome.score_result {
                    text = stream::score_feedback(score);
                }
            }
            text
        } else {
            stream::strip_think(&first.content)
        };

        for message in outcome.transcript {
            self.store.append_message(message).await?;
        }
        let persisted = stream::strip_intro(&final_text, ctx.intro_done);
        self.store
            .append_message(Message::model(session_id, &persisted))
            .await?;
        info!(%session_id, "chat turn finished");
        Ok(final_text)
    }

    /// Streaming turn: returns the client event stream.
    ///
    /// The guard runs first; a flagged candidate message short-circuits the
    /// turn with a warning and never reaches the model. Otherwise the first
    /// model call and tool dispatch happen before this method returns, and
    /// the narrative phase runs in a background task holding the session
    /// lock until the stream finishes.
    pub async fn run_stream(&self, session_id: &str) -> Result<mpsc::Receiver<TurnEvent>> {
        let lock = self.session_lock(session_id);
        let turn_guard = lock.lock_owned().await;

        let ctx = self.prepare(session_id).await?;

        if let Some(last) = ctx.history.last() {
            if last.sender == Sender::Candidate {
                let flags = guard::analyze(&last.text);
                if !flags.is_empty() {
                    debug!(%session_id, ?flags, "candidate message rejected by guard");
                    let warning = guard::warning(&flags);
                    self.store
                        .append_message(Message::system(session_id, warning))
                        .await?;
                    let (tx, rx) = mpsc::channel(4);
                    let _ = tx
                        .send(TurnEvent::Token {
                            content: warning.to_string(),
                        })
                        .await;
                    let _ = tx
                        .send(TurnEvent::Done {
                            content: warning.to_string(),
                        })
                        .await;
                    return Ok(rx);
                }
            }
        }

        let tools = interview_tool_definitions();
        let first = self.backend.complete(&ctx.messages, &tools).await?;

        let mut stream_messages = ctx.messages;
        let mut outcome = ToolOutcome::default();
        let had_tool_calls = first.has_tool_calls();
        if had_tool_calls {
            stream_messages.push(
                ChatMessage::assistant(&first.content).with_tool_calls(first.tool_calls.clone()),
            );
            outcome = self
                .run_tools(&ctx.session, &ctx.scenario, &first.tool_calls, true)
                .await?;
            stream_messages.extend(outcome.wire.iter().cloned());
        }

        let mut fallback_text = stream::strip_think(&first.content);
        if fallback_text.is_empty() {
            if let Some(score) = &outcome.score_result {
                fallback_text = stream::score_feedback(score);
            }
        }

        let (tx, rx) = mpsc::channel(64);
        let store = self.store.clone();
        let backend = Arc::clone(&self.backend);
        let session_id = session_id.to_string();
        let intro_done = ctx.intro_done;
        let score_result = outcome.score_result;
        let transcript = outcome.transcript;
        let status_texts = outcome.status_texts;

        tokio::spawn(async move {
            // Serialize the whole turn, including the narrative phase
            let _turn_guard = turn_guard;

            for status in &status_texts {
                let _ = tx
                    .send(TurnEvent::Token {
                        content: status.clone(),
                    })
                    .await;
            }

            let mut final_text = String::new();
            let mut failure: Option<String> = None;

            if had_tool_calls {
                // Tool flow: one more blocking call for the narrative, then
                // re-emit it in fixed-size pieces
                match backend.complete(&stream_messages, &[]).await {
                    Ok(second) => final_text = stream::strip_think(&second.content),
                    Err(e) => {
                        warn!(%session_id, "narrative call failed, using fallback: {e}");
                        final_text = fallback_text.clone();
                    }
                }
                if let Some(score) = &score_result {
                    if final_text.trim().is_empty() || final_text.trim() == fallback_text.trim() {
                        final_text = stream::score_feedback(score);
                    }
                }
                for piece in stream::chunk_text(&final_text, TOKEN_CHUNK_CHARS) {
                    let _ = tx.send(TurnEvent::Token { content: piece }).await;
                }
            } else {
                // Direct flow: forward the incremental stream through the
                // reasoning filter
                match backend.stream(&stream_messages, &tools).await {
                    Ok(mut chunks) => {
                        let mut filter = ThinkFilter::new();
                        while let Some(item) = chunks.recv().await {
                            match item {
                                Ok(chunk) => {
                                    if let Some(content) = chunk.content {
                                        let visible = filter.push(&content);
                                        if !visible.is_empty() {
                                            final_text.push_str(&visible);
                                            let _ = tx
                                                .send(TurnEvent::Token { content: visible })
                                                .await;
                                        }
                                    }
                                    if chunk.done {
                                        break;
                                    }
                                }
                                Err(e) => {
                                    failure = Some(e.to_string());
                                    break;
                                }
                            }
                        }
                        let tail = filter.finish();
                        if !tail.is_empty() {
                            final_text.push_str(&tail);
                            let _ = tx.send(TurnEvent::Token { content: tail }).await;
                        }
                    }
                    Err(e) => failure = Some(e.to_string()),
                }

                if failure.is_none() && final_text.trim().is_empty() {
                    // Silent stream: fall back to a blocking call and emit
                    // its reply as a single piece
                    final_text = match backend.complete(&stream_messages, &[]).await {
                        Ok(resp) => stream::strip_think(&resp.content),
                        Err(e) => {
                            warn!(%session_id, "silent-stream fallback call failed: {e}");
                            fallback_text.clone()
                        }
                    };
                    if !final_text.is_empty() {
                        let _ = tx
                            .send(TurnEvent::Token {
                                content: final_text.clone(),
                            })
                            .await;
                    }
                }
            }

            for message in transcript {
                if let Err(e) = store.append_message(message).await {
                    error!(%session_id, "failed to persist tool transcript: {e}");
                }
            }

            if let Some(detail) = failure {
                error!(%session_id, "turn stream failed: {detail}");
                let note = Message::system(&session_id, format!("Ошибка сервиса LM: {detail}"));
                if let Err(e) = store.append_message(note).await {
                    error!(%session_id, "failed to persist failure marker: {e}");
                }
                // Keep whatever was already produced
                if !final_text.is_empty() {
                    let trimmed = stream::strip_intro(&final_text, intro_done);
                    let _ = store
                        .append_message(Message::model(&session_id, &trimmed))
                        .await;
                }
                let _ = tx.send(TurnEvent::Error { detail }).await;
                if !fallback_text.is_empty() {
                    let _ = tx
                        .send(TurnEvent::Done {
                            content: fallback_text,
                        })
                        .await;
                }
                return;
            }

            let reply = if final_text.is_empty() {
                fallback_text
            } else {
                final_text
            };
            if !reply.is_empty() {
                let trimmed = stream::strip_intro(&reply, intro_done);
                if let Err(e) = store
                    .append_message(Message::model(&session_id, &trimmed))
                    .await
                {
                    error!(%session_id, "failed to persist model reply: {e}");
                }
            }
            let _ = tx.send(TurnEvent::Done { content: reply }).await;
            info!(%session_id, "stream turn finished");
        });

        Ok(rx)
    }

    /// Validate and record a direct score submission. Same invariants as the
    /// tool path.
    pub async fn record_score(
        &self,
        session_id: &str,
        task_id: &str,
        points: f64,
        comment: Option<String>,
    ) -> Result<ScoreEntry> {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;

        let session = self.store.get_session(session_id).await?;
        if !session.is_active() {
            return Err(Error::validation("Session is already completed"));
        }
        let scenario = self.store.get_scenario(session.scenario_id).await?;
        let Some(task) = scenario.task(task_id) else {
            return Err(Error::validation("Task not found in scenario"));
        };
        let max_points = task.max_points();
        if points < 0.0 || points > max_points {
            return Err(Error::validation(format!(
                "Points should be within [0, {max_points}]"
            )));
        }
        self.store
            .record_score(ScoreEntry::new(session_id, task_id, points, comment))
            .await
    }

    /// Move the task cursor to the next unscored task in scenario order.
    /// Scored tasks are never revisited; when no unscored task remains the
    /// advance is rejected.
    pub async fn advance(&self, session_id: &str) -> Result<Session> {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;

        let mut session = self.store.get_session(session_id).await?;
        if !session.is_active() {
            return Err(Error::validation("Session is already completed"));
        }
        let scenario = self.store.get_scenario(session.scenario_id).await?;
        let start = session
            .current_task_id
            .as_deref()
            .and_then(|current| scenario.tasks.iter().position(|t| t.id() == current))
            .map(|idx| idx + 1)
            .unwrap_or(0);
        let next = scenario.tasks[start.min(scenario.tasks.len())..]
            .iter()
            .find(|t| !session.scores.contains_key(t.id()));
        match next {
            Some(task) => {
                session.current_task_id = Some(task.id().to_string());
                self.store.update_session(&session).await?;
                Ok(session)
            }
            None => Err(Error::validation("No unscored tasks remain")),
        }
    }

    /// The only lifecycle transition: active to completed, once.
    pub async fn complete(&self, session_id: &str) -> Result<Session> {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;

        let mut session = self.store.get_session(session_id).await?;
        if !session.is_active() {
            return Err(Error::validation("Session is already completed"));
        }
        session.state = SessionState::Completed;
        session.finished_at = Some(Utc::now());
        self.store.update_session(&session).await?;
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use intervet_config::WebSearchConfig;
    use intervet_core::{ChatChunk, ChatResponse, GatewayError, Role, ToolDefinition};
    use intervet_tools::WebSearchClient;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockBackend {
        completions: StdMutex<VecDeque<ChatResponse>>,
        stream_fragments: Vec<String>,
        fail_stream: bool,
        complete_calls: AtomicUsize,
    }

    impl MockBackend {
        fn new(completions: Vec<ChatResponse>) -> Self {
            Self {
                completions: StdMutex::new(completions.into()),
                stream_fragments: Vec::new(),
                fail_stream: false,
                complete_calls: AtomicUsize::new(0),
            }
        }

        fn with_stream(mut self, fragments: &[&str]) -> Self {
            self.stream_fragments = fragments.iter().map(|s| s.to_string()).collect();
            self
        }

        fn failing_stream(mut self) -> Self {
            self.fail_stream = true;
            self
        }
    }

    #[async_trait]
    impl ChatBackend for MockBackend {
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _tools: &[ToolDefinition],
        ) -> std::result::Result<ChatResponse, GatewayError> {
            self.complete_calls.fetch_add(1, Ordering::SeqCst);
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
        ) -> std::result::Result<
            mpsc::Receiver<std::result::Result<ChatChunk, GatewayError>>,
            GatewayError,
        > {
            if self.fail_stream {
                return Err(GatewayError::Network("connection refused".into()));
            }
            let (tx, rx) = mpsc::channel(16);
            let fragments = self.stream_fragments.clone();
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

    fn reply(content: &str) -> ChatResponse {
        ChatResponse {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    fn tool_call_reply(name: &str, arguments: &str) -> ChatResponse {
        ChatResponse {
            content: String::new(),
            tool_calls: vec![ToolCallRequest {
                id: "call_1".into(),
                name: name.into(),
                arguments: arguments.into(),
            }],
        }
    }

    async fn fixture(backend: MockBackend) -> (TurnRunner, SqliteStore, String, Arc<MockBackend>) {
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
                name: "Junior".into(),
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
        let session = Session::new(scenario.id, role.id, None);
        store.insert_session(&session).await.unwrap();

        let dispatcher = Dispatcher::new(
            store.clone(),
            WebSearchClient::new(&WebSearchConfig::default()),
        );
        let backend = Arc::new(backend);
        let runner = TurnRunner::new(store.clone(), backend.clone(), dispatcher);
        (runner, store, session.id, backend)
    }

    async fn collect(mut rx: mpsc::Receiver<TurnEvent>) -> Vec<TurnEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn guard_short_circuits_before_model() {
        let backend = MockBackend::new(vec![]);
        let (runner, store, session_id, mock) = fixture(backend).await;
        store
            .append_message(Message::candidate(&session_id, "SELECT * FROM x"))
            .await
            .unwrap();

        let events = collect(runner.run_stream(&session_id).await.unwrap()).await;
        let warning = "Не вставляйте код/SQL в чат. Введите решение в редактор ниже и нажмите Submit.";
        assert_eq!(
            events,
            vec![
                TurnEvent::Token {
                    content: warning.into()
                },
                TurnEvent::Done {
                    content: warning.into()
                },
            ]
        );
        // The model was never called
        assert_eq!(mock.complete_calls.load(Ordering::SeqCst), 0);

        let messages = store.list_messages(&session_id).await.unwrap();
        assert_eq!(messages.last().unwrap().sender, Sender::System);
        assert_eq!(messages.last().unwrap().text, warning);
    }

    #[tokio::test]
    async fn direct_stream_filters_reasoning() {
        let backend = MockBackend::new(vec![reply("")]).with_stream(&[
            "<think>",
            "кандидат путает L1 и L2",
            "</think>",
            "Уточните, чем L1 отличается от L2?",
        ]);
        let (runner, store, session_id, _mock) = fixture(backend).await;
        store
            .append_message(Message::candidate(
                &session_id,
                "Регуляризация уменьшает веса, насколько я понимаю, в обоих случаях",
            ))
            .await
            .unwrap();

        let events = collect(runner.run_stream(&session_id).await.unwrap()).await;
        let tokens: String = events
            .iter()
            .filter_map(|e| match e {
                TurnEvent::Token { content } => Some(content.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(tokens, "Уточните, чем L1 отличается от L2?");
        assert!(!tokens.contains("путает"));
        assert!(matches!(events.last(), Some(TurnEvent::Done { content }) if content == &tokens));

        let messages = store.list_messages(&session_id).await.unwrap();
        let model_msg = messages.iter().rev().find(|m| m.sender == Sender::Model).unwrap();
        assert_eq!(model_msg.text, "Уточните, чем L1 отличается от L2?");
    }

    #[tokio::test]
    async fn tool_flow_scores_and_streams_narrative() {
        let backend = MockBackend::new(vec![
            tool_call_reply("score_task", r#"{"task_id":"T1","points":4,"comment":"хорошо"}"#),
            reply("Засчитано 4 балла. Углубляющий вопрос: что такое elastic net?"),
        ]);
        let (runner, store, session_id, _mock) = fixture(backend).await;

        let events = collect(runner.run_stream(&session_id).await.unwrap()).await;
        assert!(matches!(
            events.last(),
            Some(TurnEvent::Done { content }) if content.contains("elastic net")
        ));

        let session = store.get_session(&session_id).await.unwrap();
        assert_eq!(session.scores.get("T1"), Some(&4.0));

        let messages = store.list_messages(&session_id).await.unwrap();
        let tool_msg = messages.iter().find(|m| m.sender == Sender::Tool).unwrap();
        assert!(tool_msg.text.starts_with("score_task("));
        assert!(tool_msg.text.contains(r#""ok":true"#));
        assert_eq!(tool_msg.task_id.as_deref(), Some("T1"));
    }

    #[tokio::test]
    async fn out_of_range_tool_score_rejected_but_turn_continues() {
        let backend = MockBackend::new(vec![
            tool_call_reply("score_task", r#"{"task_id":"T1","points":6}"#),
            reply("Попробую оценить снова."),
        ]);
        let (runner, store, session_id, _mock) = fixture(backend).await;

        let events = collect(runner.run_stream(&session_id).await.unwrap()).await;
        assert!(matches!(events.last(), Some(TurnEvent::Done { .. })));

        // Ledger untouched, error fed back through the transcript
        assert!(store.list_scores(&session_id).await.unwrap().is_empty());
        let messages = store.list_messages(&session_id).await.unwrap();
        let tool_msg = messages.iter().find(|m| m.sender == Sender::Tool).unwrap();
        assert!(tool_msg.text.contains("Points should be within [0, 5]"));
    }

    #[tokio::test]
    async fn silent_score_synthesizes_feedback() {
        let backend = MockBackend::new(vec![
            tool_call_reply("score_task", r#"{"task_id":"T1","points":5,"comment":"отлично"}"#),
            reply(""),
        ]);
        let (runner, _store, session_id, _mock) = fixture(backend).await;

        let events = collect(runner.run_stream(&session_id).await.unwrap()).await;
        let Some(TurnEvent::Done { content }) = events.last() else {
            panic!("expected done event");
        };
        assert!(content.contains("Оценка сохранена"));
        assert!(content.contains("5 балл(ов) за T1"));
    }

    #[tokio::test]
    async fn stream_failure_emits_error_then_fallback_done() {
        let backend = MockBackend::new(vec![reply("Черновой ответ до стрима")]).failing_stream();
        let (runner, store, session_id, _mock) = fixture(backend).await;

        let events = collect(runner.run_stream(&session_id).await.unwrap()).await;
        assert!(matches!(
            &events[0],
            TurnEvent::Error { detail } if detail.contains("connection refused")
        ));
        assert!(matches!(
            events.last(),
            Some(TurnEvent::Done { content }) if content == "Черновой ответ до стрима"
        ));

        let messages = store.list_messages(&session_id).await.unwrap();
        assert!(messages
            .iter()
            .any(|m| m.sender == Sender::System && m.text.starts_with("Ошибка сервиса LM")));
    }

    #[tokio::test]
    async fn run_chat_returns_reply_and_persists() {
        let backend = MockBackend::new(vec![reply("Начнём с первого задания: что такое L2?")]);
        let (runner, store, session_id, _mock) = fixture(backend).await;

        let text = runner.run_chat(&session_id).await.unwrap();
        assert_eq!(text, "Начнём с первого задания: что такое L2?");
        let messages = store.list_messages(&session_id).await.unwrap();
        assert_eq!(messages.last().unwrap().sender, Sender::Model);
    }

    #[tokio::test]
    async fn record_score_direct_path_validates_bounds() {
        let backend = MockBackend::new(vec![]);
        let (runner, store, session_id, _mock) = fixture(backend).await;

        let err = runner
            .record_score(&session_id, "T1", 6.0, None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Points should be within [0, 5]"));
        assert!(store.list_scores(&session_id).await.unwrap().is_empty());

        runner
            .record_score(&session_id, "T1", 4.0, Some("норм".into()))
            .await
            .unwrap();
        let session = store.get_session(&session_id).await.unwrap();
        assert_eq!(session.scores.get("T1"), Some(&4.0));
    }

    #[tokio::test]
    async fn advance_walks_unscored_tasks_in_order() {
        let backend = MockBackend::new(vec![]);
        let (runner, _store, session_id, _mock) = fixture(backend).await;

        let session = runner.advance(&session_id).await.unwrap();
        assert_eq!(session.current_task_id.as_deref(), Some("T1"));

        runner
            .record_score(&session_id, "T1", 5.0, None)
            .await
            .unwrap();
        let session = runner.advance(&session_id).await.unwrap();
        assert_eq!(session.current_task_id.as_deref(), Some("SQL1"));

        runner
            .record_score(&session_id, "SQL1", 8.0, None)
            .await
            .unwrap();
        let err = runner.advance(&session_id).await.unwrap_err();
        assert!(err.to_string().contains("No unscored tasks remain"));
    }

    #[tokio::test]
    async fn advance_never_revisits_scored_task() {
        let backend = MockBackend::new(vec![]);
        let (runner, _store, session_id, _mock) = fixture(backend).await;

        // Score the first task before ever advancing
        runner
            .record_score(&session_id, "T1", 3.0, None)
            .await
            .unwrap();
        let session = runner.advance(&session_id).await.unwrap();
        assert_eq!(session.current_task_id.as_deref(), Some("SQL1"));
    }

    #[tokio::test]
    async fn complete_is_terminal() {
        let backend = MockBackend::new(vec![]);
        let (runner, store, session_id, _mock) = fixture(backend).await;

        let session = runner.complete(&session_id).await.unwrap();
        assert_eq!(session.state, SessionState::Completed);
        assert!(session.finished_at.is_some());

        let err = runner.complete(&session_id).await.unwrap_err();
        assert!(err.to_string().contains("already completed"));

        // Mutations on a completed session are rejected
        assert!(runner.record_score(&session_id, "T1", 1.0, None).await.is_err());
        assert!(runner.run_chat(&session_id).await.is_err());
        let _ = store;
    }
}
