//! Session lifecycle, transcript, submissions, and the chat endpoints.
//!
//! Endpoints:
//!
//! - `POST /sessions`                                — create a session
//! - `GET  /sessions/{id}`                           — session state
//! - `GET  /sessions/{id}/messages`                  — transcript
//! - `POST /sessions/{id}/messages`                  — append a message
//! - `POST /sessions/{id}/score`                     — direct score submission
//! - `POST /sessions/{id}/advance`                   — move to the next unscored task
//! - `POST /sessions/{id}/tasks/{task_id}/submit_code` — code sandbox run
//! - `POST /sessions/{id}/tasks/{task_id}/submit_sql`  — SQL sandbox run
//! - `POST /sessions/{id}/complete`                  — terminal transition
//! - `POST /sessions/{id}/web-search`                — direct web search
//! - `POST /sessions/{id}/lm/chat`                   — non-streaming turn
//! - `GET  /sessions/{id}/lm/chat-stream`            — SSE turn stream

use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::info;

use intervet_core::{Error, Message, ScoreEntry, Sender, Session, Task};

use crate::{ApiError, SharedState};

pub(crate) fn router() -> Router<SharedState> {
    Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/{id}", get(get_session))
        .route(
            "/sessions/{id}/messages",
            get(list_messages).post(post_message),
        )
        .route("/sessions/{id}/score", post(score_task))
        .route("/sessions/{id}/advance", post(advance_session))
        .route(
            "/sessions/{id}/tasks/{task_id}/submit_code",
            post(submit_code),
        )
        .route(
            "/sessions/{id}/tasks/{task_id}/submit_sql",
            post(submit_sql),
        )
        .route("/sessions/{id}/complete", post(complete_session))
        .route("/sessions/{id}/web-search", post(web_search))
        .route("/sessions/{id}/lm/chat", post(chat))
        .route("/sessions/{id}/lm/chat-stream", get(chat_stream))
}

// --- Request types ---

#[derive(Deserialize)]
struct CreateSessionRequest {
    scenario_id: i64,
    role_id: i64,
    #[serde(default)]
    candidate_id: Option<String>,
}

#[derive(Deserialize)]
struct PostMessageRequest {
    text: String,
    sender: String,
    #[serde(default)]
    task_id: Option<String>,
}

#[derive(Deserialize)]
struct ScoreRequest {
    task_id: String,
    points: f64,
    #[serde(default)]
    comment: Option<String>,
}

#[derive(Deserialize)]
struct CodeSubmission {
    code: String,
    language: String,
    tests_id: String,
}

#[derive(Deserialize)]
struct SqlSubmission {
    query: String,
    sql_scenario_id: String,
}

#[derive(Deserialize)]
struct WebSearchRequest {
    query: String,
    #[serde(default = "default_top_k")]
    top_k: usize,
}

fn default_top_k() -> usize {
    3
}

// --- Handlers ---

async fn create_session(
    State(state): State<SharedState>,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<Session>), ApiError> {
    let scenario = match state.store.get_scenario(payload.scenario_id).await {
        Ok(s) => s,
        Err(Error::NotFound { .. }) => {
            return Err(Error::validation("Scenario or role not found").into());
        }
        Err(e) => return Err(e.into()),
    };
    let role = match state.store.get_role(payload.role_id).await {
        Ok(r) => r,
        Err(Error::NotFound { .. }) => {
            return Err(Error::validation("Scenario or role not found").into());
        }
        Err(e) => return Err(e.into()),
    };
    if scenario.role_id != role.id {
        return Err(Error::validation("Scenario does not belong to the selected role").into());
    }

    let session = Session::new(payload.scenario_id, payload.role_id, payload.candidate_id);
    state.store.insert_session(&session).await?;
    info!(session_id = %session.id, scenario_id = scenario.id, "session created");
    Ok((StatusCode::CREATED, Json(session)))
}

async fn get_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    Ok(Json(state.store.get_session(&id).await?))
}

async fn list_messages(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Message>>, ApiError> {
    state.store.get_session(&id).await?;
    Ok(Json(state.store.list_messages(&id).await?))
}

async fn post_message(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(payload): Json<PostMessageRequest>,
) -> Result<Json<Message>, ApiError> {
    let session = state.store.get_session(&id).await?;
    if !session.is_active() {
        return Err(Error::validation("Session is already completed").into());
    }
    let sender: Sender = payload.sender.parse().map_err(Error::validation)?;
    let mut message = match sender {
        Sender::Candidate => Message::candidate(&id, &payload.text),
        Sender::Model => Message::model(&id, &payload.text),
        Sender::System => Message::system(&id, &payload.text),
        Sender::Tool => Message::tool(&id, &payload.text),
    };
    if let Some(task_id) = payload.task_id {
        message = message.with_task(task_id);
    }
    Ok(Json(state.store.append_message(message).await?))
}

async fn score_task(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(payload): Json<ScoreRequest>,
) -> Result<Json<ScoreEntry>, ApiError> {
    let entry = state
        .runner
        .record_score(&id, &payload.task_id, payload.points, payload.comment)
        .await?;
    Ok(Json(entry))
}

async fn advance_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    Ok(Json(state.runner.advance(&id).await?))
}

async fn submit_code(
    State(state): State<SharedState>,
    Path((id, task_id)): Path<(String, String)>,
    Json(payload): Json<CodeSubmission>,
) -> Result<Json<Value>, ApiError> {
    let session = state.store.get_session(&id).await?;
    if !session.is_active() {
        return Err(Error::validation("Session is already completed").into());
    }
    let scenario = state.store.get_scenario(session.scenario_id).await?;
    match scenario.task(&task_id) {
        Some(Task::Coding { .. }) => {}
        _ => return Err(Error::validation("Task is not a coding task").into()),
    }

    let result = state
        .sandbox
        .run_code(&payload.language, &payload.code, &payload.tests_id)
        .await;
    state
        .store
        .append_message(
            Message::system(&id, format!("Code execution result for {task_id}: {result}"))
                .with_task(&task_id),
        )
        .await?;
    Ok(Json(json!({ "task_id": task_id, "result": result })))
}

async fn submit_sql(
    State(state): State<SharedState>,
    Path((id, task_id)): Path<(String, String)>,
    Json(payload): Json<SqlSubmission>,
) -> Result<Json<Value>, ApiError> {
    let session = state.store.get_session(&id).await?;
    if !session.is_active() {
        return Err(Error::validation("Session is already completed").into());
    }
    let scenario = state.store.get_scenario(session.scenario_id).await?;
    match scenario.task(&task_id) {
        Some(Task::Sql { .. }) => {}
        _ => return Err(Error::validation("Task is not a SQL task").into()),
    }

    let result = state
        .sandbox
        .run_sql(&payload.sql_scenario_id, &payload.query)
        .await;
    state
        .store
        .append_message(
            Message::system(&id, format!("SQL execution result for {task_id}: {result}"))
                .with_task(&task_id),
        )
        .await?;
    Ok(Json(json!({ "task_id": task_id, "result": result })))
}

async fn complete_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.runner.complete(&id).await?;
    Ok(Json(json!({ "status": "ok" })))
}

async fn web_search(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(payload): Json<WebSearchRequest>,
) -> Result<Json<Value>, ApiError> {
    state.store.get_session(&id).await?;
    let results = state.web.search(&payload.query, payload.top_k).await;
    Ok(Json(json!({ "results": results })))
}

async fn chat(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let reply = state.runner.run_chat(&id).await?;
    Ok(Json(json!({ "message": reply })))
}

/// One SSE event per turn event; every line is a JSON object with a
/// `type` field in `{token, done, error}`.
async fn chat_stream(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    let rx = state.runner.run_stream(&id).await?;
    let stream = ReceiverStream::new(rx).map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok(SseEvent::default().data(data))
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build_router;
    use crate::testutil::{ScriptedBackend, seeded_state};
    use axum::body::Body;
    use axum::http::Request;
    use intervet_core::ChatResponse;
    use tower::ServiceExt;

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn create_session(app: &Router, scenario_id: i64, role_id: i64) -> String {
        let response = app
            .clone()
            .oneshot(post_json(
                "/sessions",
                json!({ "scenario_id": scenario_id, "role_id": role_id }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn create_session_rejects_mismatched_role() {
        let (state, scenario_id, _) = seeded_state(ScriptedBackend::new(vec![])).await;
        let other = state
            .store
            .create_role(intervet_core::Role {
                id: 0,
                name: "Backend".into(),
                slug: "backend".into(),
                description: None,
            })
            .await
            .unwrap();
        let app = build_router(state);

        let response = app
            .oneshot(post_json(
                "/sessions",
                json!({ "scenario_id": scenario_id, "role_id": other.id }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(
            body["detail"]
                .as_str()
                .unwrap()
                .contains("does not belong to the selected role")
        );
    }

    #[tokio::test]
    async fn create_session_unknown_scenario_is_bad_request() {
        let (state, _, role_id) = seeded_state(ScriptedBackend::new(vec![])).await;
        let app = build_router(state);

        let response = app
            .oneshot(post_json(
                "/sessions",
                json!({ "scenario_id": 999, "role_id": role_id }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(
            body["detail"]
                .as_str()
                .unwrap()
                .contains("Scenario or role not found")
        );
    }

    #[tokio::test]
    async fn score_bounds_enforced_end_to_end() {
        let (state, scenario_id, role_id) = seeded_state(ScriptedBackend::new(vec![])).await;
        let app = build_router(state);
        let session_id = create_session(&app, scenario_id, role_id).await;

        // Above T1's max of 5
        let response = app
            .clone()
            .oneshot(post_json(
                &format!("/sessions/{session_id}/score"),
                json!({ "task_id": "T1", "points": 6.0 }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["detail"].as_str().unwrap().contains("[0, 5]"));

        // In range
        let response = app
            .clone()
            .oneshot(post_json(
                &format!("/sessions/{session_id}/score"),
                json!({ "task_id": "T1", "points": 4.0, "comment": "ок" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(get_req(&format!("/sessions/{session_id}")))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["scores"]["T1"], json!(4.0));
    }

    #[tokio::test]
    async fn submit_code_rejects_non_coding_task() {
        let (state, scenario_id, role_id) = seeded_state(ScriptedBackend::new(vec![])).await;
        let app = build_router(state);
        let session_id = create_session(&app, scenario_id, role_id).await;

        let response = app
            .oneshot(post_json(
                &format!("/sessions/{session_id}/tasks/T1/submit_code"),
                json!({ "code": "print(1)", "language": "python", "tests_id": "t" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["detail"], json!("Task is not a coding task"));
    }

    #[tokio::test]
    async fn submit_sql_records_result_message() {
        let (state, scenario_id, role_id) = seeded_state(ScriptedBackend::new(vec![])).await;
        let app = build_router(state);
        let session_id = create_session(&app, scenario_id, role_id).await;

        let response = app
            .clone()
            .oneshot(post_json(
                &format!("/sessions/{session_id}/tasks/SQL1/submit_sql"),
                json!({ "query": "SELECT 1", "sql_scenario_id": "ecommerce_basic" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["task_id"], json!("SQL1"));
        // The test sandbox endpoint is unreachable, so the degraded payload
        // is returned instead of a hard failure
        assert_eq!(body["result"]["success"], json!(false));

        let response = app
            .oneshot(get_req(&format!("/sessions/{session_id}/messages")))
            .await
            .unwrap();
        let messages = body_json(response).await;
        let last = messages.as_array().unwrap().last().unwrap().clone();
        assert_eq!(last["sender"], json!("system"));
        assert!(
            last["text"]
                .as_str()
                .unwrap()
                .starts_with("SQL execution result for SQL1:")
        );
        assert_eq!(last["task_id"], json!("SQL1"));
    }

    #[tokio::test]
    async fn completed_session_rejects_new_messages() {
        let (state, scenario_id, role_id) = seeded_state(ScriptedBackend::new(vec![])).await;
        let app = build_router(state);
        let session_id = create_session(&app, scenario_id, role_id).await;

        let response = app
            .clone()
            .oneshot(post_json(
                &format!("/sessions/{session_id}/complete"),
                json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(post_json(
                &format!("/sessions/{session_id}/messages"),
                json!({ "text": "Здравствуйте", "sender": "candidate" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn advance_moves_to_next_unscored_task() {
        let (state, scenario_id, role_id) = seeded_state(ScriptedBackend::new(vec![])).await;
        let app = build_router(state);
        let session_id = create_session(&app, scenario_id, role_id).await;

        let response = app
            .clone()
            .oneshot(post_json(
                &format!("/sessions/{session_id}/score"),
                json!({ "task_id": "T1", "points": 4.0 }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(post_json(
                &format!("/sessions/{session_id}/advance"),
                json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        // T1 is scored, so the cursor skips straight to SQL1
        assert_eq!(body["current_task_id"], json!("SQL1"));
    }

    #[tokio::test]
    async fn chat_returns_final_message() {
        let backend = ScriptedBackend::new(vec![ChatResponse {
            content: "Расскажите, чем L1-регуляризация отличается от L2.".into(),
            tool_calls: Vec::new(),
        }]);
        let (state, scenario_id, role_id) = seeded_state(backend).await;
        let app = build_router(state);
        let session_id = create_session(&app, scenario_id, role_id).await;

        let response = app
            .oneshot(post_json(
                &format!("/sessions/{session_id}/lm/chat"),
                json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert!(
            body["message"]
                .as_str()
                .unwrap()
                .contains("L1-регуляризация")
        );
    }

    #[tokio::test]
    async fn web_search_for_unknown_session_is_not_found() {
        let (state, _, _) = seeded_state(ScriptedBackend::new(vec![])).await;
        let app = build_router(state);

        let response = app
            .oneshot(post_json(
                "/sessions/missing/web-search",
                json!({ "query": "градиентный бустинг" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
