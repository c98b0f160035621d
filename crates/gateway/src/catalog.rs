//! Catalog CRUD: roles, scenarios, SQL scenarios, and RAG corpora.
//!
//! Task lists arrive as raw JSON and are validated through the task
//! discriminated union before anything is stored.

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::Value;

use intervet_core::{Document, RagCorpus, Role, Scenario, SqlScenarioDef};
use intervet_tools::{RagSearchResult, search_documents};

use crate::{ApiError, SharedState};

pub(crate) fn router() -> Router<SharedState> {
    Router::new()
        .route("/roles", get(list_roles).post(create_role))
        .route(
            "/roles/{id}",
            get(get_role).put(update_role).delete(delete_role),
        )
        .route("/scenarios", get(list_scenarios).post(create_scenario))
        .route(
            "/scenarios/{id}",
            get(get_scenario).put(update_scenario).delete(delete_scenario),
        )
        .route(
            "/sql-scenarios",
            get(list_sql_scenarios).post(create_sql_scenario),
        )
        .route("/sql-scenarios/{id}", get(get_sql_scenario))
        .route("/rag/corpora", get(list_corpora).post(create_corpus))
        .route("/rag/corpora/{id}", get(get_corpus))
        .route(
            "/rag/corpora/{id}/documents",
            get(list_documents).post(add_document),
        )
        .route("/rag/search", post(rag_search))
}

// --- Roles ---

#[derive(Deserialize)]
struct RoleCreate {
    name: String,
    slug: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize)]
struct RoleUpdate {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    slug: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

async fn list_roles(State(state): State<SharedState>) -> Result<Json<Vec<Role>>, ApiError> {
    Ok(Json(state.store.list_roles().await?))
}

async fn create_role(
    State(state): State<SharedState>,
    Json(payload): Json<RoleCreate>,
) -> Result<(StatusCode, Json<Role>), ApiError> {
    let role = state
        .store
        .create_role(Role {
            id: 0,
            name: payload.name,
            slug: payload.slug,
            description: payload.description,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(role)))
}

async fn get_role(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<Role>, ApiError> {
    Ok(Json(state.store.get_role(id).await?))
}

async fn update_role(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(payload): Json<RoleUpdate>,
) -> Result<Json<Role>, ApiError> {
    let mut role = state.store.get_role(id).await?;
    if let Some(name) = payload.name {
        role.name = name;
    }
    if let Some(slug) = payload.slug {
        role.slug = slug;
    }
    if let Some(description) = payload.description {
        role.description = Some(description);
    }
    Ok(Json(state.store.update_role(&role).await?))
}

async fn delete_role(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_role(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Scenarios ---

#[derive(Deserialize)]
struct ScenarioCreate {
    role_id: i64,
    name: String,
    slug: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    difficulty: Option<String>,
    /// Raw task list, validated before storing
    #[serde(default)]
    tasks: Option<Value>,
    #[serde(default)]
    rag_corpus_id: Option<i64>,
    #[serde(default)]
    sql_scenario_id: Option<i64>,
    #[serde(default)]
    config: Option<Value>,
}

#[derive(Deserialize)]
struct ScenarioUpdate {
    #[serde(default)]
    role_id: Option<i64>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    slug: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    difficulty: Option<String>,
    #[serde(default)]
    tasks: Option<Value>,
    #[serde(default)]
    rag_corpus_id: Option<i64>,
    #[serde(default)]
    sql_scenario_id: Option<i64>,
    #[serde(default)]
    config: Option<Value>,
}

async fn list_scenarios(
    State(state): State<SharedState>,
) -> Result<Json<Vec<Scenario>>, ApiError> {
    Ok(Json(state.store.list_scenarios(None).await?))
}

async fn create_scenario(
    State(state): State<SharedState>,
    Json(payload): Json<ScenarioCreate>,
) -> Result<(StatusCode, Json<Scenario>), ApiError> {
    let tasks = match &payload.tasks {
        Some(raw) => Scenario::parse_tasks(raw)?,
        None => Vec::new(),
    };
    let scenario = state
        .store
        .create_scenario(Scenario {
            id: 0,
            role_id: payload.role_id,
            name: payload.name,
            slug: payload.slug,
            description: payload.description,
            difficulty: payload.difficulty,
            tasks,
            rag_corpus_id: payload.rag_corpus_id,
            sql_scenario_id: payload.sql_scenario_id,
            config: payload.config,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(scenario)))
}

async fn get_scenario(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<Scenario>, ApiError> {
    Ok(Json(state.store.get_scenario(id).await?))
}

async fn update_scenario(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(payload): Json<ScenarioUpdate>,
) -> Result<Json<Scenario>, ApiError> {
    let mut scenario = state.store.get_scenario(id).await?;
    if let Some(role_id) = payload.role_id {
        scenario.role_id = role_id;
    }
    if let Some(name) = payload.name {
        scenario.name = name;
    }
    if let Some(slug) = payload.slug {
        scenario.slug = slug;
    }
    if let Some(description) = payload.description {
        scenario.description = Some(description);
    }
    if let Some(difficulty) = payload.difficulty {
        scenario.difficulty = Some(difficulty);
    }
    if let Some(raw) = &payload.tasks {
        scenario.tasks = Scenario::parse_tasks(raw)?;
    }
    if let Some(corpus_id) = payload.rag_corpus_id {
        scenario.rag_corpus_id = Some(corpus_id);
    }
    if let Some(sql_id) = payload.sql_scenario_id {
        scenario.sql_scenario_id = Some(sql_id);
    }
    if let Some(config) = payload.config {
        scenario.config = Some(config);
    }
    Ok(Json(state.store.update_scenario(&scenario).await?))
}

async fn delete_scenario(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_scenario(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- SQL scenarios ---

#[derive(Deserialize)]
struct SqlScenarioCreate {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    db_schema: Option<String>,
    #[serde(default)]
    reference_solutions: Option<Value>,
}

async fn list_sql_scenarios(
    State(state): State<SharedState>,
) -> Result<Json<Vec<SqlScenarioDef>>, ApiError> {
    Ok(Json(state.store.list_sql_scenarios().await?))
}

async fn create_sql_scenario(
    State(state): State<SharedState>,
    Json(payload): Json<SqlScenarioCreate>,
) -> Result<(StatusCode, Json<SqlScenarioDef>), ApiError> {
    let def = state
        .store
        .create_sql_scenario(SqlScenarioDef {
            id: 0,
            name: payload.name,
            description: payload.description,
            db_schema: payload.db_schema,
            reference_solutions: payload.reference_solutions,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(def)))
}

async fn get_sql_scenario(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<SqlScenarioDef>, ApiError> {
    Ok(Json(state.store.get_sql_scenario(id).await?))
}

// --- RAG corpora and search ---

#[derive(Deserialize)]
struct CorpusCreate {
    name: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize)]
struct DocumentCreate {
    filename: String,
    content: String,
    #[serde(default)]
    metadata: Option<Value>,
}

#[derive(Deserialize)]
struct RagSearchRequest {
    query: String,
    corpus_id: i64,
    #[serde(default = "default_top_k")]
    top_k: usize,
}

fn default_top_k() -> usize {
    3
}

async fn list_corpora(
    State(state): State<SharedState>,
) -> Result<Json<Vec<RagCorpus>>, ApiError> {
    Ok(Json(state.store.list_corpora().await?))
}

async fn create_corpus(
    State(state): State<SharedState>,
    Json(payload): Json<CorpusCreate>,
) -> Result<(StatusCode, Json<RagCorpus>), ApiError> {
    let corpus = state
        .store
        .create_corpus(RagCorpus {
            id: 0,
            name: payload.name,
            description: payload.description,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(corpus)))
}

async fn get_corpus(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<RagCorpus>, ApiError> {
    Ok(Json(state.store.get_corpus(id).await?))
}

async fn add_document(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(payload): Json<DocumentCreate>,
) -> Result<(StatusCode, Json<Document>), ApiError> {
    let document = state
        .store
        .add_document(Document {
            id: 0,
            rag_corpus_id: id,
            filename: payload.filename,
            content: payload.content,
            metadata: payload.metadata,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(document)))
}

async fn list_documents(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Document>>, ApiError> {
    state.store.get_corpus(id).await?;
    Ok(Json(state.store.list_documents(id).await?))
}

async fn rag_search(
    State(state): State<SharedState>,
    Json(payload): Json<RagSearchRequest>,
) -> Result<Json<Vec<RagSearchResult>>, ApiError> {
    state.store.get_corpus(payload.corpus_id).await?;
    let docs = state.store.list_documents(payload.corpus_id).await?;
    Ok(Json(search_documents(&docs, &payload.query, payload.top_k)))
}
