//! SQLite store backing the catalog, sessions, transcripts, and scores.

use chrono::{DateTime, Utc};
use intervet_core::{
    Document, Error, Message, RagCorpus, Result, Role, Scenario, ScoreEntry, Session,
    SessionState, SqlScenarioDef, StorageError, Task,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, info};

/// The SQLite-backed store. Cheap to clone, safe to share across tasks.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at the given URL and run migrations.
    ///
    /// Pass `"sqlite::memory:"` for an in-process ephemeral database.
    pub async fn new(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StorageError::Backend(format!("Invalid SQLite URL: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite store initialized at {url}");
        Ok(store)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<()> {
        let statements: &[(&str, &str)] = &[
            (
                "roles table",
                r#"
                CREATE TABLE IF NOT EXISTS roles (
                    id          INTEGER PRIMARY KEY AUTOINCREMENT,
                    name        TEXT NOT NULL,
                    slug        TEXT NOT NULL UNIQUE,
                    description TEXT
                )
                "#,
            ),
            (
                "scenarios table",
                r#"
                CREATE TABLE IF NOT EXISTS scenarios (
                    id              INTEGER PRIMARY KEY AUTOINCREMENT,
                    role_id         INTEGER NOT NULL REFERENCES roles(id),
                    name            TEXT NOT NULL,
                    slug            TEXT NOT NULL,
                    description     TEXT,
                    difficulty      TEXT,
                    tasks           TEXT NOT NULL DEFAULT '[]',
                    rag_corpus_id   INTEGER,
                    sql_scenario_id INTEGER,
                    config          TEXT,
                    UNIQUE(role_id, slug)
                )
                "#,
            ),
            (
                "rag_corpora table",
                r#"
                CREATE TABLE IF NOT EXISTS rag_corpora (
                    id          INTEGER PRIMARY KEY AUTOINCREMENT,
                    name        TEXT NOT NULL,
                    description TEXT
                )
                "#,
            ),
            (
                "documents table",
                r#"
                CREATE TABLE IF NOT EXISTS documents (
                    id            INTEGER PRIMARY KEY AUTOINCREMENT,
                    rag_corpus_id INTEGER NOT NULL REFERENCES rag_corpora(id),
                    filename      TEXT NOT NULL,
                    content       TEXT NOT NULL,
                    metadata      TEXT
                )
                "#,
            ),
            (
                "sql_scenarios table",
                r#"
                CREATE TABLE IF NOT EXISTS sql_scenarios (
                    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                    name                TEXT NOT NULL,
                    description         TEXT,
                    db_schema           TEXT,
                    reference_solutions TEXT
                )
                "#,
            ),
            (
                "sessions table",
                r#"
                CREATE TABLE IF NOT EXISTS sessions (
                    id              TEXT PRIMARY KEY,
                    scenario_id     INTEGER NOT NULL REFERENCES scenarios(id),
                    role_id         INTEGER NOT NULL REFERENCES roles(id),
                    candidate_id    TEXT,
                    started_at      TEXT NOT NULL,
                    finished_at     TEXT,
                    state           TEXT NOT NULL,
                    current_task_id TEXT,
                    scores          TEXT NOT NULL DEFAULT '{}'
                )
                "#,
            ),
            (
                "messages table",
                r#"
                CREATE TABLE IF NOT EXISTS messages (
                    id         INTEGER PRIMARY KEY AUTOINCREMENT,
                    session_id TEXT NOT NULL REFERENCES sessions(id),
                    sender     TEXT NOT NULL,
                    text       TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    task_id    TEXT
                )
                "#,
            ),
            (
                "messages index",
                "CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id, created_at)",
            ),
            (
                "scores table",
                r#"
                CREATE TABLE IF NOT EXISTS scores (
                    id         INTEGER PRIMARY KEY AUTOINCREMENT,
                    session_id TEXT NOT NULL REFERENCES sessions(id),
                    task_id    TEXT NOT NULL,
                    points     REAL NOT NULL,
                    comment    TEXT,
                    created_at TEXT NOT NULL
                )
                "#,
            ),
        ];

        for (name, sql) in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::MigrationFailed(format!("{name}: {e}")))?;
        }

        debug!("SQLite migrations complete");
        Ok(())
    }

    // --- Roles ---

    pub async fn create_role(&self, mut role: Role) -> Result<Role> {
        let existing = sqlx::query("SELECT id FROM roles WHERE slug = ?1")
            .bind(&role.slug)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed)?;
        if existing.is_some() {
            return Err(Error::validation(format!(
                "Role with slug '{}' already exists",
                role.slug
            )));
        }

        let result = sqlx::query("INSERT INTO roles (name, slug, description) VALUES (?1, ?2, ?3)")
            .bind(&role.name)
            .bind(&role.slug)
            .bind(&role.description)
            .execute(&self.pool)
            .await
            .map_err(backend_failed)?;
        role.id = result.last_insert_rowid();
        Ok(role)
    }

    pub async fn list_roles(&self) -> Result<Vec<Role>> {
        let rows = sqlx::query("SELECT * FROM roles ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(query_failed)?;
        rows.iter().map(row_to_role).collect()
    }

    pub async fn get_role(&self, id: i64) -> Result<Role> {
        let row = sqlx::query("SELECT * FROM roles WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed)?;
        match row {
            Some(ref r) => row_to_role(r),
            None => Err(Error::not_found("Role", id.to_string())),
        }
    }

    pub async fn update_role(&self, role: &Role) -> Result<Role> {
        let taken = sqlx::query("SELECT id FROM roles WHERE slug = ?1 AND id != ?2")
            .bind(&role.slug)
            .bind(role.id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed)?;
        if taken.is_some() {
            return Err(Error::validation(format!(
                "Role with slug '{}' already exists",
                role.slug
            )));
        }

        let result =
            sqlx::query("UPDATE roles SET name = ?1, slug = ?2, description = ?3 WHERE id = ?4")
                .bind(&role.name)
                .bind(&role.slug)
                .bind(&role.description)
                .bind(role.id)
                .execute(&self.pool)
                .await
                .map_err(backend_failed)?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("Role", role.id.to_string()));
        }
        Ok(role.clone())
    }

    pub async fn delete_role(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM roles WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(backend_failed)?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("Role", id.to_string()));
        }
        Ok(())
    }

    // --- Scenarios ---

    pub async fn create_scenario(&self, mut scenario: Scenario) -> Result<Scenario> {
        // The role must exist before a scenario can reference it
        self.get_role(scenario.role_id).await?;

        let existing = sqlx::query("SELECT id FROM scenarios WHERE role_id = ?1 AND slug = ?2")
            .bind(scenario.role_id)
            .bind(&scenario.slug)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed)?;
        if existing.is_some() {
            return Err(Error::validation(format!(
                "Scenario with slug '{}' already exists for this role",
                scenario.slug
            )));
        }

        let tasks_json = serde_json::to_string(&scenario.tasks)?;
        let config_json = match &scenario.config {
            Some(v) => Some(serde_json::to_string(v)?),
            None => None,
        };

        let result = sqlx::query(
            r#"
            INSERT INTO scenarios
                (role_id, name, slug, description, difficulty, tasks,
                 rag_corpus_id, sql_scenario_id, config)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(scenario.role_id)
        .bind(&scenario.name)
        .bind(&scenario.slug)
        .bind(&scenario.description)
        .bind(&scenario.difficulty)
        .bind(&tasks_json)
        .bind(scenario.rag_corpus_id)
        .bind(scenario.sql_scenario_id)
        .bind(&config_json)
        .execute(&self.pool)
        .await
        .map_err(backend_failed)?;
        scenario.id = result.last_insert_rowid();
        Ok(scenario)
    }

    pub async fn list_scenarios(&self, role_id: Option<i64>) -> Result<Vec<Scenario>> {
        let rows = match role_id {
            Some(rid) => {
                sqlx::query("SELECT * FROM scenarios WHERE role_id = ?1 ORDER BY id")
                    .bind(rid)
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                sqlx::query("SELECT * FROM scenarios ORDER BY id")
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(query_failed)?;
        rows.iter().map(row_to_scenario).collect()
    }

    pub async fn get_scenario(&self, id: i64) -> Result<Scenario> {
        let row = sqlx::query("SELECT * FROM scenarios WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed)?;
        match row {
            Some(ref r) => row_to_scenario(r),
            None => Err(Error::not_found("Scenario", id.to_string())),
        }
    }

    pub async fn update_scenario(&self, scenario: &Scenario) -> Result<Scenario> {
        self.get_role(scenario.role_id).await?;

        let taken = sqlx::query(
            "SELECT id FROM scenarios WHERE role_id = ?1 AND slug = ?2 AND id != ?3",
        )
        .bind(scenario.role_id)
        .bind(&scenario.slug)
        .bind(scenario.id)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_failed)?;
        if taken.is_some() {
            return Err(Error::validation(format!(
                "Scenario with slug '{}' already exists for this role",
                scenario.slug
            )));
        }

        let tasks_json = serde_json::to_string(&scenario.tasks)?;
        let config_json = match &scenario.config {
            Some(v) => Some(serde_json::to_string(v)?),
            None => None,
        };

        let result = sqlx::query(
            r#"
            UPDATE scenarios SET
                role_id = ?1, name = ?2, slug = ?3, description = ?4,
                difficulty = ?5, tasks = ?6, rag_corpus_id = ?7,
                sql_scenario_id = ?8, config = ?9
            WHERE id = ?10
            "#,
        )
        .bind(scenario.role_id)
        .bind(&scenario.name)
        .bind(&scenario.slug)
        .bind(&scenario.description)
        .bind(&scenario.difficulty)
        .bind(&tasks_json)
        .bind(scenario.rag_corpus_id)
        .bind(scenario.sql_scenario_id)
        .bind(&config_json)
        .bind(scenario.id)
        .execute(&self.pool)
        .await
        .map_err(backend_failed)?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("Scenario", scenario.id.to_string()));
        }
        Ok(scenario.clone())
    }

    pub async fn delete_scenario(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM scenarios WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(backend_failed)?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("Scenario", id.to_string()));
        }
        Ok(())
    }

    // --- RAG corpora and documents ---

    pub async fn create_corpus(&self, mut corpus: RagCorpus) -> Result<RagCorpus> {
        let result = sqlx::query("INSERT INTO rag_corpora (name, description) VALUES (?1, ?2)")
            .bind(&corpus.name)
            .bind(&corpus.description)
            .execute(&self.pool)
            .await
            .map_err(backend_failed)?;
        corpus.id = result.last_insert_rowid();
        Ok(corpus)
    }

    pub async fn list_corpora(&self) -> Result<Vec<RagCorpus>> {
        let rows = sqlx::query("SELECT * FROM rag_corpora ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(query_failed)?;
        rows.iter().map(row_to_corpus).collect()
    }

    pub async fn get_corpus(&self, id: i64) -> Result<RagCorpus> {
        let row = sqlx::query("SELECT * FROM rag_corpora WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed)?;
        match row {
            Some(ref r) => row_to_corpus(r),
            None => Err(Error::not_found("RAG corpus", id.to_string())),
        }
    }

    pub async fn add_document(&self, mut document: Document) -> Result<Document> {
        self.get_corpus(document.rag_corpus_id).await?;
        let metadata_json = match &document.metadata {
            Some(v) => Some(serde_json::to_string(v)?),
            None => None,
        };
        let result = sqlx::query(
            "INSERT INTO documents (rag_corpus_id, filename, content, metadata) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(document.rag_corpus_id)
        .bind(&document.filename)
        .bind(&document.content)
        .bind(&metadata_json)
        .execute(&self.pool)
        .await
        .map_err(backend_failed)?;
        document.id = result.last_insert_rowid();
        Ok(document)
    }

    pub async fn list_documents(&self, corpus_id: i64) -> Result<Vec<Document>> {
        let rows = sqlx::query("SELECT * FROM documents WHERE rag_corpus_id = ?1 ORDER BY id")
            .bind(corpus_id)
            .fetch_all(&self.pool)
            .await
            .map_err(query_failed)?;
        rows.iter().map(row_to_document).collect()
    }

    // --- SQL sandbox scenarios ---

    pub async fn create_sql_scenario(&self, mut def: SqlScenarioDef) -> Result<SqlScenarioDef> {
        let solutions_json = match &def.reference_solutions {
            Some(v) => Some(serde_json::to_string(v)?),
            None => None,
        };
        let result = sqlx::query(
            "INSERT INTO sql_scenarios (name, description, db_schema, reference_solutions) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&def.name)
        .bind(&def.description)
        .bind(&def.db_schema)
        .bind(&solutions_json)
        .execute(&self.pool)
        .await
        .map_err(backend_failed)?;
        def.id = result.last_insert_rowid();
        Ok(def)
    }

    pub async fn list_sql_scenarios(&self) -> Result<Vec<SqlScenarioDef>> {
        let rows = sqlx::query("SELECT * FROM sql_scenarios ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(query_failed)?;
        rows.iter().map(row_to_sql_scenario).collect()
    }

    pub async fn get_sql_scenario(&self, id: i64) -> Result<SqlScenarioDef> {
        let row = sqlx::query("SELECT * FROM sql_scenarios WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed)?;
        match row {
            Some(ref r) => row_to_sql_scenario(r),
            None => Err(Error::not_found("SQL scenario", id.to_string())),
        }
    }

    // --- Sessions ---

    pub async fn insert_session(&self, session: &Session) -> Result<()> {
        let scores_json = serde_json::to_string(&session.scores)?;
        sqlx::query(
            r#"
            INSERT INTO sessions
                (id, scenario_id, role_id, candidate_id, started_at, finished_at,
                 state, current_task_id, scores)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&session.id)
        .bind(session.scenario_id)
        .bind(session.role_id)
        .bind(&session.candidate_id)
        .bind(session.started_at.to_rfc3339())
        .bind(session.finished_at.map(|t| t.to_rfc3339()))
        .bind(session.state.to_string())
        .bind(&session.current_task_id)
        .bind(&scores_json)
        .execute(&self.pool)
        .await
        .map_err(backend_failed)?;
        Ok(())
    }

    pub async fn get_session(&self, id: &str) -> Result<Session> {
        let row = sqlx::query("SELECT * FROM sessions WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed)?;
        match row {
            Some(ref r) => row_to_session(r),
            None => Err(Error::not_found("Session", id)),
        }
    }

    /// Persist mutable session fields (state, finish time, task cursor,
    /// derived scores map).
    pub async fn update_session(&self, session: &Session) -> Result<()> {
        let scores_json = serde_json::to_string(&session.scores)?;
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET finished_at = ?2, state = ?3, current_task_id = ?4, scores = ?5
            WHERE id = ?1
            "#,
        )
        .bind(&session.id)
        .bind(session.finished_at.map(|t| t.to_rfc3339()))
        .bind(session.state.to_string())
        .bind(&session.current_task_id)
        .bind(&scores_json)
        .execute(&self.pool)
        .await
        .map_err(backend_failed)?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("Session", session.id.clone()));
        }
        Ok(())
    }

    // --- Messages ---

    pub async fn append_message(&self, mut message: Message) -> Result<Message> {
        let result = sqlx::query(
            "INSERT INTO messages (session_id, sender, text, created_at, task_id) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&message.session_id)
        .bind(message.sender.to_string())
        .bind(&message.text)
        .bind(message.created_at.to_rfc3339())
        .bind(&message.task_id)
        .execute(&self.pool)
        .await
        .map_err(backend_failed)?;
        message.id = result.last_insert_rowid();
        Ok(message)
    }

    pub async fn list_messages(&self, session_id: &str) -> Result<Vec<Message>> {
        let rows =
            sqlx::query("SELECT * FROM messages WHERE session_id = ?1 ORDER BY created_at, id")
                .bind(session_id)
                .fetch_all(&self.pool)
                .await
                .map_err(query_failed)?;
        rows.iter().map(row_to_message).collect()
    }

    // --- Score ledger ---

    /// Append a score entry and refresh the session's derived scores map in
    /// one transaction. The ledger keeps every entry; the map keeps only the
    /// latest points per task id.
    pub async fn record_score(&self, mut entry: ScoreEntry) -> Result<ScoreEntry> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(backend_failed)?;

        let row = sqlx::query("SELECT scores FROM sessions WHERE id = ?1")
            .bind(&entry.session_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(query_failed)?;
        let scores_json: String = match row {
            Some(r) => r.try_get("scores").map_err(query_failed)?,
            None => return Err(Error::not_found("Session", entry.session_id.clone())),
        };
        let mut scores: HashMap<String, f64> =
            serde_json::from_str(&scores_json).unwrap_or_default();
        scores.insert(entry.task_id.clone(), entry.points);
        let updated_json = serde_json::to_string(&scores)?;

        let result = sqlx::query(
            "INSERT INTO scores (session_id, task_id, points, comment, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&entry.session_id)
        .bind(&entry.task_id)
        .bind(entry.points)
        .bind(&entry.comment)
        .bind(entry.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(backend_failed)?;
        entry.id = result.last_insert_rowid();

        sqlx::query("UPDATE sessions SET scores = ?2 WHERE id = ?1")
            .bind(&entry.session_id)
            .bind(&updated_json)
            .execute(&mut *tx)
            .await
            .map_err(backend_failed)?;

        tx.commit().await.map_err(backend_failed)?;
        debug!(
            session_id = %entry.session_id,
            task_id = %entry.task_id,
            points = entry.points,
            "recorded score"
        );
        Ok(entry)
    }

    pub async fn list_scores(&self, session_id: &str) -> Result<Vec<ScoreEntry>> {
        let rows =
            sqlx::query("SELECT * FROM scores WHERE session_id = ?1 ORDER BY created_at, id")
                .bind(session_id)
                .fetch_all(&self.pool)
                .await
                .map_err(query_failed)?;
        rows.iter().map(row_to_score).collect()
    }
}

fn backend_failed(e: sqlx::Error) -> StorageError {
    StorageError::Backend(e.to_string())
}

fn query_failed(e: sqlx::Error) -> StorageError {
    StorageError::QueryFailed(e.to_string())
}

fn column<T>(row: &sqlx::sqlite::SqliteRow, name: &str) -> Result<T>
where
    T: for<'r> sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name)
        .map_err(|e| StorageError::QueryFailed(format!("{name} column: {e}")).into())
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_role(row: &sqlx::sqlite::SqliteRow) -> Result<Role> {
    Ok(Role {
        id: column(row, "id")?,
        name: column(row, "name")?,
        slug: column(row, "slug")?,
        description: column(row, "description")?,
    })
}

fn row_to_scenario(row: &sqlx::sqlite::SqliteRow) -> Result<Scenario> {
    let tasks_json: String = column(row, "tasks")?;
    let tasks: Vec<Task> = serde_json::from_str(&tasks_json)
        .map_err(|e| StorageError::QueryFailed(format!("tasks column: {e}")))?;
    let config_json: Option<String> = column(row, "config")?;
    let config = match config_json {
        Some(raw) => Some(
            serde_json::from_str(&raw)
                .map_err(|e| StorageError::QueryFailed(format!("config column: {e}")))?,
        ),
        None => None,
    };
    Ok(Scenario {
        id: column(row, "id")?,
        role_id: column(row, "role_id")?,
        name: column(row, "name")?,
        slug: column(row, "slug")?,
        description: column(row, "description")?,
        difficulty: column(row, "difficulty")?,
        tasks,
        rag_corpus_id: column(row, "rag_corpus_id")?,
        sql_scenario_id: column(row, "sql_scenario_id")?,
        config,
    })
}

fn row_to_corpus(row: &sqlx::sqlite::SqliteRow) -> Result<RagCorpus> {
    Ok(RagCorpus {
        id: column(row, "id")?,
        name: column(row, "name")?,
        description: column(row, "description")?,
    })
}

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Result<Document> {
    let metadata_json: Option<String> = column(row, "metadata")?;
    let metadata = metadata_json.and_then(|raw| serde_json::from_str(&raw).ok());
    Ok(Document {
        id: column(row, "id")?,
        rag_corpus_id: column(row, "rag_corpus_id")?,
        filename: column(row, "filename")?,
        content: column(row, "content")?,
        metadata,
    })
}

fn row_to_sql_scenario(row: &sqlx::sqlite::SqliteRow) -> Result<SqlScenarioDef> {
    let solutions_json: Option<String> = column(row, "reference_solutions")?;
    let reference_solutions = solutions_json.and_then(|raw| serde_json::from_str(&raw).ok());
    Ok(SqlScenarioDef {
        id: column(row, "id")?,
        name: column(row, "name")?,
        description: column(row, "description")?,
        db_schema: column(row, "db_schema")?,
        reference_solutions,
    })
}

fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> Result<Session> {
    let started_at: String = column(row, "started_at")?;
    let finished_at: Option<String> = column(row, "finished_at")?;
    let state_raw: String = column(row, "state")?;
    let state: SessionState = state_raw
        .parse()
        .map_err(|e: String| StorageError::QueryFailed(format!("state column: {e}")))?;
    let scores_json: String = column(row, "scores")?;
    let scores: HashMap<String, f64> = serde_json::from_str(&scores_json).unwrap_or_default();
    Ok(Session {
        id: column(row, "id")?,
        scenario_id: column(row, "scenario_id")?,
        role_id: column(row, "role_id")?,
        candidate_id: column(row, "candidate_id")?,
        started_at: parse_timestamp(&started_at),
        finished_at: finished_at.as_deref().map(parse_timestamp),
        state,
        current_task_id: column(row, "current_task_id")?,
        scores,
    })
}

fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message> {
    let sender_raw: String = column(row, "sender")?;
    let sender = sender_raw
        .parse()
        .map_err(|e: String| StorageError::QueryFailed(format!("sender column: {e}")))?;
    let created_at: String = column(row, "created_at")?;
    Ok(Message {
        id: column(row, "id")?,
        session_id: column(row, "session_id")?,
        sender,
        text: column(row, "text")?,
        created_at: parse_timestamp(&created_at),
        task_id: column(row, "task_id")?,
    })
}

fn row_to_score(row: &sqlx::sqlite::SqliteRow) -> Result<ScoreEntry> {
    let created_at: String = column(row, "created_at")?;
    Ok(ScoreEntry {
        id: column(row, "id")?,
        session_id: column(row, "session_id")?,
        task_id: column(row, "task_id")?,
        points: column(row, "points")?,
        comment: column(row, "comment")?,
        created_at: parse_timestamp(&created_at),
    })
}
