//! Catalog entities: roles, scenarios, tasks, document corpora.
//!
//! A [`Scenario`] is an ordered catalog of tasks bound to a role and
//! difficulty. Tasks are a discriminated union over the three task kinds;
//! the kind-specific payloads are validated when the scenario's task JSON is
//! loaded, not when a turn runs.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// An interview role (e.g. Data Scientist, Backend).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A named collection of reference documents for `rag_search`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagCorpus {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One document inside a corpus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub id: i64,
    pub rag_corpus_id: i64,
    pub filename: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// A SQL sandbox scenario definition (schema + reference solutions).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqlScenarioDef {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_solutions: Option<serde_json::Value>,
}

/// Fields shared by every task kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskCommon {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub max_points: f64,
    #[serde(default)]
    pub hints_allowed: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_topics: Vec<String>,
}

/// A scenario task — a discriminated union over the three task kinds,
/// tagged by `type` in the stored JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Task {
    Theory {
        #[serde(flatten)]
        common: TaskCommon,
    },
    Coding {
        #[serde(flatten)]
        common: TaskCommon,
        language: String,
        /// Identifier of the test suite the code sandbox runs
        tests_id: String,
    },
    Sql {
        #[serde(flatten)]
        common: TaskCommon,
        /// Identifier of the SQL sandbox scenario
        sql_scenario_id: String,
    },
}

impl Task {
    pub fn common(&self) -> &TaskCommon {
        match self {
            Self::Theory { common }
            | Self::Coding { common, .. }
            | Self::Sql { common, .. } => common,
        }
    }

    pub fn id(&self) -> &str {
        &self.common().id
    }

    pub fn title(&self) -> &str {
        &self.common().title
    }

    pub fn max_points(&self) -> f64 {
        self.common().max_points
    }

    pub fn related_topics(&self) -> &[String] {
        &self.common().related_topics
    }

    /// The kind tag as stored in JSON.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Theory { .. } => "theory",
            Self::Coding { .. } => "coding",
            Self::Sql { .. } => "sql",
        }
    }
}

/// An ordered catalog of tasks bound to a role and difficulty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub id: i64,
    pub role_id: i64,
    pub name: String,
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rag_corpus_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_scenario_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
}

impl Scenario {
    /// Look up a task by id.
    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id() == task_id)
    }

    /// The first task in scenario order, if any.
    pub fn first_task(&self) -> Option<&Task> {
        self.tasks.first()
    }

    /// Parse and validate a task list from stored JSON. Rejects unknown
    /// kinds, missing kind-specific fields, duplicate ids, and negative
    /// point budgets at load time.
    pub fn parse_tasks(raw: &serde_json::Value) -> Result<Vec<Task>, Error> {
        let tasks: Vec<Task> = serde_json::from_value(raw.clone())
            .map_err(|e| Error::validation(format!("invalid task definition: {e}")))?;

        let mut seen = std::collections::HashSet::new();
        for task in &tasks {
            if !seen.insert(task.id().to_string()) {
                return Err(Error::validation(format!(
                    "duplicate task id: {}",
                    task.id()
                )));
            }
            if task.max_points() < 0.0 {
                return Err(Error::validation(format!(
                    "task {} has negative max_points",
                    task.id()
                )));
            }
        }
        Ok(tasks)
    }
}
