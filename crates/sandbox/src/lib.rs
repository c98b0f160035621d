//! Clients for the external execution sandboxes.
//!
//! Candidate code and SQL never run inside this process: submissions go to
//! dedicated sandbox services over HTTP. A sandbox outage degrades to a
//! failed-run result object instead of an error, so the interview can
//! continue and the model can explain what happened.

use std::time::Duration;

use intervet_config::SandboxConfig;
use serde_json::{json, Value};
use tracing::debug;

#[derive(Clone)]
pub struct SandboxClient {
    http: reqwest::Client,
    code_url: String,
    sql_url: String,
}

impl SandboxClient {
    pub fn new(config: &SandboxConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            http,
            code_url: config.code_url.clone(),
            sql_url: config.sql_url.clone(),
        }
    }

    /// Run candidate code against the named test suite.
    pub async fn run_code(&self, language: &str, code: &str, tests_id: &str) -> Value {
        let payload = json!({ "language": language, "code": code, "tests_id": tests_id });
        match self.post(&self.code_url, &payload).await {
            Ok(result) => result,
            Err(e) => {
                debug!("code sandbox unavailable: {e}");
                json!({ "success": false, "details": format!("sandbox run_code failed: {e}") })
            }
        }
    }

    /// Run a candidate SQL query against the named sandbox scenario.
    pub async fn run_sql(&self, sql_scenario_id: &str, query: &str) -> Value {
        let payload = json!({ "sql_scenario_id": sql_scenario_id, "query": query });
        match self.post(&self.sql_url, &payload).await {
            Ok(result) => result,
            Err(e) => {
                debug!("SQL sandbox unavailable: {e}");
                json!({ "success": false, "error": format!("sandbox run_sql failed: {e}") })
            }
        }
    }

    async fn post(&self, url: &str, payload: &Value) -> Result<Value, reqwest::Error> {
        self.http
            .post(url)
            .json(payload)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}
