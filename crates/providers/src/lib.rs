//! Language model client for Intervet.
//!
//! [`LmClient`] talks to any OpenAI-compatible `/chat/completions` endpoint
//! (LM Studio, Ollama, vLLM, hosted APIs) and implements the
//! [`ChatBackend`](intervet_core::ChatBackend) seam: a blocking `complete`
//! call that can carry tool-call requests, and an SSE `stream` call that
//! yields text fragments.

mod lm_client;

pub use lm_client::LmClient;
