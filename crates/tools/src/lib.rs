//! # Intervet Tools
//!
//! The three tools the model may call during an interview turn:
//!
//! - `rag_search` — lexical search over the scenario's document corpus
//! - `web_search` — DuckDuckGo instant answers with a stub fallback
//! - `score_task` — validated writes to the score ledger
//!
//! Dispatch is a closed union over these three: an unknown tool name is
//! reported back to the model as an error payload, never executed.

mod dispatch;
pub mod rag;
pub mod web;

pub use dispatch::{Dispatcher, ToolInvocation};
pub use rag::{search_documents, RagSearchResult};
pub use web::{WebSearchClient, WebSearchResult};
