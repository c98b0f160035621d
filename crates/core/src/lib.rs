//! # Intervet Core
//!
//! Domain types, traits, and error definitions for the Intervet interview
//! orchestration engine. This crate carries no web or storage framework: it
//! defines the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! The seams between subsystems are defined as traits here (notably the chat
//! backend). Implementations live in their respective crates, which keeps the
//! dependency graph pointing inward and makes every component testable with
//! mocks.

pub mod chat;
pub mod error;
pub mod message;
pub mod scenario;
pub mod session;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use chat::{ChatBackend, ChatChunk, ChatMessage, ChatResponse, WireRole};
pub use error::{Error, GatewayError, Result, StorageError, ToolError};
pub use message::{Message, Sender};
pub use scenario::{Document, RagCorpus, Role, Scenario, SqlScenarioDef, Task, TaskCommon};
pub use session::{ScoreEntry, Session, SessionState};
pub use tool::{interview_tool_definitions, ToolCallRequest, ToolDefinition};
