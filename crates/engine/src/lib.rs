//! # Intervet Engine
//!
//! The per-turn orchestration pipeline: candidate-input guard, memory
//! snapshot, instruction composition, the model tool loop, and the
//! client-facing event stream. One [`TurnRunner`] instance serves all
//! sessions; turns against the same session are serialized through a
//! per-session lock.

pub mod guard;
pub mod prompt;
pub mod snapshot;
pub mod stream;
mod turn;

pub use stream::TurnEvent;
pub use turn::TurnRunner;
