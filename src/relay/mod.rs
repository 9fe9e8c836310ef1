//! The answer-retrieval protocol.
//!
//! [`Conversation`] is the per-message entry point. It resolves the user's
//! thread, lets [`AssistantManager`] make sure the shared assistant exists
//! and can search the knowledge store, and hands the question to
//! [`RunDriver`], which drives the remote run to an answer.

pub mod assistant;
pub mod citations;
pub mod conversation;
pub mod driver;
pub mod knowledge;
pub mod tools;
pub mod validator;

pub use assistant::{AssistantManager, AssistantSettings};
pub use conversation::{Conversation, Reply, APOLOGY};
pub use driver::{RunDriver, RunSettings};
pub use knowledge::{KnowledgeAttachment, KnowledgeManager};
pub use validator::{ModelValueValidator, ValueValidator};
