//! Typed access to the assistants family of endpoints: assistants, threads,
//! messages, runs, files and vector stores.

pub mod assistants;
pub use assistants::*;

pub mod files;
pub mod messages;
pub mod runs;
pub mod threads;
pub mod vector_stores;
