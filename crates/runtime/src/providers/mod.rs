//! LLM provider adapters.
//!
//! Each provider implements the [`Backend`](crate::model::Backend) trait for
//! its specific API.

mod openai;

pub use openai::{DEFAULT_MODEL, OPENAI_API_BASE, OpenAiBackend, OpenAiBackendBuilder};
