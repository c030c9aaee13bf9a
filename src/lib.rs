//! Retrieval and caching engine for question answering over a fixed
//! document corpus.
//!
//! ```text
//! query → Retriever → {embedding cache, corpus index, similarity, result cache}
//!       → ranked passages → context budgeter → bounded context
//! ```

pub mod cache;
pub mod config;
pub mod context;
pub mod corpus;
pub mod error;
pub mod llm;
pub mod logging;
pub mod providers;
pub mod retriever;
pub mod similarity;
pub mod utils;

pub use cache::BoundedCache;
pub use config::Config;
pub use context::{ContextBudgeter, assemble_context, estimate_tokens};
pub use corpus::{CorpusIndex, CorpusStore, Embedding, PassageRecord};
pub use error::{CorpusLoadError, Result, RetrievalError};
pub use retriever::{RankedResult, Retriever};
