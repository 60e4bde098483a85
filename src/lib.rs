pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod format;
pub mod llm;
pub mod orchestrator;
pub mod prompt;
pub mod seed;
pub mod server;

pub use error::{AiqlError, Result};
pub use extract::{extract, Extraction, FallbackPolicy, NoSqlReason, SqlExtractor};
