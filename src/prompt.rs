//! Prompt construction for SQL generation
//!
//! A prompt is the schema context, a fixed instruction, the user's question
//! verbatim, and a trailing `SQL:` cue the model continues after.

use crate::error::{AiqlError, Result};
use std::fmt;
use std::path::Path;

/// Instruction placed between the schema context and the question.
pub const INSTRUCTION: &str =
    "Convert the following question into a single valid SQL query restricted to the given schema:";

/// Cue the model is expected to continue after.
pub const COMPLETION_CUE: &str = "SQL:";

/// Context for the demo `calls` database.
pub const DEFAULT_SCHEMA_CONTEXT: &str = r#"Database schema:
Table: calls(id, timestamp, duration_minutes, origin_country, destination_country, call_type)

Common questions to ask:
- What is the average duration of calls from a specific country?
- How many calls were made from a specific country?
- What is the total call duration for a given call type and country?
- Which country has the most outgoing calls?

Inside the database the countries are Germany, France, Japan, Spain, USA, Canada, Brazil.
For the country names make sure you capitalise, not make any typos or shortcuts for the countries.

Do not take shortcuts for SQL commands."#;

/// A fully rendered completion prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt(String);

impl Prompt {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Prompt {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptBuilder {
    schema_context: String,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_SCHEMA_CONTEXT)
    }
}

impl PromptBuilder {
    pub fn new(schema_context: impl Into<String>) -> Self {
        Self {
            schema_context: schema_context.into(),
        }
    }

    /// Reads the schema context from a text file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let context = std::fs::read_to_string(path).map_err(|e| {
            AiqlError::Config(format!(
                "Failed to read schema context {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(Self::new(context))
    }

    pub fn schema_context(&self) -> &str {
        &self.schema_context
    }

    pub fn prompt_for(&self, user_question: &str) -> Prompt {
        build(&self.schema_context, user_question)
    }
}

pub fn build(schema_context: &str, user_question: &str) -> Prompt {
    Prompt(format!(
        "{}\n\n{}\n\nQuestion: \"{}\"\n{}",
        schema_context.trim_end(),
        INSTRUCTION,
        user_question,
        COMPLETION_CUE
    ))
}
