//! Question-to-result pipeline
//!
//! Sequences prompt building, completion, extraction and execution. The
//! orchestrator never retries: a failed completion or a rejected statement is
//! returned to the caller, who decides whether to ask again.

use crate::config::{AppConfig, ModelConfig};
use crate::db::{MySqlExecutor, QueryExecutor, QueryOutcome};
use crate::error::{AiqlError, Result};
use crate::extract::{Extraction, SqlExtractor};
use crate::llm::{CompletionOptions, CompletionSource, OllamaClient};
use crate::prompt::{Prompt, PromptBuilder, COMPLETION_CUE};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// SQL produced for a question, with everything needed to explain it.
#[derive(Debug, Clone)]
pub struct GeneratedSql {
    pub prompt: Prompt,
    pub raw_completion: String,
    pub sql: String,
    /// One line per extraction stage that changed the completion
    pub steps: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub sql: String,
    pub outcome: QueryOutcome,
}

pub struct Orchestrator {
    completion: Arc<dyn CompletionSource>,
    executor: Arc<dyn QueryExecutor>,
    prompts: PromptBuilder,
    extractor: SqlExtractor,
    model_id: String,
    options: CompletionOptions,
}

impl Orchestrator {
    pub fn new(
        completion: Arc<dyn CompletionSource>,
        executor: Arc<dyn QueryExecutor>,
        prompts: PromptBuilder,
        extractor: SqlExtractor,
        model: &ModelConfig,
    ) -> Self {
        Self {
            completion,
            executor,
            prompts,
            extractor,
            model_id: model.model_id.clone(),
            options: model.completion_options(),
        }
    }

    /// Wires the Ollama client and MySQL executor described by `config`.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let prompts = match &config.schema_context_path {
            Some(path) => PromptBuilder::from_file(path)?,
            None => PromptBuilder::default(),
        };
        Ok(Self::new(
            Arc::new(OllamaClient::from_config(&config.model)?),
            Arc::new(MySqlExecutor::new(&config.database)),
            prompts,
            SqlExtractor::new(config.fallback_policy()),
            &config.model,
        ))
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub async fn generate_sql(&self, question: &str) -> Result<GeneratedSql> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AiqlError::EmptyQuestion);
        }

        let prompt = self.prompts.prompt_for(question);
        info!("Generating SQL for question: {}", question);
        let completion = self
            .completion
            .generate(&self.model_id, &prompt, &self.options)
            .await?;

        let mut steps = Vec::new();
        let raw = after_last_cue(&completion.text, &mut steps);
        match self.extractor.extract_with_steps(raw, &mut steps) {
            Extraction::Sql(sql) => {
                info!("Extracted SQL: {}", sql);
                Ok(GeneratedSql {
                    prompt,
                    raw_completion: completion.text,
                    sql,
                    steps,
                })
            }
            Extraction::NoSql(reason) => {
                warn!("No SQL in completion ({}): {:?}", reason, completion.text);
                Err(AiqlError::Extraction(reason))
            }
        }
    }

    pub async fn execute(&self, sql: &str) -> Result<QueryOutcome> {
        self.executor.execute(sql).await
    }

    /// Generates and runs without confirmation.
    pub async fn ask(&self, question: &str) -> Result<Answer> {
        let generated = self.generate_sql(question).await?;
        let outcome = self.execute(&generated.sql).await?;
        Ok(Answer {
            sql: generated.sql,
            outcome,
        })
    }
}

/// Models often restate the prompt, the question or just the cue before
/// answering. Only the text after the last cue is the answer.
fn after_last_cue<'a>(text: &'a str, steps: &mut Vec<String>) -> &'a str {
    match text.rfind(COMPLETION_CUE) {
        Some(pos) => {
            steps.push(format!("Kept text after last \"{}\"", COMPLETION_CUE));
            &text[pos + COMPLETION_CUE.len()..]
        }
        None => text,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::extract::NoSqlReason;
    use crate::llm::Completion;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Completion source that replays a canned response and records prompts.
    pub(crate) struct CannedCompletion {
        pub response: Result<String>,
        pub prompts: Mutex<Vec<String>>,
    }

    impl CannedCompletion {
        pub(crate) fn ok(text: &str) -> Self {
            Self {
                response: Ok(text.to_string()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn unavailable() -> Self {
            Self {
                response: Err(AiqlError::BackendUnavailable("model offline".to_string())),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CompletionSource for CannedCompletion {
        async fn generate(
            &self,
            _model_id: &str,
            prompt: &Prompt,
            options: &CompletionOptions,
        ) -> Result<Completion> {
            assert_eq!(options.temperature, 0.0);
            self.prompts.lock().unwrap().push(prompt.to_string());
            match &self.response {
                Ok(text) => Ok(Completion { text: text.clone() }),
                Err(e) => Err(AiqlError::BackendUnavailable(e.to_string())),
            }
        }
    }

    /// Executor that records statements and returns a fixed outcome.
    pub(crate) struct RecordingExecutor {
        pub outcome: std::result::Result<QueryOutcome, String>,
        pub statements: Mutex<Vec<String>>,
    }

    impl RecordingExecutor {
        pub(crate) fn rows(columns: &[&str], rows: Vec<Vec<Option<String>>>) -> Self {
            Self {
                outcome: Ok(QueryOutcome::Rows {
                    columns: columns.iter().map(|c| c.to_string()).collect(),
                    rows,
                }),
                statements: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn failing(message: &str) -> Self {
            Self {
                outcome: Err(message.to_string()),
                statements: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl QueryExecutor for RecordingExecutor {
        async fn execute(&self, sql: &str) -> Result<QueryOutcome> {
            self.statements.lock().unwrap().push(sql.to_string());
            self.outcome.clone().map_err(AiqlError::Execution)
        }
    }

    pub(crate) fn orchestrator(
        completion: Arc<CannedCompletion>,
        executor: Arc<RecordingExecutor>,
    ) -> Orchestrator {
        Orchestrator::new(
            completion,
            executor,
            PromptBuilder::new("Table: calls(id, call_type)"),
            SqlExtractor::default(),
            &ModelConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_ask_runs_extracted_sql() {
        let completion = Arc::new(CannedCompletion::ok(
            "```sql\nSELECT COUNT(*) FROM calls\n```",
        ));
        let executor = Arc::new(RecordingExecutor::rows(
            &["COUNT(*)"],
            vec![vec![Some("500".to_string())]],
        ));
        let answer = orchestrator(completion.clone(), executor.clone())
            .ask("How many calls?")
            .await
            .unwrap();

        assert_eq!(answer.sql, "SELECT COUNT(*) FROM calls;");
        assert_eq!(answer.outcome.row_count(), 1);
        assert_eq!(
            *executor.statements.lock().unwrap(),
            vec!["SELECT COUNT(*) FROM calls;".to_string()]
        );
        let prompts = completion.prompts.lock().unwrap();
        assert!(prompts[0].contains("Question: \"How many calls?\""));
    }

    #[tokio::test]
    async fn test_blank_question_rejected_before_model() {
        let completion = Arc::new(CannedCompletion::ok("SELECT 1"));
        let executor = Arc::new(RecordingExecutor::rows(&[], vec![]));
        let err = orchestrator(completion.clone(), executor)
            .generate_sql("   ")
            .await
            .unwrap_err();
        assert!(matches!(err, AiqlError::EmptyQuestion));
        assert!(completion.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_completion_is_extraction_error() {
        let completion = Arc::new(CannedCompletion::ok("  \n"));
        let executor = Arc::new(RecordingExecutor::rows(&[], vec![]));
        let err = orchestrator(completion, executor.clone())
            .ask("anything")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AiqlError::Extraction(NoSqlReason::EmptyCompletion)
        ));
        assert!(executor.statements.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_backend_unavailable_propagates() {
        let completion = Arc::new(CannedCompletion::unavailable());
        let executor = Arc::new(RecordingExecutor::rows(&[], vec![]));
        let err = orchestrator(completion, executor)
            .generate_sql("How many calls?")
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_execution_error_not_retried() {
        let completion = Arc::new(CannedCompletion::ok("SELECT * FROM missing"));
        let executor = Arc::new(RecordingExecutor::failing("Table 'aiql.missing' doesn't exist"));
        let err = orchestrator(completion, executor.clone())
            .ask("Show missing")
            .await
            .unwrap_err();
        assert!(matches!(err, AiqlError::Execution(msg) if msg.contains("doesn't exist")));
        assert_eq!(executor.statements.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_echoed_prompt_removed() {
        let prompt = PromptBuilder::new("Table: calls(id, call_type)").prompt_for("How many calls?");
        let echoed = format!("{} SELECT COUNT(*) FROM calls", prompt);
        let completion = Arc::new(CannedCompletion::ok(&echoed));
        let executor = Arc::new(RecordingExecutor::rows(&[], vec![]));
        let generated = orchestrator(completion, executor)
            .generate_sql("How many calls?")
            .await
            .unwrap();
        assert_eq!(generated.sql, "SELECT COUNT(*) FROM calls;");
        assert_eq!(generated.steps[0], "Kept text after last \"SQL:\"");
    }

    #[tokio::test]
    async fn test_restated_cue_removed() {
        let completion = Arc::new(CannedCompletion::ok("SQL: SELECT COUNT(*) FROM calls"));
        let executor = Arc::new(RecordingExecutor::rows(&[], vec![]));
        let generated = orchestrator(completion, executor)
            .generate_sql("How many calls?")
            .await
            .unwrap();
        assert_eq!(generated.sql, "SELECT COUNT(*) FROM calls;");
    }

    #[tokio::test]
    async fn test_restated_question_and_cue_removed() {
        let completion = Arc::new(CannedCompletion::ok(
            "Question: \"How many calls?\"\nSQL: SELECT COUNT(*) FROM calls",
        ));
        let executor = Arc::new(RecordingExecutor::rows(&[], vec![]));
        let answer = orchestrator(completion, executor.clone())
            .ask("How many calls?")
            .await
            .unwrap();
        assert_eq!(answer.sql, "SELECT COUNT(*) FROM calls;");
        assert_eq!(
            *executor.statements.lock().unwrap(),
            vec!["SELECT COUNT(*) FROM calls;".to_string()]
        );
    }

    #[tokio::test]
    async fn test_generated_sql_carries_steps() {
        let completion = Arc::new(CannedCompletion::ok("MySQL Query:\nSELECT 1"));
        let executor = Arc::new(RecordingExecutor::rows(&[], vec![]));
        let generated = orchestrator(completion, executor)
            .generate_sql("one")
            .await
            .unwrap();
        assert_eq!(generated.sql, "SELECT 1;");
        assert_eq!(generated.raw_completion, "MySQL Query:\nSELECT 1");
        assert!(generated.steps.iter().any(|s| s.contains("MySQL Query:")));
    }
}
