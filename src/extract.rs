//! SQL extraction from raw model completions
//!
//! Completions come back in whatever shape the model felt like producing:
//! wrapped in markdown fences, prefixed with a restated label, followed by an
//! explanation, or empty. The extractor runs a fixed sequence of text-surgery
//! stages over the completion and returns either one statement terminated by
//! exactly one semicolon, or the reason no statement could be isolated.
//!
//! Stage order matters. Fences are removed before labels, and labels before the
//! keyword scan, because each layer of noise can hide the anchor the next stage
//! looks for. Nothing here parses SQL; the output is a substring of the input
//! plus the terminator.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Keywords that mark the first line of a statement, in lookup order.
pub const SQL_KEYWORDS: [&str; 5] = ["SELECT", "INSERT", "UPDATE", "DELETE", "WITH"];

/// Start-of-sequence tokens some runtimes leak into the completion text.
const START_MARKERS: [&str; 3] = ["<|begin_of_text|>", "<|im_start|>assistant", "<s>"];

/// Restated labels, checked in priority order against the first line.
const LABEL_PHRASES: [&str; 4] = [
    "MySQL Query:",
    "SQL Query:",
    "Here is the SQL query:",
    "Here's the SQL query:",
];

/// Lines starting with one of these end the captured statement.
const TRAILER_LABELS: [&str; 2] = ["Explanation:", "Note:"];

const FENCE: &str = "```";
const COMMENT: &str = "--";

lazy_static! {
    static ref SQL_FENCE_OPENER: Regex =
        Regex::new(r"(?i)^```[ \t]*(?:my)?sql\b").expect("fence opener pattern is valid");
}

/// Why a completion produced no statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoSqlReason {
    /// Nothing but whitespace came back from the model.
    EmptyCompletion,
    /// Neither a keyword-anchored block nor fallback text survived.
    NoStatementFound,
}

impl fmt::Display for NoSqlReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoSqlReason::EmptyCompletion => write!(f, "empty completion"),
            NoSqlReason::NoStatementFound => {
                write!(f, "no SQL keyword found and no fallback text")
            }
        }
    }
}

/// Outcome of running the extractor over one completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Extraction {
    Sql(String),
    NoSql(NoSqlReason),
}

impl Extraction {
    pub fn sql(&self) -> Option<&str> {
        match self {
            Extraction::Sql(sql) => Some(sql),
            Extraction::NoSql(_) => None,
        }
    }

    pub fn is_sql(&self) -> bool {
        matches!(self, Extraction::Sql(_))
    }

    /// Converts into the crate result type, mapping `NoSql` to an extraction error.
    pub fn into_result(self) -> crate::error::Result<String> {
        match self {
            Extraction::Sql(sql) => Ok(sql),
            Extraction::NoSql(reason) => Err(crate::error::AiqlError::Extraction(reason)),
        }
    }
}

/// What to do when no line of the completion starts with a SQL keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackPolicy {
    /// Take everything before the first `--` as the statement.
    #[default]
    Lenient,
    /// Report `NoStatementFound` instead of passing prose through.
    Strict,
}

/// Stateless completion-to-statement extractor.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlExtractor {
    fallback: FallbackPolicy,
}

impl SqlExtractor {
    pub fn new(fallback: FallbackPolicy) -> Self {
        Self { fallback }
    }

    pub fn strict() -> Self {
        Self::new(FallbackPolicy::Strict)
    }

    pub fn fallback_policy(&self) -> FallbackPolicy {
        self.fallback
    }

    pub fn extract(&self, raw: &str) -> Extraction {
        let mut steps = Vec::new();
        self.extract_with_steps(raw, &mut steps)
    }

    /// Same as [`extract`](Self::extract), recording one line per stage that
    /// changed the text.
    pub fn extract_with_steps(&self, raw: &str, steps: &mut Vec<String>) -> Extraction {
        let text = raw.trim();
        if text.is_empty() {
            steps.push("Completion is empty".to_string());
            debug!("completion is empty after trimming");
            return Extraction::NoSql(NoSqlReason::EmptyCompletion);
        }

        let text = strip_start_marker(text, steps);
        let text = strip_fences(text, steps);
        let text = strip_label_phrase(text, steps);

        let candidate = match anchored_block(text) {
            Some(block) => {
                steps.push("Captured keyword-anchored statement".to_string());
                debug!(lines = block.lines().count(), "captured keyword-anchored block");
                block
            }
            None => match self.fallback {
                FallbackPolicy::Lenient => {
                    steps.push(
                        "No line starts with a SQL keyword, using text before first comment"
                            .to_string(),
                    );
                    debug!("no keyword-anchored line, applying lenient fallback");
                    fallback_candidate(text).to_string()
                }
                FallbackPolicy::Strict => {
                    steps.push("No line starts with a SQL keyword".to_string());
                    debug!("no keyword-anchored line, strict fallback rejects completion");
                    return Extraction::NoSql(NoSqlReason::NoStatementFound);
                }
            },
        };

        let body = strip_terminators(&candidate);
        if body.is_empty() {
            steps.push("Nothing left after normalization".to_string());
            debug!("candidate empty after terminator normalization");
            return Extraction::NoSql(NoSqlReason::NoStatementFound);
        }

        Extraction::Sql(format!("{};", body))
    }
}

/// Runs the default (lenient) extractor.
pub fn extract(raw: &str) -> Extraction {
    SqlExtractor::default().extract(raw)
}

fn starts_with_ignore_ascii_case(text: &str, prefix: &str) -> bool {
    text.get(..prefix.len())
        .map_or(false, |head| head.eq_ignore_ascii_case(prefix))
}

fn strip_start_marker<'a>(text: &'a str, steps: &mut Vec<String>) -> &'a str {
    for marker in START_MARKERS {
        if let Some(rest) = text.strip_prefix(marker) {
            steps.push(format!("Removed start marker {}", marker));
            debug!(marker = marker, "removed start-of-sequence marker");
            return rest.trim();
        }
    }
    text
}

fn strip_fences<'a>(text: &'a str, steps: &mut Vec<String>) -> &'a str {
    let mut text = text;

    if SQL_FENCE_OPENER.is_match(text) {
        text = match text.find('\n') {
            Some(newline) => text[newline + 1..].trim(),
            None => "",
        };
        steps.push("Removed SQL-tagged opening fence".to_string());
        debug!("removed tagged opening fence");
    }

    if let Some(rest) = text.strip_prefix(FENCE) {
        text = rest.trim();
        steps.push("Removed bare opening fence".to_string());
        debug!("removed bare opening fence");
    }

    if let Some(rest) = text.strip_suffix(FENCE) {
        text = rest.trim();
        steps.push("Removed closing fence".to_string());
        debug!("removed closing fence");
    }

    text
}

fn strip_label_phrase<'a>(text: &'a str, steps: &mut Vec<String>) -> &'a str {
    let first_line = text.lines().next().unwrap_or("");
    for phrase in LABEL_PHRASES {
        if starts_with_ignore_ascii_case(first_line, phrase) {
            steps.push(format!("Removed label \"{}\"", phrase));
            debug!(phrase = phrase, "removed label phrase");
            return text[phrase.len()..].trim();
        }
    }
    text
}

fn is_statement_start(line: &str) -> bool {
    let upper = line.trim().to_ascii_uppercase();
    SQL_KEYWORDS.iter().any(|keyword| {
        upper.strip_prefix(*keyword).map_or(false, |rest| {
            !rest.starts_with(|c: char| c.is_ascii_alphanumeric() || c == '_')
        })
    })
}

fn ends_capture(line: &str) -> bool {
    let line = line.trim();
    line.is_empty()
        || line == FENCE
        || TRAILER_LABELS
            .iter()
            .any(|label| starts_with_ignore_ascii_case(line, label))
}

fn is_comment_line(line: &str) -> bool {
    line.trim_start().starts_with(COMMENT)
}

/// Collects the first block of lines that starts with a SQL keyword. Lines
/// before the start (blank, comments, prose) are skipped; capture stops at a
/// blank line, a bare fence or an explanatory label.
fn anchored_block(text: &str) -> Option<String> {
    let mut lines = text.lines();
    let start = lines.by_ref().find(|line| is_statement_start(line))?;

    let mut captured: Vec<&str> = vec![start.trim()];
    for line in lines {
        if ends_capture(line) {
            break;
        }
        captured.push(line.trim_end());
    }

    // A trailing comment line would swallow the appended terminator.
    while captured.len() > 1 && captured.last().map_or(false, |line| is_comment_line(line)) {
        captured.pop();
    }

    Some(captured.join("\n"))
}

fn fallback_candidate(text: &str) -> &str {
    match text.find(COMMENT) {
        Some(pos) => text[..pos].trim(),
        None => text,
    }
}

fn strip_terminators(candidate: &str) -> &str {
    let mut body = candidate.trim();
    while let Some(rest) = body.strip_suffix(';') {
        body = rest.trim_end();
    }
    body.trim()
}
