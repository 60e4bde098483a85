use aiql::prompt::{build, COMPLETION_CUE};
use aiql::{extract, Extraction, FallbackPolicy, NoSqlReason, SqlExtractor};

fn sql(text: &str) -> Extraction {
    Extraction::Sql(text.to_string())
}

/// Completions as they come back from small local models.
#[test]
fn test_realistic_completions() {
    let cases = [
        (
            " SELECT AVG(duration_minutes) FROM calls WHERE origin_country = 'Germany'\n",
            "SELECT AVG(duration_minutes) FROM calls WHERE origin_country = 'Germany';",
        ),
        (
            "```sql\nSELECT origin_country, COUNT(*) AS outgoing\nFROM calls\nWHERE call_type = 'outgoing'\nGROUP BY origin_country\nORDER BY outgoing DESC\nLIMIT 1;\n```\n\nExplanation: groups outgoing calls by country.",
            "SELECT origin_country, COUNT(*) AS outgoing\nFROM calls\nWHERE call_type = 'outgoing'\nGROUP BY origin_country\nORDER BY outgoing DESC\nLIMIT 1;",
        ),
        (
            "Here's the SQL query:\n\n```\nSELECT SUM(duration_minutes) FROM calls WHERE call_type = 'incoming' AND origin_country = 'Spain';\n```",
            "SELECT SUM(duration_minutes) FROM calls WHERE call_type = 'incoming' AND origin_country = 'Spain';",
        ),
        (
            "<s> MySQL Query: SELECT COUNT(*) FROM calls WHERE origin_country = 'USA';;\nNote: USA is stored in capitals.",
            "SELECT COUNT(*) FROM calls WHERE origin_country = 'USA';",
        ),
    ];

    for (raw, expected) in cases {
        assert_eq!(extract(raw), sql(expected), "raw completion: {:?}", raw);
    }
}

#[test]
fn test_documented_completions() {
    assert_eq!(extract("```sql\nSELECT 1\n```"), sql("SELECT 1;"));
    assert_eq!(extract("MySQL Query:\nSELECT 1"), sql("SELECT 1;"));
    assert_eq!(extract("   "), Extraction::NoSql(NoSqlReason::EmptyCompletion));
    assert_eq!(
        extract("SELECT * FROM calls\nExplanation: counts rows"),
        sql("SELECT * FROM calls;")
    );
}

#[test]
fn test_fallback_policies_diverge_only_without_keyword() {
    let lenient = SqlExtractor::new(FallbackPolicy::Lenient);
    let strict = SqlExtractor::new(FallbackPolicy::Strict);

    assert_eq!(lenient.extract("I cannot help with that"), sql("I cannot help with that;"));
    assert_eq!(
        strict.extract("I cannot help with that"),
        Extraction::NoSql(NoSqlReason::NoStatementFound)
    );

    let raw = "Sure.\nSELECT 1";
    assert_eq!(lenient.extract(raw), strict.extract(raw));
}

#[test]
fn test_extract_output_is_fixed_point() {
    let raw = "Here is the SQL query:\n```mysql\nWITH recent AS (\n  SELECT * FROM calls WHERE timestamp > NOW() - INTERVAL 7 DAY\n)\nSELECT COUNT(*) FROM recent;\n```";
    let first = extract(raw);
    let text = first.sql().unwrap().to_string();
    assert_eq!(extract(&text), first);
}

#[test]
fn test_prompt_restated_in_completion() {
    // Some models echo the prompt before answering on a new line.
    let prompt = build("Table: calls(id)", "How many calls?");
    let raw = format!("{}\nSELECT COUNT(*) FROM calls", prompt);
    assert!(prompt.as_str().ends_with(COMPLETION_CUE));
    assert_eq!(extract(&raw), sql("SELECT COUNT(*) FROM calls;"));
}
