//! SQL generation stage
//!
//! Composes the sanitized schema, the recent history window and the current
//! question into a deterministic prompt, invokes the model capability and
//! extracts a single statement from whatever came back. Extraction and
//! validation are coupled here: no caller ever sees an unvalidated
//! candidate.

use crate::capability::ModelCapability;
use crate::error::ModelError;
use crate::history::ConversationHistory;
use crate::pipeline::types::SqlCandidate;
use crate::policy::MaskPolicy;
use crate::schema::SchemaDescriptor;
use crate::validator::{RejectReason, SqlValidator, Verdict};
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;
use tracing::debug;

/// First token that can plausibly open a SQL statement. Deliberately wider
/// than the allow-list: a DROP the model hallucinated must still be
/// extracted so the validator can reject it on record.
static STATEMENT_START: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(SELECT|WITH|INSERT|UPDATE|DELETE|DROP|CREATE|ALTER|TRUNCATE|GRANT|REVOKE|EXEC|EXECUTE|EXPLAIN|SHOW)\b",
    )
    .expect("statement-start pattern must compile")
});

/// Keywords that appear inside a statement body. Several statement openers
/// (WITH, SHOW, CREATE, UPDATE) are ordinary English words; a mid-line match
/// only counts as SQL when something statement-shaped follows it.
static STATEMENT_BODY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(SELECT|FROM|TABLE|INTO|VALUES|JOIN)\b")
        .expect("statement-body pattern must compile")
});

pub struct SqlGenerationStage<'a> {
    model: &'a dyn ModelCapability,
    policy: &'a MaskPolicy,
}

impl<'a> SqlGenerationStage<'a> {
    pub fn new(model: &'a dyn ModelCapability, policy: &'a MaskPolicy) -> Self {
        Self { model, policy }
    }

    /// Produce a validated candidate for the question.
    ///
    /// Returns `Err` only for model failures; an unextractable or
    /// policy-violating statement is a rejected candidate, not an error.
    pub async fn generate(
        &self,
        question: &str,
        sanitized_schema: &SchemaDescriptor,
        history: &ConversationHistory,
        max_history_turns: usize,
        budget: Duration,
    ) -> Result<SqlCandidate, ModelError> {
        let prompt = build_prompt(question, sanitized_schema, history, max_history_turns);

        let response = match tokio::time::timeout(budget, self.model.complete(&prompt)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ModelError::Unavailable(
                    "completion exceeded the time budget".to_string(),
                ));
            }
        };

        let candidate = match extract_statement(&response) {
            Some(sql) => {
                let verdict = SqlValidator::validate(&sql, self.policy);
                SqlCandidate { sql, verdict }
            }
            None => SqlCandidate {
                sql: String::new(),
                verdict: Verdict::Rejected(RejectReason::EmptyStatement),
            },
        };

        debug!(
            "Generated candidate ({} chars, accepted: {})",
            candidate.sql.len(),
            candidate.is_accepted()
        );
        Ok(candidate)
    }
}

/// Deterministic generation prompt.
fn build_prompt(
    question: &str,
    schema: &SchemaDescriptor,
    history: &ConversationHistory,
    max_history_turns: usize,
) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "You are a data analyst. Based on the table schema below, write a SQL query \
         that would answer the user's question.\n\n",
    );
    prompt.push_str("<SCHEMA>\n");
    prompt.push_str(&schema.to_prompt_text());
    prompt.push_str("</SCHEMA>\n\n");

    if !history.is_empty() {
        prompt.push_str("Conversation so far:\n");
        prompt.push_str(&history.to_prompt_text(max_history_turns));
        prompt.push('\n');
    }

    prompt.push_str(
        "Write only the SQL query and nothing else. Do not wrap the SQL query in any \
         other text, not even backticks.\n\n",
    );
    prompt.push_str("Question: ");
    prompt.push_str(question);
    prompt.push_str("\nSQL Query:\n");
    prompt
}

/// Pull the first statement-shaped substring out of a model response,
/// trimming surrounding prose and markdown fencing.
///
/// A keyword match mid-sentence is only taken as a statement opener when the
/// text after it contains further statement keywords; "I cannot help with
/// that." must come back as no statement, not as `with that.`.
fn extract_statement(response: &str) -> Option<String> {
    // Prefer a fenced block when the model ignored the no-fencing instruction
    let body = fenced_block(response).unwrap_or(response);

    for m in STATEMENT_START.find_iter(body) {
        let tail = &body[m.start()..];

        // Statement runs to the first separator outside string literals,
        // or to the end of the text
        let end = statement_end(tail);
        let mut sql = tail[..end].trim().to_string();

        // A fence inside the cut means the statement ended before it
        if let Some(fence) = sql.find("```") {
            sql.truncate(fence);
            sql = sql.trim().to_string();
        }

        if sql.is_empty() {
            continue;
        }

        let at_line_start = body[..m.start()]
            .chars()
            .rev()
            .take_while(|c| *c != '\n')
            .all(char::is_whitespace);
        let rest = &sql[m.as_str().len()..];

        if at_line_start || STATEMENT_BODY.is_match(rest) {
            return Some(sql);
        }
    }

    None
}

/// Byte offset one past the statement's terminating `;`, skipping
/// separators inside single-quoted literals (with `''` escapes).
fn statement_end(tail: &str) -> usize {
    let bytes = tail.as_bytes();
    let mut in_literal = false;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\'' => {
                if in_literal && bytes.get(i + 1) == Some(&b'\'') {
                    i += 1;
                } else {
                    in_literal = !in_literal;
                }
            }
            b';' if !in_literal => return i + 1,
            _ => {}
        }
        i += 1;
    }

    tail.len()
}

/// Content of the first ``` fenced block, language tag stripped.
fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_open = &text[open + 3..];
    let close = after_open.find("```")?;
    let block = &after_open[..close];

    // Drop a language tag like "sql" on the opening line
    match block.split_once('\n') {
        Some((first, rest)) if first.trim().chars().all(|c| c.is_ascii_alphanumeric()) => Some(rest),
        _ => Some(block),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_extracts_bare_statement() {
        assert_eq!(
            extract_statement("SELECT * FROM customers"),
            Some("SELECT * FROM customers".to_string())
        );
    }

    #[test]
    fn test_extracts_from_fenced_markdown() {
        let response = "Here is the query:\n```sql\nSELECT id FROM orders;\n```\nHope that helps!";
        assert_eq!(
            extract_statement(response),
            Some("SELECT id FROM orders;".to_string())
        );
    }

    #[test]
    fn test_extracts_from_surrounding_prose() {
        let response = "Sure! The query you want is SELECT name FROM artists; let me know.";
        assert_eq!(
            extract_statement(response),
            Some("SELECT name FROM artists;".to_string())
        );
    }

    #[test]
    fn test_extracts_hallucinated_drop_for_the_validator() {
        assert_eq!(
            extract_statement("DROP TABLE customers;"),
            Some("DROP TABLE customers;".to_string())
        );
    }

    #[test]
    fn test_no_statement_yields_none() {
        assert_eq!(extract_statement("I cannot answer that question."), None);
        assert_eq!(extract_statement(""), None);
    }

    #[test]
    fn test_refusal_prose_is_not_mistaken_for_sql() {
        // "with", "show" and "create" are ordinary English words; a refusal
        // must not be extracted as a statement.
        assert_eq!(
            extract_statement("I am sorry, I cannot help with that."),
            None
        );
        assert_eq!(
            extract_statement("I can show you the schema if you create a session first."),
            None
        );
    }

    #[test]
    fn test_semicolon_inside_literal_does_not_split_statement() {
        assert_eq!(
            extract_statement("SELECT * FROM notes WHERE body = 'a;b'"),
            Some("SELECT * FROM notes WHERE body = 'a;b'".to_string())
        );
        assert_eq!(
            extract_statement("SELECT * FROM notes WHERE body = 'a;b'; trailing prose"),
            Some("SELECT * FROM notes WHERE body = 'a;b';".to_string())
        );
    }

    #[test]
    fn test_prompt_contains_schema_history_and_question() {
        let schema = SchemaDescriptor::new(vec![crate::schema::TableDescriptor {
            name: "orders".to_string(),
            columns: vec![crate::schema::ColumnDescriptor {
                name: "id".to_string(),
                data_type: "integer".to_string(),
            }],
        }]);
        let mut history = ConversationHistory::new();
        history.push(crate::history::Role::User, "earlier question");

        let prompt = build_prompt("how many orders?", &schema, &history, 5);
        assert!(prompt.contains("Table orders (id integer)"));
        assert!(prompt.contains("User: earlier question"));
        assert!(prompt.contains("Question: how many orders?"));
    }

    #[test]
    fn test_prompt_history_respects_cap() {
        let schema = SchemaDescriptor::new(vec![]);
        let mut history = ConversationHistory::new();
        for i in 0..20 {
            history.push(crate::history::Role::User, format!("question {}", i));
        }

        let prompt = build_prompt("latest", &schema, &history, 3);
        assert!(!prompt.contains("question 16"));
        assert!(prompt.contains("question 17"));
        assert!(prompt.contains("question 19"));
    }
}
