//! Pipeline data types
//!
//! The per-turn artifacts: the SQL candidate with its verdict, the bounded
//! tabular result, and the outcome handed back to the caller.

use crate::validator::Verdict;
use serde::{Deserialize, Serialize};

/// Model-produced SQL together with its validation verdict.
///
/// A candidate is never executed while its verdict is anything other than
/// accepted; construction couples extraction and validation so no caller can
/// hold an unvalidated candidate by accident.
#[derive(Debug, Clone)]
pub struct SqlCandidate {
    pub sql: String,
    pub verdict: Verdict,
}

impl SqlCandidate {
    pub fn is_accepted(&self) -> bool {
        self.verdict.is_accepted()
    }
}

impl Serialize for SqlCandidate {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("SqlCandidate", 3)?;
        state.serialize_field("sql", &self.sql)?;
        match &self.verdict {
            Verdict::Accepted => {
                state.serialize_field("accepted", &true)?;
                state.serialize_field("reason", &Option::<String>::None)?;
            }
            Verdict::Rejected(reason) => {
                state.serialize_field("accepted", &false)?;
                state.serialize_field("reason", &Some(reason.to_string()))?;
            }
        }
        state.end()
    }
}

/// Bounded tabular query result.
///
/// Rows are ordered string cells aligned with `columns`; `truncated` is set
/// whenever the row cap cut additional rows, so the caller always knows the
/// result is partial.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub truncated: bool,
}

impl QueryResult {
    /// Render the result as the literal-data block used in prompts.
    pub fn to_table_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.columns.join("\t"));
        out.push('\n');
        for row in &self.rows {
            out.push_str(&row.join("\t"));
            out.push('\n');
        }
        if self.truncated {
            out.push_str("(additional rows truncated)\n");
        }
        out
    }
}

/// How far a turn progressed through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Generating,
    Validating,
    Rejected,
    Executing,
    ExecutionFailed,
    Sanitizing,
    Responding,
    Done,
}

impl PipelineStage {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineStage::Rejected | PipelineStage::ExecutionFailed | PipelineStage::Done
        )
    }
}

/// Everything the caller gets back from one turn.
///
/// Constructed fresh per turn and never mutated afterwards. Exactly one of
/// `answer` and `error` is populated.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOutcome {
    pub stage: PipelineStage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate: Option<SqlCandidate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<QueryResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PipelineOutcome {
    pub fn done(candidate: SqlCandidate, result: QueryResult, answer: String) -> Self {
        Self {
            stage: PipelineStage::Done,
            candidate: Some(candidate),
            result: Some(result),
            answer: Some(answer),
            error: None,
        }
    }

    pub fn rejected(candidate: SqlCandidate, reason: String) -> Self {
        Self {
            stage: PipelineStage::Rejected,
            candidate: Some(candidate),
            result: None,
            answer: None,
            error: Some(reason),
        }
    }

    pub fn failed(stage: PipelineStage, candidate: Option<SqlCandidate>, error: String) -> Self {
        Self {
            stage,
            candidate,
            result: None,
            answer: None,
            error: Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_table_text_flags_truncation() {
        let result = QueryResult {
            columns: vec!["id".to_string(), "name".to_string()],
            rows: vec![vec!["1".to_string(), "a".to_string()]],
            truncated: true,
        };
        let text = result.to_table_text();
        assert!(text.contains("id\tname"));
        assert!(text.contains("(additional rows truncated)"));
    }

    #[test]
    fn test_terminal_stages() {
        assert!(PipelineStage::Done.is_terminal());
        assert!(PipelineStage::Rejected.is_terminal());
        assert!(PipelineStage::ExecutionFailed.is_terminal());
        assert!(!PipelineStage::Executing.is_terminal());
        assert!(!PipelineStage::Generating.is_terminal());
    }

    #[test]
    fn test_outcome_always_carries_answer_or_error() {
        let candidate = SqlCandidate {
            sql: "SELECT * FROM t".to_string(),
            verdict: crate::validator::Verdict::Accepted,
        };
        let done = PipelineOutcome::done(candidate.clone(), QueryResult::default(), "ok".to_string());
        assert!(done.answer.is_some() && done.error.is_none());

        let rejected = PipelineOutcome::rejected(candidate, "nope".to_string());
        assert!(rejected.answer.is_none() && rejected.error.is_some());
    }

    #[test]
    fn test_candidate_serializes_verdict() {
        let candidate = SqlCandidate {
            sql: "SELECT 1".to_string(),
            verdict: crate::validator::Verdict::Rejected(
                crate::validator::RejectReason::NoTableReference,
            ),
        };
        let json = serde_json::to_value(&candidate).unwrap();
        assert_eq!(json["accepted"], false);
        assert_eq!(json["reason"], "statement references no tables");
    }
}
