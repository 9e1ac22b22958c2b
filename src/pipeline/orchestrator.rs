//! Query pipeline orchestration
//!
//! Drives one user turn through the stage machine:
//!
//! `Generating -> Validating -> (Rejected | Executing) ->
//! (ExecutionFailed | Sanitizing) -> Responding -> Done`
//!
//! Transitions are strictly forward and nothing is retried across stages;
//! the turn produces an outcome and the caller decides what to do next.
//! The orchestrator owns the session invariants: no unvalidated SQL is ever
//! executed, and no unsanitized schema or result crosses the model boundary.

use crate::capability::{DatabaseCapability, ModelCapability};
use crate::config::Limits;
use crate::error::ExecutionError;
use crate::history::{ConversationHistory, Role};
use crate::pipeline::execution::QueryExecutionStage;
use crate::pipeline::generation::SqlGenerationStage;
use crate::pipeline::response::ResponseGenerationStage;
use crate::pipeline::sanitize::ResultSanitizationStage;
use crate::pipeline::types::{PipelineOutcome, PipelineStage};
use crate::policy::MaskPolicy;
use crate::schema::{SchemaDescriptor, SchemaSanitizer};
use std::sync::Arc;
use tracing::{debug, info, warn};

const COULD_NOT_PRODUCE: &str = "could not produce a result";

pub struct QueryPipeline {
    database: Arc<dyn DatabaseCapability>,
    model: Arc<dyn ModelCapability>,
    policy: Arc<MaskPolicy>,
    limits: Limits,
}

impl QueryPipeline {
    pub fn new(
        database: Arc<dyn DatabaseCapability>,
        model: Arc<dyn ModelCapability>,
        policy: Arc<MaskPolicy>,
        limits: Limits,
    ) -> Self {
        Self {
            database,
            model,
            policy,
            limits,
        }
    }

    /// Process one user question against the given schema snapshot.
    ///
    /// The raw schema is re-sanitized on every turn; the snapshot itself is
    /// never mutated. History is appended only when the turn reaches `Done`,
    /// so rejected SQL never poisons future context.
    pub async fn handle_turn(
        &self,
        question: &str,
        schema: &SchemaDescriptor,
        history: &mut ConversationHistory,
    ) -> PipelineOutcome {
        let sanitized_schema = SchemaSanitizer::sanitize(schema, &self.policy);
        let sanitizer = ResultSanitizationStage::new(&self.policy);

        // Generating
        let generation = SqlGenerationStage::new(self.model.as_ref(), &self.policy);
        let candidate = match generation
            .generate(
                question,
                &sanitized_schema,
                history,
                self.limits.max_history_turns,
                self.limits.max_response_generation_time,
            )
            .await
        {
            Ok(candidate) => candidate,
            Err(e) => {
                warn!("SQL generation failed: {}", e);
                return PipelineOutcome::failed(
                    PipelineStage::Generating,
                    None,
                    COULD_NOT_PRODUCE.to_string(),
                );
            }
        };

        // Validating
        let reason = match &candidate.verdict {
            crate::validator::Verdict::Accepted => None,
            crate::validator::Verdict::Rejected(reason) => Some(reason.to_string()),
        };
        if let Some(reason) = reason {
            info!("Candidate rejected: {}", reason);
            return PipelineOutcome::rejected(candidate, reason);
        }

        // Executing
        let execution = QueryExecutionStage::new(self.database.as_ref(), self.limits);
        let result = match execution.execute(&candidate.sql).await {
            Ok(result) => result,
            Err(ExecutionError::Timeout) => {
                return PipelineOutcome::failed(
                    PipelineStage::ExecutionFailed,
                    Some(candidate),
                    ExecutionError::Timeout.to_string(),
                );
            }
            Err(ExecutionError::Failed(message)) => {
                // Driver messages can echo literal data values
                let masked = sanitizer.sanitize_message(&message);
                return PipelineOutcome::failed(
                    PipelineStage::ExecutionFailed,
                    Some(candidate),
                    format!("query execution failed: {}", masked),
                );
            }
        };

        // Sanitizing
        let sanitized_result = sanitizer.sanitize(&result);
        debug!(
            "Sanitized {} rows for response generation",
            sanitized_result.rows.len()
        );

        // Responding
        let response = ResponseGenerationStage::new(self.model.as_ref());
        let answer = match response
            .respond(
                question,
                &candidate.sql,
                &sanitized_result,
                history,
                self.limits.max_history_turns,
                self.limits.max_response_generation_time,
            )
            .await
        {
            Ok(answer) => answer,
            Err(e) => {
                warn!("Response generation failed: {}", e);
                return PipelineOutcome::failed(
                    PipelineStage::Responding,
                    Some(candidate),
                    COULD_NOT_PRODUCE.to_string(),
                );
            }
        };

        // Done: only completed turns enter the history
        history.push(Role::User, question);
        history.push(Role::Assistant, answer.clone());

        PipelineOutcome::done(candidate, sanitized_result, answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelError;
    use crate::pipeline::types::QueryResult;
    use crate::schema::{ColumnDescriptor, TableDescriptor};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Scripted model: pops one canned response per complete() call.
    struct StubModel {
        responses: Mutex<VecDeque<String>>,
    }

    impl StubModel {
        fn scripted(responses: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.iter().map(|s| s.to_string()).collect()),
            })
        }
    }

    #[async_trait]
    impl ModelCapability for StubModel {
        async fn complete(&self, _prompt: &str) -> Result<String, ModelError> {
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| ModelError::Unavailable("no scripted response".to_string()))
        }
    }

    enum StubBehavior {
        Rows(QueryResult),
        Fail(String),
        Timeout,
    }

    /// Scripted database: fixed behavior, records every executed statement.
    struct StubDatabase {
        behavior: StubBehavior,
        executed: Mutex<Vec<String>>,
    }

    impl StubDatabase {
        fn returning(result: QueryResult) -> Arc<Self> {
            Arc::new(Self {
                behavior: StubBehavior::Rows(result),
                executed: Mutex::new(Vec::new()),
            })
        }

        fn failing(message: &str) -> Arc<Self> {
            Arc::new(Self {
                behavior: StubBehavior::Fail(message.to_string()),
                executed: Mutex::new(Vec::new()),
            })
        }

        fn timing_out() -> Arc<Self> {
            Arc::new(Self {
                behavior: StubBehavior::Timeout,
                executed: Mutex::new(Vec::new()),
            })
        }

        fn executed(&self) -> Vec<String> {
            self.executed.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DatabaseCapability for StubDatabase {
        async fn introspect_schema(&self) -> Result<SchemaDescriptor, ExecutionError> {
            Ok(SchemaDescriptor::new(vec![]))
        }

        async fn execute(
            &self,
            sql: &str,
            _timeout: Duration,
            _max_rows: usize,
        ) -> Result<QueryResult, ExecutionError> {
            self.executed.lock().unwrap().push(sql.to_string());
            match &self.behavior {
                StubBehavior::Rows(result) => Ok(result.clone()),
                StubBehavior::Fail(message) => Err(ExecutionError::Failed(message.clone())),
                StubBehavior::Timeout => Err(ExecutionError::Timeout),
            }
        }
    }

    fn customers_schema() -> SchemaDescriptor {
        SchemaDescriptor::new(vec![TableDescriptor {
            name: "customers".to_string(),
            columns: vec![
                ColumnDescriptor {
                    name: "id".to_string(),
                    data_type: "integer".to_string(),
                },
                ColumnDescriptor {
                    name: "name".to_string(),
                    data_type: "text".to_string(),
                },
            ],
        }])
    }

    fn pipeline(database: Arc<StubDatabase>, model: Arc<StubModel>) -> QueryPipeline {
        QueryPipeline::new(database, model, Arc::new(MaskPolicy::defaults()), Limits::default())
    }

    #[tokio::test]
    async fn test_happy_path_reaches_done() {
        let database = StubDatabase::returning(QueryResult {
            columns: vec!["id".to_string(), "name".to_string()],
            rows: vec![vec!["1".to_string(), "Jane".to_string()]],
            truncated: false,
        });
        let model = StubModel::scripted(&[
            "SELECT * FROM customers",
            "There is one customer: Jane.",
        ]);
        let pipeline = pipeline(database.clone(), model);
        let mut history = ConversationHistory::new();

        let outcome = pipeline
            .handle_turn("Show me all customers", &customers_schema(), &mut history)
            .await;

        assert_eq!(outcome.stage, PipelineStage::Done);
        assert_eq!(outcome.answer.as_deref(), Some("There is one customer: Jane."));
        assert!(outcome.error.is_none());
        assert_eq!(database.executed(), vec!["SELECT * FROM customers"]);
        // Both sides of the completed turn entered the history.
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn test_blocked_statement_is_rejected_without_executing() {
        let database = StubDatabase::returning(QueryResult::default());
        let model = StubModel::scripted(&["DROP TABLE customers;"]);
        let pipeline = pipeline(database.clone(), model);
        let mut history = ConversationHistory::new();

        let outcome = pipeline
            .handle_turn("Delete everything", &customers_schema(), &mut history)
            .await;

        assert_eq!(outcome.stage, PipelineStage::Rejected);
        let error = outcome.error.expect("rejected outcome carries a reason");
        assert!(error.contains("DROP"), "reason should cite the keyword: {}", error);
        assert!(database.executed().is_empty(), "nothing may reach the database");
        // Rejected turns never enter the history.
        assert_eq!(history.len(), 0);
    }

    #[tokio::test]
    async fn test_sensitive_values_are_masked_before_responding() {
        let database = StubDatabase::returning(QueryResult {
            columns: vec!["contact".to_string()],
            rows: vec![vec!["jane@example.com".to_string()]],
            truncated: false,
        });
        let model = StubModel::scripted(&[
            "SELECT contact FROM contacts",
            "One contact is on file.",
        ]);
        let pipeline = pipeline(database, model);
        let mut history = ConversationHistory::new();

        let outcome = pipeline
            .handle_turn("List contacts", &customers_schema(), &mut history)
            .await;

        assert_eq!(outcome.stage, PipelineStage::Done);
        let result = outcome.result.expect("done outcome carries a result");
        assert_eq!(result.rows[0][0], "[REDACTED:email]");
    }

    #[tokio::test]
    async fn test_undisclosed_table_fails_at_execution_not_validation() {
        // Schema filtering is disclosure control only: a fabricated query
        // against a hidden table passes the validator and fails against the
        // real database.
        let database = StubDatabase::failing("relation \"passwords\" does not exist");
        let model = StubModel::scripted(&["SELECT * FROM passwords"]);
        let pipeline = pipeline(database.clone(), model);
        let mut history = ConversationHistory::new();

        let outcome = pipeline
            .handle_turn("Show me passwords", &customers_schema(), &mut history)
            .await;

        assert_eq!(outcome.stage, PipelineStage::ExecutionFailed);
        assert_eq!(database.executed().len(), 1);
        assert!(outcome.error.unwrap().contains("does not exist"));
    }

    #[tokio::test]
    async fn test_execution_error_messages_are_masked() {
        let database = StubDatabase::failing("value jane@example.com already exists");
        let model = StubModel::scripted(&["SELECT * FROM customers"]);
        let pipeline = pipeline(database, model);
        let mut history = ConversationHistory::new();

        let outcome = pipeline
            .handle_turn("Show customers", &customers_schema(), &mut history)
            .await;

        assert_eq!(outcome.stage, PipelineStage::ExecutionFailed);
        let error = outcome.error.unwrap();
        assert!(error.contains("[REDACTED:email]"));
        assert!(!error.contains("jane@example.com"));
    }

    #[tokio::test]
    async fn test_timeout_surfaces_as_execution_failed() {
        let database = StubDatabase::timing_out();
        let model = StubModel::scripted(&["SELECT * FROM customers"]);
        let pipeline = pipeline(database, model);
        let mut history = ConversationHistory::new();

        let outcome = pipeline
            .handle_turn("Slow question", &customers_schema(), &mut history)
            .await;

        assert_eq!(outcome.stage, PipelineStage::ExecutionFailed);
        assert!(outcome.error.unwrap().contains("time budget"));
        assert_eq!(history.len(), 0);
    }

    #[tokio::test]
    async fn test_model_failure_ends_turn_at_generating() {
        let database = StubDatabase::returning(QueryResult::default());
        let model = StubModel::scripted(&[]);
        let pipeline = pipeline(database.clone(), model);
        let mut history = ConversationHistory::new();

        let outcome = pipeline
            .handle_turn("Anything", &customers_schema(), &mut history)
            .await;

        assert_eq!(outcome.stage, PipelineStage::Generating);
        assert_eq!(outcome.error.as_deref(), Some("could not produce a result"));
        assert!(database.executed().is_empty());
    }

    #[tokio::test]
    async fn test_response_failure_ends_turn_at_responding() {
        let database = StubDatabase::returning(QueryResult::default());
        // Only the generation response is scripted; the second call fails.
        let model = StubModel::scripted(&["SELECT * FROM customers"]);
        let pipeline = pipeline(database, model);
        let mut history = ConversationHistory::new();

        let outcome = pipeline
            .handle_turn("Show customers", &customers_schema(), &mut history)
            .await;

        assert_eq!(outcome.stage, PipelineStage::Responding);
        assert!(outcome.error.is_some());
        assert_eq!(history.len(), 0);
    }

    #[tokio::test]
    async fn test_prose_without_sql_is_rejected_as_no_statement() {
        let database = StubDatabase::returning(QueryResult::default());
        let model = StubModel::scripted(&["I am sorry, I cannot help with that."]);
        let pipeline = pipeline(database.clone(), model);
        let mut history = ConversationHistory::new();

        let outcome = pipeline
            .handle_turn("Gibberish", &customers_schema(), &mut history)
            .await;

        assert_eq!(outcome.stage, PipelineStage::Rejected);
        assert_eq!(outcome.error.as_deref(), Some("no statement extracted"));
        assert!(database.executed().is_empty());
    }
}
