//! Query execution stage
//!
//! Runs an accepted statement through the database capability under the
//! configured row cap and time budget. This stage never sees an unvalidated
//! candidate; the orchestrator only hands it accepted SQL.

use crate::capability::DatabaseCapability;
use crate::config::Limits;
use crate::error::ExecutionError;
use crate::pipeline::types::QueryResult;
use tracing::{debug, warn};

pub struct QueryExecutionStage<'a> {
    database: &'a dyn DatabaseCapability,
    limits: Limits,
}

impl<'a> QueryExecutionStage<'a> {
    pub fn new(database: &'a dyn DatabaseCapability, limits: Limits) -> Self {
        Self { database, limits }
    }

    pub async fn execute(&self, sql: &str) -> Result<QueryResult, ExecutionError> {
        let result = self
            .database
            .execute(
                sql,
                self.limits.max_query_execution_time,
                self.limits.max_query_results,
            )
            .await;

        match &result {
            Ok(rows) => debug!(
                "Query returned {} rows (truncated: {})",
                rows.rows.len(),
                rows.truncated
            ),
            Err(ExecutionError::Timeout) => warn!("Query execution timed out"),
            Err(ExecutionError::Failed(_)) => warn!("Query execution failed"),
        }

        result
    }
}
