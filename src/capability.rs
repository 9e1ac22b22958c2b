//! External capability interfaces
//!
//! The pipeline consumes exactly two collaborators: something that can run a
//! read query, and something that can turn a prompt into text. Both are
//! narrow trait objects so tests can substitute deterministic stubs and so
//! no pipeline code ever depends on a concrete driver or provider.

use crate::error::{ExecutionError, ModelError};
use crate::pipeline::types::QueryResult;
use crate::schema::SchemaDescriptor;
use async_trait::async_trait;
use std::time::Duration;

/// "Execute read query, get rows" - the database as seen by the pipeline.
///
/// Implementations enforce the timeout themselves and must cancel the
/// in-flight query server-side when the budget expires; the pipeline never
/// leaves an orphaned long-running query behind.
#[async_trait]
pub trait DatabaseCapability: Send + Sync {
    /// Snapshot the current schema of the connected database.
    async fn introspect_schema(&self) -> Result<SchemaDescriptor, ExecutionError>;

    /// Run a single validated statement, capped at `max_rows` rows.
    async fn execute(
        &self,
        sql: &str,
        timeout: Duration,
        max_rows: usize,
    ) -> Result<QueryResult, ExecutionError>;
}

/// "Given a prompt, return text" - the model as seen by the pipeline.
///
/// No retry policy is assumed here; retries, if any, belong to whoever
/// constructs the capability.
#[async_trait]
pub trait ModelCapability: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, ModelError>;
}
