//! Application state management
//!
//! Contains shared state accessible across all handlers. The policy and the
//! schema snapshot are read-only from the handlers' point of view (the
//! snapshot is swapped wholesale on refresh, never mutated in place), so
//! they can be shared freely across concurrent sessions.

use crate::capability::DatabaseCapability;
use crate::config::Limits;
use crate::pipeline::QueryPipeline;
use crate::policy::MaskPolicy;
use crate::schema::SchemaDescriptor;
use crate::session::SessionManager;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Application state shared across all handlers
pub struct AppState {
    /// Process-wide masking policy (immutable after load)
    pub policy: Arc<MaskPolicy>,

    /// Per-turn resource limits
    pub limits: Limits,

    /// Database capability, also used for schema refresh
    pub database: Arc<dyn DatabaseCapability>,

    /// The turn pipeline itself
    pub pipeline: QueryPipeline,

    /// Current raw schema snapshot, swapped on refresh
    pub schema: RwLock<Arc<SchemaDescriptor>>,

    /// Live chat sessions
    pub sessions: SessionManager,
}

impl AppState {
    pub fn new(
        database: Arc<dyn DatabaseCapability>,
        model: Arc<dyn crate::capability::ModelCapability>,
        policy: Arc<MaskPolicy>,
        limits: Limits,
        schema: SchemaDescriptor,
    ) -> Self {
        let pipeline = QueryPipeline::new(database.clone(), model, policy.clone(), limits);

        Self {
            policy,
            limits,
            database,
            pipeline,
            schema: RwLock::new(Arc::new(schema)),
            sessions: SessionManager::new(),
        }
    }

    /// The snapshot used for the next turn.
    pub async fn current_schema(&self) -> Arc<SchemaDescriptor> {
        self.schema.read().await.clone()
    }

    /// Swap in a freshly introspected snapshot.
    pub async fn replace_schema(&self, schema: SchemaDescriptor) {
        *self.schema.write().await = Arc::new(schema);
    }
}

/// Type alias for shared state
pub type SharedState = Arc<AppState>;
