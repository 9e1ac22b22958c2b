//! Security-Gated Query Pipeline
//!
//! One user turn flows through four stages, each with a single job:
//!
//! 1. **Generation**: sanitized schema + history + question -> SQL candidate
//! 2. **Execution**: accepted SQL -> bounded tabular result
//! 3. **Sanitization**: result cells -> masked result cells
//! 4. **Response**: masked result -> natural-language answer
//!
//! The orchestrator chains them and enforces that no unvalidated SQL is
//! executed and no unsanitized data crosses the model boundary.

pub mod execution;
pub mod generation;
pub mod orchestrator;
pub mod response;
pub mod sanitize;
pub mod types;

// Re-export main types for convenient access
pub use orchestrator::QueryPipeline;
pub use types::{PipelineOutcome, PipelineStage, QueryResult, SqlCandidate};
