//! Result sanitization stage
//!
//! Masks every result cell before anything downstream (model or user) can
//! see it. Column names pass through untouched - they already cleared the
//! schema sanitizer before the query was generated - but cell values can
//! still carry sensitive content regardless of which column they came from.

use crate::masking::SensitivePatternMasker;
use crate::pipeline::types::QueryResult;
use crate::policy::MaskPolicy;

pub struct ResultSanitizationStage<'a> {
    masker: SensitivePatternMasker<'a>,
}

impl<'a> ResultSanitizationStage<'a> {
    pub fn new(policy: &'a MaskPolicy) -> Self {
        Self {
            masker: SensitivePatternMasker::new(policy),
        }
    }

    /// Return a copy of the result with every cell masked.
    pub fn sanitize(&self, result: &QueryResult) -> QueryResult {
        QueryResult {
            columns: result.columns.clone(),
            rows: result
                .rows
                .iter()
                .map(|row| row.iter().map(|cell| self.masker.mask(cell)).collect())
                .collect(),
            truncated: result.truncated,
        }
    }

    /// Mask free text, used for driver error messages that may echo
    /// literal data values.
    pub fn sanitize_message(&self, message: &str) -> String {
        self.masker.mask(message)
    }
}
