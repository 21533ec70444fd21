//! Pipeline error taxonomy
//!
//! Only genuine faults live here. Business rejections (balance preconditions,
//! sentiment/trend mismatches, low profitability) are values, see
//! [`crate::types::GateReason`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The generative backend returned output that could not be parsed even
    /// after best-effort salvage. Callers degrade to an empty signal set and
    /// keep the batch alive.
    #[error("failed to parse structured backend output: {0}")]
    ExtractionParse(String),

    /// A generative-backend call failed after exhausting the retry budget.
    /// The enclosing call chain is abandoned and logged, never silently
    /// continued with stale data.
    #[error("backend call failed after {attempts} attempts: {message}")]
    Backend { attempts: u32, message: String },

    /// An audit or history write failed. Reported on the operational channel
    /// only; never propagated into the business flow.
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl PipelineError {
    /// True for failures worth retrying at the call site.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::Backend { .. })
    }
}
