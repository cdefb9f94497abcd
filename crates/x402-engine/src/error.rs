use thiserror::Error;

use crate::registry::StrategyError;

/// Failures while decoding a wire payload. None of these change engine state.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },

    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("structurally invalid authorization: {0}")]
    Structural(String),
}

/// Engine-level faults. Verdicts (`Invalid`, `Failed`) are ordinary return
/// values; these are the cases where the engine could not run a check at all.
#[derive(Debug, Error)]
pub enum FacilitatorError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Strategy(#[from] StrategyError),

    #[error("clock error: {0}")]
    Clock(String),
}
