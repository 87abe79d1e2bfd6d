//! Error taxonomy of the scoring pipeline.
//!
//! Every per-CAM failure is local: the handler logs it and goes back to
//! waiting for the next message. Only configuration errors terminate the
//! process.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QualityError {
    /// Malformed CAM payload at the boundary; the message is dropped.
    #[error("malformed CAM payload: {0}")]
    Decode(#[from] serde_json::Error),

    /// A decoded field violates its ETSI value range.
    #[error("CAM field out of range: {0}")]
    OutOfRange(&'static str),

    /// A cross-station update was attempted; no state is mutated.
    #[error("station identifier mismatch: expected {expected}, got {got}")]
    IdentityMismatch { expected: u32, got: u32 },

    /// An update arrived for a station that was never registered.
    #[error("station {0} is not registered")]
    UnknownStation(u32),

    /// The external sink rejected a batch result; the batch is dropped.
    #[error("score publication failed: {0}")]
    Persistence(String),

    /// A required environment variable is unset or empty at startup.
    #[error("missing required environment variable {0}")]
    ConfigMissing(&'static str),
}
