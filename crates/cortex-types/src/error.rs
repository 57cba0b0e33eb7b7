//! Crate-wide error type.
//!
//! Per the error-handling design, `CoreError` is reserved for conditions a
//! stage function cannot recover from by folding a trace entry into the
//! returned snapshot — malformed serialized state, a poisoned lock. Every
//! *expected* failure mode (parse errors, guardrail rejections, timeouts,
//! rejected approvals) is represented inside [`crate::BrainState`] itself,
//! never as an `Err`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to (de)serialize brain snapshot: {0}")]
    Serialization(String),

    #[error("snapshot failed validation: {0}")]
    InvalidSnapshot(String),

    #[error("internal lock was poisoned: {0}")]
    LockPoisoned(String),
}
