//! Error kinds surfaced across the verification pipeline.
//!
//! Per the propagation policy: most stages recover locally and degrade the
//! result toward [`crate::types::Status::Unknown`] instead of raising. Only
//! the handful of variants here ever reach a caller of [`crate::Client::verify`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("missing or malformed email address")]
    InputError,

    #[error("too many concurrent verifications for this domain")]
    AdmissionRejected,

    #[error("unexpected internal failure: {0}")]
    InternalError(String),
}

impl VerifyError {
    /// Internal-boundary HTTP status, per spec §6. The HTTP router itself is
    /// out of scope for this crate; this is exposed so that collaborator can
    /// map errors without re-deriving the table.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::InputError => 400,
            Self::AdmissionRejected => 429,
            Self::InternalError(_) => 500,
        }
    }
}

/// Errors local to a single resolver/backend call. These never escape their
/// stage; they are folded into the pipeline's degrade-to-unknown behavior by
/// the caller.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("backend returned an unexpected response: {0}")]
    Protocol(String),
}
