//! Crate-wide error taxonomy.
//!
//! Tagged variants rather than a single string, keeping wire-level reason
//! strings a presentation concern (rendered by [`RelayError::wire_reason`]).

use thiserror::Error;

/// Top-level error taxonomy for the admission pipeline (spec.md §7).
#[derive(Debug, Error)]
pub enum RelayError {
    /// Malformed event, missing mandatory tag, wrong field type.
    #[error("structural: {0}")]
    Structural(String),

    /// Id mismatch or signature verification failure.
    #[error("cryptographic: {0}")]
    Cryptographic(String),

    /// Schema absent, class absent, class definition malformed, expiry bounds.
    #[error("schema: {0}")]
    Schema(String),

    /// Chain resolution failed, scope violation, issuance-time invalidity.
    #[error("authority: {0}")]
    Authority(String),

    /// Verification determined the grant is expired.
    #[error("temporal: expired at {0}")]
    Temporal(i64),

    /// Verification determined the grant is revoked.
    #[error("revocation: {reason} at {revoked_at}")]
    Revocation { revoked_at: i64, reason: String },

    /// Storage unavailable, disk full, or other internal failure.
    #[error("transport/storage: {0}")]
    Transport(#[from] StoreError),
}

impl RelayError {
    /// Render the wire-level `OK` rejection reason (spec.md §6).
    pub fn wire_reason(&self) -> String {
        match self {
            RelayError::Structural(r) => format!("invalid: {r}"),
            RelayError::Cryptographic(r) => format!("invalid: {r}"),
            RelayError::Schema(r) => format!("invalid: {r}"),
            RelayError::Authority(r) => {
                format!("invalid: credential verification failed - {r}")
            }
            RelayError::Temporal(ts) => {
                format!("invalid: credential verification failed - EXPIRED at {ts}")
            }
            RelayError::Revocation { revoked_at, reason } => format!(
                "invalid: credential verification failed - REVOKED at {revoked_at} ({reason})"
            ),
            RelayError::Transport(_) => "error: could not save event".to_string(),
        }
    }
}

/// Storage-layer failures, never surfaced with internal detail to clients.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}
