//! The engine's error type: typed validation failures plus an opaque
//! storage-failure variant, mirroring the teacher's split between
//! `thiserror` for domain errors and `anyhow` at I/O boundaries (spec §7).

use thiserror::Error;

/// Errors a [`crate::engine::PresenceEngine`] call can fail with.
///
/// Not-found is deliberately *not* a variant here: per spec §7 it is not an
/// error but a sentinel (`Option::None` / an empty `Vec`) returned from the
/// relevant call.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A presence-document or expiry validation failure (spec §3, §4.1).
    #[error(transparent)]
    Validation(#[from] presence_core::PresenceError),

    /// The storage backend failed. Propagated verbatim; the engine does not
    /// retry (spec §7: "the storage backend handles its own reconnection").
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}
