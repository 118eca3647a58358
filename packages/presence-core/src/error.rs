//! Validation errors raised by the presence data model.
//!
//! These are the only errors the engine surfaces to adapters as "your
//! request was malformed" rather than "storage failed" or "not found".

use thiserror::Error;

/// Errors raised while constructing or validating a [`crate::Status`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PresenceError {
    /// `expires_s` exceeded [`crate::MAX_EXPIRES`].
    #[error("expire limit exceeded: requested {requested}s, limit is {limit}s")]
    ExpireLimitExceeded {
        /// The configured ceiling.
        limit: u32,
        /// What the caller asked for.
        requested: u32,
    },

    /// `presence_doc.status` was not `"online"` or `"offline"`.
    #[error("unknown status: {status:?}")]
    UnknownStatus {
        /// The offending value, if the field was present at all.
        status: Option<String>,
    },

    /// `resource` was empty.
    #[error("resource identifier must not be empty")]
    EmptyResource,

    /// `expires_s` was zero or negative.
    ///
    /// The source left this case unvalidated in `updateStatus`; this spec
    /// resolves the open question by rejecting non-positive values in both
    /// `Put` and `Update`.
    #[error("expires_s must be positive, got {expires_s}")]
    NonPositiveExpiry {
        /// The rejected value.
        expires_s: i64,
    },
}
