//! The [`Status`] record: one concurrent presence report for a resource.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PresenceError;

/// Upper bound on `expires_s`, in seconds. See spec §4.1.
pub const MAX_EXPIRES: u32 = 3900;

/// The two values `presence_doc.status` is allowed to take.
const ALLOWED_STATUSES: [&str; 2] = ["online", "offline"];

/// One status report: an opaque presence document, an absolute expiry, and
/// a priority used to break ties between concurrent reports on the same
/// resource (see [`crate::aggregate::aggregate_status`]).
///
/// Serializes to `{"presence": <doc>, "expiresat": <float>, "priority": <int>}`
/// per spec §6.2 -- the wire shape of the `res:<resource>` hash fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    /// Opaque JSON object. Only `.status` is inspected by the engine; every
    /// other field passes through untouched.
    #[serde(rename = "presence")]
    pub presence_doc: Value,
    /// Absolute wall-clock seconds (double precision) when this status
    /// becomes stale.
    #[serde(rename = "expiresat")]
    pub expires_at: f64,
    /// Higher wins in aggregation. Default 0.
    #[serde(default)]
    pub priority: i32,
}

impl Status {
    /// Builds a `Status`, validating `presence_doc.status`.
    ///
    /// # Errors
    ///
    /// Returns [`PresenceError::UnknownStatus`] if `presence_doc` has no
    /// `status` field, or the field is not `"online"`/`"offline"`.
    pub fn new(presence_doc: Value, expires_at: f64, priority: i32) -> Result<Self, PresenceError> {
        validate_presence_doc(&presence_doc)?;
        Ok(Self {
            presence_doc,
            expires_at,
            priority,
        })
    }

    /// Whether this status is still live at the given wall-clock time.
    #[must_use]
    pub fn is_expired(&self, now: f64) -> bool {
        self.expires_at < now
    }

    /// The `"status"` field of the presence document, e.g. `"online"`.
    ///
    /// Only present on validated statuses, so this never panics on a
    /// `Status` built through [`Status::new`].
    #[must_use]
    pub fn status_str(&self) -> &str {
        self.presence_doc
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("offline")
    }
}

/// Validates that `doc.status` is one of the allowed presence values.
///
/// # Errors
///
/// Returns [`PresenceError::UnknownStatus`] if the field is missing or not
/// one of `"online"`/`"offline"`.
pub fn validate_presence_doc(doc: &Value) -> Result<(), PresenceError> {
    match doc.get("status").and_then(Value::as_str) {
        Some(s) if ALLOWED_STATUSES.contains(&s) => Ok(()),
        Some(other) => Err(PresenceError::UnknownStatus {
            status: Some(other.to_string()),
        }),
        None => Err(PresenceError::UnknownStatus { status: None }),
    }
}

/// Validates `expires_s` against the engine's configured ceiling and the
/// zero/negative rejection decided in spec §9's open question.
///
/// # Errors
///
/// Returns [`PresenceError::NonPositiveExpiry`] or
/// [`PresenceError::ExpireLimitExceeded`].
pub fn validate_expires(expires_s: i64, limit: u32) -> Result<(), PresenceError> {
    if expires_s <= 0 {
        return Err(PresenceError::NonPositiveExpiry { expires_s });
    }
    // expires_s > 0 here, so this cast is lossless up to i64::MAX.
    #[allow(clippy::cast_sign_loss)]
    let requested = expires_s as u32;
    if expires_s > i64::from(limit) {
        return Err(PresenceError::ExpireLimitExceeded { limit, requested });
    }
    Ok(())
}

/// The aggregated view returned when a resource has no live statuses.
#[must_use]
pub fn offline_sentinel() -> Value {
    serde_json::json!({ "status": "offline" })
}
