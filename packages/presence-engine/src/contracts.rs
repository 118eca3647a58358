//! DTOs consumed by the (unimplemented) HTTP and AMQP adapters (spec §6.1,
//! §6.3, component F). Plain serde types, no transport code.

use serde::{Deserialize, Serialize};

/// The uniform HTTP response envelope: `{"status": "ok"|"failure", "reason": ..., "result": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// `"ok"` or `"failure"`.
    pub status: &'static str,
    /// Human-readable outcome, e.g. `"Success"` or a validation diagnostic.
    pub reason: String,
    /// Present on success; omitted on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
}

impl<T> ApiResponse<T> {
    /// Builds a success envelope.
    pub fn ok(reason: impl Into<String>, result: T) -> Self {
        Self {
            status: "ok",
            reason: reason.into(),
            result: Some(result),
        }
    }

    /// Builds a failure envelope with no result payload.
    #[must_use]
    pub fn failure(reason: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            status: "failure",
            reason: reason.into(),
            result: None,
        }
    }
}

/// Request body for `PUT /presence/<resource>[/<tag>]` (spec §6.1).
///
/// `expires` is required, unlike `priority` and `tag`, which fall back to
/// the engine's defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutRequestBody {
    /// Opaque presence document; only `.status` is validated by the engine.
    pub presence: serde_json::Value,
    /// Seconds until expiry.
    pub expires: i64,
    /// Aggregation priority; defaults to 0.
    #[serde(default)]
    pub priority: i32,
    /// Caller-assigned tag; generated if absent. Only meaningful in the
    /// bulk `POST /presence` body -- single-resource `PUT` takes the tag
    /// from the path instead.
    #[serde(default)]
    pub tag: Option<String>,
}

/// One entry of the bulk-`Put` request body: `{resource: {...}, ...}` (spec §6.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkPutEntry {
    /// The resource this entry targets.
    pub resource: String,
    /// The same fields a single `PutRequestBody` carries.
    #[serde(flatten)]
    pub body: PutRequestBody,
}

/// The AMQP notification shape: a two-element JSON array
/// `[resource, {"presence": {"status": ...}}]` (spec §6.3), grounded in
/// `original_source`'s `json.dumps([resource, {'presence': {'status': status}}])`.
#[derive(Debug, Clone, PartialEq)]
pub struct AmqpPresenceChange {
    /// The resource whose aggregated view changed.
    pub resource: String,
    /// The new aggregated `presence_doc`.
    pub view: serde_json::Value,
}

impl Serialize for AmqpPresenceChange {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeSeq;
        let status = self
            .view
            .get("status")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("offline");
        let mut seq = serializer.serialize_seq(Some(2))?;
        seq.serialize_element(&self.resource)?;
        seq.serialize_element(&serde_json::json!({ "presence": { "status": status } }))?;
        seq.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_response_serializes_result() {
        let response = ApiResponse::ok("Success", serde_json::json!({"tag": "T1"}));
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"status": "ok", "reason": "Success", "result": {"tag": "T1"}})
        );
    }

    #[test]
    fn failure_response_omits_result() {
        let response: ApiResponse<()> = ApiResponse::failure("Not Found");
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value, serde_json::json!({"status": "failure", "reason": "Not Found"}));
    }

    #[test]
    fn put_request_body_defaults_priority_and_tag() {
        let body: PutRequestBody =
            serde_json::from_value(serde_json::json!({"presence": {"status": "online"}, "expires": 60}))
                .unwrap();
        assert_eq!(body.priority, 0);
        assert_eq!(body.tag, None);
    }

    #[test]
    fn amqp_presence_change_serializes_to_two_element_array() {
        let change = AmqpPresenceChange {
            resource: "alice".to_string(),
            view: serde_json::json!({"status": "online"}),
        };
        let value = serde_json::to_value(&change).unwrap();
        assert_eq!(
            value,
            serde_json::json!(["alice", {"presence": {"status": "online"}}])
        );
    }

    #[test]
    fn amqp_presence_change_defaults_missing_status_to_offline() {
        let change = AmqpPresenceChange {
            resource: "bob".to_string(),
            view: serde_json::json!({}),
        };
        let value = serde_json::to_value(&change).unwrap();
        assert_eq!(
            value,
            serde_json::json!(["bob", {"presence": {"status": "offline"}}])
        );
    }
}
