//! JSON message envelope exchanged between services
//!
//! Every inter-service message carries a correlation id so an asynchronous
//! response can be matched to its originating request. Requests additionally
//! carry an `action`; responses carry `success` plus `result` or `error`.

use mesh_core::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub correlation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Request parameters accompanying `action`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Envelope {
    /// A request message with a freshly generated correlation id
    pub fn request(action: &str) -> Self {
        Self::request_with_id(Uuid::new_v4().to_string(), action)
    }

    /// A request message reusing the caller's correlation id
    pub fn request_with_id(correlation_id: String, action: &str) -> Self {
        Self {
            correlation_id,
            action: Some(action.to_string()),
            params: None,
            success: None,
            result: None,
            error: None,
        }
    }

    /// A successful response paired to `correlation_id`
    pub fn response(correlation_id: &str, result: Value) -> Self {
        Self {
            correlation_id: correlation_id.to_string(),
            action: None,
            params: None,
            success: Some(true),
            result: Some(result),
            error: None,
        }
    }

    /// A failed response paired to `correlation_id`
    pub fn failure(correlation_id: &str, error: &str) -> Self {
        Self {
            correlation_id: correlation_id.to_string(),
            action: None,
            params: None,
            success: Some(false),
            result: None,
            error: Some(error.to_string()),
        }
    }

    /// Attach request parameters
    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(raw: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(raw)?)
    }
}
