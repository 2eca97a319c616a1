//! Concrete services: thin wrappers over the base runtime

use crate::otp::OtpStore;
use mesh_broker::{channel as broker_channel, Channel, Envelope};
use mesh_core::{MeshError, Result};
use mesh_runtime::{BaseService, MessageHandler, Service};
use serde_json::{json, Value};
use std::sync::Arc;

pub const API_REQUEST_QUEUE: &str = "api.requests";
pub const API_RESPONSE_QUEUE: &str = "api.responses";
pub const OTP_REQUEST_QUEUE: &str = "otp.requests";
pub const OTP_RESPONSE_QUEUE: &str = "otp.responses";

/// General-purpose API service answering request envelopes
pub struct ApiService {
    base: BaseService,
}

impl ApiService {
    pub fn new(base: BaseService) -> Self {
        Self { base }
    }

    fn require_channel(&self) -> Result<Channel> {
        self.base.channel().cloned().ok_or_else(|| {
            MeshError::BrokerUnavailable("api service has no broker channel".to_string())
        })
    }
}

#[async_trait::async_trait]
impl Service for ApiService {
    fn base(&self) -> &BaseService {
        &self.base
    }

    async fn on_start(&self) -> Result<()> {
        let channel = self.require_channel()?;
        self.base.register_queue(API_REQUEST_QUEUE).await?;
        self.base.register_queue(API_RESPONSE_QUEUE).await?;
        self.base
            .consume_from_queue(API_REQUEST_QUEUE, Arc::new(ApiHandler { channel }))
            .await
    }
}

struct ApiHandler {
    channel: Channel,
}

#[async_trait::async_trait]
impl MessageHandler for ApiHandler {
    async fn handle(&self, payload: Value, _raw: &[u8]) -> Result<()> {
        let request: Envelope = serde_json::from_value(payload)?;
        let response = answer_api_request(&request);
        broker_channel::publish(&self.channel, API_RESPONSE_QUEUE, &response.encode()?).await
    }
}

fn answer_api_request(request: &Envelope) -> Envelope {
    match request.action.as_deref() {
        Some("ping") => Envelope::response(&request.correlation_id, json!("pong")),
        Some(other) => Envelope::failure(
            &request.correlation_id,
            &format!("unknown action: {}", other),
        ),
        None => Envelope::failure(&request.correlation_id, "request is missing an action"),
    }
}

/// One-time-code service: issues and verifies codes over the broker
pub struct OtpService {
    base: BaseService,
    store: Arc<OtpStore>,
}

impl OtpService {
    pub fn new(base: BaseService, store: OtpStore) -> Self {
        Self {
            base,
            store: Arc::new(store),
        }
    }
}

#[async_trait::async_trait]
impl Service for OtpService {
    fn base(&self) -> &BaseService {
        &self.base
    }

    async fn on_start(&self) -> Result<()> {
        let channel = self.base.channel().cloned().ok_or_else(|| {
            MeshError::BrokerUnavailable("otp service has no broker channel".to_string())
        })?;
        self.base.register_queue(OTP_REQUEST_QUEUE).await?;
        self.base.register_queue(OTP_RESPONSE_QUEUE).await?;
        let handler = OtpHandler {
            channel,
            store: Arc::clone(&self.store),
        };
        self.base
            .consume_from_queue(OTP_REQUEST_QUEUE, Arc::new(handler))
            .await
    }
}

struct OtpHandler {
    channel: Channel,
    store: Arc<OtpStore>,
}

#[async_trait::async_trait]
impl MessageHandler for OtpHandler {
    async fn handle(&self, payload: Value, _raw: &[u8]) -> Result<()> {
        let request: Envelope = serde_json::from_value(payload)?;
        let response = answer_otp_request(&self.store, &request).await;
        broker_channel::publish(&self.channel, OTP_RESPONSE_QUEUE, &response.encode()?).await
    }
}

async fn answer_otp_request(store: &OtpStore, request: &Envelope) -> Envelope {
    let id = &request.correlation_id;
    let params = request.params.clone().unwrap_or(Value::Null);

    match request.action.as_deref() {
        Some("otp.generate") => match params.get("key").and_then(Value::as_str) {
            Some(key) => {
                let code = store.generate(key).await;
                Envelope::response(id, json!({ "key": key, "code": code }))
            }
            None => Envelope::failure(id, "otp.generate requires a key"),
        },
        Some("otp.verify") => {
            let key = params.get("key").and_then(Value::as_str);
            let code = params.get("code").and_then(Value::as_str);
            match (key, code) {
                (Some(key), Some(code)) => {
                    let valid = store.verify(key, code).await;
                    Envelope::response(id, json!({ "valid": valid }))
                }
                _ => Envelope::failure(id, "otp.verify requires key and code"),
            }
        }
        Some(other) => Envelope::failure(id, &format!("unknown action: {}", other)),
        None => Envelope::failure(id, "request is missing an action"),
    }
}

/// Gateway service: broker-free, registers with the registry; its HTTP read
/// surface is served by the launcher
pub struct GatewayService {
    base: BaseService,
}

impl GatewayService {
    pub fn new(base: BaseService) -> Self {
        Self { base }
    }
}

#[async_trait::async_trait]
impl Service for GatewayService {
    fn base(&self) -> &BaseService {
        &self.base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_api_ping_gets_pong() {
        let request = Envelope::request_with_id("req-1".to_string(), "ping");
        let response = answer_api_request(&request);
        assert_eq!(response.correlation_id, "req-1");
        assert_eq!(response.success, Some(true));
        assert_eq!(response.result, Some(json!("pong")));
    }

    #[test]
    fn test_api_unknown_action_gets_failure() {
        let request = Envelope::request_with_id("req-2".to_string(), "reboot");
        let response = answer_api_request(&request);
        assert_eq!(response.success, Some(false));
        assert!(response.error.unwrap().contains("reboot"));
    }

    #[tokio::test]
    async fn test_otp_generate_then_verify_over_envelopes() {
        let store = OtpStore::new(Duration::from_secs(60));

        let generate = Envelope::request_with_id("req-3".to_string(), "otp.generate")
            .with_params(json!({"key": "user@example.com"}));
        let generated = answer_otp_request(&store, &generate).await;
        assert_eq!(generated.success, Some(true));
        let code = generated.result.unwrap()["code"].as_str().unwrap().to_string();

        let verify = Envelope::request_with_id("req-4".to_string(), "otp.verify")
            .with_params(json!({"key": "user@example.com", "code": code}));
        let verified = answer_otp_request(&store, &verify).await;
        assert_eq!(verified.result.unwrap()["valid"], json!(true));
    }

    #[tokio::test]
    async fn test_otp_generate_without_key_fails() {
        let store = OtpStore::new(Duration::from_secs(60));
        let request = Envelope::request_with_id("req-5".to_string(), "otp.generate");
        let response = answer_otp_request(&store, &request).await;
        assert_eq!(response.success, Some(false));
    }

    #[tokio::test]
    async fn test_otp_verify_wrong_code_is_invalid_not_error() {
        let store = OtpStore::new(Duration::from_secs(60));
        store.generate("user@example.com").await;

        let verify = Envelope::request_with_id("req-6".to_string(), "otp.verify")
            .with_params(json!({"key": "user@example.com", "code": "0000000"}));
        let response = answer_otp_request(&store, &verify).await;
        assert_eq!(response.success, Some(true));
        assert_eq!(response.result.unwrap()["valid"], json!(false));
    }
}
