//! Keyed one-time-code store
//!
//! External collaborator of the core: generates short random codes per key
//! and verifies them within a time-to-live window. Purely in-memory.

use rand::Rng;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

struct IssuedCode {
    code: String,
    expires_at: Instant,
}

/// Store of outstanding one-time codes, keyed by an opaque subject
/// (a phone number, an email, a session id)
pub struct OtpStore {
    ttl: Duration,
    codes: Mutex<HashMap<String, IssuedCode>>,
}

impl OtpStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            codes: Mutex::new(HashMap::new()),
        }
    }

    /// Issue a fresh 6-digit code for `key`, replacing any outstanding one
    pub async fn generate(&self, key: &str) -> String {
        let code = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000));
        let mut codes = self.codes.lock().await;
        codes.insert(
            key.to_string(),
            IssuedCode {
                code: code.clone(),
                expires_at: Instant::now() + self.ttl,
            },
        );
        code
    }

    /// Check a code for `key`; a successful verification consumes the code
    pub async fn verify(&self, key: &str, code: &str) -> bool {
        let mut codes = self.codes.lock().await;
        let valid = match codes.get(key) {
            Some(issued) => issued.expires_at >= Instant::now() && issued.code == code,
            None => false,
        };
        if valid {
            codes.remove(key);
        }
        valid
    }
}
