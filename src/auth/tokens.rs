//! Token storage and management

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Treat a token as expired this many seconds early.
const EXPIRY_MARGIN_SECS: i64 = 300;

/// Stored bearer token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub token: String,
    /// Unix seconds, from the JWT `exp` claim when there is one
    pub expires_at: Option<u64>,
}

impl StoredToken {
    /// Wrap a bearer token, reading its expiry from the JWT payload if it
    /// has one. Opaque tokens never expire client-side.
    pub fn new(token: String) -> Self {
        let expires_at = jwt_expiry(&token);
        Self { token, expires_at }
    }

    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(exp) => chrono::Utc::now().timestamp() + EXPIRY_MARGIN_SECS >= exp as i64,
            None => false,
        }
    }
}

/// Read the `exp` claim from a JWT without verifying it.
pub fn jwt_expiry(token: &str) -> Option<u64> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    claims.get("exp")?.as_u64()
}

/// Login persisted between runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    pub user_id: String,
    #[serde(default)]
    pub full_name: String,
    pub email: Option<String>,
    pub token: StoredToken,
}

/// Session store trait for different storage backends
pub trait TokenStore {
    fn get_session(&self) -> Option<StoredSession>;
    fn set_session(&mut self, session: StoredSession);
    fn clear_session(&mut self);
}
