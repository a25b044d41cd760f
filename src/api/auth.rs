//! Login and profile endpoints

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};

use super::client::{ApiClient, Envelope};
use crate::models::PayloadError;

/// Signed-in user's profile (the fields this client uses).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub id: String,
    pub full_name: String,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawProfile {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

impl Profile {
    fn from_value(value: Value) -> Result<Self, PayloadError> {
        let raw: RawProfile = serde_json::from_value(value)?;
        let id = raw
            .id
            .as_ref()
            .and_then(crate::models::id_string)
            .ok_or(PayloadError::MissingId("user id"))?;
        Ok(Self {
            id,
            full_name: raw.full_name.unwrap_or_default(),
            email: raw.email,
        })
    }
}

/// Find the bearer token in a login response.
///
/// Accepts `data.token`, `data.accessToken`, or a top-level `token`.
fn extract_token(body: &Value) -> Option<String> {
    let data = body.get("data");
    [
        data.and_then(|d| d.get("token")),
        data.and_then(|d| d.get("accessToken")),
        body.get("token"),
    ]
    .into_iter()
    .flatten()
    .filter_map(Value::as_str)
    .find(|t| !t.is_empty())
    .map(String::from)
}

impl ApiClient {
    /// `POST /auth/login`. Returns the bearer token.
    pub async fn login(&self, email: &str, password: &str) -> Result<String> {
        let body: Value = self
            .post("/auth/login", &json!({ "email": email, "password": password }))
            .await?
            .json()
            .await
            .context("Failed to parse login response")?;

        if body.get("success").and_then(Value::as_bool) == Some(false) {
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("invalid credentials");
            anyhow::bail!("Login failed: {}", message);
        }

        extract_token(&body).context("Login response did not contain a token")
    }

    /// `GET /users/profile`.
    pub async fn profile(&self) -> Result<Profile> {
        let envelope: Envelope<Value> = self
            .get("/users/profile")
            .await?
            .json()
            .await
            .context("Failed to parse profile response")?;
        let value = envelope.into_data("Profile")?;
        Ok(Profile::from_value(value)?)
    }
}
