//! Authenticated HTTP client for the SkillSwap REST API
//!
//! Wraps reqwest::Client with bearer token injection and the backend's
//! `{ success, data, message }` response envelope.

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::auth::Session;
use crate::config::Config;

/// Standard response envelope.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

impl<T> Envelope<T> {
    /// Unwrap `data`, turning `success: false` into an error carrying the
    /// server's message.
    pub fn into_data(self, what: &str) -> Result<T> {
        if !self.success {
            bail!(
                "{} failed: {}",
                what,
                self.message
                    .as_deref()
                    .unwrap_or("server reported an unsuccessful response")
            );
        }
        self.data
            .with_context(|| format!("{}: response has no data", what))
    }
}

/// REST client. Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: String,
    token: Option<String>,
}

impl ApiClient {
    /// Client for `config`'s backend, authenticated as `session` if given.
    pub fn new(config: &Config, session: Option<&Session>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: config.api_base(),
            token: session.map(|s| s.token.clone()),
        }
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let req = self.http.request(method, url);
        match self.token {
            Some(ref token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// GET `<base><path>`.
    pub async fn get(&self, path: &str) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base, path);
        tracing::debug!("GET {}", url);

        let resp = self
            .request(reqwest::Method::GET, &url)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;

        check_response(resp, &url).await
    }

    /// POST a JSON body to `<base><path>`.
    pub async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base, path);
        tracing::debug!("POST {}", url);

        let resp = self
            .request(reqwest::Method::POST, &url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {} failed", url))?;

        check_response(resp, &url).await
    }

    /// GET and unwrap the envelope's `data`.
    pub async fn get_data<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let envelope: Envelope<T> = self
            .get(path)
            .await?
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {}", path))?;
        envelope.into_data(path)
    }

    /// POST and unwrap the envelope's `data`.
    pub async fn post_data<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let envelope: Envelope<T> = self
            .post(path, body)
            .await?
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {}", path))?;
        envelope.into_data(path)
    }
}

/// Check HTTP response status code and return a clear error on failure.
async fn check_response(resp: reqwest::Response, url: &str) -> Result<reqwest::Response> {
    let status = resp.status();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        bail!(
            "{} for {}. Token may be invalid -- run 'skillswap login'.",
            status,
            url
        );
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<Envelope<serde_json::Value>>(&body)
            .ok()
            .and_then(|e| e.message)
            .unwrap_or(body);
        bail!("HTTP {} for {}: {}", status.as_u16(), url, detail);
    }
    Ok(resp)
}
