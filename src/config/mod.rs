//! Configuration and session storage

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::auth::{Session, StoredSession, TokenStore};
use crate::realtime::TransportConfig;

const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Backend origin; the REST base and both WebSocket endpoints derive from it
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Stored login (token + identity)
    #[serde(default)]
    pub session: Option<StoredSession>,
    #[serde(default)]
    pub realtime: RealtimeConfig,
}

/// `[realtime]` table
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    pub chat_path: String,
    pub notifications_path: String,
    pub reconnect_delay_secs: u64,
    /// Heart-beat offered in both directions, 0 disables
    pub heartbeat_ms: u64,
    pub connect_timeout_secs: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            chat_path: "/api/ws-chat/websocket".to_string(),
            notifications_path: "/api/ws-notifications/websocket".to_string(),
            reconnect_delay_secs: 5,
            heartbeat_ms: 10_000,
            connect_timeout_secs: 10,
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            session: None,
            realtime: RealtimeConfig::default(),
        }
    }
}

impl Config {
    /// Get config directory path
    fn config_dir() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "skillswap", "skillswap")
            .context("Could not determine config directory")?;
        Ok(proj_dirs.config_dir().to_path_buf())
    }

    /// Get config file path
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from disk
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        toml::from_str(&content).context("Failed to parse config file")
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir).context("Failed to create config directory")?;

        let path = Self::config_path()?;
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&path, content).context("Failed to write config file")?;

        // Set restrictive permissions on config file (contains the bearer token)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(&path, perms).context("Failed to set config permissions")?;
        }

        Ok(())
    }

    /// Apply the `--base-url` flag for this run.
    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        if let Some(url) = base_url {
            self.base_url = url;
        }
        self
    }

    /// Origin without a trailing slash.
    pub fn origin(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// REST base, `<origin>/api`.
    pub fn api_base(&self) -> String {
        format!("{}/api", self.origin())
    }

    /// WebSocket URL for `path`: the origin with http(s) swapped for ws(s).
    pub fn ws_url(&self, path: &str) -> String {
        let origin = self.origin();
        let origin = if let Some(rest) = origin.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = origin.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            origin.to_string()
        };
        format!("{}/{}", origin, path.trim_start_matches('/'))
    }

    /// Host name for the STOMP `host` header.
    pub fn host(&self) -> String {
        url::Url::parse(self.origin())
            .ok()
            .and_then(|u| u.host_str().map(String::from))
            .unwrap_or_else(|| "localhost".to_string())
    }

    fn transport_config(&self, path: &str, session: Option<&Session>) -> TransportConfig {
        TransportConfig {
            url: self.ws_url(path),
            host: self.host(),
            bearer: session.map(|s| s.token.clone()),
            reconnect_delay: Duration::from_secs(self.realtime.reconnect_delay_secs.max(1)),
            heartbeat: Duration::from_millis(self.realtime.heartbeat_ms),
            connect_timeout: Duration::from_secs(self.realtime.connect_timeout_secs.max(1)),
        }
    }

    /// Transport settings for the chat endpoint.
    pub fn chat_transport(&self, session: Option<&Session>) -> TransportConfig {
        self.transport_config(&self.realtime.chat_path, session)
    }

    /// Transport settings for the notification endpoint.
    pub fn notifications_transport(&self, session: Option<&Session>) -> TransportConfig {
        self.transport_config(&self.realtime.notifications_path, session)
    }
}

impl TokenStore for Config {
    fn get_session(&self) -> Option<StoredSession> {
        self.session.clone()
    }

    fn set_session(&mut self, session: StoredSession) {
        self.session = Some(session);
    }

    fn clear_session(&mut self) {
        self.session = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::tokens::StoredToken;

    #[test]
    fn test_ws_url_swaps_scheme() {
        let mut config = Config::default();
        assert_eq!(
            config.ws_url("/api/ws-chat/websocket"),
            "ws://localhost:8080/api/ws-chat/websocket"
        );

        config.base_url = "https://skills.example.com/".to_string();
        assert_eq!(config.api_base(), "https://skills.example.com/api");
        assert_eq!(
            config.ws_url(&config.realtime.notifications_path),
            "wss://skills.example.com/api/ws-notifications/websocket"
        );
        assert_eq!(config.host(), "skills.example.com");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
base_url = "http://10.0.0.2:9000"

[realtime]
reconnect_delay_secs = 2
"#,
        )
        .unwrap();
        assert_eq!(config.base_url, "http://10.0.0.2:9000");
        assert!(config.session.is_none());
        assert_eq!(config.realtime.reconnect_delay_secs, 2);
        assert_eq!(config.realtime.heartbeat_ms, 10_000);
        assert_eq!(config.realtime.chat_path, "/api/ws-chat/websocket");
    }

    #[test]
    fn test_session_survives_toml() {
        let mut config = Config::default();
        config.set_session(StoredSession {
            user_id: "u1".to_string(),
            full_name: "Ann Lee".to_string(),
            email: Some("ann@example.com".to_string()),
            token: StoredToken {
                token: "abc".to_string(),
                expires_at: Some(4_102_444_800),
            },
        });

        let text = toml::to_string_pretty(&config).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.get_session(), config.get_session());

        let mut back = back;
        back.clear_session();
        assert!(back.get_session().is_none());
    }

    #[test]
    fn test_transport_config_carries_bearer() {
        let config = Config::default().with_base_url(Some("https://x.io".to_string()));
        let session = Session {
            user_id: "u1".to_string(),
            token: "tok".to_string(),
            full_name: String::new(),
        };
        let chat = config.chat_transport(Some(&session));
        assert_eq!(chat.url, "wss://x.io/api/ws-chat/websocket");
        assert_eq!(chat.bearer.as_deref(), Some("tok"));
        assert_eq!(chat.reconnect_delay, Duration::from_secs(5));

        let anon = config.notifications_transport(None);
        assert!(anon.bearer.is_none());
    }

    #[test]
    fn test_zero_delays_are_clamped() {
        let mut config = Config::default();
        config.realtime.reconnect_delay_secs = 0;
        config.realtime.connect_timeout_secs = 0;
        let chat = config.chat_transport(None);
        assert_eq!(chat.reconnect_delay, Duration::from_secs(1));
        assert_eq!(chat.connect_timeout, Duration::from_secs(1));
    }
}
