//! Authentication and the signed-in session
//!
//! The session is an explicit value handed to the components that need the
//! current user id or bearer token. It is built from the stored config, so
//! tests construct it directly.

mod login;
pub mod tokens;

pub use login::{login, logout, status};
pub use tokens::{StoredSession, TokenStore};

use anyhow::{bail, Result};

use crate::config::Config;

/// Signed-in identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub token: String,
    pub full_name: String,
}

impl Session {
    /// Session from stored config. `None` if nobody is logged in or the
    /// token has expired.
    pub fn from_config(config: &Config) -> Option<Self> {
        let stored = config.get_session()?;
        if stored.token.is_expired() {
            tracing::info!("Stored token for {} has expired", stored.user_id);
            return None;
        }
        if stored.user_id.is_empty() {
            return None;
        }
        Some(Self {
            user_id: stored.user_id,
            token: stored.token.token,
            full_name: stored.full_name,
        })
    }

    /// Like [`from_config`](Self::from_config) but fails with a hint.
    pub fn require(config: &Config) -> Result<Self> {
        match Self::from_config(config) {
            Some(session) => Ok(session),
            None => bail!("Not logged in (or token expired). Run 'skillswap login' first."),
        }
    }

    /// Name to show for the signed-in user.
    pub fn display_name(&self) -> &str {
        if self.full_name.is_empty() {
            &self.user_id
        } else {
            &self.full_name
        }
    }
}
