//! Email/password login against the backend

use std::io::{self, BufRead, Write};

use anyhow::{bail, Context, Result};

use super::tokens::{StoredSession, StoredToken, TokenStore};
use super::Session;
use crate::api::client::ApiClient;
use crate::config::Config;

/// Log in and store the session.
pub async fn login(
    config: Config,
    email: &str,
    password: Option<String>,
    force: bool,
) -> Result<()> {
    let mut config = config;

    if !force {
        if let Some(session) = Session::from_config(&config) {
            println!(
                "Already logged in as {}. Use --force to re-authenticate.",
                session.display_name()
            );
            return Ok(());
        }
    }

    let password = match password {
        Some(p) => p,
        None => prompt("Password: ")?,
    };
    if password.is_empty() {
        bail!("Password must not be empty");
    }

    let anonymous = ApiClient::new(&config, None);
    let token = anonymous.login(email, &password).await?;
    tracing::info!("Login accepted, fetching profile...");

    let session = Session {
        user_id: String::new(),
        token: token.clone(),
        full_name: String::new(),
    };
    let profile = ApiClient::new(&config, Some(&session))
        .profile()
        .await
        .context("Logged in but failed to fetch user profile")?;

    config.set_session(StoredSession {
        user_id: profile.id.clone(),
        full_name: profile.full_name.clone(),
        email: profile.email.clone().or_else(|| Some(email.to_string())),
        token: StoredToken::new(token),
    });
    config.save()?;

    println!("Login successful. Signed in as {} ({}).", profile.full_name, profile.id);
    Ok(())
}

/// Clear the stored session
pub async fn logout(config: Config) -> Result<()> {
    let mut config = config;
    config.clear_session();
    config.save()?;
    println!("Logged out.");
    Ok(())
}

/// Print the stored session and endpoints
pub async fn status(config: Config) -> Result<()> {
    println!("Backend:       {}", config.origin());
    println!(
        "Chat WS:       {}",
        config.ws_url(&config.realtime.chat_path)
    );
    println!(
        "Notify WS:     {}",
        config.ws_url(&config.realtime.notifications_path)
    );

    match config.get_session() {
        Some(stored) if !stored.token.is_expired() => {
            println!("Session:       valid");
            println!("  user:        {} ({})", stored.full_name, stored.user_id);
            if let Some(exp) = stored.token.expires_at {
                println!("  expires_at:  {}", exp);
            }
        }
        Some(stored) => {
            println!("Session:       expired (user {})", stored.user_id);
        }
        None => {
            println!("Session:       none");
        }
    }

    if Session::from_config(&config).is_none() {
        println!("\nRun 'skillswap login --email <you@example.com>' to authenticate.");
    }

    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush().context("Failed to flush stdout")?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
