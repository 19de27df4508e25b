//! CLI command implementations.
//!
//! Sessions are not persisted, so every command bootstraps its own.

use anyhow::{Context, Result, anyhow, bail};

use shiplink::config::Config;
use shiplink::{Session, ShipClient};

pub mod login;
pub mod logout;
pub mod poke;
pub mod status;
pub mod watch;

/// Where to connect, as given on the command line.
#[derive(Debug)]
pub struct Target {
    pub config: String,
    pub server: Option<String>,
    pub user: Option<String>,
}

/// Load config and establish a session.
///
/// With `authenticate`, a pending session is logged in with the configured
/// code; a missing code or a rejected login is an error.
pub async fn connect(target: &Target, authenticate: bool) -> Result<Session> {
    let config = Config::load(&target.config)
        .await
        .with_context(|| format!("loading {}", target.config))?;

    let server = target
        .server
        .clone()
        .or_else(|| config.server.clone())
        .ok_or_else(|| anyhow!("no server configured (use --server or set `server` in {})", target.config))?;
    let user = target
        .user
        .clone()
        .or_else(|| config.user.clone())
        .ok_or_else(|| anyhow!("no user configured (use --user or set `user` in {})", target.config))?;

    let client = ShipClient::new(config.client_options());
    let session = client.establish_session(&server, &user).await?;

    if authenticate && !session.is_authenticated() {
        let Some(code) = config.code.as_deref() else {
            bail!("{user} is not authenticated and no login code is configured");
        };
        if !session.authenticate(code).await {
            bail!("authentication failed for {user}");
        }
    }

    Ok(session)
}
