//! `shiplink status`: establish a session and print its state.

use anyhow::Result;
use serde::Serialize;

use super::{Target, connect};

#[derive(Debug, Serialize)]
struct StatusReport {
    server: String,
    user: String,
    ship: Option<String>,
    authenticated: bool,
    /// Result of a fresh bootstrap, only checked when `authenticated` is set.
    live: bool,
    event: u64,
}

pub async fn run(target: &Target) -> Result<()> {
    let session = connect(target, false).await?;

    let report = StatusReport {
        server: session.server().to_string(),
        user: session.user().to_string(),
        ship: session.ship(),
        authenticated: session.is_authenticated(),
        live: session.check_authenticated().await,
        event: session.event(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
