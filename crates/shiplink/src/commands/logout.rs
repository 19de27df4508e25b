//! `shiplink logout`: deauthenticate a freshly authenticated session.

use anyhow::{Result, bail};

use super::{Target, connect};

pub async fn run(target: &Target) -> Result<()> {
    let session = connect(target, true).await?;

    if !session.delete_session().await {
        bail!("failed to deauthenticate {}", session.user());
    }
    println!("Deauthenticated {}", session.user());
    Ok(())
}
