//! `shiplink login`: authenticate with the configured login code.

use anyhow::Result;

use super::{Target, connect};

pub async fn run(target: &Target) -> Result<()> {
    let session = connect(target, true).await?;

    match session.ship() {
        Some(ship) => println!("Authenticated as {} on ~{ship}", session.user()),
        None => println!("Authenticated as {}", session.user()),
    }
    Ok(())
}
