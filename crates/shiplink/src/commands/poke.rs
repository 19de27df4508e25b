//! `shiplink poke`: send a one-way command to an app.

use anyhow::{Context, Result, bail};
use serde_json::Value;

use super::{Target, connect};

pub async fn run(target: &Target, app: &str, mark: &str, wire: &str, data: &str) -> Result<()> {
    let data: Value = serde_json::from_str(data).context("--data is not valid JSON")?;
    let session = connect(target, true).await?;

    if !session.poke(app, mark, wire, data).await {
        bail!("poke to {app} failed");
    }
    println!("Poked {app} ({mark}) on {wire}");
    Ok(())
}
