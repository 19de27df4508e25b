//! `shiplink watch`: subscribe to a path and print events until Ctrl-C or quit.

use anyhow::{Result, anyhow, bail};
use serde_json::json;
use tracing::{info, warn};

use shiplink::{ChannelSink, WireEvent};

use super::{Target, connect};

pub async fn run(
    target: &Target,
    app: &str,
    path: &str,
    wire: Option<&str>,
    ship: Option<&str>,
) -> Result<()> {
    let session = connect(target, true).await?;

    let ship = ship
        .map(str::to_string)
        .or_else(|| session.ship())
        .ok_or_else(|| anyhow!("server did not report a ship name (use --ship)"))?;
    let ship = ship.trim_start_matches('~');
    let wire = wire.unwrap_or(path);

    let (sink, mut events) = ChannelSink::channel();
    if !session.subscribe(ship, wire, app, path, sink).await {
        bail!("failed to subscribe to {app}{path} on ~{ship}");
    }
    info!(wire, app, path, "Watching");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            received = events.recv() => {
                let Some((wire, event)) = received else { break };
                match event {
                    WireEvent::Rush(data) => {
                        println!("{}", json!({"wire": wire, "type": "rush", "data": data}));
                    }
                    WireEvent::Quit => {
                        println!("{}", json!({"wire": wire, "type": "quit"}));
                        break;
                    }
                }
            }
        }
    }

    if !session.unsubscribe(ship, wire, app).await {
        warn!(wire, "Failed to unsubscribe");
    }
    session.stop_polling();
    Ok(())
}
