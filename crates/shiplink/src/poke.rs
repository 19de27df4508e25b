//! One-way commands ("pokes") to a ship's apps.

use serde_json::Value;
use shiplink_protocol::{PokeRequest, endpoint};
use tracing::{debug, error};

use crate::auth::log_error_body;
use crate::session::{Result, Session};

impl Session {
    /// Send `data` to `app`, tagged with the data format `mark` and `wire`.
    ///
    /// Returns `true` iff the server answered 2xx. There is no retry, and the
    /// session's tokens are left as they were.
    pub async fn poke(&self, app: &str, mark: &str, wire: &str, data: Value) -> bool {
        match self.try_poke(app, mark, wire, data).await {
            Ok(()) => {
                debug!(app, mark, wire, "Poke delivered");
                true
            }
            Err(e) => {
                error!(app, mark, wire, error = %e, "Poke failed");
                log_error_body(&e);
                false
            }
        }
    }

    async fn try_poke(&self, app: &str, mark: &str, wire: &str, data: Value) -> Result<()> {
        let body = PokeRequest {
            oryx: self.oryx(),
            wire: wire.to_string(),
            xyro: data,
        };
        let request = self.command(
            endpoint::poke(self.server(), app, mark),
            &body,
            self.options().request_timeout,
        )?;
        self.send(request).await?;
        Ok(())
    }
}
