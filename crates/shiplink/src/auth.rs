//! Session establishment and authentication.
//!
//! `establish_session` bootstraps a [`Session`] from `GET /~/auth.json`. A
//! server that answers with HTML or a redirect marker is not an error: the
//! caller gets a pending session and may `authenticate` it with a login code.

use chrono::Utc;
use shiplink_protocol::{AuthRequest, AuthStatus, DeauthRequest, DeauthResponse, endpoint};
use tracing::{debug, error, warn};

use crate::session::{ClientError, EstablishError, Result, Session, SessionState, ShipClient};
use crate::transport::TransportRequest;

impl ShipClient {
    /// Bootstrap a session against `server` for `user`.
    ///
    /// Fails only when the auth endpoint cannot be reached or answers with a
    /// non-2xx status.
    pub async fn establish_session(
        &self,
        server: &str,
        user: &str,
    ) -> std::result::Result<Session, EstablishError> {
        let server = server.trim_end_matches('/');
        debug!(server, user, "Establishing session");

        let request =
            TransportRequest::get(endpoint::auth(server)).with_timeout(self.options().request_timeout);
        let response = self
            .send(request)
            .await
            .map_err(|source| EstablishError::Transport {
                server: server.to_string(),
                source,
            })?;

        let cookie = response.session_cookie();
        if cookie.is_none() {
            debug!(server, "No session cookie in auth response");
        }
        let pending = |cookie: Option<String>| {
            Session::new(self.clone(), server, user, SessionState::new(cookie))
        };

        if !response.is_json() {
            debug!(
                server,
                content_type = ?response.content_type,
                "Auth endpoint did not answer with JSON, session not authenticated"
            );
            return Ok(pending(cookie));
        }

        let status: AuthStatus = match response.json() {
            Ok(status) => status,
            Err(e) => {
                warn!(server, error = %e, "Unreadable auth status, session not authenticated");
                return Ok(pending(cookie));
            }
        };
        if status.is_redirect() {
            debug!(server, "Auth endpoint redirected, session not authenticated");
            return Ok(pending(cookie));
        }

        let authenticated = status.lists(user);
        let mut state = SessionState::new(cookie);
        state.ship = status.ship;
        state.authenticated = authenticated;
        state.oryx = status.oryx;
        state.ixor = status.ixor;

        let session = Session::new(self.clone(), server, user, state);
        debug!(server, user, ship = ?session.ship(), authenticated, "Session established");
        Ok(session)
    }
}

impl Session {
    /// Live authentication check.
    ///
    /// Returns `false` straight away when the cached flag is unset. Otherwise
    /// bootstraps a brand-new session and reports its flag. The existing cookie
    /// is not presented, so this reflects whether the server would
    /// authenticate a fresh request, not whether this session is still valid.
    pub async fn check_authenticated(&self) -> bool {
        if !self.is_authenticated() {
            return false;
        }

        match self.client().establish_session(self.server(), self.user()).await {
            Ok(fresh) => fresh.is_authenticated(),
            Err(e) => {
                warn!(server = %self.server(), error = %e, "Authentication check failed");
                false
            }
        }
    }

    /// Log in with `code`. A session that is already authenticated succeeds
    /// without contacting the server.
    pub async fn authenticate(&self, code: &str) -> bool {
        if self.is_authenticated() {
            debug!(user = %self.user(), "Already authenticated");
            return true;
        }

        match self.try_authenticate(code).await {
            Ok(()) => {
                debug!(user = %self.user(), "Authenticated successfully");
                true
            }
            Err(e) => {
                error!(user = %self.user(), error = %e, "Failed to authenticate");
                log_error_body(&e);
                false
            }
        }
    }

    async fn try_authenticate(&self, code: &str) -> Result<()> {
        let body = AuthRequest {
            ship: self.user().to_string(),
            code: code.to_string(),
            oryx: self.oryx(),
        };
        let request = self.command(
            endpoint::authenticate(self.server()),
            &body,
            self.options().request_timeout,
        )?;
        let status: AuthStatus = self.send(request).await?.json()?;

        if !status.lists(self.user()) {
            return Err(ClientError::NotAuthenticated {
                user: self.user().to_string(),
            });
        }

        let mut state = self.state();
        state.authenticated = true;
        if status.oryx.is_some() {
            state.oryx = status.oryx;
        }
        if status.ixor.is_some() {
            state.ixor = status.ixor;
        }
        state.last_update = Utc::now();
        Ok(())
    }

    /// Deauthenticate. Succeeds without contacting the server when the session
    /// is not authenticated.
    ///
    /// Subscriptions are not touched; unsubscribe every wire first.
    pub async fn delete_session(&self) -> bool {
        if !self.is_authenticated() {
            debug!(user = %self.user(), "Not authenticated");
            return true;
        }

        match self.try_delete_session().await {
            Ok(()) => {
                debug!(user = %self.user(), "Deauthenticated successfully");
                true
            }
            Err(e) => {
                error!(user = %self.user(), error = %e, "Failed to deauthenticate");
                log_error_body(&e);
                false
            }
        }
    }

    async fn try_delete_session(&self) -> Result<()> {
        let body = DeauthRequest { oryx: self.oryx() };
        let request = self.command(
            endpoint::deauthenticate(self.server()),
            &body,
            self.options().request_timeout,
        )?;
        let reply: DeauthResponse = self.send(request).await?.json()?;

        if !reply.ok {
            return Err(ClientError::Rejected("deauthentication refused".to_string()));
        }

        let mut state = self.state();
        state.cookie = None;
        state.authenticated = false;
        state.oryx = None;
        state.ixor = None;
        Ok(())
    }
}

/// Log the structured body of a failed response, if the server sent one.
pub(crate) fn log_error_body(error: &ClientError) {
    if let ClientError::Transport(e) = error {
        if let Some(body) = e.body() {
            debug!(%body, "Error response body");
        }
    }
}
