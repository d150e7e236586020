//! Authentication context passed explicitly to every API client.
//!
//! Holds the bearer credential and the principal it belongs to. `login` and
//! `logout` replace the whole credential in one step, and subscribers see the
//! change through a `watch` channel (used to route back to login on 401).

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use crate::error::{CoreError, Result};

/// Logged-in identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    /// Email of the player or staff member the token was issued to
    pub principal: String,
}

#[derive(Debug, Clone)]
pub struct AuthContext {
    state: Arc<watch::Sender<Option<Credential>>>,
}

impl Default for AuthContext {
    fn default() -> Self {
        Self::anonymous()
    }
}

impl AuthContext {
    pub fn anonymous() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { state: Arc::new(tx) }
    }

    pub fn logged_in(token: impl Into<String>, principal: impl Into<String>) -> Self {
        let ctx = Self::anonymous();
        ctx.login(token, principal);
        ctx
    }

    pub fn login(&self, token: impl Into<String>, principal: impl Into<String>) {
        let credential = Credential {
            token: token.into(),
            principal: principal.into(),
        };
        info!(principal = %credential.principal, "credential installed");
        self.state.send_replace(Some(credential));
    }

    /// Drop the credential. Returns whether one was present.
    pub fn logout(&self) -> bool {
        let previous = self.state.send_replace(None);
        if let Some(credential) = &previous {
            info!(principal = %credential.principal, "credential cleared");
        }
        previous.is_some()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_some()
    }

    pub fn bearer(&self) -> Result<String> {
        self.state
            .borrow()
            .as_ref()
            .map(|c| c.token.clone())
            .ok_or(CoreError::Unauthenticated)
    }

    pub fn principal(&self) -> Option<String> {
        self.state.borrow().as_ref().map(|c| c.principal.clone())
    }

    /// Change feed; `None` means logged out.
    pub fn subscribe(&self) -> watch::Receiver<Option<Credential>> {
        self.state.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_logout_cycle() {
        let ctx = AuthContext::anonymous();
        assert!(!ctx.is_authenticated());
        assert_eq!(ctx.bearer(), Err(CoreError::Unauthenticated));

        ctx.login("tok-1", "player@x.com");
        assert_eq!(ctx.bearer().unwrap(), "tok-1");
        assert_eq!(ctx.principal().as_deref(), Some("player@x.com"));

        assert!(ctx.logout());
        assert!(!ctx.logout());
        assert!(ctx.principal().is_none());
    }

    #[tokio::test]
    async fn test_clones_share_one_credential() {
        let ctx = AuthContext::logged_in("tok-2", "staff@x.com");
        let clone = ctx.clone();
        let mut feed = ctx.subscribe();

        clone.logout();
        feed.changed().await.unwrap();
        assert!(feed.borrow().is_none());
        assert!(!ctx.is_authenticated());
    }
}
