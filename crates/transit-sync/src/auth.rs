//! Authentication boundary.
//!
//! The core never signs anyone in. It reads who is signed in, listens for
//! transitions, and asks for a bearer token right before each request.

use std::future::Future;

use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

use transit_proto::config::AuthConfig;

use crate::error::AuthError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub user_id: String,
}

impl Identity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

pub trait AuthSession: Send + Sync + 'static {
    /// Who is signed in right now.
    fn current(&self) -> Option<Identity>;

    /// One message per identity transition. Dropping the receiver
    /// unsubscribes.
    fn subscribe(&self) -> broadcast::Receiver<Option<Identity>>;

    /// Fresh bearer token for the current identity.
    fn get_token(&self) -> impl Future<Output = Result<String, AuthError>> + Send;
}

#[derive(Debug, Clone)]
struct Credentials {
    identity: Identity,
    token: String,
}

/// In-process session holding a pre-issued token.
pub struct StaticSession {
    credentials: watch::Sender<Option<Credentials>>,
    events: broadcast::Sender<Option<Identity>>,
}

impl Default for StaticSession {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticSession {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            credentials: watch::Sender::new(None),
            events,
        }
    }

    pub fn signed_in(identity: Identity, token: impl Into<String>) -> Self {
        let session = Self::new();
        session.credentials.send_replace(Some(Credentials {
            identity,
            token: token.into(),
        }));
        session
    }

    /// Signed in when both `user_id` and `token` are configured.
    pub fn from_config(config: &AuthConfig) -> Self {
        match (&config.user_id, &config.token) {
            (Some(user_id), Some(token)) => {
                info!("[auth] using configured session for {}", user_id);
                Self::signed_in(Identity::new(user_id.clone()), token.clone())
            }
            (None, None) => Self::new(),
            _ => {
                warn!("[auth] config needs both user_id and token; starting signed out");
                Self::new()
            }
        }
    }

    /// Sign in (or swap the token). Notifies only when the identity changes.
    pub fn sign_in(&self, identity: Identity, token: impl Into<String>) {
        let token = token.into();
        let mut changed = false;
        self.credentials.send_modify(|creds| {
            changed = creds.as_ref().map(|c| &c.identity) != Some(&identity);
            *creds = Some(Credentials {
                identity: identity.clone(),
                token,
            });
        });
        if changed {
            info!("[auth] signed in as {}", identity.user_id);
            let _ = self.events.send(Some(identity));
        }
    }

    pub fn sign_out(&self) {
        let was_signed_in = self.credentials.send_replace(None).is_some();
        if was_signed_in {
            info!("[auth] signed out");
            let _ = self.events.send(None);
        }
    }
}

impl AuthSession for StaticSession {
    fn current(&self) -> Option<Identity> {
        self.credentials
            .borrow()
            .as_ref()
            .map(|c| c.identity.clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<Option<Identity>> {
        self.events.subscribe()
    }

    async fn get_token(&self) -> Result<String, AuthError> {
        self.credentials
            .borrow()
            .as_ref()
            .map(|c| c.token.clone())
            .ok_or(AuthError::SignedOut)
    }
}
