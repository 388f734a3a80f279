use async_trait::async_trait;
use marks_common::api::SessionUser;

use crate::error::RemoteError;

/// The signed-in identity a synchronizer works on behalf of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub email: Option<String>,
}

impl Session {
    pub fn new(user_id: impl Into<String>, email: Option<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email,
        }
    }

    /// Display label: the email when known, otherwise the owner id.
    pub fn label(&self) -> &str {
        self.email.as_deref().unwrap_or(&self.user_id)
    }
}

impl From<SessionUser> for Session {
    fn from(user: SessionUser) -> Self {
        Self::new(user.id, user.email)
    }
}

/// Source of truth for "who is signed in".
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// The current session, or `None` when nobody is signed in.
    async fn current_user(&self) -> Result<Option<Session>, RemoteError>;

    async fn sign_out(&self) -> Result<(), RemoteError>;
}

/// Where presentation starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Dashboard(Session),
    SignIn,
}

/// Route to the dashboard when a session exists, to sign-in otherwise.
/// Provider failures count as signed out.
pub async fn resolve_entry(provider: &dyn SessionProvider) -> Entry {
    match provider.current_user().await {
        Ok(Some(session)) => Entry::Dashboard(session),
        Ok(None) => Entry::SignIn,
        Err(err) => {
            tracing::warn!(%err, "session lookup failed");
            Entry::SignIn
        }
    }
}
