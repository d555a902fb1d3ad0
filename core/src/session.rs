use crate::models::AuthUser;
use crate::{Error, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// The currently signed-in user, observable by anything that needs to
/// react to sign-in and sign-out.
#[derive(Clone)]
pub struct Session {
    user: Arc<watch::Sender<Option<AuthUser>>>,
}

impl Session {
    /// A session with nobody signed in
    pub fn new() -> Self {
        let (user, _) = watch::channel(None);
        Self { user: Arc::new(user) }
    }

    pub fn sign_in(&self, user: AuthUser) {
        info!(user_id = %user.id, "signed in");
        self.user.send_replace(Some(user));
    }

    pub fn sign_out(&self) {
        if let Some(previous) = self.user.send_replace(None) {
            info!(user_id = %previous.id, "signed out");
        }
    }

    pub fn current_user(&self) -> Option<AuthUser> {
        self.user.borrow().clone()
    }

    /// The signed-in user, or [`Error::Unauthenticated`]
    pub fn require_user(&self) -> Result<AuthUser> {
        self.current_user().ok_or(Error::Unauthenticated)
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<AuthUser>> {
        self.user.subscribe()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_in_and_out() {
        let session = Session::new();
        assert!(matches!(session.require_user(), Err(Error::Unauthenticated)));

        session.sign_in(AuthUser::new("u1", "u1@example.com"));
        assert_eq!(session.require_user().unwrap().id, "u1");

        session.sign_out();
        assert!(session.current_user().is_none());
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let session = Session::new();
        let mut rx = session.subscribe();

        session.sign_in(AuthUser::new("u1", "u1@example.com"));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().as_ref().map(|u| u.id.clone()), Some("u1".to_string()));
    }
}
