use serde::{Deserialize, Serialize};

/// The signed-in identity, as handed over by the authentication provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    pub username: Option<String>,
}

impl AuthUser {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            username: None,
        }
    }

    /// Name shown as the author of quotes this user submits
    pub fn display_name(&self) -> &str {
        self.username.as_deref().unwrap_or("Anonymous")
    }
}
