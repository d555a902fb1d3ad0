use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Favorite {
    pub id: String,
    pub user_id: String,
    pub quote_id: String,
    pub created_at: DateTime<Utc>,
}

impl Favorite {
    /// Create a new favorite
    pub fn new(user_id: String, quote_id: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            quote_id,
            created_at: Utc::now(),
        }
    }
}
