use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Collection {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Collection {
    /// Create a new collection owned by `user_id`
    pub fn new(user_id: String, name: String, description: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            name,
            description,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollectionItem {
    pub id: String,
    pub collection_id: String,
    pub quote_id: String,
    pub created_at: DateTime<Utc>,
}

impl CollectionItem {
    pub fn new(collection_id: String, quote_id: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            collection_id,
            quote_id,
            created_at: Utc::now(),
        }
    }
}
