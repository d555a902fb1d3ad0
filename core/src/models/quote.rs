use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Quote {
    pub id: String,
    pub content: String,
    pub author: String,
    pub author_title: Option<String>,
    pub category_id: Option<String>,
    /// Resolved from the categories table when the quote is read, never stored.
    pub category_name: Option<String>,
    pub is_quote_of_day: bool,
    pub created_at: DateTime<Utc>,
}

impl Quote {
    /// Create a new quote with a generated UUID
    pub fn new(content: String, author: String, category_id: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content,
            author,
            author_title: None,
            category_id,
            category_name: None,
            is_quote_of_day: false,
            created_at: Utc::now(),
        }
    }

    /// Create a quote with a specific ID (for testing or import)
    pub fn with_id(id: String, content: String, author: String) -> Self {
        Self {
            id,
            ..Self::new(content, author, None)
        }
    }
}

/// An author aggregated from the quotes table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Author {
    pub name: String,
    pub quote_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_creation() {
        let quote = Quote::new("Stay hungry".to_string(), "Steve Jobs".to_string(), None);
        assert_eq!(quote.content, "Stay hungry");
        assert_eq!(quote.author, "Steve Jobs");
        assert!(!quote.id.is_empty());
        assert!(!quote.is_quote_of_day);
    }

    #[test]
    fn test_quote_with_id() {
        let quote = Quote::with_id("q1".to_string(), "Text".to_string(), "Someone".to_string());
        assert_eq!(quote.id, "q1");
        assert_eq!(quote.category_id, None);
    }
}
