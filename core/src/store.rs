//! Boundary to the backing store.
//!
//! [`RemoteStore`] is the contract the favorites synchronizer depends on.
//! [`SqliteStore`] implements it over the `storage` repositories and also
//! hands out its connection to the catalog.

use crate::models::{Favorite, Quote, QuoteId};
use crate::storage::{Connection, FavoriteRepository};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Favorites operations of the backing store.
///
/// Reads fail with [`Error::RemoteReadFailed`], writes with
/// [`Error::RemoteWriteFailed`].
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Ids of the quotes `user_id` has favorited
    async fn list_favorite_ids(&self, user_id: &str) -> Result<Vec<QuoteId>>;

    /// Full quotes `user_id` has favorited, newest favorite first
    async fn list_favorite_quotes(&self, user_id: &str) -> Result<Vec<Quote>>;

    /// Record a favorite; a duplicate (user, quote) pair is a write failure
    async fn insert_favorite(&self, user_id: &str, quote_id: &str) -> Result<()>;

    /// Remove a favorite
    async fn delete_favorite(&self, user_id: &str, quote_id: &str) -> Result<()>;
}

/// SQLite-backed store
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Run `f` with exclusive access to the connection
    pub async fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send,
        T: Send,
    {
        let conn = self.conn.lock().await;
        f(&conn)
    }
}

fn read_failed(err: Error) -> Error {
    Error::RemoteReadFailed(err.to_string())
}

fn write_failed(err: Error) -> Error {
    Error::RemoteWriteFailed(err.to_string())
}

#[async_trait]
impl RemoteStore for SqliteStore {
    async fn list_favorite_ids(&self, user_id: &str) -> Result<Vec<QuoteId>> {
        self.with_connection(|conn| FavoriteRepository::quote_ids_for_user(conn, user_id))
            .await
            .map_err(read_failed)
    }

    async fn list_favorite_quotes(&self, user_id: &str) -> Result<Vec<Quote>> {
        self.with_connection(|conn| FavoriteRepository::quotes_for_user(conn, user_id))
            .await
            .map_err(read_failed)
    }

    async fn insert_favorite(&self, user_id: &str, quote_id: &str) -> Result<()> {
        let favorite = Favorite::new(user_id.to_string(), quote_id.to_string());
        self.with_connection(|conn| FavoriteRepository::create(conn, &favorite))
            .await
            .map_err(write_failed)
    }

    async fn delete_favorite(&self, user_id: &str, quote_id: &str) -> Result<()> {
        let deleted = self
            .with_connection(|conn| FavoriteRepository::delete(conn, user_id, quote_id))
            .await;

        match deleted {
            // Deleting an absent row is not an error for the backend either
            Err(Error::NotFound(_)) => {
                debug!(user_id, quote_id, "favorite already absent");
                Ok(())
            }
            other => other.map_err(write_failed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Database, FavoriteRepository, QuoteRepository};

    fn store_with_quotes(ids: &[&str]) -> SqliteStore {
        let conn = Database::open_in_memory().unwrap();
        for id in ids {
            let quote = Quote::with_id(id.to_string(), format!("Quote {}", id), "Author".to_string());
            QuoteRepository::create(&conn, &quote).unwrap();
        }
        SqliteStore::new(conn)
    }

    #[tokio::test]
    async fn test_insert_then_list() {
        let store = store_with_quotes(&["q1", "q2"]);

        store.insert_favorite("u1", "q1").await.unwrap();

        let stored = store
            .with_connection(|conn| {
                Ok((
                    FavoriteRepository::is_favorited(conn, "u1", "q1")?,
                    FavoriteRepository::is_favorited(conn, "u1", "q2")?,
                ))
            })
            .await
            .unwrap();
        assert_eq!(stored, (true, false));
        assert_eq!(store.list_favorite_ids("u1").await.unwrap(), vec!["q1".to_string()]);
        let quotes = store.list_favorite_quotes("u1").await.unwrap();
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].content, "Quote q1");
        assert!(store.list_favorite_ids("u2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_write_failure() {
        let store = store_with_quotes(&["q1"]);

        store.insert_favorite("u1", "q1").await.unwrap();
        let result = store.insert_favorite("u1", "q1").await;

        assert!(matches!(result, Err(Error::RemoteWriteFailed(_))));
    }

    #[tokio::test]
    async fn test_insert_for_missing_quote_is_write_failure() {
        let store = store_with_quotes(&[]);
        let result = store.insert_favorite("u1", "nope").await;
        assert!(matches!(result, Err(Error::RemoteWriteFailed(_))));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = store_with_quotes(&["q1"]);

        store.insert_favorite("u1", "q1").await.unwrap();
        store.delete_favorite("u1", "q1").await.unwrap();
        store.delete_favorite("u1", "q1").await.unwrap();

        let still_stored = store
            .with_connection(|conn| FavoriteRepository::is_favorited(conn, "u1", "q1"))
            .await
            .unwrap();
        assert!(!still_stored);

        assert!(store.list_favorite_ids("u1").await.unwrap().is_empty());
    }
}
